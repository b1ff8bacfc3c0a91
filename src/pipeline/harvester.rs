//! The single consumer of the record queue

use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cohort::SubjectRecord;
use crate::error::Result;
use crate::record_log::RecordLogWriter;

/// Start draining `receiver` into `writer` on the blocking pool.
///
/// The task ends once every sender is gone and the queue is empty, and hands
/// the writer back. On a write failure the receiver is closed so producers
/// blocked on a full queue fail instead of waiting forever.
pub fn spawn_harvester<W>(
    writer: RecordLogWriter<W>,
    receiver: mpsc::Receiver<SubjectRecord>,
) -> JoinHandle<Result<RecordLogWriter<W>>>
where
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || harvest(writer, receiver))
}

fn harvest<W: Write>(
    mut writer: RecordLogWriter<W>,
    mut receiver: mpsc::Receiver<SubjectRecord>,
) -> Result<RecordLogWriter<W>> {
    while let Some(record) = receiver.blocking_recv() {
        if let Err(e) = writer.write_record(&record) {
            log::error!("Failed to write record {}: {e}", writer.records_written() + 1);
            receiver.close();
            return Err(e);
        }
    }
    log::debug!("Record queue drained after {} records", writer.records_written());
    Ok(writer)
}
