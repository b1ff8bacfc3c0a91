use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use super::{LogHeader, is_compressed};
use crate::cohort::SubjectRecord;
use crate::error::Result;

/// Reads the header, then iterates records until the end of the log
pub struct RecordLogReader<R: BufRead> {
    lines: Lines<R>,
    header: LogHeader,
}

impl RecordLogReader<BufReader<Box<dyn Read + Send>>> {
    /// Open a log file, decompressing `.gz` paths
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let input: Box<dyn Read + Send> = if is_compressed(path) {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::new(BufReader::new(input))
    }
}

impl<R: BufRead> RecordLogReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let first = lines.next().transpose()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "record log has no header")
        })?;
        let header: LogHeader = serde_json::from_str(&first)?;
        Ok(Self { lines, header })
    }

    #[must_use]
    pub const fn header(&self) -> &LogHeader {
        &self.header
    }
}

impl<R: BufRead> Iterator for RecordLogReader<R> {
    type Item = Result<SubjectRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(Into::into));
        }
    }
}

/// Read a whole log into memory
pub fn read_record_log(path: &Path) -> Result<(LogHeader, Vec<SubjectRecord>)> {
    let reader = RecordLogReader::open(path)?;
    let header = reader.header().clone();
    let records = reader.collect::<Result<Vec<_>>>()?;
    Ok((header, records))
}
