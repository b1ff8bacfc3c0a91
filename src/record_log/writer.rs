use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use super::{LogHeader, is_compressed};
use crate::cohort::SubjectRecord;
use crate::error::Result;

/// Serializes the header and records as JSON Lines
pub struct RecordLogWriter<W: Write> {
    out: BufWriter<W>,
    header_written: bool,
    records: u64,
}

impl<W: Write> RecordLogWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: BufWriter::new(inner),
            header_written: false,
            records: 0,
        }
    }

    /// Write the header; allowed once, before any record
    pub fn write_header(&mut self, header: &LogHeader) -> Result<()> {
        if self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record log header already written",
            )
            .into());
        }
        serde_json::to_writer(&mut self.out, header)?;
        self.out.write_all(b"\n")?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_record(&mut self, record: &SubjectRecord) -> Result<()> {
        if !self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record written before the record log header",
            )
            .into());
        }
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    #[must_use]
    pub const fn records_written(&self) -> u64 {
        self.records
    }

    #[must_use]
    pub const fn header_written(&self) -> bool {
        self.header_written
    }

    /// Flush buffered output and return the underlying writer
    pub fn finish(self) -> Result<W> {
        self.out.into_inner().map_err(|e| e.into_error().into())
    }
}

enum LogSink {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(file) => file.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(file) => file.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Output file that only appears under its final name once committed.
///
/// Data goes to `<path>.partial`; [`LogFile::commit`] finishes compression
/// and renames it, [`LogFile::discard`] deletes it.
pub struct LogFile {
    path: PathBuf,
    partial: PathBuf,
    sink: LogSink,
}

impl LogFile {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let partial = partial_path(path);
        let file = File::create(&partial)?;
        let sink = if is_compressed(path) {
            LogSink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            LogSink::Plain(file)
        };

        log::debug!("Writing record log to {}", partial.display());
        Ok(Self {
            path: path.to_path_buf(),
            partial,
            sink,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete the stream and move it to its final path
    pub fn commit(self) -> Result<PathBuf> {
        let mut file = match self.sink {
            LogSink::Plain(file) => file,
            LogSink::Gzip(encoder) => encoder.finish()?,
        };
        file.flush()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.partial, &self.path)?;
        Ok(self.path)
    }

    /// Remove the partial output of a failed run
    pub fn discard(self) {
        drop(self.sink);
        discard_partial(&self.path);
    }
}

/// Where the log for `path` is written until it is committed
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

/// Delete the uncommitted log for `path`, if any
pub fn discard_partial(path: &Path) {
    let partial = partial_path(path);
    match fs::remove_file(&partial) {
        Ok(()) => log::info!("Discarded partial record log {}", partial.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "Failed to remove partial record log {}: {e}",
            partial.display()
        ),
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
