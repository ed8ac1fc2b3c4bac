use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::WriterError;
use super::event_builder::ReadoutEvent;

/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// Persistence of readout events
pub trait ReadoutWriter {
    fn write_event(&mut self, event: &ReadoutEvent) -> Result<(), WriterError>;
    fn close(&mut self) -> Result<(), WriterError>;
}

/// First document of every output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: String,
    pub run_number: i32,
}

/// Writes a YAML stream: one header document followed by one document per event.
#[derive(Debug)]
pub struct YamlWriter {
    file: Option<BufWriter<File>>,
    path: PathBuf,
    events_written: u64,
}

impl YamlWriter {
    /// Create the writer, opening a file at path and writing the header
    pub fn new(path: &Path, run_number: i32) -> Result<Self, WriterError> {
        let mut file = BufWriter::new(File::create(path)?);
        let header = FileHeader {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            run_number,
        };
        file.write_all(b"---\n")?;
        file.write_all(serde_yaml::to_string(&header)?.as_bytes())?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            events_written: 0,
        })
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }
}

impl ReadoutWriter for YamlWriter {
    fn write_event(&mut self, event: &ReadoutEvent) -> Result<(), WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::Closed)?;
        file.write_all(b"---\n")?;
        file.write_all(serde_yaml::to_string(event)?.as_bytes())?;
        self.events_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriterError> {
        let mut file = self.file.take().ok_or(WriterError::Closed)?;
        file.flush()?;
        log::info!(
            "Wrote {} events to {}",
            self.events_written,
            self.path.to_string_lossy()
        );
        Ok(())
    }
}

/// Read back a file written by [`YamlWriter`]
pub fn read_readout_file(path: &Path) -> Result<(FileHeader, Vec<ReadoutEvent>), WriterError> {
    let contents = std::fs::read_to_string(path)?;
    let mut documents = serde_yaml::Deserializer::from_str(&contents);
    let header = match documents.next() {
        Some(doc) => FileHeader::deserialize(doc)?,
        None => {
            return Err(WriterError::IOError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "readout file has no header",
            )))
        }
    };
    let mut events = Vec::new();
    for doc in documents {
        events.push(ReadoutEvent::deserialize(doc)?);
    }
    Ok((header, events))
}
