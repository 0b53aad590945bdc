//! Writer side of the wire protocol.

use std::collections::HashSet;
use std::io::{self, Write};

use super::LineProcessor;
use crate::observation::{Observation, ObservationKind};

/// Writes observations as newline-delimited records.
///
/// The meta record for a kind is written the first time an observation of
/// that kind goes out, so a reader can always decode what follows.
pub struct Encoder<W: Write> {
    writer: W,
    announced: HashSet<ObservationKind>,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            announced: HashSet::new(),
        }
    }

    /// Write one observation, preceded by its meta record if needed.
    pub fn write(&mut self, observation: &Observation) -> io::Result<()> {
        let kind = observation.kind();
        if self.announced.insert(kind) {
            self.write_line(&LineProcessor::meta_record(kind))?;
        }
        self.write_line(&LineProcessor::encode(observation))
    }

    /// Write the terminal record and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_line(&LineProcessor::end_record())?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_line(&mut self, record: &serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }
}
