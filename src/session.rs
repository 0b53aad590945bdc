//! One analysis run: a decoder and a state machine fed from an ordered
//! record stream.

use anyhow::Context;
use std::io::BufRead;
use tracing::{debug, info, warn};

use crate::analysis::{Analyzer, Snapshot, SourceProvider, SuspensionClassifier};
use crate::codec::{CodecError, LineProcessor, Record};
use crate::observation::AsyncId;

/// Whether the caller should keep feeding lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Counters for the ingested stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Non-blank lines read before the end record
    pub lines: u64,
    /// Observations handed to the state machine
    pub observations: u64,
    /// Malformed lines skipped
    pub skipped: u64,
    /// Records of unknown kinds
    pub ignored: u64,
}

/// Per-run ingestion state.
#[derive(Debug, Default)]
pub struct Session {
    processor: LineProcessor,
    analyzer: Analyzer,
    ended: bool,
    stats: IngestStats,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dump the final state of these ids to the debug log when the session
    /// finishes.
    pub fn with_raw_ids<I: IntoIterator<Item = AsyncId>>(mut self, ids: I) -> Self {
        self.analyzer = self.analyzer.with_raw_ids(ids);
        self
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Feed one line of newline-delimited JSON.
    ///
    /// Malformed lines are logged and skipped. Protocol violations are
    /// returned as errors and the stream should be abandoned.
    pub fn feed_line(&mut self, line: &str) -> Result<Flow, CodecError> {
        if self.ended {
            return Ok(Flow::Stop);
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        self.stats.lines += 1;

        match self.processor.decode_line(line) {
            Ok(Record::Observation(observation)) => {
                self.stats.observations += 1;
                self.analyzer.process(observation);
            }
            Ok(Record::Meta(kind)) => debug!(%kind, "field order registered"),
            Ok(Record::Ignored) => self.stats.ignored += 1,
            Ok(Record::End) => {
                debug!("end of stream");
                self.ended = true;
                return Ok(Flow::Stop);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "skipping record");
                self.stats.skipped += 1;
            }
        }
        Ok(Flow::Continue)
    }

    /// Feed every line of a reader until the end record or end of input.
    pub fn feed_reader<R: BufRead>(&mut self, mut reader: R) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("failed to read line {}", line_no + 1))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!(line = line_no, "skipping record that is not valid UTF-8");
                self.stats.lines += 1;
                self.stats.skipped += 1;
                continue;
            };

            let flow = self
                .feed_line(line)
                .with_context(|| format!("line {}", line_no))?;
            if flow == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Freeze the states, classify them and hand back the snapshot.
    pub fn finish<P: SourceProvider>(self, classifier: &SuspensionClassifier<P>) -> Snapshot {
        info!(
            lines = self.stats.lines,
            observations = self.stats.observations,
            skipped = self.stats.skipped,
            ended = self.ended,
            "trace ingested"
        );
        self.analyzer.finish(classifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_META: &str =
        r#"["meta","init",["type","executionAsyncId","triggerAsyncId","asyncId","stack"]]"#;

    #[test]
    fn test_feed_lines() {
        let mut session = Session::new();
        assert_eq!(session.feed_line(INIT_META).unwrap(), Flow::Continue);
        session
            .feed_line(r#"["init","PROMISE",1,1,2,"file:///srv/a.js:3:5"]"#)
            .unwrap();
        session
            .feed_line(r#"["init","Timeout",1,1,3,"file:///srv/a.js:4:1"]"#)
            .unwrap();
        session.feed_line("   ").unwrap();

        assert_eq!(session.stats().lines, 3);
        assert_eq!(session.stats().observations, 2);
        assert_eq!(session.analyzer().states().len(), 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut session = Session::new();
        session.feed_line(INIT_META).unwrap();
        assert_eq!(session.feed_line("{not json").unwrap(), Flow::Continue);
        assert_eq!(session.feed_line(r#"{"kind":"init"}"#).unwrap(), Flow::Continue);
        assert_eq!(session.feed_line(r#"[42]"#).unwrap(), Flow::Continue);
        assert_eq!(
            session
                .feed_line(r#"["init","PROMISE","one",1,2,""]"#)
                .unwrap(),
            Flow::Continue
        );
        assert_eq!(session.feed_line(r#"["gc",1]"#).unwrap(), Flow::Continue);

        assert_eq!(session.stats().skipped, 4);
        assert_eq!(session.stats().ignored, 1);
        assert!(session.analyzer().states().is_empty());
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let mut session = Session::new();
        let err = session
            .feed_line(r#"["init","PROMISE",1,1,2,""]"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::NoFieldOrder("init")));
    }

    #[test]
    fn test_nothing_after_end() {
        let mut session = Session::new();
        session.feed_line(INIT_META).unwrap();
        assert_eq!(session.feed_line(r#"["end"]"#).unwrap(), Flow::Stop);
        assert!(session.is_ended());
        assert_eq!(
            session
                .feed_line(r#"["init","PROMISE",1,1,2,"file:///srv/a.js:3:5"]"#)
                .unwrap(),
            Flow::Stop
        );
        assert!(session.analyzer().states().is_empty());
    }

    #[test]
    fn test_feed_reader() {
        let mut input = Vec::new();
        input.extend_from_slice(INIT_META.as_bytes());
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(br#"["init","PROMISE",1,1,2,"file:///srv/a.js:3:5"]"#);
        input.extend_from_slice(b"\n[\"end\"]\n");
        input.extend_from_slice(br#"["init","PROMISE",1,1,3,"file:///srv/a.js:9:1"]"#);

        let mut session = Session::new();
        session.feed_reader(input.as_slice()).unwrap();
        assert!(session.is_ended());
        assert_eq!(session.stats().skipped, 1);

        let snapshot = session.finish(&SuspensionClassifier::default());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(2).is_some());
    }

    #[test]
    fn test_feed_reader_reports_line_of_fatal_error() {
        let input = "\n[\"before\",1,2]\n";
        let err = Session::new().feed_reader(input.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
