//! Compact wire codec between the collector and the analyzer.
//!
//! Records are JSON arrays, one per line. Field positions are negotiated per
//! kind with a `["meta", kind, [fieldName, ...]]` record that must precede the
//! first data record of that kind. `["end"]` terminates the stream.

mod encoder;
mod error;
mod processor;

pub use encoder::Encoder;
pub use error::CodecError;
pub use processor::{LineProcessor, Record, END_KIND, META_KIND};
