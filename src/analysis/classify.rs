//! Suspension vs continuation classification from source text.
//!
//! Async hooks report `await x` and `x.then(cb)` identically. The runtime
//! does, however, give the promise produced by an `await` a source position
//! pointing exactly at the `await` keyword, so reading the token at the
//! reported position recovers the distinction.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::frame::Frame;
use super::state::StateArena;

lazy_static! {
    static ref AWAIT_TOKEN: Regex = Regex::new(r"^await\b").unwrap();
}

/// Supplies the full text of local source files.
pub trait SourceProvider: Send + Sync {
    fn read_source(&self, path: &Path) -> io::Result<Arc<str>>;
}

/// Reads sources from disk, caching each file for the rest of the run.
#[derive(Debug, Default)]
pub struct FsSourceProvider {
    cache: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl FsSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceProvider for FsSourceProvider {
    fn read_source(&self, path: &Path) -> io::Result<Arc<str>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(text) = cache.get(path) {
                return Ok(Arc::clone(text));
            }
        }

        let text: Arc<str> = std::fs::read_to_string(path)?.into();
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path.to_path_buf(), Arc::clone(&text));
        }
        Ok(text)
    }
}

/// Decides whether an allocation site is an `await` expression.
pub struct SuspensionClassifier<P = FsSourceProvider> {
    provider: P,
}

impl Default for SuspensionClassifier<FsSourceProvider> {
    fn default() -> Self {
        Self::new(FsSourceProvider::new())
    }
}

impl<P: SourceProvider> SuspensionClassifier<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Classify one frame.
    ///
    /// Sources that are not local files or cannot be read classify as
    /// "not a suspension".
    pub fn is_suspension(&self, frame: &Frame<'_>) -> bool {
        let Some(path) = frame.local_path() else {
            return false;
        };
        match self.provider.read_source(&path) {
            Ok(source) => is_await_at(&source, frame.line, frame.column),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "source unavailable, assuming continuation");
                false
            }
        }
    }

    /// Resolve `is_suspension` for every executed state of a frozen arena.
    pub fn classify_all(&self, states: &StateArena) {
        assert!(states.is_frozen(), "classification requires a frozen arena");

        states
            .as_slice()
            .par_iter()
            .filter(|state| state.executed)
            .for_each(|state| {
                if let Some(frame) = state.first_frame() {
                    state.resolve_suspension(self.is_suspension(&frame));
                }
            });
    }
}

/// Whether `source` holds an `await` token at the 1-indexed position.
///
/// The token must stand alone: no identifier character directly before or
/// after it, and no `.` before it once whitespace is skipped.
pub fn is_await_at(source: &str, line: usize, column: usize) -> bool {
    let Some(offset) = byte_offset(source, line, column) else {
        return false;
    };
    if !AWAIT_TOKEN.is_match(&source[offset..]) {
        return false;
    }

    let before = &source[..offset];
    if before.chars().next_back().is_some_and(is_identifier_char) {
        return false;
    }
    !before.trim_end().ends_with('.')
}

fn byte_offset(source: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 || column == 0 {
        return None;
    }

    let mut offset = 0;
    for (index, text) in source.split('\n').enumerate() {
        if index + 1 == line {
            return utf16_column_to_byte(text, column - 1).map(|at| offset + at);
        }
        offset += text.len() + 1;
    }
    None
}

/// Byte index of the character starting `units` UTF-16 code units into
/// `line`. Positions inside a surrogate pair have no character.
fn utf16_column_to_byte(line: &str, units: usize) -> Option<usize> {
    let mut seen = 0;
    for (at, c) in line.char_indices() {
        if seen == units {
            return Some(at);
        }
        if seen > units {
            return None;
        }
        seen += c.len_utf16();
    }
    None
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
