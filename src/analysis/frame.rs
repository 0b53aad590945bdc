//! Stack frame parsing.

use std::path::PathBuf;

/// A single `url:line:col` stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub url: &'a str,
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
}

impl<'a> Frame<'a> {
    /// Parse a frame rendered as `url:line:col` or `name (url:line:col)`.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim();
        let location = match (text.rfind('('), text.strip_suffix(')')) {
            (Some(open), Some(inner)) => &inner[open + 1..],
            _ => text,
        };

        let mut parts = location.rsplitn(3, ':');
        let column = parts.next()?.parse().ok()?;
        let line = parts.next()?.parse().ok()?;
        let url = parts.next().filter(|url| !url.is_empty())?;

        Some(Frame { url, line, column })
    }

    /// The synthetic position a module's top-level evaluation reports.
    pub fn is_module_start(&self) -> bool {
        self.line == 1 && self.column == 1
    }

    /// Filesystem path for `file://` URLs and absolute paths.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.url.strip_prefix("file://") {
            return Some(PathBuf::from(percent_decode(rest)));
        }
        if self.url.starts_with('/') {
            return Some(PathBuf::from(self.url));
        }
        None
    }
}

/// The caller frame of an allocation stack.
pub fn first_frame(stack: &str) -> Option<Frame<'_>> {
    stack.lines().next().and_then(Frame::parse)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
