use std::path::Path;

use tracing::warn;

use crate::{PipelineError, Result};

/// Class names in output-channel order. Line `i` of the source file names
/// channel `i`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Lines that are not valid UTF-8 are decoded lossily so every later
    /// line keeps its index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::Resource(format!("can't read class names from {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&bytes))
    }

    /// One name per `\n`-terminated line, trailing `\r` removed.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut names: Vec<String> = bytes
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect();
        // A final newline terminates the last line rather than starting one.
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            names.pop();
        }
        Self { names }
    }

    /// Like `load`, but a missing or unreadable file yields an empty table.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, "continuing without class names");
                Self::default()
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
