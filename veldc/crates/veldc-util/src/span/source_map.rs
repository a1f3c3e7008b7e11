//! Source map - registry of loaded source files.

use std::sync::Arc;

use crate::IndexVec;

use super::{FileId, Span};

/// A single source file with precomputed line starts.
pub struct SourceFile {
    id: FileId,
    name: String,
    content: Arc<str>,
    /// Byte offset at which each line begins. `line_starts[0]` is always 0.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a source file and index its line starts.
    pub fn new(id: usize, name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        let content: Arc<str> = content.into();
        let mut line_starts = vec![0];
        for (offset, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self {
            id: FileId(id),
            name: name.into(),
            content,
            line_starts,
        }
    }

    /// The file's id within its [`SourceMap`].
    pub fn id(&self) -> FileId {
        self.id
    }

    /// The file's name (usually its path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full file content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of lines in the file.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a (line, column) pair, both 1-based.
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insertion) => insertion.saturating_sub(1),
        };
        let column = offset - self.line_starts[line];
        (line + 1, column + 1)
    }

    /// The text of the given 1-based line, without its newline.
    pub fn line_at(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.content.len());
        Some(self.content[start..end].trim_end_matches('\n'))
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lines", &self.line_count())
            .finish()
    }
}

/// Registry of all source files in a compilation session.
#[derive(Default)]
pub struct SourceMap {
    files: IndexVec<FileId, Arc<SourceFile>>,
}

impl SourceMap {
    /// Create an empty source map.
    pub fn new() -> Self {
        Self {
            files: IndexVec::new(),
        }
    }

    /// Add a file and return its id.
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<Arc<str>>) -> FileId {
        let id = self.files.len();
        self.files.push(Arc::new(SourceFile::new(id, name, content)))
    }

    /// Look up a file by id.
    pub fn get(&self, id: FileId) -> Option<Arc<SourceFile>> {
        self.files.get(id).cloned()
    }

    /// Number of registered files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Render a span as `name:line:column` for diagnostics.
    pub fn format_span(&self, span: Span) -> Option<String> {
        let file = self.get(span.file_id)?;
        Some(format!("{}:{}:{}", file.name(), span.line, span.column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_to_line_col_tracks_newlines() {
        let file = SourceFile::new(0, "test.veld", "ab\ncd\nef");
        assert_eq!(file.offset_to_line_col(0), (1, 1));
        assert_eq!(file.offset_to_line_col(3), (2, 1));
        assert_eq!(file.offset_to_line_col(4), (2, 2));
        assert_eq!(file.offset_to_line_col(7), (3, 2));
    }

    #[test]
    fn line_at_strips_newline() {
        let file = SourceFile::new(0, "test.veld", "first\nsecond\n");
        assert_eq!(file.line_at(1), Some("first"));
        assert_eq!(file.line_at(2), Some("second"));
        assert_eq!(file.line_at(9), None);
    }

    #[test]
    fn source_map_assigns_sequential_ids() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.veld", "x");
        let b = map.add_file("b.veld", "y");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        assert_eq!(map.file_count(), 2);
    }
}
