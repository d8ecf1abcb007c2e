//! Named source buffers with a precomputed line table.

use std::fmt;

/// An immutable named source text.
///
/// Every [`Location`](crate::Location) issued by the parser holds the buffer
/// it points into, so the text lives as long as any node referring to it.
pub struct Buffer {
    name: String,
    content: String,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
    /// Line and column of the first byte (1-indexed line, 0-indexed column).
    origin: (usize, usize),
}

impl Buffer {
    /// Create a buffer whose first byte sits at line 1, column 0.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_origin(name, content, 1, 0)
    }

    /// Create a buffer for a fragment embedded in a larger document.
    ///
    /// `line` and `column` give the position of the fragment's first byte;
    /// only positions on the first line are shifted by `column`.
    #[must_use]
    pub fn with_origin(
        name: impl Into<String>,
        content: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        let content = content.into();
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            name: name.into(),
            content,
            line_starts,
            origin: (line, column),
        }
    }

    /// The buffer name, usually a file path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full source text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length of the content in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the buffer has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Zero-based index of the raw line containing `pos`.
    #[must_use]
    pub fn line_of(&self, pos: usize) -> usize {
        match self.line_starts.binary_search(&pos) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    /// Convert a byte offset to `(line, column)`.
    ///
    /// Lines are 1-indexed and columns are 0-indexed, counted in characters.
    #[must_use]
    pub fn pos_to_loc(&self, pos: usize) -> (usize, usize) {
        let pos = pos.min(self.content.len());
        let line = self.line_of(pos);
        let line_start = self.line_starts[line];
        let column = self
            .content
            .get(line_start..pos)
            .map_or(pos - line_start, |s| s.chars().count());

        if line == 0 {
            (self.origin.0, self.origin.1 + column)
        } else {
            (self.origin.0 + line, column)
        }
    }

    /// Text of the raw line with the given zero-based index, without the newline.
    #[must_use]
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.content.len(), |next| next - 1);
        self.content.get(start..end)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .field("origin", &self.origin)
            .finish()
    }
}
