//! Source location tracking for AST nodes.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::buffer::Buffer;

/// Errors raised when a location does not fit its buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The range ends before it starts or runs past the buffer.
    #[error("range {start}...{end} is outside of buffer `{buffer}` ({len} bytes)")]
    OutOfBounds {
        buffer: String,
        start: usize,
        end: usize,
        len: usize,
    },
    /// The range splits a multi-byte character.
    #[error("range {start}...{end} does not fall on character boundaries of `{buffer}`")]
    NotCharBoundary {
        buffer: String,
        start: usize,
        end: usize,
    },
}

/// A named sub-range recorded on a [`Location`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Child {
    Required(Range<usize>),
    Optional(Option<Range<usize>>),
}

/// Result of looking up a named child.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildLookup {
    /// The child was recorded with a range.
    Present(Location),
    /// The child is known to the construct but the token was not written.
    Empty,
    /// No child with this name was recorded.
    NotApplicable,
}

/// A half-open byte range `[start, end)` in a [`Buffer`].
///
/// A location may carry named children (`keyword`, `name`, `end`, ...) that
/// point at pieces of the construct it covers.
#[derive(Clone)]
pub struct Location {
    buffer: Arc<Buffer>,
    start: usize,
    end: usize,
    children: Vec<(&'static str, Child)>,
    start_loc: OnceCell<(usize, usize)>,
    end_loc: OnceCell<(usize, usize)>,
}

impl Location {
    /// Create a location, checking the range against the buffer.
    pub fn new(buffer: Arc<Buffer>, range: Range<usize>) -> Result<Self, LocationError> {
        check_range(&buffer, &range)?;
        Ok(Self::from_range(buffer, range))
    }

    /// Create a location the lexer already knows to be valid.
    pub(crate) fn from_range(buffer: Arc<Buffer>, range: Range<usize>) -> Self {
        debug_assert!(range.start <= range.end && range.end <= buffer.len());
        Self {
            buffer,
            start: range.start,
            end: range.end,
            children: Vec::new(),
            start_loc: OnceCell::new(),
            end_loc: OnceCell::new(),
        }
    }

    /// The buffer this location points into.
    #[must_use]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// The buffer name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.buffer.name()
    }

    /// Start byte offset.
    #[must_use]
    pub const fn start_pos(&self) -> usize {
        self.start
    }

    /// End byte offset (exclusive).
    #[must_use]
    pub const fn end_pos(&self) -> usize {
        self.end
    }

    /// The byte range.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// `(line, column)` of the start.
    #[must_use]
    pub fn start_loc(&self) -> (usize, usize) {
        *self.start_loc.get_or_init(|| self.buffer.pos_to_loc(self.start))
    }

    /// `(line, column)` of the end.
    #[must_use]
    pub fn end_loc(&self) -> (usize, usize) {
        *self.end_loc.get_or_init(|| self.buffer.pos_to_loc(self.end))
    }

    /// Start line (1-indexed).
    #[must_use]
    pub fn start_line(&self) -> usize {
        self.start_loc().0
    }

    /// Start column (0-indexed, in characters).
    #[must_use]
    pub fn start_column(&self) -> usize {
        self.start_loc().1
    }

    /// End line (1-indexed).
    #[must_use]
    pub fn end_line(&self) -> usize {
        self.end_loc().0
    }

    /// End column (0-indexed, in characters).
    #[must_use]
    pub fn end_column(&self) -> usize {
        self.end_loc().1
    }

    /// The source text covered by this location.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.buffer.content()[self.start..self.end]
    }

    /// Whether any named child was recorded.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Record a child that is always present.
    pub fn add_required_child(
        &mut self,
        name: &'static str,
        range: Range<usize>,
    ) -> Result<(), LocationError> {
        check_range(&self.buffer, &range)?;
        self.children.push((name, Child::Required(range)));
        Ok(())
    }

    /// Record a child that may be missing from the source.
    pub fn add_optional_child(
        &mut self,
        name: &'static str,
        range: Option<Range<usize>>,
    ) -> Result<(), LocationError> {
        if let Some(range) = &range {
            check_range(&self.buffer, range)?;
        }
        self.children.push((name, Child::Optional(range)));
        Ok(())
    }

    /// Attach a required child whose range came from a token.
    #[must_use]
    pub(crate) fn with_required(mut self, name: &'static str, range: Range<usize>) -> Self {
        debug_assert!(check_range(&self.buffer, &range).is_ok());
        self.children.push((name, Child::Required(range)));
        self
    }

    /// Attach an optional child whose range came from a token.
    #[must_use]
    pub(crate) fn with_optional(mut self, name: &'static str, range: Option<Range<usize>>) -> Self {
        debug_assert!(range.as_ref().is_none_or(|r| check_range(&self.buffer, r).is_ok()));
        self.children.push((name, Child::Optional(range)));
        self
    }

    /// Look up a named child, distinguishing "not written" from "unknown".
    #[must_use]
    pub fn lookup(&self, name: &str) -> ChildLookup {
        let found = self.children.iter().rev().find(|(n, _)| *n == name);
        match found {
            Some((_, Child::Required(range) | Child::Optional(Some(range)))) => {
                ChildLookup::Present(Self::from_range(self.buffer.clone(), range.clone()))
            }
            Some((_, Child::Optional(None))) => ChildLookup::Empty,
            None => ChildLookup::NotApplicable,
        }
    }

    /// The named child, if it was recorded with a range.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Self> {
        match self.lookup(name) {
            ChildLookup::Present(location) => Some(location),
            ChildLookup::Empty | ChildLookup::NotApplicable => None,
        }
    }

    /// Names of all recorded children, in insertion order.
    pub fn child_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.children.iter().map(|(name, _)| *name)
    }

    /// A plain location spanning both `self` and `other`.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        debug_assert!(Arc::ptr_eq(&self.buffer, &other.buffer));
        Self::from_range(
            self.buffer.clone(),
            self.start.min(other.start)..self.end.max(other.end),
        )
    }
}

fn check_range(buffer: &Buffer, range: &Range<usize>) -> Result<(), LocationError> {
    let content = buffer.content();
    if range.start > range.end || range.end > content.len() {
        return Err(LocationError::OutOfBounds {
            buffer: buffer.name().to_string(),
            start: range.start,
            end: range.end,
            len: content.len(),
        });
    }
    if !content.is_char_boundary(range.start) || !content.is_char_boundary(range.end) {
        return Err(LocationError::NotCharBoundary {
            buffer: buffer.name().to_string(),
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.start == other.start
            && self.end == other.end
    }
}

impl Eq for Location {}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name().is_empty() { "-" } else { self.name() };
        let (start_line, start_column) = self.start_loc();
        let (end_line, end_column) = self.end_loc();
        write!(f, "{name}:{start_line}:{start_column}...{end_line}:{end_column}")
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({}@{}...{})", self.name(), self.start, self.end)
    }
}

/// The location slot carried by AST nodes.
///
/// AST equality is structural: two nodes parsed from different text compare
/// equal when they describe the same signature, so this slot always compares
/// equal. Compare [`Location`]s directly when positions matter.
#[derive(Clone, Default)]
pub struct NodeLocation(Option<Location>);

impl NodeLocation {
    /// A slot for a node built without source text.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// The location, if the node came from the parser.
    #[must_use]
    pub const fn get(&self) -> Option<&Location> {
        self.0.as_ref()
    }
}

impl From<Location> for NodeLocation {
    fn from(location: Location) -> Self {
        Self(Some(location))
    }
}

impl From<Option<Location>> for NodeLocation {
    fn from(location: Option<Location>) -> Self {
        Self(location)
    }
}

impl PartialEq for NodeLocation {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for NodeLocation {}

impl fmt::Debug for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(location) => write!(f, "{location:?}"),
            None => f.write_str("-"),
        }
    }
}
