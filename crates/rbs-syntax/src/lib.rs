//! Parsing and writing of RBS-style type signatures.
//!
//! This crate provides:
//! - A lexer and recursive-descent parser for types, method types and
//!   whole signature files
//! - A typed AST whose nodes carry source [`Location`]s with named children
//! - A [`Writer`] that renders declarations back to canonical text
//!
//! # Example
//!
//! ```
//! use rbs_syntax::{format, parse_signature, WriterConfig};
//!
//! let decls = parse_signature("class Foo<Bar\n  def baz:()->void\nend").unwrap();
//! let text = format(&decls, &WriterConfig::default());
//! assert_eq!(text, "class Foo < Bar\n  def baz: () -> void\nend\n");
//! ```

pub mod ast;
pub mod buffer;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod writer;

#[cfg(test)]
mod proptest_support;

pub use ast::*;
pub use buffer::Buffer;
pub use lexer::{Token, TokenKind};
pub use location::{ChildLookup, Location, LocationError, NodeLocation};
pub use parser::{
    parse_method_type, parse_signature, parse_type, ParseError, ParseOptions, ParseResult, Parser,
};
pub use writer::{format, Writer, WriterConfig};
