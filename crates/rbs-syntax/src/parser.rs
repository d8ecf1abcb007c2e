//! Recursive-descent parser for types, method types and signature files.
//!
//! All three entry points share one expression grammar. Precedence, loosest
//! first: union `|`, intersection `&`, postfix optional `?`. Unions and
//! intersections are flat N-ary nodes in source order.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

use crate::ast::*;
use crate::buffer::Buffer;
use crate::lexer::{Lexer, Token, TokenKind, TokenValue};
use crate::location::Location;

/// Errors that can occur during parsing.
///
/// Parsing stops at the first error.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The lexer hit text it cannot tokenize.
    #[error("{location}: Lexical error: {message}, char=`{text}`")]
    Lexical {
        /// Span of the offending characters.
        location: Location,
        /// What went wrong.
        message: String,
        /// The offending characters.
        text: String,
    },
    /// A token appeared where the grammar does not allow it.
    #[error("{location}: Syntax error: {message}, token=`{text}` ({kind})")]
    Syntax {
        /// Span of the offending token.
        location: Location,
        /// What went wrong.
        message: String,
        /// Source text of the token.
        text: String,
        /// Kind of the token.
        kind: TokenKind,
    },
}

impl ParseError {
    /// Where the error happened.
    #[must_use]
    pub const fn location(&self) -> &Location {
        match self {
            Self::Lexical { location, .. } | Self::Syntax { location, .. } => location,
        }
    }

    /// The error description without location and token.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Lexical { message, .. } | Self::Syntax { message, .. } => message,
        }
    }

    /// The offending source text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Lexical { text, .. } | Self::Syntax { text, .. } => text,
        }
    }

    /// Kind of the offending token, for syntax errors.
    #[must_use]
    pub const fn token_kind(&self) -> Option<TokenKind> {
        match self {
            Self::Lexical { .. } => None,
            Self::Syntax { kind, .. } => Some(*kind),
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Inputs shared by the three entry points.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Type variables already bound around the fragment.
    pub variables: Vec<String>,
    /// Pattern that ends a fragment when it matches at a token start.
    pub terminator: Option<Regex>,
    /// Byte offset to start parsing at.
    pub start: usize,
}

impl ParseOptions {
    /// Bind type variable names.
    #[must_use]
    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Stop at `terminator` instead of the end of the buffer.
    #[must_use]
    pub fn with_terminator(mut self, terminator: Regex) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Start parsing at byte offset `start`.
    #[must_use]
    pub const fn starting_at(mut self, start: usize) -> Self {
        self.start = start;
        self
    }
}

/// Parse a type expression from a string.
pub fn parse_type(source: &str) -> ParseResult<Type> {
    Parser::parse_type(Buffer::new("<input>", source), &ParseOptions::default())
}

/// Parse a method type from a string.
pub fn parse_method_type(source: &str) -> ParseResult<MethodType> {
    Parser::parse_method_type(Buffer::new("<input>", source), &ParseOptions::default())
}

/// Parse a signature file from a string.
pub fn parse_signature(source: &str) -> ParseResult<Vec<Declaration>> {
    Parser::parse_signature(Buffer::new("<input>", source), &ParseOptions::default())
}

/// Where a member list appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Class,
    Module,
    Interface,
}

impl Body {
    const fn member_error(self) -> &'static str {
        match self {
            Self::Class | Self::Module => "unexpected token for class/module declaration member",
            Self::Interface => "unexpected token for interface declaration member",
        }
    }
}

/// Position inside a parameter list, in the order sections must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ParamStage {
    Required,
    Optional,
    Rest,
    Trailing,
    Keywords,
    RestKeywords,
}

/// Consecutive line comments.
#[derive(Debug)]
struct CommentBlock {
    lines: Vec<String>,
    range: Range<usize>,
    last_line: usize,
}

/// Type variables visible in a declaration.
#[derive(Debug)]
struct Scope {
    names: Vec<String>,
    /// Hides the scopes outside it.
    reset: bool,
}

/// Recursive-descent parser over a token stream.
pub struct Parser {
    buffer: Arc<Buffer>,
    lexer: Lexer,
    lookahead: VecDeque<Token>,
    last_end: usize,
    comments: Vec<CommentBlock>,
    scopes: Vec<Scope>,
}

impl Parser {
    /// Parse a single type expression.
    pub fn parse_type(
        buffer: impl Into<Arc<Buffer>>,
        options: &ParseOptions,
    ) -> ParseResult<Type> {
        let mut parser = Self::new(buffer.into(), options)?;
        let ty = parser.parse_type_expr()?;
        parser.expect_eof()?;
        Ok(ty)
    }

    /// Parse a single method type: `[T] (T) { () -> void } -> T`.
    pub fn parse_method_type(
        buffer: impl Into<Arc<Buffer>>,
        options: &ParseOptions,
    ) -> ParseResult<MethodType> {
        let mut parser = Self::new(buffer.into(), options)?;
        let method_type = parser.parse_method_type_expr()?;
        parser.expect_eof()?;
        Ok(method_type)
    }

    /// Parse a whole signature file.
    pub fn parse_signature(
        buffer: impl Into<Arc<Buffer>>,
        options: &ParseOptions,
    ) -> ParseResult<Vec<Declaration>> {
        let mut parser = Self::new(buffer.into(), options)?;
        let mut declarations = Vec::new();
        while parser.peek_kind(0)? != TokenKind::Eof {
            declarations.push(parser.parse_top_declaration()?);
        }
        tracing::debug!(
            buffer = parser.buffer.name(),
            declarations = declarations.len(),
            "parsed signature"
        );
        Ok(declarations)
    }

    fn new(buffer: Arc<Buffer>, options: &ParseOptions) -> ParseResult<Self> {
        check_start(&buffer, options.start)?;
        let lexer =
            Lexer::new(buffer.clone(), options.start).with_terminator(options.terminator.clone());
        Ok(Self {
            buffer,
            lexer,
            lookahead: VecDeque::new(),
            last_end: options.start,
            comments: Vec::new(),
            scopes: vec![Scope {
                names: options.variables.clone(),
                reset: true,
            }],
        })
    }

    // ========================================================================
    // Token stream
    // ========================================================================

    fn fill(&mut self, n: usize) -> ParseResult<()> {
        while self.lookahead.len() <= n {
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::LineComment => self.push_comment(token),
                TokenKind::Comment => {}
                _ => self.lookahead.push_back(token),
            }
        }
        Ok(())
    }

    fn peek(&mut self, n: usize) -> ParseResult<&Token> {
        self.fill(n)?;
        Ok(&self.lookahead[n])
    }

    fn peek_kind(&mut self, n: usize) -> ParseResult<TokenKind> {
        Ok(self.peek(n)?.kind)
    }

    fn peek_start(&mut self) -> ParseResult<usize> {
        Ok(self.peek(0)?.range.start)
    }

    fn advance(&mut self) -> ParseResult<Token> {
        self.fill(0)?;
        let token = match self.lookahead.pop_front() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        self.last_end = token.range.end;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.peek_kind(0)? == kind {
            self.advance()
        } else {
            Err(self.unexpected(message))
        }
    }

    fn expect_eof(&mut self) -> ParseResult<()> {
        if self.peek_kind(0)? == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("unexpected trailing token"))
        }
    }

    fn text(&self, token: &Token) -> String {
        self.buffer.content()[token.range.clone()].to_string()
    }

    fn loc(&self, range: Range<usize>) -> Location {
        Location::from_range(self.buffer.clone(), range)
    }

    fn error_at(&self, token: &Token, message: &str) -> ParseError {
        ParseError::Syntax {
            location: self.loc(token.range.clone()),
            message: message.to_string(),
            text: self.text(token),
            kind: token.kind,
        }
    }

    /// An error pointing at the next token.
    fn unexpected(&mut self, message: &str) -> ParseError {
        match self.peek(0) {
            Ok(token) => {
                let token = token.clone();
                self.error_at(&token, message)
            }
            Err(error) => error,
        }
    }

    // ========================================================================
    // Comments and scopes
    // ========================================================================

    fn push_comment(&mut self, token: Token) {
        let text = match token.value {
            Some(TokenValue::Comment(text)) => text,
            _ => String::new(),
        };
        if let Some(block) = self.comments.last_mut() {
            if block.last_line + 1 == token.line {
                block.lines.push(text);
                block.range.end = token.range.end;
                block.last_line = token.line;
                return;
            }
        }
        self.comments.push(CommentBlock {
            lines: vec![text],
            range: token.range,
            last_line: token.line,
        });
    }

    /// Take the comment block that ends on the line above `line`.
    fn take_comment(&mut self, line: usize) -> Option<Comment> {
        let above = line.checked_sub(1)?;
        let index = self.comments.iter().rposition(|b| b.last_line == above)?;
        let block = self.comments.remove(index);
        tracing::trace!(line = line + 1, lines = block.lines.len(), "attached comment");
        Some(Comment {
            lines: block.lines,
            location: self.loc(block.range).into(),
        })
    }

    fn push_scope(&mut self, params: &[TypeParam], reset: bool) {
        self.scopes.push(Scope {
            names: params.iter().map(|p| p.name.clone()).collect(),
            reset,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn is_variable(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.names.iter().any(|n| n == name) {
                return true;
            }
            if scope.reset {
                return false;
            }
        }
        false
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// `intersection ('|' intersection)*`
    fn parse_type_expr(&mut self) -> ParseResult<Type> {
        let start = self.peek_start()?;
        let first = self.parse_intersection()?;
        if self.peek_kind(0)? != TokenKind::Bar {
            return Ok(first);
        }

        let mut types = vec![first];
        while self.peek_kind(0)? == TokenKind::Bar {
            self.advance()?;
            types.push(self.parse_intersection()?);
        }
        Ok(Type::Union {
            types,
            location: self.loc(start..self.last_end).into(),
        })
    }

    /// `optional ('&' optional)*`
    fn parse_intersection(&mut self) -> ParseResult<Type> {
        let start = self.peek_start()?;
        let first = self.parse_optional()?;
        if self.peek_kind(0)? != TokenKind::Amp {
            return Ok(first);
        }

        let mut types = vec![first];
        while self.peek_kind(0)? == TokenKind::Amp {
            self.advance()?;
            types.push(self.parse_optional()?);
        }
        Ok(Type::Intersection {
            types,
            location: self.loc(start..self.last_end).into(),
        })
    }

    /// `simple '?'?`
    fn parse_optional(&mut self) -> ParseResult<Type> {
        let start = self.peek_start()?;
        let ty = self.parse_simple()?;
        if self.peek_kind(0)? == TokenKind::Question {
            self.advance()?;
            return Ok(Type::Optional {
                inner: Box::new(ty),
                location: self.loc(start..self.last_end).into(),
            });
        }
        Ok(ty)
    }

    fn parse_simple(&mut self) -> ParseResult<Type> {
        let token = self.peek(0)?.clone();

        let base = match token.kind {
            TokenKind::KwBool => Some(BaseType::Bool),
            TokenKind::KwBot => Some(BaseType::Bottom),
            TokenKind::KwClass => Some(BaseType::Class),
            TokenKind::KwInstance => Some(BaseType::Instance),
            TokenKind::KwNil => Some(BaseType::Nil),
            TokenKind::KwSelf => Some(BaseType::SelfType),
            TokenKind::KwTop => Some(BaseType::Top),
            TokenKind::KwVoid => Some(BaseType::Void),
            TokenKind::KwUntyped => Some(BaseType::Untyped),
            _ => None,
        };
        if let Some(kind) = base {
            self.advance()?;
            return Ok(Type::Base {
                kind,
                location: self.loc(token.range).into(),
            });
        }

        if let Some(literal) = literal_of(&token) {
            self.advance()?;
            return Ok(Type::Literal {
                literal,
                location: self.loc(token.range).into(),
            });
        }

        match token.kind {
            TokenKind::LParen => {
                self.advance()?;
                let ty = self.parse_type_expr()?;
                self.expect(TokenKind::RParen, "expected `)`")?;
                Ok(ty)
            }
            TokenKind::UIdent
                if self.peek_kind(1)? != TokenKind::Colon2 && self.is_variable(&self.text(&token)) =>
            {
                self.advance()?;
                Ok(Type::Variable {
                    name: self.text(&token),
                    location: self.loc(token.range).into(),
                })
            }
            TokenKind::UIdent | TokenKind::LIdent | TokenKind::ULIdent | TokenKind::Colon2 => {
                let (name, _) = self.parse_type_name("expected type name")?;
                let (args, _) = self.parse_type_args()?;
                let location = self.loc(token.range.start..self.last_end).into();
                Ok(match name.kind() {
                    NameKind::Class => Type::ClassInstance {
                        name,
                        args,
                        location,
                    },
                    NameKind::Interface => Type::Interface {
                        name,
                        args,
                        location,
                    },
                    NameKind::Alias => Type::Alias {
                        name,
                        args,
                        location,
                    },
                })
            }
            TokenKind::KwSingleton => {
                self.advance()?;
                self.expect(TokenKind::LParen, "expected `(` after `singleton`")?;
                let name_token = self.peek(0)?.clone();
                let (name, _) = self.parse_type_name("expected class name")?;
                if name.kind() != NameKind::Class {
                    return Err(self.error_at(&name_token, "expected class name"));
                }
                self.expect(TokenKind::RParen, "expected `)`")?;
                Ok(Type::ClassSingleton {
                    name,
                    location: self.loc(token.range.start..self.last_end).into(),
                })
            }
            TokenKind::LBracket => {
                self.advance()?;
                let types = self.parse_type_list(TokenKind::RBracket, "expected `]`")?;
                Ok(Type::Tuple {
                    types,
                    location: self.loc(token.range.start..self.last_end).into(),
                })
            }
            TokenKind::ArefOperator => {
                self.advance()?;
                Ok(Type::Tuple {
                    types: Vec::new(),
                    location: self.loc(token.range).into(),
                })
            }
            TokenKind::LBrace => self.parse_record(),
            TokenKind::Hat => {
                self.advance()?;
                let (function, block, _) = self.parse_function()?;
                Ok(Type::Proc {
                    function: Box::new(function),
                    block: block.map(Box::new),
                    location: self.loc(token.range.start..self.last_end).into(),
                })
            }
            _ => Err(self.error_at(&token, "unexpected token for simple type")),
        }
    }

    /// `'::'? (UIDENT '::')* IDENT`
    fn parse_type_name(&mut self, message: &str) -> ParseResult<(TypeName, Range<usize>)> {
        let start = self.peek_start()?;
        let absolute = if self.peek_kind(0)? == TokenKind::Colon2 {
            self.advance()?;
            true
        } else {
            false
        };

        let mut path = Vec::new();
        loop {
            let token = self.peek(0)?.clone();
            if !matches!(
                token.kind,
                TokenKind::UIdent | TokenKind::LIdent | TokenKind::ULIdent
            ) {
                return Err(self.error_at(&token, message));
            }
            self.advance()?;
            let segment = self.text(&token);

            if token.kind == TokenKind::UIdent && self.peek_kind(0)? == TokenKind::Colon2 {
                self.advance()?;
                path.push(segment);
                continue;
            }

            let name = TypeName::new(Namespace { path, absolute }, segment);
            return Ok((name, start..self.last_end));
        }
    }

    /// Optional `[T, ...]` after a name.
    fn parse_type_args(&mut self) -> ParseResult<(Vec<Type>, Option<Range<usize>>)> {
        if self.peek_kind(0)? != TokenKind::LBracket {
            return Ok((Vec::new(), None));
        }
        let open = self.advance()?;
        let args = self.parse_type_list(TokenKind::RBracket, "expected `]`")?;
        Ok((args, Some(open.range.start..self.last_end)))
    }

    /// Comma-separated types up to `close`, trailing comma allowed.
    fn parse_type_list(&mut self, close: TokenKind, message: &str) -> ParseResult<Vec<Type>> {
        let mut types = Vec::new();
        while self.peek_kind(0)? != close {
            types.push(self.parse_type_expr()?);
            if self.peek_kind(0)? == TokenKind::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(close, message)?;
        Ok(types)
    }

    fn parse_record(&mut self) -> ParseResult<Type> {
        let open = self.advance()?;
        let mut fields = IndexMap::new();

        while self.peek_kind(0)? != TokenKind::RBrace {
            let key_token = self.peek(0)?.clone();
            let key = if is_name_token(key_token.kind) && self.peek_kind(1)? == TokenKind::Colon {
                self.advance()?;
                self.advance()?;
                Literal::Symbol(self.text(&key_token))
            } else if let Some(literal) = literal_of(&key_token) {
                self.advance()?;
                self.expect(TokenKind::FatArrow, "expected `=>`")?;
                literal
            } else {
                return Err(self.error_at(&key_token, "unexpected record key"));
            };

            if fields.contains_key(&key) {
                return Err(self.error_at(&key_token, "duplicated record key"));
            }
            let ty = self.parse_type_expr()?;
            fields.insert(key, ty);

            if self.peek_kind(0)? == TokenKind::Comma {
                self.advance()?;
            } else {
                break;
            }
        }

        self.expect(TokenKind::RBrace, "expected `}`")?;
        Ok(Type::Record {
            fields,
            location: self.loc(open.range.start..self.last_end).into(),
        })
    }

    // ========================================================================
    // Functions and method types
    // ========================================================================

    /// `params? block? '->' optional`, shared by procs and method types.
    fn parse_function(&mut self) -> ParseResult<(Function, Option<Block>, Range<usize>)> {
        let start = self.peek_start()?;
        let mut function = Function::returning(Type::base(BaseType::Void));
        self.parse_params(&mut function)?;
        let block = self.parse_block()?;
        self.expect(TokenKind::Arrow, "expected `->`")?;
        function.return_type = self.parse_optional()?;
        Ok((function, block, start..self.last_end))
    }

    fn parse_block(&mut self) -> ParseResult<Option<Block>> {
        let required = match (self.peek_kind(0)?, self.peek_kind(1)?) {
            (TokenKind::LBrace, _) => true,
            (TokenKind::Question, TokenKind::LBrace) => {
                self.advance()?;
                false
            }
            _ => return Ok(None),
        };
        self.advance()?;

        let mut function = Function::returning(Type::base(BaseType::Void));
        self.parse_params(&mut function)?;
        self.expect(TokenKind::Arrow, "expected `->`")?;
        function.return_type = self.parse_optional()?;
        self.expect(TokenKind::RBrace, "expected `}` after block type")?;
        Ok(Some(Block { function, required }))
    }

    /// Name and token count of a keyword label (`name:`, `name?:`) at lookahead `n`.
    fn keyword_label(&mut self, n: usize) -> ParseResult<Option<(String, usize)>> {
        let token = self.peek(n)?.clone();
        if !is_name_token(token.kind) && token.kind != TokenKind::BangIdent {
            return Ok(None);
        }
        match self.peek_kind(n + 1)? {
            TokenKind::Colon => Ok(Some((self.text(&token), 1))),
            TokenKind::Question if token.kind != TokenKind::BangIdent => {
                let adjacent = self.peek(n + 1)?.range.start == token.range.end;
                if adjacent && self.peek_kind(n + 2)? == TokenKind::Colon {
                    Ok(Some((format!("{}?", self.text(&token)), 2)))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    /// `'(' params ')'`, if present.
    fn parse_params(&mut self, function: &mut Function) -> ParseResult<()> {
        if self.peek_kind(0)? != TokenKind::LParen {
            return Ok(());
        }
        self.advance()?;
        let mut stage = ParamStage::Required;

        while self.peek_kind(0)? != TokenKind::RParen {
            let token = self.peek(0)?.clone();

            if let Some((name, count)) = self.keyword_label(0)? {
                if stage > ParamStage::Keywords {
                    return Err(self.error_at(&token, "keyword parameter is not allowed here"));
                }
                self.parse_keyword_param(function, &token, name, count, true)?;
                stage = ParamStage::Keywords;
            } else {
                match token.kind {
                    TokenKind::Question => {
                        if let Some((name, count)) = self.keyword_label(1)? {
                            if stage > ParamStage::Keywords {
                                return Err(
                                    self.error_at(&token, "keyword parameter is not allowed here")
                                );
                            }
                            self.advance()?;
                            let label = self.peek(0)?.clone();
                            self.parse_keyword_param(function, &label, name, count, false)?;
                            stage = ParamStage::Keywords;
                        } else {
                            if stage > ParamStage::Optional {
                                return Err(self.error_at(
                                    &token,
                                    "optional positional parameter is not allowed here",
                                ));
                            }
                            self.advance()?;
                            function.optional_positionals.push(self.parse_param()?);
                            stage = ParamStage::Optional;
                        }
                    }
                    TokenKind::Star => {
                        if stage > ParamStage::Optional {
                            return Err(
                                self.error_at(&token, "rest parameter is not allowed here")
                            );
                        }
                        self.advance()?;
                        function.rest_positionals = Some(self.parse_param()?);
                        stage = ParamStage::Rest;
                    }
                    TokenKind::Star2 => {
                        if stage > ParamStage::Keywords {
                            return Err(self.error_at(
                                &token,
                                "rest keyword parameter is not allowed here",
                            ));
                        }
                        self.advance()?;
                        function.rest_keywords = Some(self.parse_param()?);
                        stage = ParamStage::RestKeywords;
                    }
                    _ => match stage {
                        ParamStage::Required => {
                            function.required_positionals.push(self.parse_param()?);
                        }
                        ParamStage::Rest | ParamStage::Trailing => {
                            function.trailing_positionals.push(self.parse_param()?);
                            stage = ParamStage::Trailing;
                        }
                        ParamStage::Optional => {
                            return Err(self.error_at(
                                &token,
                                "required positional parameter is not allowed after optional parameters",
                            ));
                        }
                        ParamStage::Keywords | ParamStage::RestKeywords => {
                            return Err(self.error_at(
                                &token,
                                "positional parameter is not allowed after keyword parameters",
                            ));
                        }
                    },
                }
            }

            if self.peek_kind(0)? == TokenKind::Comma {
                self.advance()?;
            } else {
                break;
            }
        }

        self.expect(TokenKind::RParen, "expected `)`")?;
        Ok(())
    }

    fn parse_keyword_param(
        &mut self,
        function: &mut Function,
        label: &Token,
        name: String,
        count: usize,
        required: bool,
    ) -> ParseResult<()> {
        if function.required_keywords.contains_key(&name)
            || function.optional_keywords.contains_key(&name)
        {
            return Err(self.error_at(label, "duplicated keyword argument"));
        }
        for _ in 0..count {
            self.advance()?;
        }
        self.expect(TokenKind::Colon, "expected `:` after keyword")?;
        let param = self.parse_param()?;
        if required {
            function.required_keywords.insert(name, param);
        } else {
            function.optional_keywords.insert(name, param);
        }
        Ok(())
    }

    /// `type name?`
    fn parse_param(&mut self) -> ParseResult<Param> {
        let start = self.peek_start()?;
        let ty = self.parse_type_expr()?;
        let type_range = start..self.last_end;

        let next = self.peek(0)?.clone();
        let name = match (&next.kind, &next.value) {
            (TokenKind::QIdent, Some(TokenValue::Ident(name))) => Some(name.clone()),
            (kind, _) if is_name_token(*kind) => Some(self.text(&next)),
            _ => None,
        };
        let name_range = if name.is_some() {
            self.advance()?;
            Some(next.range)
        } else {
            None
        };

        let location = self
            .loc(start..self.last_end)
            .with_required("type", type_range)
            .with_optional("name", name_range);
        Ok(Param {
            ty,
            name,
            location: location.into(),
        })
    }

    /// `[A, B]` type parameters, if present.
    fn parse_type_params(
        &mut self,
        allow_variance: bool,
    ) -> ParseResult<(Vec<TypeParam>, Option<Range<usize>>)> {
        if self.peek_kind(0)? != TokenKind::LBracket {
            return Ok((Vec::new(), None));
        }
        let open = self.advance()?;
        let mut params = Vec::new();

        while self.peek_kind(0)? != TokenKind::RBracket {
            let start = self.peek_start()?;

            let mut unchecked = None;
            if self.peek_kind(0)? == TokenKind::KwUnchecked {
                if !allow_variance {
                    return Err(self.unexpected("`unchecked` is not allowed here"));
                }
                unchecked = Some(self.advance()?.range);
            }

            let mut variance = Variance::Invariant;
            let mut variance_range = None;
            match self.peek_kind(0)? {
                TokenKind::KwIn | TokenKind::KwOut if !allow_variance => {
                    return Err(self.unexpected("variance annotation is not allowed here"));
                }
                TokenKind::KwIn => {
                    variance = Variance::Contravariant;
                    variance_range = Some(self.advance()?.range);
                }
                TokenKind::KwOut => {
                    variance = Variance::Covariant;
                    variance_range = Some(self.advance()?.range);
                }
                _ => {}
            }

            let name = self.expect(TokenKind::UIdent, "expected type parameter name")?;
            let location = self
                .loc(start..self.last_end)
                .with_required("name", name.range.clone())
                .with_optional("variance", variance_range)
                .with_optional("unchecked", unchecked.clone());
            params.push(TypeParam {
                name: self.text(&name),
                variance,
                unchecked: unchecked.is_some(),
                location: location.into(),
            });

            if self.peek_kind(0)? == TokenKind::Comma {
                self.advance()?;
            } else {
                break;
            }
        }

        self.expect(TokenKind::RBracket, "expected `]`")?;
        Ok((params, Some(open.range.start..self.last_end)))
    }

    fn parse_method_type_expr(&mut self) -> ParseResult<MethodType> {
        let start = self.peek_start()?;
        let (type_params, type_params_range) = self.parse_type_params(false)?;
        self.push_scope(&type_params, false);
        let function = self.parse_function();
        self.pop_scope();
        let (function, block, type_range) = function?;

        let location = self
            .loc(start..self.last_end)
            .with_optional("type_params", type_params_range)
            .with_required("type", type_range);
        Ok(MethodType {
            type_params,
            function,
            block,
            location: location.into(),
        })
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn parse_annotations(&mut self) -> ParseResult<Vec<Annotation>> {
        let mut annotations = Vec::new();
        while self.peek_kind(0)? == TokenKind::Annotation {
            let token = self.advance()?;
            let string = match token.value {
                Some(TokenValue::Annotation(string)) => string,
                _ => String::new(),
            };
            annotations.push(Annotation {
                string,
                location: self.loc(token.range).into(),
            });
        }
        Ok(annotations)
    }

    fn parse_top_declaration(&mut self) -> ParseResult<Declaration> {
        let first = self.peek(0)?.clone();
        let comment = self.take_comment(first.line);
        let annotations = self.parse_annotations()?;
        self.parse_declaration(first.range.start, annotations, comment)
    }

    fn parse_declaration(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<Declaration> {
        match self.peek_kind(0)? {
            TokenKind::KwClass => self
                .parse_class(start, annotations, comment)
                .map(Declaration::Class),
            TokenKind::KwModule => self
                .parse_module(start, annotations, comment)
                .map(Declaration::Module),
            TokenKind::KwInterface => self
                .parse_interface(start, annotations, comment)
                .map(Declaration::Interface),
            TokenKind::KwType => self
                .parse_type_alias(start, annotations, comment)
                .map(Declaration::TypeAlias),
            TokenKind::UIdent | TokenKind::Colon2 => self
                .parse_constant(start, annotations, comment)
                .map(Declaration::Constant),
            TokenKind::GIdent => self
                .parse_global(start, annotations, comment)
                .map(Declaration::Global),
            _ => Err(self.unexpected("cannot start a declaration")),
        }
    }

    /// A declaration name whose last segment must be of `kind`.
    fn parse_decl_name(
        &mut self,
        kind: NameKind,
        message: &str,
    ) -> ParseResult<(TypeName, Range<usize>)> {
        let token = self.peek(0)?.clone();
        let (name, range) = self.parse_type_name(message)?;
        if name.kind() != kind {
            return Err(self.error_at(&token, message));
        }
        Ok((name, range))
    }

    /// A superclass or self type: `Name[Args]`.
    fn parse_parent(&mut self, kinds: &[NameKind], message: &str) -> ParseResult<Parent> {
        let token = self.peek(0)?.clone();
        let (name, name_range) = self.parse_type_name(message)?;
        if !kinds.contains(&name.kind()) {
            return Err(self.error_at(&token, message));
        }
        let (args, args_range) = self.parse_type_args()?;
        let location = self
            .loc(name_range.start..self.last_end)
            .with_required("name", name_range)
            .with_optional("args", args_range);
        Ok(Parent {
            name,
            args,
            location: location.into(),
        })
    }

    fn parse_class(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<ClassDecl> {
        let keyword = self.advance()?;
        let (name, name_range) = self.parse_decl_name(NameKind::Class, "expected class name")?;
        let (type_params, type_params_range) = self.parse_type_params(true)?;
        self.push_scope(&type_params, true);

        let mut lt_range = None;
        let mut super_class = None;
        if self.peek_kind(0)? == TokenKind::Lt {
            lt_range = Some(self.advance()?.range);
            super_class = Some(self.parse_parent(&[NameKind::Class], "expected superclass name")?);
        }

        let members = self.parse_members(Body::Class)?;
        let end = self.expect(TokenKind::KwEnd, "expected `end`")?;
        self.pop_scope();

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("name", name_range)
            .with_required("end", end.range)
            .with_optional("type_params", type_params_range)
            .with_optional("lt", lt_range);
        Ok(ClassDecl {
            name,
            type_params,
            super_class,
            members,
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_module(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<ModuleDecl> {
        let keyword = self.advance()?;
        let (name, name_range) = self.parse_decl_name(NameKind::Class, "expected module name")?;
        let (type_params, type_params_range) = self.parse_type_params(true)?;
        self.push_scope(&type_params, true);

        let mut colon_range = None;
        let mut self_types_range = None;
        let mut self_types = Vec::new();
        if self.peek_kind(0)? == TokenKind::Colon {
            colon_range = Some(self.advance()?.range);
            let first = self.peek_start()?;
            loop {
                self_types.push(self.parse_parent(
                    &[NameKind::Class, NameKind::Interface],
                    "expected module self type",
                )?);
                if self.peek_kind(0)? == TokenKind::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
            self_types_range = Some(first..self.last_end);
        }

        let members = self.parse_members(Body::Module)?;
        let end = self.expect(TokenKind::KwEnd, "expected `end`")?;
        self.pop_scope();

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("name", name_range)
            .with_required("end", end.range)
            .with_optional("type_params", type_params_range)
            .with_optional("colon", colon_range)
            .with_optional("self_types", self_types_range);
        Ok(ModuleDecl {
            name,
            type_params,
            self_types,
            members,
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_interface(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<InterfaceDecl> {
        let keyword = self.advance()?;
        let (name, name_range) =
            self.parse_decl_name(NameKind::Interface, "expected interface name")?;
        let (type_params, type_params_range) = self.parse_type_params(true)?;
        self.push_scope(&type_params, true);

        let members = self.parse_members(Body::Interface)?;
        let end = self.expect(TokenKind::KwEnd, "expected `end`")?;
        self.pop_scope();

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("name", name_range)
            .with_required("end", end.range)
            .with_optional("type_params", type_params_range);
        Ok(InterfaceDecl {
            name,
            type_params,
            members,
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_type_alias(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<TypeAliasDecl> {
        let keyword = self.advance()?;
        let (name, name_range) =
            self.parse_decl_name(NameKind::Alias, "expected type alias name")?;
        let (type_params, type_params_range) = self.parse_type_params(false)?;
        self.push_scope(&type_params, true);
        let eq = self.expect(TokenKind::Eq, "expected `=`");
        let ty = eq.and_then(|eq| Ok((eq, self.parse_type_expr()?)));
        self.pop_scope();
        let (eq, ty) = ty?;

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("name", name_range)
            .with_optional("type_params", type_params_range)
            .with_required("eq", eq.range);
        Ok(TypeAliasDecl {
            name,
            type_params,
            ty,
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_constant(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<ConstantDecl> {
        let (name, name_range) = self.parse_decl_name(NameKind::Class, "expected constant name")?;
        let colon = self.expect(TokenKind::Colon, "expected `:` after constant name")?;
        let ty = self.parse_type_expr()?;

        let location = self
            .loc(start..self.last_end)
            .with_required("name", name_range)
            .with_required("colon", colon.range);
        Ok(ConstantDecl {
            name,
            ty,
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_global(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<GlobalDecl> {
        let name = self.advance()?;
        let colon = self.expect(TokenKind::Colon, "expected `:` after global name")?;
        let ty = self.parse_type_expr()?;

        let location = self
            .loc(start..self.last_end)
            .with_required("name", name.range.clone())
            .with_required("colon", colon.range);
        Ok(GlobalDecl {
            name: self.text(&name),
            ty,
            annotations,
            comment,
            location: location.into(),
        })
    }

    // ========================================================================
    // Members
    // ========================================================================

    fn parse_members(&mut self, body: Body) -> ParseResult<Vec<Member>> {
        let mut members = Vec::new();
        while self.peek_kind(0)? != TokenKind::KwEnd {
            members.push(self.parse_member(body)?);
        }
        Ok(members)
    }

    /// `public def ...` / `private attr_reader ...` on one line.
    fn at_visibility_prefix(&mut self) -> ParseResult<bool> {
        if !matches!(self.peek_kind(0)?, TokenKind::KwPublic | TokenKind::KwPrivate) {
            return Ok(false);
        }
        let line = self.peek(0)?.line;
        let next = self.peek(1)?;
        Ok(next.line == line
            && matches!(
                next.kind,
                TokenKind::KwDef
                    | TokenKind::KwAttrReader
                    | TokenKind::KwAttrWriter
                    | TokenKind::KwAttrAccessor
            ))
    }

    fn parse_member(&mut self, body: Body) -> ParseResult<Member> {
        let first = self.peek(0)?.clone();

        if matches!(first.kind, TokenKind::KwPublic | TokenKind::KwPrivate)
            && !self.at_visibility_prefix()?
        {
            if body == Body::Interface {
                return Err(self.error_at(
                    &first,
                    "visibility member is not allowed in interface declaration",
                ));
            }
            self.advance()?;
            let location = self.loc(first.range.clone()).into();
            return Ok(if first.kind == TokenKind::KwPublic {
                Member::Public(location)
            } else {
                Member::Private(location)
            });
        }

        let comment = self.take_comment(first.line);
        let annotations = self.parse_annotations()?;
        let start = first.range.start;
        let token = self.peek(0)?.clone();

        let visibility = if self.at_visibility_prefix()? {
            if body == Body::Interface {
                return Err(self.error_at(
                    &token,
                    "visibility member is not allowed in interface declaration",
                ));
            }
            let keyword = self.advance()?;
            let visibility = if keyword.kind == TokenKind::KwPublic {
                Visibility::Public
            } else {
                Visibility::Private
            };
            Some((visibility, keyword.range))
        } else {
            None
        };

        let reject_annotations = |parser: &Self, message: &str| -> ParseResult<()> {
            if annotations.is_empty() {
                Ok(())
            } else {
                Err(parser.error_at(&token, message))
            }
        };

        match self.peek_kind(0)? {
            TokenKind::KwDef => self
                .parse_method_definition(body, start, visibility, annotations, comment)
                .map(Member::MethodDefinition),
            TokenKind::KwAttrReader | TokenKind::KwAttrWriter | TokenKind::KwAttrAccessor => {
                self.parse_attribute(body, start, visibility, annotations, comment)
            }
            TokenKind::KwInclude | TokenKind::KwExtend | TokenKind::KwPrepend => {
                if body == Body::Interface {
                    return Err(
                        self.error_at(&token, "mixin is not allowed in interface declaration")
                    );
                }
                self.parse_mixin(start, annotations, comment)
            }
            TokenKind::AIdent | TokenKind::A2Ident => {
                if body == Body::Interface {
                    return Err(self.error_at(
                        &token,
                        "instance variable is not allowed in interface declaration",
                    ));
                }
                reject_annotations(self, "annotation is not allowed on a variable member")?;
                self.parse_variable(start, comment)
            }
            TokenKind::KwSelf
                if self.peek_kind(1)? == TokenKind::Dot
                    && self.peek_kind(2)? == TokenKind::AIdent =>
            {
                if body == Body::Interface {
                    return Err(self.error_at(
                        &token,
                        "instance variable is not allowed in interface declaration",
                    ));
                }
                reject_annotations(self, "annotation is not allowed on a variable member")?;
                self.parse_variable(start, comment)
            }
            TokenKind::KwAlias => self
                .parse_alias(start, annotations, comment)
                .map(Member::Alias),
            TokenKind::KwClass
            | TokenKind::KwModule
            | TokenKind::KwInterface
            | TokenKind::KwType
            | TokenKind::UIdent
            | TokenKind::Colon2 => {
                if body == Body::Interface {
                    return Err(self.error_at(
                        &token,
                        "declaration is not allowed in interface declaration",
                    ));
                }
                self.parse_declaration(start, annotations, comment)
                    .map(Member::Declaration)
            }
            TokenKind::KwPublic | TokenKind::KwPrivate => {
                Err(self.error_at(&token, "annotation is not allowed on a visibility member"))
            }
            _ => Err(self.error_at(&token, body.member_error())),
        }
    }

    /// `self.` or `self?.` before a method name.
    fn parse_method_kind(&mut self, body: Body) -> ParseResult<(MethodKind, Option<Range<usize>>)> {
        if self.peek_kind(0)? != TokenKind::KwSelf {
            return Ok((MethodKind::Instance, None));
        }
        let kind = match (self.peek_kind(1)?, self.peek_kind(2)?) {
            (TokenKind::Dot, _) => MethodKind::Singleton,
            (TokenKind::Question, TokenKind::Dot) => MethodKind::SingletonInstance,
            _ => return Ok((MethodKind::Instance, None)),
        };

        let token = self.peek(0)?.clone();
        if body == Body::Interface {
            let message = match kind {
                MethodKind::SingletonInstance => {
                    "`self?` method is not allowed in interface declaration"
                }
                _ => "singleton method is not allowed in interface declaration",
            };
            return Err(self.error_at(&token, message));
        }

        let count = if kind == MethodKind::Singleton { 2 } else { 3 };
        for _ in 0..count {
            self.advance()?;
        }
        Ok((kind, Some(token.range.start..self.last_end)))
    }

    fn parse_method_name(&mut self) -> ParseResult<(String, Range<usize>)> {
        let token = self.peek(0)?.clone();
        let name = match (&token.kind, &token.value) {
            (TokenKind::QIdent, Some(TokenValue::Ident(name))) => name.clone(),
            (
                TokenKind::BangIdent
                | TokenKind::EqIdent
                | TokenKind::Operator
                | TokenKind::ArefOperator
                | TokenKind::Bar
                | TokenKind::Amp
                | TokenKind::Star
                | TokenKind::Star2
                | TokenKind::Lt
                | TokenKind::Hat,
                _,
            ) => self.text(&token),
            (kind, _) if is_name_token(*kind) => {
                self.advance()?;
                let question = self.peek(0)?;
                if question.kind == TokenKind::Question && question.range.start == token.range.end {
                    self.advance()?;
                    return Ok((format!("{}?", self.text(&token)), token.range.start..self.last_end));
                }
                return Ok((self.text(&token), token.range));
            }
            _ => return Err(self.error_at(&token, "unexpected token for method name")),
        };
        self.advance()?;
        Ok((name, token.range))
    }

    fn parse_method_definition(
        &mut self,
        body: Body,
        start: usize,
        visibility: Option<(Visibility, Range<usize>)>,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<MethodDefinition> {
        let keyword = self.advance()?;
        let (kind, kind_range) = self.parse_method_kind(body)?;
        let (name, name_range) = self.parse_method_name()?;
        self.expect(TokenKind::Colon, "expected `:` after method name")?;

        let mut overloads = Vec::new();
        let mut overload_range = None;
        loop {
            if self.peek_kind(0)? == TokenKind::Dot3 {
                let dots = self.peek(0)?.clone();
                if body == Body::Interface {
                    return Err(self.error_at(&dots, "unexpected overloading method definition"));
                }
                if overloads.is_empty() {
                    return Err(self.error_at(&dots, "`...` must follow a method type"));
                }
                self.advance()?;
                overload_range = Some(dots.range);
                if self.peek_kind(0)? == TokenKind::Bar {
                    return Err(self.unexpected("`...` must be the last overload"));
                }
                break;
            }

            overloads.push(self.parse_method_type_expr()?);
            if self.peek_kind(0)? == TokenKind::Bar {
                self.advance()?;
            } else {
                break;
            }
        }

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("name", name_range)
            .with_optional("kind", kind_range)
            .with_optional("overload", overload_range.clone())
            .with_optional("visibility", visibility.as_ref().map(|(_, r)| r.clone()));
        Ok(MethodDefinition {
            name,
            kind,
            overloads,
            overload: overload_range.is_some(),
            visibility: visibility.map(|(v, _)| v),
            annotations,
            comment,
            location: location.into(),
        })
    }

    fn parse_attribute(
        &mut self,
        body: Body,
        start: usize,
        visibility: Option<(Visibility, Range<usize>)>,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<Member> {
        if body == Body::Interface {
            return Err(self.unexpected("attribute is not allowed in interface declaration"));
        }
        let keyword = self.advance()?;

        let mut kind = MemberKind::Instance;
        let mut kind_range = None;
        if self.peek_kind(0)? == TokenKind::KwSelf && self.peek_kind(1)? == TokenKind::Dot {
            let receiver = self.advance()?;
            self.advance()?;
            kind = MemberKind::Singleton;
            kind_range = Some(receiver.range.start..self.last_end);
        }

        let name = self.peek(0)?.clone();
        if !is_name_token(name.kind) {
            return Err(self.error_at(&name, "expected attribute name"));
        }
        self.advance()?;

        let mut ivar = AttrIvar::Default;
        let mut ivar_range = None;
        let mut ivar_name_range = None;
        if self.peek_kind(0)? == TokenKind::LParen {
            let open = self.advance()?;
            if self.peek_kind(0)? == TokenKind::AIdent {
                let ivar_token = self.advance()?;
                ivar = AttrIvar::Named(self.text(&ivar_token));
                ivar_name_range = Some(ivar_token.range);
            } else {
                ivar = AttrIvar::None;
            }
            self.expect(TokenKind::RParen, "expected `)`")?;
            ivar_range = Some(open.range.start..self.last_end);
        }

        let colon = self.expect(TokenKind::Colon, "expected `:` after attribute name")?;
        let ty = self.parse_type_expr()?;

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range.clone())
            .with_required("name", name.range.clone())
            .with_required("colon", colon.range)
            .with_optional("kind", kind_range)
            .with_optional("ivar", ivar_range)
            .with_optional("ivar_name", ivar_name_range)
            .with_optional("visibility", visibility.as_ref().map(|(_, r)| r.clone()));
        let attribute = Attribute {
            name: self.text(&name),
            kind,
            ty,
            ivar,
            visibility: visibility.map(|(v, _)| v),
            annotations,
            comment,
            location: location.into(),
        };

        Ok(match keyword.kind {
            TokenKind::KwAttrReader => Member::AttrReader(attribute),
            TokenKind::KwAttrWriter => Member::AttrWriter(attribute),
            _ => Member::AttrAccessor(attribute),
        })
    }

    fn parse_mixin(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<Member> {
        let keyword = self.advance()?;
        let kinds: &[NameKind] = if keyword.kind == TokenKind::KwPrepend {
            &[NameKind::Class]
        } else {
            &[NameKind::Class, NameKind::Interface]
        };

        let token = self.peek(0)?.clone();
        let (name, name_range) = self.parse_type_name("expected module name")?;
        if !kinds.contains(&name.kind()) {
            return Err(self.error_at(&token, "expected module name"));
        }
        let (args, args_range) = self.parse_type_args()?;

        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range.clone())
            .with_required("name", name_range)
            .with_optional("args", args_range);
        let mixin = Mixin {
            name,
            args,
            annotations,
            comment,
            location: location.into(),
        };

        Ok(match keyword.kind {
            TokenKind::KwInclude => Member::Include(mixin),
            TokenKind::KwExtend => Member::Extend(mixin),
            _ => Member::Prepend(mixin),
        })
    }

    fn parse_variable(&mut self, start: usize, comment: Option<Comment>) -> ParseResult<Member> {
        let mut kind_range = None;
        if self.peek_kind(0)? == TokenKind::KwSelf {
            let receiver = self.advance()?;
            self.advance()?;
            kind_range = Some(receiver.range.start..self.last_end);
        }

        let name = self.advance()?;
        let colon = self.expect(TokenKind::Colon, "expected `:` after variable name")?;
        let ty = self.parse_type_expr()?;

        let location = self
            .loc(start..self.last_end)
            .with_required("name", name.range.clone())
            .with_required("colon", colon.range)
            .with_optional("kind", kind_range.clone());
        let variable = Variable {
            name: self.text(&name),
            ty,
            comment,
            location: location.into(),
        };

        Ok(match (kind_range, name.kind) {
            (Some(_), _) => Member::ClassInstanceVariable(variable),
            (None, TokenKind::A2Ident) => Member::ClassVariable(variable),
            (None, _) => Member::InstanceVariable(variable),
        })
    }

    /// `self.` before an alias name.
    fn parse_alias_kind(&mut self) -> ParseResult<Option<Range<usize>>> {
        if self.peek_kind(0)? == TokenKind::KwSelf && self.peek_kind(1)? == TokenKind::Dot {
            let receiver = self.advance()?;
            self.advance()?;
            return Ok(Some(receiver.range.start..self.last_end));
        }
        Ok(None)
    }

    fn parse_alias(
        &mut self,
        start: usize,
        annotations: Vec<Annotation>,
        comment: Option<Comment>,
    ) -> ParseResult<MethodAlias> {
        let keyword = self.advance()?;
        let new_kind = self.parse_alias_kind()?;
        let (new_name, new_name_range) = self.parse_method_name()?;

        let old_token = self.peek(0)?.clone();
        let old_kind = self.parse_alias_kind()?;
        if new_kind.is_some() != old_kind.is_some() {
            let message = if new_kind.is_some() {
                "expected `self.` before the aliased name"
            } else {
                "unexpected `self.` before the aliased name"
            };
            return Err(self.error_at(&old_token, message));
        }
        let (old_name, old_name_range) = self.parse_method_name()?;

        let kind = if new_kind.is_some() {
            MemberKind::Singleton
        } else {
            MemberKind::Instance
        };
        let location = self
            .loc(start..self.last_end)
            .with_required("keyword", keyword.range)
            .with_required("new_name", new_name_range)
            .with_required("old_name", old_name_range)
            .with_optional("new_kind", new_kind)
            .with_optional("old_kind", old_kind);
        Ok(MethodAlias {
            new_name,
            old_name,
            kind,
            annotations,
            comment,
            location: location.into(),
        })
    }
}

/// Identifiers and keywords, which may all serve as names.
/// Reject a start offset that is past the end or inside a character.
fn check_start(buffer: &Arc<Buffer>, start: usize) -> ParseResult<()> {
    let content = buffer.content();
    if start > content.len() {
        let end = content.len();
        return Err(ParseError::Lexical {
            location: Location::from_range(buffer.clone(), end..end),
            message: format!("start offset {start} is past the end of the buffer"),
            text: String::new(),
        });
    }
    if !content.is_char_boundary(start) {
        let (from, c) = content
            .char_indices()
            .take_while(|(i, _)| *i < start)
            .last()
            .unwrap_or((0, ' '));
        let location = Location::from_range(buffer.clone(), from..from + c.len_utf8());
        return Err(ParseError::Lexical {
            message: format!("start offset {start} is inside a character"),
            text: location.source().to_string(),
            location,
        });
    }
    Ok(())
}

const fn is_name_token(kind: TokenKind) -> bool {
    kind.is_identifier() || kind.is_keyword()
}

fn literal_of(token: &Token) -> Option<Literal> {
    match (token.kind, &token.value) {
        (TokenKind::Integer, Some(TokenValue::Integer(value))) => Some(Literal::Integer(*value)),
        (TokenKind::DqString | TokenKind::SqString, Some(TokenValue::String(value))) => {
            Some(Literal::String(value.clone()))
        }
        (
            TokenKind::Symbol | TokenKind::DqSymbol | TokenKind::SqSymbol,
            Some(TokenValue::Symbol(name)),
        ) => Some(Literal::Symbol(name.clone())),
        (TokenKind::KwTrue, _) => Some(Literal::Bool(true)),
        (TokenKind::KwFalse, _) => Some(Literal::Bool(false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(source: &str) -> Type {
        parse_type(source).unwrap()
    }

    fn class(name: &str) -> Type {
        Type::class_instance(TypeName::simple(name), vec![])
    }

    fn alias(name: &str) -> Type {
        Type::Alias {
            name: TypeName::simple(name),
            args: vec![],
            location: Default::default(),
        }
    }

    #[test]
    fn base_types() {
        assert_eq!(ty("untyped"), Type::base(BaseType::Untyped));
        assert_eq!(ty("bot"), Type::base(BaseType::Bottom));
        assert_eq!(ty("instance"), Type::base(BaseType::Instance));
        assert_eq!(ty("class"), Type::base(BaseType::Class));
    }

    #[test]
    fn union_of_intersections() {
        assert_eq!(
            ty("t & s | u & a"),
            Type::union(vec![
                Type::intersection(vec![alias("t"), alias("s")]),
                Type::intersection(vec![alias("u"), alias("a")]),
            ])
        );
    }

    #[test]
    fn unions_are_flat() {
        let Type::Union { types, .. } = ty("A | B | C") else {
            panic!("expected union");
        };
        assert_eq!(types.len(), 3);
    }

    #[test]
    fn optional_binds_tightest() {
        assert_eq!(
            ty("Array[String?]?"),
            Type::optional(Type::class_instance(
                TypeName::simple("Array"),
                vec![Type::optional(class("String"))],
            ))
        );
    }

    #[test]
    fn tuples() {
        assert_eq!(ty("[]"), Type::tuple(vec![]));
        assert_eq!(ty("[ ]"), Type::tuple(vec![]));
        assert_eq!(ty("[a,]"), ty("[a]"));
    }

    #[test]
    fn namespaced_names() {
        let Type::ClassInstance { name, .. } = ty("::Foo::Bar") else {
            panic!("expected class instance");
        };
        assert!(name.namespace.absolute);
        assert_eq!(name.namespace.path, vec!["Foo"]);
        assert_eq!(name.name, "Bar");

        let Type::Interface { name, args, .. } = ty("Foo::_Each[String]") else {
            panic!("expected interface");
        };
        assert_eq!(name.to_string(), "Foo::_Each");
        assert_eq!(args, vec![class("String")]);
    }

    #[test]
    fn aliases_take_arguments() {
        let Type::Alias { name, args, .. } = ty("list[Integer]") else {
            panic!("expected alias");
        };
        assert_eq!(name.name, "list");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn variables_resolve_from_scope() {
        let options = ParseOptions::default().with_variables(["A"]);
        let parsed = Parser::parse_type(Buffer::new("a.rbs", "A | B"), &options).unwrap();
        assert_eq!(parsed, Type::union(vec![Type::variable("A"), class("B")]));

        let parsed = Parser::parse_type(Buffer::new("a.rbs", "::A"), &options).unwrap();
        assert_eq!(
            parsed,
            Type::class_instance(TypeName::new(Namespace::root(), "A"), vec![])
        );
    }

    #[test]
    fn records() {
        let Type::Record { fields, .. } = ty("{ id: Integer, :name => String, 'x' => bool, 1 => nil }")
        else {
            panic!("expected record");
        };
        let keys: Vec<_> = fields.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                Literal::symbol("id"),
                Literal::symbol("name"),
                Literal::String("x".into()),
                Literal::Integer(1),
            ]
        );
        assert_eq!(ty("{ id: Integer }"), ty("{ :id => Integer }"));
    }

    #[test]
    fn duplicated_record_key() {
        let error = parse_type("{ id: Integer, :id => String }").unwrap_err();
        assert_eq!(error.message(), "duplicated record key");
        assert_eq!(error.text(), ":id");
    }

    #[test]
    fn literal_types() {
        assert_eq!(ty("-12"), Type::literal(Literal::Integer(-12)));
        assert_eq!(ty("'foo'"), Type::literal(Literal::String("foo".into())));
        assert_eq!(ty(":+"), Type::literal(Literal::symbol("+")));
        assert_eq!(ty("false"), Type::literal(Literal::Bool(false)));
    }

    #[test]
    fn proc_types() {
        let Type::Proc {
            function, block, ..
        } = ty("^(Integer x) { (String) -> void } -> bool?")
        else {
            panic!("expected proc");
        };
        assert_eq!(function.required_positionals.len(), 1);
        assert!(block.is_some_and(|b| b.required));
        assert_eq!(function.return_type, Type::optional(Type::base(BaseType::Bool)));

        let Type::Union { types, .. } = ty("^() -> void | String") else {
            panic!("expected union");
        };
        assert!(matches!(types[0], Type::Proc { .. }));

        assert!(matches!(ty("^-> void"), Type::Proc { .. }));
    }

    #[test]
    fn method_type_params() {
        let method_type = parse_method_type(
            "(untyped a, ?Integer b, *String c, Symbol d, key: top, ?opt?: bot, **nil rest) ?{ -> void } -> A",
        )
        .unwrap();
        let function = &method_type.function;
        assert_eq!(function.required_positionals.len(), 1);
        assert_eq!(function.optional_positionals.len(), 1);
        assert!(function.rest_positionals.is_some());
        assert_eq!(function.trailing_positionals.len(), 1);
        assert!(function.required_keywords.contains_key("key"));
        assert!(function.optional_keywords.contains_key("opt?"));
        assert_eq!(
            function.rest_keywords.as_ref().and_then(|p| p.name.as_deref()),
            Some("rest")
        );
        assert!(method_type.block.is_some_and(|b| !b.required));
    }

    #[test]
    fn method_type_renders_canonically() {
        let method_type = parse_method_type("(untyped _, top __)->void").unwrap();
        assert_eq!(method_type.to_string(), "(untyped _, top __) -> void");
    }

    #[test]
    fn method_type_variables() {
        let method_type = parse_method_type("[T] (T) -> Array[T]").unwrap();
        assert_eq!(
            method_type.function.required_positionals[0].ty,
            Type::variable("T")
        );
    }

    #[test]
    fn duplicated_keyword() {
        let error = parse_method_type("(foo: Integer, ?foo: String) -> void").unwrap_err();
        assert_eq!(error.message(), "duplicated keyword argument");
        assert_eq!(error.text(), "foo");
    }

    #[test]
    fn variance_is_rejected_on_method_types() {
        let error = parse_method_type("[out T] () -> T").unwrap_err();
        assert_eq!(error.token_kind(), Some(TokenKind::KwOut));
    }

    #[test]
    fn param_name_children() {
        let method_type =
            parse_method_type("(untyped a, ?Integer b, *String c, Symbol d) -> void").unwrap();
        let function = &method_type.function;
        let names: Vec<String> = function
            .params()
            .map(|p| {
                p.location
                    .get()
                    .and_then(|l| l.child("name"))
                    .map(|l| l.source().to_string())
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);

        let param = &function.optional_positionals[0];
        let location = param.location.get().unwrap();
        assert_eq!(location.child("type").unwrap().source(), "Integer");
    }

    #[test]
    fn syntax_error_format() {
        let error = parse_type("Array[").unwrap_err();
        assert_eq!(
            error.to_string(),
            "<input>:1:6...1:6: Syntax error: unexpected token for simple type, token=`` (pEOF)"
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let error = parse_type("Integer String").unwrap_err();
        assert_eq!(error.message(), "unexpected trailing token");
        assert_eq!(error.text(), "String");
    }

    #[test]
    fn terminator_ends_fragment() {
        let options = ParseOptions::default().with_terminator(Regex::new(r"\}").unwrap());
        let parsed =
            Parser::parse_method_type(Buffer::new("a.rb", "() -> void } junk"), &options).unwrap();
        assert_eq!(parsed.to_string(), "() -> void");

        let error =
            Parser::parse_method_type(Buffer::new("a.rb", "()-> { foo: bar } }"), &options)
                .unwrap_err();
        assert_eq!(error.text(), "}");
        assert_eq!(error.token_kind(), Some(TokenKind::Eof));
    }

    #[test]
    fn fragment_positions_follow_origin() {
        let buffer = Buffer::with_origin("a.rb", "#: () -> Integer", 10, 4);
        let options = ParseOptions::default().starting_at(3);
        let parsed = Parser::parse_method_type(buffer, &options).unwrap();
        let location = parsed.location.get().unwrap();
        assert_eq!(location.start_loc(), (10, 7));
        assert_eq!(location.source(), "() -> Integer");
    }

    #[test]
    fn start_inside_character_is_an_error() {
        let buffer = Buffer::new("a.rb", "é Integer");
        let error = Parser::parse_type(buffer, &ParseOptions::default().starting_at(1)).unwrap_err();
        assert!(matches!(error, ParseError::Lexical { .. }));
        assert_eq!(error.text(), "é");
        assert_eq!(error.location().range(), 0..2);
        assert_eq!(error.message(), "start offset 1 is inside a character");
    }

    #[test]
    fn start_past_end_is_an_error() {
        let options = ParseOptions::default().starting_at(40);
        let error = Parser::parse_signature(Buffer::new("a.rbs", "type a = b"), &options)
            .unwrap_err();
        assert!(matches!(error, ParseError::Lexical { .. }));
        assert_eq!(error.location().range(), 10..10);
        assert_eq!(error.message(), "start offset 40 is past the end of the buffer");
    }

    #[test]
    fn start_at_end_parses_empty_signature() {
        let options = ParseOptions::default().starting_at(10);
        let decls = Parser::parse_signature(Buffer::new("a.rbs", "type a = b"), &options).unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn class_declaration_children() {
        let decls = parse_signature("class Foo[out A] < Bar[A]\nend\n").unwrap();
        let Declaration::Class(class) = &decls[0] else {
            panic!("expected class");
        };
        let location = class.location.get().unwrap();
        assert_eq!(location.child("keyword").unwrap().source(), "class");
        assert_eq!(location.child("name").unwrap().source(), "Foo");
        assert_eq!(location.child("type_params").unwrap().source(), "[out A]");
        assert_eq!(location.child("lt").unwrap().source(), "<");
        assert_eq!(location.child("end").unwrap().source(), "end");

        let super_class = class.super_class.as_ref().unwrap();
        assert_eq!(super_class.args, vec![Type::variable("A")]);
        assert_eq!(class.type_params[0].variance, Variance::Covariant);
    }

    #[test]
    fn module_self_types() {
        let decls = parse_signature("module Foo : _Each[Integer], Bar\nend").unwrap();
        let Declaration::Module(module) = &decls[0] else {
            panic!("expected module");
        };
        assert_eq!(module.self_types.len(), 2);
        let location = module.location.get().unwrap();
        assert_eq!(location.child("self_types").unwrap().source(), "_Each[Integer], Bar");
    }

    #[test]
    fn overload_continuation_must_be_last() {
        let error = parse_signature("class Foo\n def foo: () -> void | ... | () -> Integer\nend")
            .unwrap_err();
        assert_eq!(error.text(), "|");

        let decls = parse_signature("class Foo\n def foo: () -> void | ...\nend").unwrap();
        let Declaration::Class(class) = &decls[0] else {
            panic!("expected class");
        };
        let Member::MethodDefinition(def) = &class.members[0] else {
            panic!("expected method");
        };
        assert!(def.overload);
        assert_eq!(def.overloads.len(), 1);
    }

    #[test]
    fn interface_rejects_overload_continuation() {
        let error = parse_signature("interface _Foo\n def foo: () -> void | ...\nend").unwrap_err();
        assert_eq!(error.text(), "...");
        assert_eq!(error.message(), "unexpected overloading method definition");
    }

    #[test]
    fn interface_rejections() {
        let cases = [
            ("include Foo", "mixin is not allowed in interface declaration"),
            ("extend Foo", "mixin is not allowed in interface declaration"),
            ("prepend Foo", "mixin is not allowed in interface declaration"),
            ("@foo: Integer", "instance variable is not allowed in interface declaration"),
            ("def self?.foo: () -> void", "`self?` method is not allowed in interface declaration"),
            ("def self.foo: () -> void", "singleton method is not allowed in interface declaration"),
            ("attr_reader foo: Integer", "attribute is not allowed in interface declaration"),
            ("private", "visibility member is not allowed in interface declaration"),
            ("type foo = Integer", "declaration is not allowed in interface declaration"),
        ];
        for (member, message) in cases {
            let source = format!("interface _Foo\n  {member}\nend");
            let error = parse_signature(&source).unwrap_err();
            assert_eq!(error.message(), message, "{member}");
        }
    }

    #[test]
    fn method_names() {
        let source = "class Foo\n  def foo?: () -> bool\n  def self: () -> void\n  def self?: () -> void\n  def `foo!=`: () -> void\n  def []=: (Integer, String) -> String\n  def type: () -> void\nend";
        let decls = parse_signature(source).unwrap();
        let Declaration::Class(class) = &decls[0] else {
            panic!("expected class");
        };
        let names: Vec<_> = class
            .members
            .iter()
            .filter_map(|m| match m {
                Member::MethodDefinition(def) => Some(def.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["foo?", "self", "self?", "foo!=", "[]=", "type"]);
    }

    #[test]
    fn visibility_prefix() {
        let decls =
            parse_signature("class Foo\n  private def foo: () -> void\n  private\n  def bar: () -> void\nend")
                .unwrap();
        let Declaration::Class(class) = &decls[0] else {
            panic!("expected class");
        };
        assert!(matches!(
            &class.members[0],
            Member::MethodDefinition(def) if def.visibility == Some(Visibility::Private)
        ));
        assert!(matches!(&class.members[1], Member::Private(_)));
        assert!(matches!(
            &class.members[2],
            Member::MethodDefinition(def) if def.visibility.is_none()
        ));
    }

    #[test]
    fn comments_attach_to_following_declaration() {
        let decls = parse_signature("# one\n# two\n#\n# four\nclass Foo\nend\n").unwrap();
        let comment = decls[0].comment().unwrap();
        assert_eq!(comment.string(), "one\ntwo\n\nfour");

        let decls = parse_signature("# detached\n\nclass Foo\nend\n").unwrap();
        assert!(decls[0].comment().is_none());
    }

    #[test]
    fn lexical_errors_surface() {
        let error = parse_type("\"foo").unwrap_err();
        assert!(matches!(error, ParseError::Lexical { .. }));
        assert!(error.to_string().contains("Lexical error: unterminated string literal"));
    }
}
