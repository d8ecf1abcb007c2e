//! Hand-written lexer for signature source text.
//!
//! The lexer is lazy: the parser pulls tokens one at a time, so a fragment
//! that ends at a caller-supplied terminator never looks at the text after it.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;

use crate::buffer::Buffer;
use crate::location::Location;
use crate::parser::{ParseError, ParseResult};

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input, or the caller-supplied terminator.
    Eof,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `::`
    Colon2,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `^`
    Hat,
    /// `->`
    Arrow,
    /// `=>`
    FatArrow,
    /// `,`
    Comma,
    /// `|`
    Bar,
    /// `&`
    Amp,
    /// `*`
    Star,
    /// `**`
    Star2,
    /// `.`
    Dot,
    /// `...`
    Dot3,
    /// `?`
    Question,
    /// `<`
    Lt,
    /// `=`
    Eq,
    /// `[]`
    ArefOperator,
    /// Operators that only appear as method names (`==`, `<=>`, `+@`, ...).
    Operator,

    KwBool,
    KwBot,
    KwClass,
    KwFalse,
    KwInstance,
    KwInterface,
    KwNil,
    KwSelf,
    KwSingleton,
    KwTop,
    KwTrue,
    KwVoid,
    KwType,
    KwUnchecked,
    KwIn,
    KwOut,
    KwEnd,
    KwDef,
    KwInclude,
    KwExtend,
    KwPrepend,
    KwAlias,
    KwModule,
    KwAttrReader,
    KwAttrWriter,
    KwAttrAccessor,
    KwPublic,
    KwPrivate,
    KwUntyped,

    /// Identifier starting with a lowercase letter.
    LIdent,
    /// Identifier starting with an uppercase letter.
    UIdent,
    /// Interface name: `_` followed by an uppercase letter.
    ULIdent,
    /// `_` followed by a lowercase letter, digit or `_`, or `_` alone.
    ULLIdent,
    /// Global variable: `$name`.
    GIdent,
    /// Instance variable: `@name`.
    AIdent,
    /// Class variable: `@@name`.
    A2Ident,
    /// Identifier ending with `!`.
    BangIdent,
    /// Identifier ending with `=`.
    EqIdent,
    /// Back-quoted identifier.
    QIdent,

    /// Double-quoted string.
    DqString,
    /// Single-quoted string.
    SqString,
    /// Integer literal.
    Integer,
    /// Bare symbol: `:foo`, `:+`, `:@ivar`.
    Symbol,
    /// Double-quoted symbol: `:"foo"`.
    DqSymbol,
    /// Single-quoted symbol: `:'foo'`.
    SqSymbol,
    /// `%a{...}` annotation.
    Annotation,

    /// Comment after other tokens on the same line.
    Comment,
    /// Comment that starts its line.
    LineComment,
}

impl TokenKind {
    /// The tag reported in error messages.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Eof => "pEOF",
            Self::LParen => "pLPAREN",
            Self::RParen => "pRPAREN",
            Self::Colon => "pCOLON",
            Self::Colon2 => "pCOLON2",
            Self::LBracket => "pLBRACKET",
            Self::RBracket => "pRBRACKET",
            Self::LBrace => "pLBRACE",
            Self::RBrace => "pRBRACE",
            Self::Hat => "pHAT",
            Self::Arrow => "pARROW",
            Self::FatArrow => "pFATARROW",
            Self::Comma => "pCOMMA",
            Self::Bar => "pBAR",
            Self::Amp => "pAMP",
            Self::Star => "pSTAR",
            Self::Star2 => "pSTAR2",
            Self::Dot => "pDOT",
            Self::Dot3 => "pDOT3",
            Self::Question => "pQUESTION",
            Self::Lt => "pLT",
            Self::Eq => "pEQ",
            Self::ArefOperator => "pAREF_OPR",
            Self::Operator => "tOPERATOR",
            Self::KwBool => "kBOOL",
            Self::KwBot => "kBOT",
            Self::KwClass => "kCLASS",
            Self::KwFalse => "kFALSE",
            Self::KwInstance => "kINSTANCE",
            Self::KwInterface => "kINTERFACE",
            Self::KwNil => "kNIL",
            Self::KwSelf => "kSELF",
            Self::KwSingleton => "kSINGLETON",
            Self::KwTop => "kTOP",
            Self::KwTrue => "kTRUE",
            Self::KwVoid => "kVOID",
            Self::KwType => "kTYPE",
            Self::KwUnchecked => "kUNCHECKED",
            Self::KwIn => "kIN",
            Self::KwOut => "kOUT",
            Self::KwEnd => "kEND",
            Self::KwDef => "kDEF",
            Self::KwInclude => "kINCLUDE",
            Self::KwExtend => "kEXTEND",
            Self::KwPrepend => "kPREPEND",
            Self::KwAlias => "kALIAS",
            Self::KwModule => "kMODULE",
            Self::KwAttrReader => "kATTRREADER",
            Self::KwAttrWriter => "kATTRWRITER",
            Self::KwAttrAccessor => "kATTRACCESSOR",
            Self::KwPublic => "kPUBLIC",
            Self::KwPrivate => "kPRIVATE",
            Self::KwUntyped => "kUNTYPED",
            Self::LIdent => "tLIDENT",
            Self::UIdent => "tUIDENT",
            Self::ULIdent => "tULIDENT",
            Self::ULLIdent => "tULLIDENT",
            Self::GIdent => "tGIDENT",
            Self::AIdent => "tAIDENT",
            Self::A2Ident => "tA2IDENT",
            Self::BangIdent => "tBANGIDENT",
            Self::EqIdent => "tEQIDENT",
            Self::QIdent => "tQIDENT",
            Self::DqString => "tDQSTRING",
            Self::SqString => "tSQSTRING",
            Self::Integer => "tINTEGER",
            Self::Symbol => "tSYMBOL",
            Self::DqSymbol => "tDQSYMBOL",
            Self::SqSymbol => "tSQSYMBOL",
            Self::Annotation => "tANNOTATION",
            Self::Comment => "tCOMMENT",
            Self::LineComment => "tLINECOMMENT",
        }
    }

    /// Whether this is a reserved word.
    #[must_use]
    pub const fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::KwBool
                | Self::KwBot
                | Self::KwClass
                | Self::KwFalse
                | Self::KwInstance
                | Self::KwInterface
                | Self::KwNil
                | Self::KwSelf
                | Self::KwSingleton
                | Self::KwTop
                | Self::KwTrue
                | Self::KwVoid
                | Self::KwType
                | Self::KwUnchecked
                | Self::KwIn
                | Self::KwOut
                | Self::KwEnd
                | Self::KwDef
                | Self::KwInclude
                | Self::KwExtend
                | Self::KwPrepend
                | Self::KwAlias
                | Self::KwModule
                | Self::KwAttrReader
                | Self::KwAttrWriter
                | Self::KwAttrAccessor
                | Self::KwPublic
                | Self::KwPrivate
                | Self::KwUntyped
        )
    }

    /// Whether this is a plain identifier of any case.
    #[must_use]
    pub const fn is_identifier(self) -> bool {
        matches!(
            self,
            Self::LIdent | Self::UIdent | Self::ULIdent | Self::ULLIdent
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Look up the keyword spelled by `word`.
#[must_use]
pub fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "bool" => TokenKind::KwBool,
        "bot" => TokenKind::KwBot,
        "class" => TokenKind::KwClass,
        "false" => TokenKind::KwFalse,
        "instance" => TokenKind::KwInstance,
        "interface" => TokenKind::KwInterface,
        "nil" => TokenKind::KwNil,
        "self" => TokenKind::KwSelf,
        "singleton" => TokenKind::KwSingleton,
        "top" => TokenKind::KwTop,
        "true" => TokenKind::KwTrue,
        "void" => TokenKind::KwVoid,
        "type" => TokenKind::KwType,
        "unchecked" => TokenKind::KwUnchecked,
        "in" => TokenKind::KwIn,
        "out" => TokenKind::KwOut,
        "end" => TokenKind::KwEnd,
        "def" => TokenKind::KwDef,
        "include" => TokenKind::KwInclude,
        "extend" => TokenKind::KwExtend,
        "prepend" => TokenKind::KwPrepend,
        "alias" => TokenKind::KwAlias,
        "module" => TokenKind::KwModule,
        "attr_reader" => TokenKind::KwAttrReader,
        "attr_writer" => TokenKind::KwAttrWriter,
        "attr_accessor" => TokenKind::KwAttrAccessor,
        "public" => TokenKind::KwPublic,
        "private" => TokenKind::KwPrivate,
        "untyped" => TokenKind::KwUntyped,
        _ => return None,
    };
    Some(kind)
}

/// Operator spellings accepted after `:` in symbol literals, longest first.
const OPERATOR_SYMBOLS: &[&str] = &[
    "[]=", "===", "<=>", "[]", "==", "=~", "!=", "!~", "<=", ">=", "<<", ">>", "**", "+@",
    "-@", "|", "&", "/", "%", "~", "`", "^", "<", ">", "+", "-", "*", "!",
];

/// Decoded payload of literal-like tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    /// Decoded string contents.
    String(String),
    /// Symbol name without the leading `:`.
    Symbol(String),
    /// Integer value.
    Integer(i64),
    /// Annotation text between the delimiters.
    Annotation(String),
    /// Comment text after `#` and one optional space.
    Comment(String),
    /// Back-quoted identifier text.
    Ident(String),
}

/// A token with its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// Byte range in the buffer.
    pub range: Range<usize>,
    /// Zero-based raw line the token starts on.
    pub line: usize,
    /// Decoded literal value, when the kind carries one.
    pub value: Option<TokenValue>,
}

impl Token {
    /// Whether the token is the end of input.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Lazy tokenizer over a shared [`Buffer`].
pub struct Lexer {
    buffer: Arc<Buffer>,
    pos: usize,
    line: usize,
    line_has_token: bool,
    terminator: Option<Regex>,
    finished: bool,
}

impl Lexer {
    /// Start lexing `buffer` at byte offset `start`.
    #[must_use]
    pub fn new(buffer: Arc<Buffer>, start: usize) -> Self {
        let mut start = start.min(buffer.len());
        while !buffer.content().is_char_boundary(start) {
            start -= 1;
        }
        let line = buffer.line_of(start);
        let line_has_token = buffer
            .content()
            .get(..start)
            .and_then(|before| before.rsplit('\n').next())
            .is_some_and(|prefix| !prefix.trim().is_empty());

        Self {
            buffer,
            pos: start,
            line,
            line_has_token,
            terminator: None,
            finished: false,
        }
    }

    /// Stop at the first token position where `terminator` matches.
    ///
    /// The pattern is anchored, so it only ever matches at a token start.
    #[must_use]
    pub fn with_terminator(mut self, terminator: Option<Regex>) -> Self {
        self.terminator = terminator.map(|pattern| {
            Regex::new(&format!("^(?:{})", pattern.as_str())).unwrap_or(pattern)
        });
        self
    }

    /// The buffer being lexed.
    #[must_use]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Produce the next token.
    ///
    /// After the end of input every call returns another `Eof` token.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        if self.finished {
            return Ok(self.token(TokenKind::Eof, self.pos..self.pos, None));
        }

        self.skip_whitespace();
        let start = self.pos;

        if let Some(len) = self.terminator_match() {
            self.finished = true;
            return Ok(self.token(TokenKind::Eof, start..start + len, None));
        }

        let Some(c) = self.peek_byte(0) else {
            self.finished = true;
            return Ok(self.token(TokenKind::Eof, start..start, None));
        };

        let token = match c {
            b'(' => self.punct(TokenKind::LParen, 1),
            b')' => self.punct(TokenKind::RParen, 1),
            b'{' => self.punct(TokenKind::LBrace, 1),
            b'}' => self.punct(TokenKind::RBrace, 1),
            b']' => self.punct(TokenKind::RBracket, 1),
            b',' => self.punct(TokenKind::Comma, 1),
            b'&' => self.punct(TokenKind::Amp, 1),
            b'|' => self.punct(TokenKind::Bar, 1),
            b'^' => self.punct(TokenKind::Hat, 1),
            b'?' => self.punct(TokenKind::Question, 1),
            b'~' | b'/' => self.punct(TokenKind::Operator, 1),
            b'[' => match (self.peek_byte(1), self.peek_byte(2)) {
                (Some(b']'), Some(b'=')) => self.punct(TokenKind::Operator, 3),
                (Some(b']'), _) => self.punct(TokenKind::ArefOperator, 2),
                _ => self.punct(TokenKind::LBracket, 1),
            },
            b'-' => match self.peek_byte(1) {
                Some(b'>') => self.punct(TokenKind::Arrow, 2),
                Some(b'@') => self.punct(TokenKind::Operator, 2),
                Some(d) if d.is_ascii_digit() => self.integer()?,
                _ => self.punct(TokenKind::Operator, 1),
            },
            b'+' => match self.peek_byte(1) {
                Some(b'@') => self.punct(TokenKind::Operator, 2),
                Some(d) if d.is_ascii_digit() => self.integer()?,
                _ => self.punct(TokenKind::Operator, 1),
            },
            b'*' => match self.peek_byte(1) {
                Some(b'*') => self.punct(TokenKind::Star2, 2),
                _ => self.punct(TokenKind::Star, 1),
            },
            b'.' => {
                if self.peek_byte(1) == Some(b'.') && self.peek_byte(2) == Some(b'.') {
                    self.punct(TokenKind::Dot3, 3)
                } else {
                    self.punct(TokenKind::Dot, 1)
                }
            }
            b'=' => match (self.peek_byte(1), self.peek_byte(2)) {
                (Some(b'='), Some(b'=')) => self.punct(TokenKind::Operator, 3),
                (Some(b'=' | b'~'), _) => self.punct(TokenKind::Operator, 2),
                (Some(b'>'), _) => self.punct(TokenKind::FatArrow, 2),
                _ => self.punct(TokenKind::Eq, 1),
            },
            b'<' => match (self.peek_byte(1), self.peek_byte(2)) {
                (Some(b'='), Some(b'>')) => self.punct(TokenKind::Operator, 3),
                (Some(b'=' | b'<'), _) => self.punct(TokenKind::Operator, 2),
                _ => self.punct(TokenKind::Lt, 1),
            },
            b'>' => match self.peek_byte(1) {
                Some(b'=' | b'>') => self.punct(TokenKind::Operator, 2),
                _ => self.punct(TokenKind::Operator, 1),
            },
            b'!' => match self.peek_byte(1) {
                Some(b'=' | b'~') => self.punct(TokenKind::Operator, 2),
                _ => self.punct(TokenKind::Operator, 1),
            },
            b'%' => {
                if self.peek_byte(1) == Some(b'a')
                    && matches!(self.peek_byte(2), Some(b'{' | b'(' | b'[' | b'<' | b'|'))
                {
                    self.annotation()?
                } else {
                    self.punct(TokenKind::Operator, 1)
                }
            }
            b':' => self.colon()?,
            b'`' => self.backquote(),
            b'"' => self.double_quoted(TokenKind::DqString, start, 0)?,
            b'\'' => self.single_quoted(TokenKind::SqString, start, 0)?,
            b'#' => self.comment(),
            b'$' => self.global()?,
            b'@' => self.instance_variable()?,
            b'0'..=b'9' => self.integer()?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.word(),
            _ => return Err(self.unexpected_char()),
        };

        if !matches!(token.kind, TokenKind::Comment) {
            self.line_has_token = true;
        }
        Ok(token)
    }

    fn content(&self) -> &str {
        self.buffer.content()
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.content().as_bytes().get(self.pos + offset).copied()
    }

    fn token(&self, kind: TokenKind, range: Range<usize>, value: Option<TokenValue>) -> Token {
        let line = self.buffer.line_of(range.start);
        Token {
            kind,
            range,
            line,
            value,
        }
    }

    fn lexical_error(&self, range: Range<usize>, message: impl Into<String>) -> ParseError {
        let location = Location::from_range(self.buffer.clone(), range);
        let text = location.source().to_string();
        ParseError::Lexical {
            location,
            message: message.into(),
            text,
        }
    }

    fn unexpected_char(&self) -> ParseError {
        let len = self.content()[self.pos..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        self.lexical_error(self.pos..self.pos + len, "unexpected character")
    }

    fn terminator_match(&self) -> Option<usize> {
        let terminator = self.terminator.as_ref()?;
        let found = terminator.find(&self.content()[self.pos..])?;
        (found.start() == 0).then(|| found.end())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_byte(0) {
            match c {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.line_has_token = false;
                }
                _ => break,
            }
        }
    }

    fn punct(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.pos;
        self.pos += len;
        self.token(kind, start..self.pos, None)
    }

    fn ident_len(&self, from: usize) -> usize {
        self.content().as_bytes()[from..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count()
    }

    /// Length of a `!` or `=` suffix that makes a method-name identifier.
    fn name_suffix_len(&self, at: usize) -> (usize, Option<TokenKind>) {
        let bytes = self.content().as_bytes();
        let next = bytes.get(at + 1).copied();
        match bytes.get(at) {
            Some(b'!') if !matches!(next, Some(b'=' | b'~')) => (1, Some(TokenKind::BangIdent)),
            Some(b'=') if !matches!(next, Some(b'=' | b'~' | b'>')) => {
                (1, Some(TokenKind::EqIdent))
            }
            _ => (0, None),
        }
    }

    fn word(&mut self) -> Token {
        let start = self.pos;
        let len = self.ident_len(start);
        let end = start + len;

        let (suffix, suffixed_kind) = self.name_suffix_len(end);
        if let Some(kind) = suffixed_kind {
            self.pos = end + suffix;
            return self.token(kind, start..self.pos, None);
        }
        self.pos = end;

        let word = &self.content()[start..end];
        let bytes = word.as_bytes();
        let kind = match bytes[0] {
            b'_' => {
                if bytes.get(1).is_some_and(u8::is_ascii_uppercase) {
                    TokenKind::ULIdent
                } else {
                    TokenKind::ULLIdent
                }
            }
            b'A'..=b'Z' => TokenKind::UIdent,
            _ => keyword(word).unwrap_or(TokenKind::LIdent),
        };
        self.token(kind, start..end, None)
    }

    fn integer(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let mut end = start;
        let bytes = self.content().as_bytes();
        if matches!(bytes[end], b'+' | b'-') {
            end += 1;
        }
        while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'_') {
            end += 1;
        }

        let digits: String = self.content()[start..end]
            .chars()
            .filter(|c| *c != '_' && *c != '+')
            .collect();
        let value = digits
            .parse::<i64>()
            .map_err(|_| self.lexical_error(start..end, "integer literal is out of range"))?;

        self.pos = end;
        Ok(self.token(TokenKind::Integer, start..end, Some(TokenValue::Integer(value))))
    }

    fn colon(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let rest = &self.content()[start + 1..];
        let Some(&next) = rest.as_bytes().first() else {
            return Ok(self.punct(TokenKind::Colon, 1));
        };

        match next {
            b':' => Ok(self.punct(TokenKind::Colon2, 2)),
            b'"' => self.double_quoted(TokenKind::DqSymbol, start, 1),
            b'\'' => self.single_quoted(TokenKind::SqSymbol, start, 1),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let mut end = start + 1 + self.ident_len(start + 1);
                let (suffix, kind) = self.name_suffix_len(end);
                if kind.is_some() {
                    end += suffix;
                } else if self.content().as_bytes().get(end) == Some(&b'?') {
                    end += 1;
                }
                Ok(self.symbol(start, end))
            }
            b'$' | b'@' => {
                let sigil = if rest.starts_with("@@") { 2 } else { 1 };
                let len = self.ident_len(start + 1 + sigil);
                if len == 0 {
                    return Ok(self.punct(TokenKind::Colon, 1));
                }
                Ok(self.symbol(start, start + 1 + sigil + len))
            }
            _ => match OPERATOR_SYMBOLS.iter().find(|op| rest.starts_with(**op)) {
                Some(op) => Ok(self.symbol(start, start + 1 + op.len())),
                None => Ok(self.punct(TokenKind::Colon, 1)),
            },
        }
    }

    fn symbol(&mut self, start: usize, end: usize) -> Token {
        let name = self.content()[start + 1..end].to_string();
        self.pos = end;
        self.token(TokenKind::Symbol, start..end, Some(TokenValue::Symbol(name)))
    }

    /// Lex a `"..."` string or symbol; `prefix` is the length of a leading `:`.
    fn double_quoted(&mut self, kind: TokenKind, start: usize, prefix: usize) -> ParseResult<Token> {
        let mut chars = self.content()[start + prefix + 1..].char_indices();
        let base = start + prefix + 1;
        let mut value = String::new();

        loop {
            let Some((i, c)) = chars.next() else {
                return Err(self.lexical_error(start..self.buffer.len(), "unterminated string literal"));
            };
            match c {
                '"' => {
                    self.pos = base + i + 1;
                    break;
                }
                '\\' => {
                    let escape_start = base + i;
                    let Some((_, e)) = chars.next() else {
                        return Err(self.lexical_error(
                            start..self.buffer.len(),
                            "unterminated string literal",
                        ));
                    };
                    let decoded = match e {
                        'a' => '\u{7}',
                        'b' => '\u{8}',
                        'e' => '\u{1b}',
                        'f' => '\u{c}',
                        'n' => '\n',
                        'r' => '\r',
                        's' => ' ',
                        't' => '\t',
                        'v' => '\u{b}',
                        '"' | '\'' | '\\' => e,
                        'u' => {
                            let rest = chars.as_str();
                            let (hex, consumed) = if let Some(braced) = rest.strip_prefix('{') {
                                let close = braced.find('}').unwrap_or(0);
                                (&braced[..close], close + 2)
                            } else {
                                (rest.get(..4).unwrap_or(""), 4)
                            };
                            let code = u32::from_str_radix(hex, 16)
                                .ok()
                                .filter(|_| !hex.is_empty())
                                .and_then(char::from_u32);
                            let Some(code) = code else {
                                let end = (escape_start + 2 + consumed).min(self.buffer.len());
                                let end = if self.content().is_char_boundary(end) {
                                    end
                                } else {
                                    escape_start + 2
                                };
                                return Err(self.lexical_error(
                                    escape_start..end,
                                    "invalid unicode escape",
                                ));
                            };
                            for _ in 0..consumed {
                                chars.next();
                            }
                            code
                        }
                        other => {
                            let end = escape_start + 1 + other.len_utf8();
                            return Err(self.lexical_error(
                                escape_start..end,
                                "invalid escape sequence",
                            ));
                        }
                    };
                    value.push(decoded);
                }
                c => value.push(c),
            }
        }

        let range = start..self.pos;
        let value = if kind == TokenKind::DqSymbol {
            TokenValue::Symbol(value)
        } else {
            TokenValue::String(value)
        };
        Ok(self.token(kind, range, Some(value)))
    }

    /// Lex a `'...'` string or symbol; `prefix` is the length of a leading `:`.
    fn single_quoted(&mut self, kind: TokenKind, start: usize, prefix: usize) -> ParseResult<Token> {
        let base = start + prefix + 1;
        let mut chars = self.content()[base..].char_indices().peekable();
        let mut value = String::new();

        loop {
            let Some((i, c)) = chars.next() else {
                return Err(self.lexical_error(start..self.buffer.len(), "unterminated string literal"));
            };
            match c {
                '\'' => {
                    self.pos = base + i + 1;
                    break;
                }
                '\\' => match chars.peek() {
                    Some(&(_, e @ ('\'' | '\\'))) => {
                        chars.next();
                        value.push(e);
                    }
                    _ => value.push('\\'),
                },
                c => value.push(c),
            }
        }

        let value = if kind == TokenKind::SqSymbol {
            TokenValue::Symbol(value)
        } else {
            TokenValue::String(value)
        };
        Ok(self.token(kind, start..self.pos, Some(value)))
    }

    fn annotation(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let open = self.content().as_bytes()[start + 2];
        let close = match open {
            b'{' => '}',
            b'(' => ')',
            b'[' => ']',
            b'<' => '>',
            _ => '|',
        };
        let body_start = start + 3;
        let Some(len) = self.content()[body_start..].find(close) else {
            return Err(self.lexical_error(start..self.buffer.len(), "unterminated annotation"));
        };
        let text = self.content()[body_start..body_start + len].to_string();
        self.pos = body_start + len + 1;
        Ok(self.token(
            TokenKind::Annotation,
            start..self.pos,
            Some(TokenValue::Annotation(text)),
        ))
    }

    fn backquote(&mut self) -> Token {
        let start = self.pos;
        let rest = &self.content()[start + 1..];
        let line = rest.split('\n').next().unwrap_or("");
        let quoted = !matches!(line.as_bytes().first(), None | Some(b' ' | b':'))
            && line.contains('`');

        if quoted {
            let len = line.find('`').unwrap_or(0);
            let name = line[..len].to_string();
            self.pos = start + 1 + len + 1;
            self.token(TokenKind::QIdent, start..self.pos, Some(TokenValue::Ident(name)))
        } else {
            self.punct(TokenKind::Operator, 1)
        }
    }

    fn comment(&mut self) -> Token {
        let start = self.pos;
        let rest = &self.content()[start..];
        let len = rest.find('\n').unwrap_or(rest.len());
        let body = rest[1..len].trim_end_matches('\r');
        let text = body.strip_prefix(' ').unwrap_or(body).to_string();
        let end = start + 1 + body.len();
        let kind = if self.line_has_token {
            TokenKind::Comment
        } else {
            TokenKind::LineComment
        };
        self.pos = start + len;
        self.token(kind, start..end, Some(TokenValue::Comment(text)))
    }

    fn global(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let len = self.ident_len(start + 1);
        let end = if len > 0 {
            start + 1 + len
        } else {
            match self.peek_byte(1) {
                Some(b'-') if self.ident_len(start + 2) > 0 => start + 3,
                Some(
                    b'~' | b'*' | b'$' | b'?' | b'!' | b'@' | b'/' | b'\\' | b';' | b',' | b'.'
                    | b'=' | b':' | b'<' | b'>' | b'"' | b'&' | b'\'' | b'`' | b'+',
                ) => start + 2,
                _ => return Err(self.unexpected_char()),
            }
        };
        self.pos = end;
        Ok(self.token(TokenKind::GIdent, start..end, None))
    }

    fn instance_variable(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let (kind, sigil) = if self.peek_byte(1) == Some(b'@') {
            (TokenKind::A2Ident, 2)
        } else {
            (TokenKind::AIdent, 1)
        };
        let first = self.content().as_bytes().get(start + sigil).copied();
        if !first.is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') {
            return Err(self.unexpected_char());
        }
        let end = start + sigil + self.ident_len(start + sigil);
        self.pos = end;
        Ok(self.token(kind, start..end, None))
    }
}

impl Iterator for Lexer {
    type Item = ParseResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) => Some(Ok(token)),
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

/// Lex the whole buffer, ending with the `Eof` token.
pub fn tokenize(buffer: Arc<Buffer>) -> ParseResult<Vec<Token>> {
    Lexer::new(buffer, 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(Arc::new(Buffer::new("test.rbs", source)))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn single(source: &str) -> Token {
        tokenize(Arc::new(Buffer::new("test.rbs", source)))
            .unwrap()
            .remove(0)
    }

    #[test]
    fn identifier_classes() {
        use TokenKind::*;
        assert_eq!(
            kinds("foo Foo _Foo _foo _ $foo @foo @@foo foo! foo= `foo bar`"),
            vec![
                LIdent, UIdent, ULIdent, ULLIdent, ULLIdent, GIdent, AIdent, A2Ident, BangIdent,
                EqIdent, QIdent, Eof
            ]
        );
    }

    #[test]
    fn keywords_and_punctuation() {
        use TokenKind::*;
        assert_eq!(
            kinds("class Foo < Bar[X] end"),
            vec![KwClass, UIdent, Lt, UIdent, LBracket, UIdent, RBracket, KwEnd, Eof]
        );
        assert_eq!(
            kinds("^(a) -> b | c & d? ... :: => **"),
            vec![
                Hat, LParen, LIdent, RParen, Arrow, LIdent, Bar, LIdent, Amp, LIdent, Question,
                Dot3, Colon2, FatArrow, Star2, Eof
            ]
        );
    }

    #[test]
    fn aref_and_operators() {
        use TokenKind::*;
        assert_eq!(kinds("[] []= [ ]"), vec![ArefOperator, Operator, LBracket, RBracket, Eof]);
        assert_eq!(
            kinds("== === =~ != !~ ! <=> <= << >= >> > + - +@ -@ ~ / %"),
            vec![
                Operator, Operator, Operator, Operator, Operator, Operator, Operator, Operator,
                Operator, Operator, Operator, Operator, Operator, Operator, Operator, Operator,
                Operator, Operator, Operator, Eof
            ]
        );
    }

    #[test]
    fn bang_before_equal_is_not_a_suffix() {
        use TokenKind::*;
        assert_eq!(kinds("a!=b"), vec![LIdent, Operator, LIdent, Eof]);
        assert_eq!(kinds("a=>b"), vec![LIdent, FatArrow, LIdent, Eof]);
    }

    #[test]
    fn string_escapes() {
        let token = single(r#""foo\"bar\tbaz\u{65e5}""#);
        assert_eq!(token.kind, TokenKind::DqString);
        assert_eq!(
            token.value,
            Some(TokenValue::String("foo\"bar\tbaz日".to_string()))
        );

        let token = single(r"'ba\'z\n'");
        assert_eq!(token.kind, TokenKind::SqString);
        assert_eq!(token.value, Some(TokenValue::String("ba'z\\n".to_string())));
    }

    #[test]
    fn integers_with_signs_and_separators() {
        assert_eq!(single("123").value, Some(TokenValue::Integer(123)));
        assert_eq!(single("+12_23").value, Some(TokenValue::Integer(1223)));
        assert_eq!(single("-1234_").value, Some(TokenValue::Integer(-1234)));
    }

    #[test]
    fn symbols() {
        for (source, name) in [
            (":foo", "foo"),
            (":foo?", "foo?"),
            (":$bar", "$bar"),
            (":@bar", "@bar"),
            (":@@bar", "@@bar"),
            (":[]=", "[]="),
            (":<=>", "<=>"),
            (":`", "`"),
            (":+@", "+@"),
        ] {
            let token = single(source);
            assert_eq!(token.kind, TokenKind::Symbol, "{source}");
            assert_eq!(token.value, Some(TokenValue::Symbol(name.to_string())));
        }

        let token = single(r#":"日本語""#);
        assert_eq!(token.kind, TokenKind::DqSymbol);
        assert_eq!(token.value, Some(TokenValue::Symbol("日本語".to_string())));
    }

    #[test]
    fn line_comments_versus_trailing_comments() {
        let tokens = tokenize(Arc::new(Buffer::new(
            "test.rbs",
            "# first\nfoo # trailing\n#\n",
        )))
        .unwrap();
        assert_eq!(tokens[0].kind, TokenKind::LineComment);
        assert_eq!(tokens[0].value, Some(TokenValue::Comment("first".to_string())));
        assert_eq!(tokens[2].kind, TokenKind::Comment);
        assert_eq!(tokens[3].kind, TokenKind::LineComment);
        assert_eq!(tokens[3].value, Some(TokenValue::Comment(String::new())));
        assert_eq!(tokens[3].line, 2);
    }

    #[test]
    fn annotations() {
        let token = single("%a{This is enumerable}");
        assert_eq!(token.kind, TokenKind::Annotation);
        assert_eq!(
            token.value,
            Some(TokenValue::Annotation("This is enumerable".to_string()))
        );
        assert_eq!(
            single("%a|huga|").value,
            Some(TokenValue::Annotation("huga".to_string()))
        );
    }

    #[test]
    fn terminator_ends_input() {
        let buffer = Arc::new(Buffer::new("test.rbs", "() -> void~ Integer"));
        let tokens: Vec<_> = Lexer::new(buffer, 0)
            .with_terminator(Some(Regex::new("~").unwrap()))
            .collect::<ParseResult<_>>()
            .unwrap();
        let last = tokens.last().unwrap();
        assert!(last.is_eof());
        assert_eq!(last.range, 10..11);
    }

    #[test]
    fn terminator_is_anchored_at_token_start() {
        let buffer = Arc::new(Buffer::new("test.rbs", "String | Integer } x"));
        let lexer = Lexer::new(buffer, 0).with_terminator(Some(Regex::new(r"\}|x").unwrap()));
        assert_eq!(lexer.terminator.as_ref().unwrap().as_str(), r"^(?:\}|x)");

        let kinds: Vec<_> = lexer.map(|token| token.unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::UIdent, TokenKind::Bar, TokenKind::UIdent, TokenKind::Eof]
        );
    }

    #[test]
    fn lexical_errors() {
        let lex = |s: &str| tokenize(Arc::new(Buffer::new("test.rbs", s)));

        let error = lex("\"foo").unwrap_err();
        assert!(error.to_string().contains("unterminated string literal"));

        let error = lex(r#""\q""#).unwrap_err();
        assert!(error.to_string().contains("invalid escape sequence"));
        assert_eq!(error.location().source(), r"\q");

        let error = lex("foo ∀").unwrap_err();
        assert_eq!(error.location().source(), "∀");
        assert_eq!(error.location().start_column(), 4);
    }

    #[test]
    fn starts_at_offset() {
        let buffer = Arc::new(Buffer::new("test.rbs", "ignored: String"));
        let token = Lexer::new(buffer, 9).next_token().unwrap();
        assert_eq!(token.kind, TokenKind::UIdent);
        assert_eq!(token.range, 9..15);
    }
}
