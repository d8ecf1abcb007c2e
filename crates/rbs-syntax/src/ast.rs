//! Typed AST nodes for signature files.
//!
//! Nodes carry a [`NodeLocation`] that points back into the parsed
//! [`Buffer`](crate::Buffer). Node equality is structural: the location slot
//! never takes part in `==`, so a tree parsed from formatted output compares
//! equal to the tree it was formatted from.
//!
//! `Display` impls render canonical surface syntax, with the parentheses
//! needed for the text to parse back into the same tree.

use std::fmt;

use facet::Facet;
use indexmap::IndexMap;

use crate::location::{Location, NodeLocation};

// ============================================================================
// Names
// ============================================================================

/// A `::`-separated module path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Facet)]
pub struct Namespace {
    /// Path segments, outermost first.
    pub path: Vec<String>,
    /// Whether the path starts with `::`.
    pub absolute: bool,
}

impl Namespace {
    /// The relative, empty namespace.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            path: Vec::new(),
            absolute: false,
        }
    }

    /// The root namespace, `::`.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            path: Vec::new(),
            absolute: true,
        }
    }

    /// Whether this namespace is relative and has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && !self.absolute
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("::")?;
        }
        for segment in &self.path {
            write!(f, "{segment}::")?;
        }
        Ok(())
    }
}

/// What a type name refers to, decided by its spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum NameKind {
    /// `Foo`: a class or module.
    Class,
    /// `_Foo`: an interface.
    Interface,
    /// `foo`: a type alias.
    Alias,
}

/// A possibly-qualified type name: `::Foo::Bar`, `_Each`, `json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct TypeName {
    /// The namespace prefix.
    pub namespace: Namespace,
    /// The last segment.
    pub name: String,
}

impl TypeName {
    /// Create a type name.
    #[must_use]
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// A name without a namespace.
    #[must_use]
    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(Namespace::empty(), name)
    }

    /// The kind of entity this name refers to.
    #[must_use]
    pub fn kind(&self) -> NameKind {
        let mut chars = self.name.chars();
        match chars.next() {
            Some('_') if chars.next().is_some_and(|c| c.is_ascii_uppercase()) => {
                NameKind::Interface
            }
            Some(c) if c.is_ascii_uppercase() => NameKind::Class,
            _ => NameKind::Alias,
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.namespace, self.name)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Built-in types spelled by a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum BaseType {
    /// `bool`
    Bool,
    /// `void`
    Void,
    /// `untyped`
    Untyped,
    /// `nil`
    Nil,
    /// `top`
    Top,
    /// `bot`
    Bottom,
    /// `self`
    SelfType,
    /// `instance`
    Instance,
    /// `class`
    Class,
}

impl BaseType {
    /// The keyword spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Void => "void",
            Self::Untyped => "untyped",
            Self::Nil => "nil",
            Self::Top => "top",
            Self::Bottom => "bot",
            Self::SelfType => "self",
            Self::Instance => "instance",
            Self::Class => "class",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal value, used as a literal type and as a record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
#[repr(C)]
pub enum Literal {
    /// `123`, `-1`
    Integer(i64),
    /// `"foo"`, `'foo'`
    String(String),
    /// `:foo`, `:"foo bar"`
    Symbol(String),
    /// `true`, `false`
    Bool(bool),
}

impl Literal {
    /// Create a symbol literal.
    #[must_use]
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// The symbol name, when this is a symbol that can be written as a
    /// `name: T` record key.
    #[must_use]
    pub fn record_key_name(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) if is_plain_identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => write_quoted(f, value),
            Self::Symbol(name) => {
                f.write_str(":")?;
                if is_bare_symbol(name) {
                    f.write_str(name)
                } else {
                    write_quoted(f, name)
                }
            }
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Write `value` as a double-quoted string with escapes.
fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\u{7}' => f.write_str("\\a")?,
            '\u{8}' => f.write_str("\\b")?,
            '\u{b}' => f.write_str("\\v")?,
            '\u{c}' => f.write_str("\\f")?,
            '\u{1b}' => f.write_str("\\e")?,
            c if c.is_control() => write!(f, "\\u{{{:x}}}", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Operators that may follow `:` in a bare symbol or name a method.
pub(crate) const OPERATOR_NAMES: &[&str] = &[
    "==", "===", "=~", "!", "!=", "!~", "<", "<=", "<=>", "<<", ">", ">=", ">>", "+", "-",
    "*", "**", "/", "%", "~", "`", "^", "&", "|", "+@", "-@", "[]", "[]=",
];

/// Whether `:name` lexes back as the same symbol.
fn is_bare_symbol(name: &str) -> bool {
    if OPERATOR_NAMES.contains(&name) {
        return true;
    }
    if let Some(rest) = name.strip_prefix("@@").or_else(|| name.strip_prefix(['@', '$'])) {
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    }
    let base = name.strip_suffix(['?', '!', '=']).unwrap_or(name);
    is_plain_identifier(base)
}

/// A type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A keyword type such as `untyped` or `self`.
    Base {
        /// Which base type.
        kind: BaseType,
        /// Source location.
        location: NodeLocation,
    },
    /// A type variable bound by an enclosing declaration or method type.
    Variable {
        /// Variable name.
        name: String,
        /// Source location.
        location: NodeLocation,
    },
    /// `singleton(Foo)`
    ClassSingleton {
        /// The class name.
        name: TypeName,
        /// Source location.
        location: NodeLocation,
    },
    /// `Foo`, `Array[String]`
    ClassInstance {
        /// The class name.
        name: TypeName,
        /// Type arguments.
        args: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `_Each[String]`
    Interface {
        /// The interface name.
        name: TypeName,
        /// Type arguments.
        args: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `json`, `list[Integer]`
    Alias {
        /// The alias name.
        name: TypeName,
        /// Type arguments.
        args: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `[A, B]`
    Tuple {
        /// Element types.
        types: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `{ id: Integer, "name" => String }`
    Record {
        /// Fields in source order.
        fields: IndexMap<Literal, Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `T?`
    Optional {
        /// The wrapped type.
        inner: Box<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `A | B | C`
    Union {
        /// Members, at least two.
        types: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `A & B & C`
    Intersection {
        /// Members, at least two.
        types: Vec<Type>,
        /// Source location.
        location: NodeLocation,
    },
    /// `^(Integer) -> String`
    Proc {
        /// Parameters and return type.
        function: Box<Function>,
        /// The block the proc takes, if any.
        block: Option<Box<Block>>,
        /// Source location.
        location: NodeLocation,
    },
    /// `1`, `"foo"`, `:bar`, `true`
    Literal {
        /// The literal value.
        literal: Literal,
        /// Source location.
        location: NodeLocation,
    },
}

/// Contexts a type can be rendered in, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Top,
    UnionMember,
    IntersectionMember,
    /// Return types of procs, blocks and method types.
    Return,
    OptionalInner,
}

impl Type {
    /// A base type without a location.
    #[must_use]
    pub fn base(kind: BaseType) -> Self {
        Self::Base {
            kind,
            location: NodeLocation::none(),
        }
    }

    /// A type variable without a location.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            location: NodeLocation::none(),
        }
    }

    /// A class instance type without a location.
    #[must_use]
    pub fn class_instance(name: TypeName, args: Vec<Self>) -> Self {
        Self::ClassInstance {
            name,
            args,
            location: NodeLocation::none(),
        }
    }

    /// A literal type without a location.
    #[must_use]
    pub fn literal(literal: Literal) -> Self {
        Self::Literal {
            literal,
            location: NodeLocation::none(),
        }
    }

    /// Wrap `inner` in an optional type.
    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional {
            inner: Box::new(inner),
            location: NodeLocation::none(),
        }
    }

    /// A union type without a location.
    #[must_use]
    pub fn union(types: Vec<Self>) -> Self {
        Self::Union {
            types,
            location: NodeLocation::none(),
        }
    }

    /// An intersection type without a location.
    #[must_use]
    pub fn intersection(types: Vec<Self>) -> Self {
        Self::Intersection {
            types,
            location: NodeLocation::none(),
        }
    }

    /// A tuple type without a location.
    #[must_use]
    pub fn tuple(types: Vec<Self>) -> Self {
        Self::Tuple {
            types,
            location: NodeLocation::none(),
        }
    }

    /// The source location, if the type came from the parser.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        match self {
            Self::Base { location, .. }
            | Self::Variable { location, .. }
            | Self::ClassSingleton { location, .. }
            | Self::ClassInstance { location, .. }
            | Self::Interface { location, .. }
            | Self::Alias { location, .. }
            | Self::Tuple { location, .. }
            | Self::Record { location, .. }
            | Self::Optional { location, .. }
            | Self::Union { location, .. }
            | Self::Intersection { location, .. }
            | Self::Proc { location, .. }
            | Self::Literal { location, .. } => location.get(),
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, prec: Prec) -> fmt::Result {
        let parens = match self {
            Self::Union { .. } => prec >= Prec::UnionMember,
            Self::Intersection { .. } => prec >= Prec::IntersectionMember,
            Self::Optional { .. } | Self::Proc { .. } => prec >= Prec::OptionalInner,
            // `:foo?` would lex as the symbol `foo?`.
            Self::Literal {
                literal: Literal::Symbol(_),
                ..
            } => prec >= Prec::OptionalInner,
            _ => false,
        };
        if parens {
            f.write_str("(")?;
        }

        match self {
            Self::Base { kind, .. } => write!(f, "{kind}")?,
            Self::Variable { name, .. } => f.write_str(name)?,
            Self::ClassSingleton { name, .. } => write!(f, "singleton({name})")?,
            Self::ClassInstance { name, args, .. }
            | Self::Interface { name, args, .. }
            | Self::Alias { name, args, .. } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    f.write_str("[")?;
                    write_list(f, args, ", ")?;
                    f.write_str("]")?;
                }
            }
            Self::Tuple { types, .. } => {
                if types.is_empty() {
                    f.write_str("[ ]")?;
                } else {
                    f.write_str("[")?;
                    write_list(f, types, ", ")?;
                    f.write_str("]")?;
                }
            }
            Self::Record { fields, .. } => {
                if fields.is_empty() {
                    f.write_str("{ }")?;
                } else {
                    f.write_str("{ ")?;
                    for (i, (key, ty)) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        match key.record_key_name() {
                            Some(name) => write!(f, "{name}: {ty}")?,
                            None => write!(f, "{key} => {ty}")?,
                        }
                    }
                    f.write_str(" }")?;
                }
            }
            Self::Optional { inner, .. } => {
                inner.fmt_prec(f, Prec::OptionalInner)?;
                f.write_str("?")?;
            }
            Self::Union { types, .. } => write_members(f, types, " | ", Prec::UnionMember)?,
            Self::Intersection { types, .. } => {
                write_members(f, types, " & ", Prec::IntersectionMember)?;
            }
            Self::Proc {
                function, block, ..
            } => {
                f.write_str("^")?;
                function.fmt_params(f)?;
                if let Some(block) = block {
                    write!(f, " {block}")?;
                }
                f.write_str(" -> ")?;
                function.return_type.fmt_prec(f, Prec::Return)?;
            }
            Self::Literal { literal, .. } => write!(f, "{literal}")?,
        }

        if parens {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, Prec::Top)
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_members(f: &mut fmt::Formatter<'_>, types: &[Type], sep: &str, prec: Prec) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        ty.fmt_prec(f, prec)?;
    }
    Ok(())
}

// ============================================================================
// Functions and method types
// ============================================================================

/// A function parameter: a type and an optional name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter type.
    pub ty: Type,
    /// Parameter name.
    pub name: Option<String>,
    /// Source location, with `type` and `name` children.
    pub location: NodeLocation,
}

impl Param {
    /// An unnamed parameter without a location.
    #[must_use]
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            name: None,
            location: NodeLocation::none(),
        }
    }

    /// Attach a name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if let Some(name) = &self.name {
            if is_plain_identifier(name) {
                write!(f, " {name}")?;
            } else {
                write!(f, " `{name}`")?;
            }
        }
        Ok(())
    }
}

/// A parameter list with its return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// `(A, B)`
    pub required_positionals: Vec<Param>,
    /// `(?A, ?B)`
    pub optional_positionals: Vec<Param>,
    /// `(*A)`
    pub rest_positionals: Option<Param>,
    /// Required positionals after the rest parameter.
    pub trailing_positionals: Vec<Param>,
    /// `(name: A)`
    pub required_keywords: IndexMap<String, Param>,
    /// `(?name: A)`
    pub optional_keywords: IndexMap<String, Param>,
    /// `(**A)`
    pub rest_keywords: Option<Param>,
    /// The return type.
    pub return_type: Type,
}

impl Function {
    /// A function without parameters.
    #[must_use]
    pub fn returning(return_type: Type) -> Self {
        Self {
            required_positionals: Vec::new(),
            optional_positionals: Vec::new(),
            rest_positionals: None,
            trailing_positionals: Vec::new(),
            required_keywords: IndexMap::new(),
            optional_keywords: IndexMap::new(),
            rest_keywords: None,
            return_type,
        }
    }

    /// Whether the function takes any parameter.
    #[must_use]
    pub fn has_params(&self) -> bool {
        !self.required_positionals.is_empty()
            || !self.optional_positionals.is_empty()
            || self.rest_positionals.is_some()
            || !self.trailing_positionals.is_empty()
            || !self.required_keywords.is_empty()
            || !self.optional_keywords.is_empty()
            || self.rest_keywords.is_some()
    }

    /// Every parameter, in source order.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.required_positionals
            .iter()
            .chain(&self.optional_positionals)
            .chain(&self.rest_positionals)
            .chain(&self.trailing_positionals)
            .chain(self.required_keywords.values())
            .chain(self.optional_keywords.values())
            .chain(&self.rest_keywords)
    }

    /// Write the parenthesized parameter list.
    fn fmt_params(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        parts.extend(self.required_positionals.iter().map(ToString::to_string));
        parts.extend(self.optional_positionals.iter().map(|p| format!("?{p}")));
        if let Some(rest) = &self.rest_positionals {
            parts.push(format!("*{rest}"));
        }
        parts.extend(self.trailing_positionals.iter().map(ToString::to_string));
        parts.extend(
            self.required_keywords
                .iter()
                .map(|(name, p)| format!("{name}: {p}")),
        );
        parts.extend(
            self.optional_keywords
                .iter()
                .map(|(name, p)| format!("?{name}: {p}")),
        );
        if let Some(rest) = &self.rest_keywords {
            parts.push(format!("**{rest}"));
        }
        write!(f, "({})", parts.join(", "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_params(f)?;
        f.write_str(" -> ")?;
        self.return_type.fmt_prec(f, Prec::Return)
    }
}

/// A block parameter: `{ (A) -> B }`, or `?{ ... }` when optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The block's parameters and return type.
    pub function: Function,
    /// Whether a block must be given.
    pub required: bool,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.required {
            f.write_str("?")?;
        }
        write!(f, "{{ {} }}", self.function)
    }
}

/// Variance of a type parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Variance {
    /// No marker.
    #[default]
    Invariant,
    /// `out`
    Covariant,
    /// `in`
    Contravariant,
}

/// A declared type parameter: `unchecked out Elem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParam {
    /// Parameter name.
    pub name: String,
    /// Declared variance.
    pub variance: Variance,
    /// Whether variance checking is skipped.
    pub unchecked: bool,
    /// Source location, with `name`, `variance` and `unchecked` children.
    pub location: NodeLocation,
}

impl TypeParam {
    /// An invariant, checked parameter without a location.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variance: Variance::Invariant,
            unchecked: false,
            location: NodeLocation::none(),
        }
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unchecked {
            f.write_str("unchecked ")?;
        }
        match self.variance {
            Variance::Invariant => {}
            Variance::Covariant => f.write_str("out ")?,
            Variance::Contravariant => f.write_str("in ")?,
        }
        f.write_str(&self.name)
    }
}

/// Render `[A, out B]`, or nothing for an empty list.
pub(crate) fn fmt_type_params(params: &[TypeParam]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let names: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}

/// A method signature: `[T] (T) { (T) -> void } -> T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodType {
    /// Method-level type parameters.
    pub type_params: Vec<TypeParam>,
    /// Parameters and return type.
    pub function: Function,
    /// The block, if the method takes one.
    pub block: Option<Block>,
    /// Source location, with `type_params` and `type` children.
    pub location: NodeLocation,
}

impl MethodType {
    /// A method type without type parameters or block.
    #[must_use]
    pub fn new(function: Function) -> Self {
        Self {
            type_params: Vec::new(),
            function,
            block: None,
            location: NodeLocation::none(),
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            write!(f, "{} ", fmt_type_params(&self.type_params))?;
        }
        self.function.fmt_params(f)?;
        if let Some(block) = &self.block {
            write!(f, " {block}")?;
        }
        f.write_str(" -> ")?;
        self.function.return_type.fmt_prec(f, Prec::Return)
    }
}

// ============================================================================
// Comments and annotations
// ============================================================================

/// A block of `#` lines attached to the declaration or member below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Line texts with the `#` and one following space removed.
    pub lines: Vec<String>,
    /// Span from the first `#` to the end of the last line.
    pub location: NodeLocation,
}

impl Comment {
    /// A comment without a location.
    #[must_use]
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            location: NodeLocation::none(),
        }
    }

    /// The comment text, lines joined with newlines.
    #[must_use]
    pub fn string(&self) -> String {
        self.lines.join("\n")
    }
}

/// A `%a{...}` annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Text between the delimiters.
    pub string: String,
    /// Source location.
    pub location: NodeLocation,
}

impl Annotation {
    /// An annotation without a location.
    #[must_use]
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            string: string.into(),
            location: NodeLocation::none(),
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// `class Foo[T] < Bar[T] ... end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    /// Class name.
    pub name: TypeName,
    /// Type parameters.
    pub type_params: Vec<TypeParam>,
    /// The superclass, if written.
    pub super_class: Option<Parent>,
    /// Body members.
    pub members: Vec<Member>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// A name with type arguments: a superclass or a module self type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    /// The referenced name.
    pub name: TypeName,
    /// Type arguments.
    pub args: Vec<Type>,
    /// Source location, with `name` and `args` children.
    pub location: NodeLocation,
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            f.write_str("[")?;
            write_list(f, &self.args, ", ")?;
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// `module Foo[T] : _Each[T] ... end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDecl {
    /// Module name.
    pub name: TypeName,
    /// Type parameters.
    pub type_params: Vec<TypeParam>,
    /// Self-type constraints after `:`.
    pub self_types: Vec<Parent>,
    /// Body members.
    pub members: Vec<Member>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `interface _Foo[T] ... end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    /// Interface name.
    pub name: TypeName,
    /// Type parameters.
    pub type_params: Vec<TypeParam>,
    /// Body members: method definitions and aliases.
    pub members: Vec<Member>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `type foo[T] = T | Array[T]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAliasDecl {
    /// Alias name.
    pub name: TypeName,
    /// Type parameters.
    pub type_params: Vec<TypeParam>,
    /// The aliased type.
    pub ty: Type,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `Foo::VERSION: String`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDecl {
    /// Constant name.
    pub name: TypeName,
    /// Constant type.
    pub ty: Type,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `$stdout: IO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDecl {
    /// Variable name, including `$`.
    pub name: String,
    /// Variable type.
    pub ty: Type,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// A top-level or nested declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// A class.
    Class(ClassDecl),
    /// A module.
    Module(ModuleDecl),
    /// An interface.
    Interface(InterfaceDecl),
    /// A type alias.
    TypeAlias(TypeAliasDecl),
    /// A constant.
    Constant(ConstantDecl),
    /// A global variable.
    Global(GlobalDecl),
}

impl Declaration {
    /// The source location.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        match self {
            Self::Class(d) => d.location.get(),
            Self::Module(d) => d.location.get(),
            Self::Interface(d) => d.location.get(),
            Self::TypeAlias(d) => d.location.get(),
            Self::Constant(d) => d.location.get(),
            Self::Global(d) => d.location.get(),
        }
    }

    /// The attached comment.
    #[must_use]
    pub const fn comment(&self) -> Option<&Comment> {
        match self {
            Self::Class(d) => d.comment.as_ref(),
            Self::Module(d) => d.comment.as_ref(),
            Self::Interface(d) => d.comment.as_ref(),
            Self::TypeAlias(d) => d.comment.as_ref(),
            Self::Constant(d) => d.comment.as_ref(),
            Self::Global(d) => d.comment.as_ref(),
        }
    }

    /// Leading annotations.
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        match self {
            Self::Class(d) => &d.annotations,
            Self::Module(d) => &d.annotations,
            Self::Interface(d) => &d.annotations,
            Self::TypeAlias(d) => &d.annotations,
            Self::Constant(d) => &d.annotations,
            Self::Global(d) => &d.annotations,
        }
    }

    /// The declared name, as written.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Class(d) => d.name.to_string(),
            Self::Module(d) => d.name.to_string(),
            Self::Interface(d) => d.name.to_string(),
            Self::TypeAlias(d) => d.name.to_string(),
            Self::Constant(d) => d.name.to_string(),
            Self::Global(d) => d.name.clone(),
        }
    }
}

// ============================================================================
// Members
// ============================================================================

/// Receiver of a method definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum MethodKind {
    /// `def foo`
    Instance,
    /// `def self.foo`
    Singleton,
    /// `def self?.foo`: both a singleton and a private instance method.
    SingletonInstance,
}

impl MethodKind {
    /// The prefix written before the method name.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Instance => "",
            Self::Singleton => "self.",
            Self::SingletonInstance => "self?.",
        }
    }
}

/// Receiver of an attribute or alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum MemberKind {
    /// Instance-level.
    Instance,
    /// `self.`
    Singleton,
}

impl MemberKind {
    /// The prefix written before the name.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Instance => "",
            Self::Singleton => "self.",
        }
    }
}

/// `public` or `private`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Visibility {
    /// `public`
    Public,
    /// `private`
    Private,
}

impl Visibility {
    /// The keyword spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// `def foo: () -> void | (Integer) -> void`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Method name.
    pub name: String,
    /// Receiver.
    pub kind: MethodKind,
    /// Overloads, in source order.
    pub overloads: Vec<MethodType>,
    /// Whether the definition ends with `| ...`, extending an earlier one.
    pub overload: bool,
    /// Visibility written on the same line, as in `private def foo`.
    pub visibility: Option<Visibility>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// Backing instance variable of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrIvar {
    /// `attr_reader foo: T`, backed by `@foo`.
    Default,
    /// `attr_reader foo(): T`, no backing variable.
    None,
    /// `attr_reader foo(@bar): T`
    Named(String),
}

/// `attr_reader name: String`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Receiver.
    pub kind: MemberKind,
    /// Attribute type.
    pub ty: Type,
    /// Backing variable.
    pub ivar: AttrIvar,
    /// Visibility written on the same line.
    pub visibility: Option<Visibility>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `include Enumerable[T]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mixin {
    /// The mixed-in module or interface.
    pub name: TypeName,
    /// Type arguments.
    pub args: Vec<Type>,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `@name: String`, `@@count: Integer`, `self.@cache: Hash`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Variable name with its sigil.
    pub name: String,
    /// Variable type.
    pub ty: Type,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// `alias new_name old_name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodAlias {
    /// The new name.
    pub new_name: String,
    /// The aliased name.
    pub old_name: String,
    /// Receiver of both names.
    pub kind: MemberKind,
    /// Leading annotations.
    pub annotations: Vec<Annotation>,
    /// Attached comment.
    pub comment: Option<Comment>,
    /// Source location.
    pub location: NodeLocation,
}

/// A member of a class, module or interface body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// `def`
    MethodDefinition(MethodDefinition),
    /// `attr_reader`
    AttrReader(Attribute),
    /// `attr_writer`
    AttrWriter(Attribute),
    /// `attr_accessor`
    AttrAccessor(Attribute),
    /// `include`
    Include(Mixin),
    /// `extend`
    Extend(Mixin),
    /// `prepend`
    Prepend(Mixin),
    /// `@name: T`
    InstanceVariable(Variable),
    /// `@@name: T`
    ClassVariable(Variable),
    /// `self.@name: T`
    ClassInstanceVariable(Variable),
    /// `alias`
    Alias(MethodAlias),
    /// `public`
    Public(NodeLocation),
    /// `private`
    Private(NodeLocation),
    /// A nested declaration.
    Declaration(Declaration),
}

impl Member {
    /// The source location.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        match self {
            Self::MethodDefinition(m) => m.location.get(),
            Self::AttrReader(m) | Self::AttrWriter(m) | Self::AttrAccessor(m) => m.location.get(),
            Self::Include(m) | Self::Extend(m) | Self::Prepend(m) => m.location.get(),
            Self::InstanceVariable(m) | Self::ClassVariable(m) | Self::ClassInstanceVariable(m) => {
                m.location.get()
            }
            Self::Alias(m) => m.location.get(),
            Self::Public(location) | Self::Private(location) => location.get(),
            Self::Declaration(d) => d.location(),
        }
    }

    /// The attached comment.
    #[must_use]
    pub const fn comment(&self) -> Option<&Comment> {
        match self {
            Self::MethodDefinition(m) => m.comment.as_ref(),
            Self::AttrReader(m) | Self::AttrWriter(m) | Self::AttrAccessor(m) => m.comment.as_ref(),
            Self::Include(m) | Self::Extend(m) | Self::Prepend(m) => m.comment.as_ref(),
            Self::InstanceVariable(m) | Self::ClassVariable(m) | Self::ClassInstanceVariable(m) => {
                m.comment.as_ref()
            }
            Self::Alias(m) => m.comment.as_ref(),
            Self::Public(_) | Self::Private(_) => None,
            Self::Declaration(d) => d.comment(),
        }
    }
}

/// Whether `name` can follow `def` without backquotes.
#[must_use]
pub fn is_plain_method_name(name: &str) -> bool {
    if OPERATOR_NAMES.contains(&name) {
        return true;
    }
    if matches!(name, "self?" | "self") {
        return true;
    }
    let base = name.strip_suffix(['?', '!', '=']).unwrap_or(name);
    is_plain_identifier(base)
}
