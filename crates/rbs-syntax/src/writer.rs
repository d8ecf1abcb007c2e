//! Canonical text rendering for signature declarations.
//!
//! Parsing the output yields a tree equal to the one written, and writing
//! that tree again reproduces the output byte for byte.

use std::io;

use crate::ast::*;
use crate::location::Location;

/// Configuration for the writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Indentation string per nesting level (default: two spaces).
    pub indent: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
        }
    }
}

/// Format declarations to a string.
pub fn format(declarations: &[Declaration], config: &WriterConfig) -> String {
    let mut formatter = Formatter::new(config);
    formatter.format_declarations(declarations);
    formatter.output
}

/// Writes declarations to an [`io::Write`] sink.
pub struct Writer<W: io::Write> {
    out: W,
    config: WriterConfig,
}

impl<W: io::Write> Writer<W> {
    /// A writer with the default configuration.
    pub fn new(out: W) -> Self {
        Self::with_config(out, WriterConfig::default())
    }

    /// A writer with an explicit configuration.
    pub const fn with_config(out: W, config: WriterConfig) -> Self {
        Self { out, config }
    }

    /// Write `declarations` in canonical form.
    pub fn write(&mut self, declarations: &[Declaration]) -> io::Result<()> {
        let text = format(declarations, &self.config);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    /// Give back the sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Something written on its own lines, with blank lines kept between.
trait Statement {
    fn location(&self) -> Option<&Location>;
    fn comment(&self) -> Option<&Comment>;

    /// First line of the statement, counting its comment.
    fn start_line(&self) -> Option<usize> {
        match self.comment().and_then(|c| c.location.get()) {
            Some(location) => Some(location.start_line()),
            None => self.location().map(Location::start_line),
        }
    }
}

impl Statement for Declaration {
    fn location(&self) -> Option<&Location> {
        Self::location(self)
    }

    fn comment(&self) -> Option<&Comment> {
        Self::comment(self)
    }
}

impl Statement for Member {
    fn location(&self) -> Option<&Location> {
        Self::location(self)
    }

    fn comment(&self) -> Option<&Comment> {
        Self::comment(self)
    }
}

/// Whether a blank line separates `next` from `prev`.
fn blank_between(prev: &impl Statement, next: &impl Statement) -> bool {
    match (prev.location(), next.start_line()) {
        (Some(prev), Some(start)) => start > prev.end_line() + 1,
        _ => true,
    }
}

/// Wrap annotation text in the first delimiter pair it does not close.
fn annotation_text(annotation: &Annotation) -> String {
    const DELIMITERS: [(char, char); 5] = [('{', '}'), ('(', ')'), ('[', ']'), ('<', '>'), ('|', '|')];
    let (open, close) = DELIMITERS
        .into_iter()
        .find(|(_, close)| !annotation.string.contains(*close))
        .unwrap_or(DELIMITERS[0]);
    format!("%a{open}{}{close}", annotation.string)
}

fn method_name(name: &str) -> String {
    if is_plain_method_name(name) {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

/// Panic on trees the parser can never produce.
fn check_type(ty: &Type) {
    match ty {
        Type::Union { types, .. } => {
            assert!(types.len() >= 2, "union type needs at least two members");
            types.iter().for_each(check_type);
        }
        Type::Intersection { types, .. } => {
            assert!(types.len() >= 2, "intersection type needs at least two members");
            types.iter().for_each(check_type);
        }
        Type::ClassInstance { args, .. } | Type::Interface { args, .. } | Type::Alias { args, .. } => {
            args.iter().for_each(check_type);
        }
        Type::Tuple { types, .. } => types.iter().for_each(check_type),
        Type::Record { fields, .. } => fields.values().for_each(check_type),
        Type::Optional { inner, .. } => check_type(inner),
        Type::Proc {
            function, block, ..
        } => {
            check_function(function);
            if let Some(block) = block {
                check_function(&block.function);
            }
        }
        Type::Base { .. }
        | Type::Variable { .. }
        | Type::ClassSingleton { .. }
        | Type::Literal { .. } => {}
    }
}

fn check_function(function: &Function) {
    function.params().for_each(|p| check_type(&p.ty));
    check_type(&function.return_type);
}

fn check_method_type(method_type: &MethodType) {
    check_function(&method_type.function);
    if let Some(block) = &method_type.block {
        check_function(&block.function);
    }
}

/// The internal writer state.
struct Formatter<'a> {
    config: &'a WriterConfig,
    output: String,
    depth: usize,
}

impl<'a> Formatter<'a> {
    const fn new(config: &'a WriterConfig) -> Self {
        Self {
            config,
            output: String::new(),
            depth: 0,
        }
    }

    fn writeln(&mut self, s: &str) {
        for _ in 0..self.depth {
            self.output.push_str(&self.config.indent);
        }
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn blank_line(&mut self) {
        self.output.push('\n');
    }

    fn format_declarations(&mut self, declarations: &[Declaration]) {
        for (i, decl) in declarations.iter().enumerate() {
            if i > 0 && blank_between(&declarations[i - 1], decl) {
                self.blank_line();
            }
            self.format_declaration(decl);
        }
    }

    fn format_members(&mut self, members: &[Member]) {
        self.depth += 1;
        for (i, member) in members.iter().enumerate() {
            if i > 0 && blank_between(&members[i - 1], member) {
                self.blank_line();
            }
            self.format_member(member);
        }
        self.depth -= 1;
    }

    fn format_comment(&mut self, comment: Option<&Comment>) {
        let Some(comment) = comment else {
            return;
        };
        for line in &comment.lines {
            if line.is_empty() {
                self.writeln("#");
            } else {
                self.writeln(&format!("# {line}"));
            }
        }
    }

    fn format_annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            self.writeln(&annotation_text(annotation));
        }
    }

    fn format_declaration(&mut self, decl: &Declaration) {
        self.format_comment(decl.comment());
        self.format_annotations(decl.annotations());

        match decl {
            Declaration::Class(class) => {
                let mut header = format!(
                    "class {}{}",
                    class.name,
                    fmt_type_params(&class.type_params)
                );
                if let Some(super_class) = &class.super_class {
                    super_class.args.iter().for_each(check_type);
                    header.push_str(&format!(" < {super_class}"));
                }
                self.writeln(&header);
                self.format_members(&class.members);
                self.writeln("end");
            }
            Declaration::Module(module) => {
                let mut header = format!(
                    "module {}{}",
                    module.name,
                    fmt_type_params(&module.type_params)
                );
                if !module.self_types.is_empty() {
                    let self_types: Vec<String> =
                        module.self_types.iter().map(ToString::to_string).collect();
                    header.push_str(&format!(" : {}", self_types.join(", ")));
                }
                self.writeln(&header);
                self.format_members(&module.members);
                self.writeln("end");
            }
            Declaration::Interface(interface) => {
                self.writeln(&format!(
                    "interface {}{}",
                    interface.name,
                    fmt_type_params(&interface.type_params)
                ));
                self.format_members(&interface.members);
                self.writeln("end");
            }
            Declaration::TypeAlias(alias) => {
                check_type(&alias.ty);
                self.writeln(&format!(
                    "type {}{} = {}",
                    alias.name,
                    fmt_type_params(&alias.type_params),
                    alias.ty
                ));
            }
            Declaration::Constant(constant) => {
                check_type(&constant.ty);
                self.writeln(&format!("{}: {}", constant.name, constant.ty));
            }
            Declaration::Global(global) => {
                check_type(&global.ty);
                self.writeln(&format!("{}: {}", global.name, global.ty));
            }
        }
    }

    fn format_member(&mut self, member: &Member) {
        match member {
            Member::MethodDefinition(def) => self.format_method_definition(def),
            Member::AttrReader(attr) => self.format_attribute("attr_reader", attr),
            Member::AttrWriter(attr) => self.format_attribute("attr_writer", attr),
            Member::AttrAccessor(attr) => self.format_attribute("attr_accessor", attr),
            Member::Include(mixin) => self.format_mixin("include", mixin),
            Member::Extend(mixin) => self.format_mixin("extend", mixin),
            Member::Prepend(mixin) => self.format_mixin("prepend", mixin),
            Member::InstanceVariable(var) | Member::ClassVariable(var) => {
                self.format_variable("", var);
            }
            Member::ClassInstanceVariable(var) => self.format_variable("self.", var),
            Member::Alias(alias) => {
                self.format_comment(alias.comment.as_ref());
                self.format_annotations(&alias.annotations);
                let prefix = alias.kind.prefix();
                self.writeln(&format!(
                    "alias {prefix}{} {prefix}{}",
                    method_name(&alias.new_name),
                    method_name(&alias.old_name)
                ));
            }
            Member::Public(_) => self.writeln("public"),
            Member::Private(_) => self.writeln("private"),
            Member::Declaration(decl) => self.format_declaration(decl),
        }
    }

    fn format_method_definition(&mut self, def: &MethodDefinition) {
        self.format_comment(def.comment.as_ref());
        self.format_annotations(&def.annotations);

        let visibility = def
            .visibility
            .map(|v| format!("{} ", v.as_str()))
            .unwrap_or_default();
        let prefix = format!(
            "{visibility}def {}{}:",
            def.kind.prefix(),
            method_name(&def.name)
        );
        // `|` goes under the `:`.
        let padding = " ".repeat(prefix.chars().count() - 1);

        let mut lines = Vec::new();
        for (i, overload) in def.overloads.iter().enumerate() {
            check_method_type(overload);
            if i == 0 {
                lines.push(format!("{prefix} {overload}"));
            } else {
                lines.push(format!("{padding}| {overload}"));
            }
        }
        if def.overload {
            if lines.is_empty() {
                lines.push(format!("{prefix} ..."));
            } else {
                lines.push(format!("{padding}| ..."));
            }
        }
        for line in &lines {
            self.writeln(line);
        }
    }

    fn format_attribute(&mut self, keyword: &str, attr: &Attribute) {
        self.format_comment(attr.comment.as_ref());
        self.format_annotations(&attr.annotations);
        check_type(&attr.ty);

        let visibility = attr
            .visibility
            .map(|v| format!("{} ", v.as_str()))
            .unwrap_or_default();
        let ivar = match &attr.ivar {
            AttrIvar::Default => String::new(),
            AttrIvar::None => "()".to_string(),
            AttrIvar::Named(name) => format!("({name})"),
        };
        self.writeln(&format!(
            "{visibility}{keyword} {}{}{ivar}: {}",
            attr.kind.prefix(),
            attr.name,
            attr.ty
        ));
    }

    fn format_mixin(&mut self, keyword: &str, mixin: &Mixin) {
        self.format_comment(mixin.comment.as_ref());
        self.format_annotations(&mixin.annotations);
        mixin.args.iter().for_each(check_type);

        let mut line = format!("{keyword} {}", mixin.name);
        if !mixin.args.is_empty() {
            let args: Vec<String> = mixin.args.iter().map(ToString::to_string).collect();
            line.push_str(&format!("[{}]", args.join(", ")));
        }
        self.writeln(&line);
    }

    fn format_variable(&mut self, prefix: &str, var: &Variable) {
        self.format_comment(var.comment.as_ref());
        check_type(&var.ty);
        self.writeln(&format!("{prefix}{}: {}", var.name, var.ty));
    }
}
