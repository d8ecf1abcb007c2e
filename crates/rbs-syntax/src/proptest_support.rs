//! Property-based testing support with arbitrary generators.
//!
//! Strategies build location-free AST nodes; the properties render them,
//! re-parse the text and compare trees. Procs may take blocks, record keys
//! may be any literal, and method types bind their own type variables.

use indexmap::IndexMap;
use proptest::prelude::*;

use crate::ast::*;
use crate::NodeLocation;

/// A class name such as `Foo` or `Foo::Bar`.
///
/// The second character is lowercase so names never collide with the
/// all-caps type parameters of [`arb_method_type`].
fn class_name_strategy() -> impl Strategy<Value = TypeName> {
    (
        proptest::collection::vec("[A-Z][a-z]{0,6}", 0..3),
        any::<bool>(),
        "[A-Z][a-z][a-zA-Z0-9]{0,7}",
    )
        .prop_map(|(path, absolute, name)| TypeName::new(Namespace { path, absolute }, name))
}

fn interface_name_strategy() -> impl Strategy<Value = TypeName> {
    "_[A-Z][a-zA-Z]{0,8}".prop_map(TypeName::simple)
}

fn alias_name_strategy() -> impl Strategy<Value = TypeName> {
    "[a-z][a-z_]{0,8}"
        .prop_filter("keywords are not alias names", |s| {
            crate::lexer::keyword(s).is_none()
        })
        .prop_map(TypeName::simple)
}

/// Parameter and record-key names that are not keywords.
fn lower_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_filter("keywords are reserved", |s| {
        crate::lexer::keyword(s).is_none()
    })
}

fn base_strategy() -> impl Strategy<Value = BaseType> {
    prop_oneof![
        Just(BaseType::Bool),
        Just(BaseType::Void),
        Just(BaseType::Untyped),
        Just(BaseType::Nil),
        Just(BaseType::Top),
        Just(BaseType::Bottom),
        Just(BaseType::SelfType),
        Just(BaseType::Instance),
        Just(BaseType::Class),
    ]
}

/// Generate an arbitrary literal.
pub fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        any::<i32>().prop_map(|n| Literal::Integer(i64::from(n))),
        "[a-zA-Z0-9 '\"\\\\]{0,8}".prop_map(Literal::String),
        "[a-z][a-z_]{0,6}[?!]?".prop_map(Literal::Symbol),
        Just(Literal::symbol("+")),
        Just(Literal::symbol("[]=")),
        any::<bool>().prop_map(Literal::Bool),
    ]
}

/// Leaves, plus references to the bound type variables `vars`.
fn leaf_type(vars: Vec<String>) -> BoxedStrategy<Type> {
    let leaves = prop_oneof![
        base_strategy().prop_map(Type::base),
        arb_literal().prop_map(Type::literal),
        class_name_strategy().prop_map(|name| Type::class_instance(name, vec![])),
        class_name_strategy().prop_map(|name| Type::ClassSingleton {
            name,
            location: NodeLocation::none(),
        }),
        interface_name_strategy().prop_map(|name| Type::Interface {
            name,
            args: vec![],
            location: NodeLocation::none(),
        }),
        alias_name_strategy().prop_map(|name| Type::Alias {
            name,
            args: vec![],
            location: NodeLocation::none(),
        }),
    ];
    if vars.is_empty() {
        leaves.boxed()
    } else {
        prop_oneof![
            3 => leaves,
            1 => proptest::sample::select(vars).prop_map(Type::variable),
        ]
        .boxed()
    }
}

/// A record key: a bare label or any literal written with `=>`.
fn record_key_strategy() -> impl Strategy<Value = Literal> {
    prop_oneof![
        lower_name_strategy().prop_map(Literal::Symbol),
        arb_literal(),
    ]
}

fn arb_param(ty: impl Strategy<Value = Type>) -> impl Strategy<Value = Param> {
    (ty, proptest::option::of(lower_name_strategy())).prop_map(|(ty, name)| {
        let param = Param::new(ty);
        match name {
            Some(name) => param.named(name),
            None => param,
        }
    })
}

fn arb_function(ty: BoxedStrategy<Type>) -> impl Strategy<Value = Function> {
    (
        proptest::collection::vec(arb_param(ty.clone()), 0..3),
        proptest::collection::vec(arb_param(ty.clone()), 0..2),
        proptest::option::of(arb_param(ty.clone())),
        proptest::collection::vec(arb_param(ty.clone()), 0..2),
        proptest::collection::vec((lower_name_strategy(), arb_param(ty.clone()), any::<bool>()), 0..3),
        ty,
    )
        .prop_map(|(required, optional, rest, trailing, keywords, return_type)| {
            let mut function = Function::returning(return_type);
            function.required_positionals = required;
            function.optional_positionals = optional;
            // Trailing positionals only exist after a rest parameter.
            if rest.is_some() {
                function.trailing_positionals = trailing;
            }
            function.rest_positionals = rest;
            for (name, param, required) in keywords {
                if function.required_keywords.contains_key(&name)
                    || function.optional_keywords.contains_key(&name)
                {
                    continue;
                }
                if required {
                    function.required_keywords.insert(name, param);
                } else {
                    function.optional_keywords.insert(name, param);
                }
            }
            function
        })
}

/// A block clause, `{ ... }` or `?{ ... }`.
fn arb_block(ty: BoxedStrategy<Type>) -> impl Strategy<Value = Block> {
    (arb_function(ty), any::<bool>()).prop_map(|(function, required)| Block { function, required })
}

/// Types whose bare names in `vars` are bound type variables.
fn arb_type_in(vars: Vec<String>) -> BoxedStrategy<Type> {
    leaf_type(vars)
        .prop_recursive(4, 32, 4, |inner| {
            let boxed = inner.clone().boxed();
            prop_oneof![
                inner.clone().prop_map(Type::optional),
                proptest::collection::vec(inner.clone(), 2..4).prop_map(Type::union),
                proptest::collection::vec(inner.clone(), 2..4).prop_map(Type::intersection),
                proptest::collection::vec(inner.clone(), 0..3).prop_map(Type::tuple),
                (class_name_strategy(), proptest::collection::vec(inner.clone(), 1..3))
                    .prop_map(|(name, args)| Type::class_instance(name, args)),
                proptest::collection::vec((record_key_strategy(), inner.clone()), 0..3).prop_map(
                    |fields| Type::Record {
                        fields: fields.into_iter().collect::<IndexMap<_, _>>(),
                        location: NodeLocation::none(),
                    }
                ),
                (
                    arb_function(boxed.clone()),
                    proptest::option::of(arb_block(boxed)),
                )
                    .prop_map(|(function, block)| Type::Proc {
                        function: Box::new(function),
                        block: block.map(Box::new),
                        location: NodeLocation::none(),
                    }),
            ]
        })
        .boxed()
}

/// Generate an arbitrary type, nesting composites a few levels deep.
pub fn arb_type() -> impl Strategy<Value = Type> {
    arb_type_in(Vec::new())
}

/// Generate an arbitrary method type whose parameters and return type may
/// refer to its own type parameters.
pub fn arb_method_type() -> impl Strategy<Value = MethodType> {
    proptest::collection::vec("[A-Z][A-Z0-9]{0,2}", 0..3)
        .prop_map(|names| {
            let mut unique: Vec<String> = Vec::new();
            for name in names {
                if !unique.contains(&name) {
                    unique.push(name);
                }
            }
            unique
        })
        .prop_flat_map(|names| {
            let ty = arb_type_in(names.clone());
            (
                Just(names),
                arb_function(ty.clone()),
                proptest::option::of(arb_block(ty)),
            )
        })
        .prop_map(|(names, function, block)| MethodType {
            type_params: names.into_iter().map(TypeParam::new).collect(),
            function,
            block,
            location: NodeLocation::none(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_method_type, parse_type};

    proptest! {
        /// Rendered types parse back to the same tree.
        #[test]
        fn type_round_trip(ty in arb_type()) {
            let text = ty.to_string();
            let parsed = parse_type(&text);
            prop_assert!(parsed.is_ok(), "Failed to parse:\n{}\nError: {:?}", text, parsed.err());
            prop_assert_eq!(parsed.unwrap(), ty);
        }

        /// Rendering a re-parsed type gives the same text.
        #[test]
        fn type_rendering_idempotent(ty in arb_type()) {
            let text = ty.to_string();
            if let Ok(parsed) = parse_type(&text) {
                prop_assert_eq!(parsed.to_string(), text, "Rendering not idempotent");
            }
        }

        /// Rendered method types parse back to the same tree, with type
        /// parameters binding the variables that use them.
        #[test]
        fn method_type_round_trip(method_type in arb_method_type()) {
            let text = method_type.to_string();
            let parsed = parse_method_type(&text);
            prop_assert!(parsed.is_ok(), "Failed to parse:\n{}\nError: {:?}", text, parsed.err());
            let parsed = parsed.unwrap();
            prop_assert_eq!(parsed.to_string(), text);
            prop_assert_eq!(parsed, method_type);
        }
    }
}
