//! Query text → [`Document`].
//!
//! Syntax is handled by `apollo-parser`; this module lowers its lossless CST
//! into the owned document model. Type-system definitions are accepted and
//! dropped since nothing can project against them.
//!
//! Fragments that spread themselves, directly or through other fragments, are
//! rejected; projection expands spreads without a depth limit.

use std::collections::{HashMap, HashSet};

use apollo_parser::cst::{self, CstNode};
use apollo_parser::Parser;
use serde_json::{Map, Number, Value};

use crate::query::document::{
    Argument, ArgumentValue, Directive, Document, Field, FragmentDefinition, FragmentSpread,
    InlineFragment, OperationDefinition, OperationKind, Selection, SelectionSet,
};

/// Errors raised while turning query text into a [`Document`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error(s): {0}")]
    Syntax(String),

    #[error("incomplete query: missing {0}")]
    Incomplete(&'static str),

    #[error("variable ${0} cannot be nested inside a literal")]
    NestedVariable(String),

    #[error("invalid number literal {0}")]
    InvalidNumber(String),

    #[error("fragment `{0}` spreads itself")]
    FragmentCycle(String),
}

/// Parse a query document.
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    let tree = Parser::new(source).parse();

    let errors = tree
        .errors()
        .map(|err| format!("{} at {}", err.message(), err.index()))
        .collect::<Vec<_>>();
    if !errors.is_empty() {
        return Err(ParseError::Syntax(errors.join(", ")));
    }

    let mut document = Document::default();
    for definition in tree.document().definitions() {
        match definition {
            cst::Definition::OperationDefinition(operation) => {
                document.operations.push(lower_operation(operation)?);
            }
            cst::Definition::FragmentDefinition(fragment) => {
                document.fragments.push(lower_fragment(fragment)?);
            }
            _ => {}
        }
    }
    check_fragment_cycles(&document)?;
    Ok(document)
}

/// Reject any fragment reachable from itself through spreads.
///
/// Fragments sharing a name are merged into one node, so a cycle through any
/// of them counts.
fn check_fragment_cycles(document: &Document) -> Result<(), ParseError> {
    let mut spreads: HashMap<&str, Vec<&str>> = HashMap::new();
    for fragment in &document.fragments {
        collect_spreads(
            &fragment.selection_set,
            spreads.entry(fragment.name.as_str()).or_default(),
        );
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for fragment in &document.fragments {
        visit_fragment(fragment.name.as_str(), &spreads, &mut path, &mut visited)?;
    }
    Ok(())
}

fn visit_fragment<'a>(
    name: &'a str,
    spreads: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    visited: &mut HashSet<&'a str>,
) -> Result<(), ParseError> {
    if path.contains(&name) {
        return Err(ParseError::FragmentCycle(name.to_string()));
    }
    if visited.contains(name) {
        return Ok(());
    }

    path.push(name);
    for &next in spreads.get(name).into_iter().flatten() {
        visit_fragment(next, spreads, path, visited)?;
    }
    path.pop();
    visited.insert(name);
    Ok(())
}

fn collect_spreads<'a>(selection_set: &'a SelectionSet, out: &mut Vec<&'a str>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(selection_set) = &field.selection_set {
                    collect_spreads(selection_set, out);
                }
            }
            Selection::FragmentSpread(spread) => out.push(&spread.fragment_name),
            Selection::InlineFragment(inline) => collect_spreads(&inline.selection_set, out),
        }
    }
}

fn lower_operation(operation: cst::OperationDefinition) -> Result<OperationDefinition, ParseError> {
    // The `{ ... }` shorthand has no operation type and is a query.
    let kind = match operation.operation_type() {
        Some(op_type) if op_type.mutation_token().is_some() => OperationKind::Mutation,
        Some(op_type) if op_type.subscription_token().is_some() => OperationKind::Subscription,
        _ => OperationKind::Query,
    };

    Ok(OperationDefinition {
        kind,
        name: operation.name().map(|name| name.text().to_string()),
        directives: lower_directives(operation.directives())?,
        selection_set: lower_selection_set(operation.selection_set())?,
    })
}

fn lower_fragment(fragment: cst::FragmentDefinition) -> Result<FragmentDefinition, ParseError> {
    let name = fragment
        .fragment_name()
        .and_then(|fragment_name| fragment_name.name())
        .map(|name| name.text().to_string())
        .ok_or(ParseError::Incomplete("fragment name"))?;

    let type_condition = fragment
        .type_condition()
        .and_then(|condition| condition.named_type())
        .and_then(|named| named.name())
        .map(|name| name.text().to_string())
        .ok_or(ParseError::Incomplete("fragment type condition"))?;

    Ok(FragmentDefinition {
        name,
        type_condition,
        directives: lower_directives(fragment.directives())?,
        selection_set: lower_selection_set(fragment.selection_set())?,
    })
}

fn lower_selection_set(selection_set: Option<cst::SelectionSet>) -> Result<SelectionSet, ParseError> {
    let selection_set = selection_set.ok_or(ParseError::Incomplete("selection set"))?;
    let selections = selection_set
        .selections()
        .map(lower_selection)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SelectionSet { selections })
}

fn lower_selection(selection: cst::Selection) -> Result<Selection, ParseError> {
    match selection {
        cst::Selection::Field(field) => {
            let name = field
                .name()
                .map(|name| name.text().to_string())
                .ok_or(ParseError::Incomplete("field name"))?;
            let selection_set = match field.selection_set() {
                Some(nested) => Some(lower_selection_set(Some(nested))?),
                None => None,
            };
            Ok(Selection::Field(Field {
                alias: field
                    .alias()
                    .and_then(|alias| alias.name())
                    .map(|name| name.text().to_string()),
                name,
                arguments: lower_arguments(field.arguments())?,
                directives: lower_directives(field.directives())?,
                selection_set,
            }))
        }
        cst::Selection::FragmentSpread(spread) => {
            let fragment_name = spread
                .fragment_name()
                .and_then(|fragment_name| fragment_name.name())
                .map(|name| name.text().to_string())
                .ok_or(ParseError::Incomplete("fragment spread name"))?;
            Ok(Selection::FragmentSpread(FragmentSpread {
                fragment_name,
                directives: lower_directives(spread.directives())?,
            }))
        }
        cst::Selection::InlineFragment(inline) => Ok(Selection::InlineFragment(InlineFragment {
            type_condition: inline
                .type_condition()
                .and_then(|condition| condition.named_type())
                .and_then(|named| named.name())
                .map(|name| name.text().to_string()),
            directives: lower_directives(inline.directives())?,
            selection_set: lower_selection_set(inline.selection_set())?,
        })),
    }
}

fn lower_directives(directives: Option<cst::Directives>) -> Result<Vec<Directive>, ParseError> {
    let Some(directives) = directives else {
        return Ok(Vec::new());
    };
    directives
        .directives()
        .map(|directive| {
            let name = directive
                .name()
                .map(|name| name.text().to_string())
                .ok_or(ParseError::Incomplete("directive name"))?;
            Ok(Directive {
                name,
                arguments: lower_arguments(directive.arguments())?,
            })
        })
        .collect()
}

fn lower_arguments(arguments: Option<cst::Arguments>) -> Result<Vec<Argument>, ParseError> {
    let Some(arguments) = arguments else {
        return Ok(Vec::new());
    };
    arguments
        .arguments()
        .map(|argument| {
            let name = argument
                .name()
                .map(|name| name.text().to_string())
                .ok_or(ParseError::Incomplete("argument name"))?;
            let value = argument
                .value()
                .ok_or(ParseError::Incomplete("argument value"))?;
            let value = match value {
                cst::Value::Variable(variable) => ArgumentValue::Variable(variable_name(&variable)),
                other => ArgumentValue::Literal(lower_literal(other)?),
            };
            Ok(Argument { name, value })
        })
        .collect()
}

fn variable_name(variable: &cst::Variable) -> String {
    variable
        .name()
        .map(|name| name.text().to_string())
        .unwrap_or_default()
}

fn lower_literal(value: cst::Value) -> Result<Value, ParseError> {
    Ok(match value {
        cst::Value::Variable(variable) => {
            return Err(ParseError::NestedVariable(variable_name(&variable)));
        }
        cst::Value::StringValue(string) => Value::String(String::from(string)),
        cst::Value::IntValue(int) => {
            let text = int.source_string();
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => float_literal(text)?,
            }
        }
        cst::Value::FloatValue(float) => float_literal(float.source_string().trim())?,
        cst::Value::BooleanValue(boolean) => Value::Bool(boolean.true_token().is_some()),
        cst::Value::NullValue(_) => Value::Null,
        cst::Value::EnumValue(enum_value) => Value::String(
            enum_value
                .name()
                .map(|name| name.text().to_string())
                .unwrap_or_default(),
        ),
        cst::Value::ListValue(list) => Value::Array(
            list.values()
                .map(lower_literal)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        cst::Value::ObjectValue(object) => {
            let mut map = Map::new();
            for field in object.object_fields() {
                let name = field
                    .name()
                    .map(|name| name.text().to_string())
                    .ok_or(ParseError::Incomplete("object field name"))?;
                let value = field
                    .value()
                    .ok_or(ParseError::Incomplete("object field value"))?;
                map.insert(name, lower_literal(value)?);
            }
            Value::Object(map)
        }
    })
}

fn float_literal(text: &str) -> Result<Value, ParseError> {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ParseError::InvalidNumber(text.to_string()))
}
