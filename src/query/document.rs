//! Query document model.
//!
//! An owned, schema-less representation of a GraphQL-style document. Only the
//! executable parts are kept: operations and fragment definitions. Selections
//! are an explicit tagged union so traversal is an exhaustive `match`.

use serde_json::Value;

/// Kind of an operation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// A parsed query document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: Vec<FragmentDefinition>,
}

impl Document {
    /// First operation of kind `query`, in document order.
    pub fn query_operation(&self) -> Option<&OperationDefinition> {
        self.operations
            .iter()
            .find(|op| op.kind == OperationKind::Query)
    }

    /// First fragment named `name` whose type condition matches `discriminator`.
    ///
    /// A missing discriminator matches every type condition.
    pub fn applicable_fragment(
        &self,
        name: &str,
        discriminator: Option<&str>,
    ) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|fragment| {
            fragment.name == name && type_matches(Some(&fragment.type_condition), discriminator)
        })
    }
}

/// Heuristic type check used in place of schema-based type resolution.
///
/// There is no schema at runtime. A type condition applies when no
/// discriminator is known, when the selection declares no condition, or when
/// both names are equal.
pub fn type_matches(type_condition: Option<&str>, discriminator: Option<&str>) -> bool {
    match (type_condition, discriminator) {
        (Some(condition), Some(required)) => condition == required,
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

/// Ordered selections. Order drives output field order and follow-up order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    /// Key under which the field appears in the output: alias, else name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments
            .iter()
            .find(|argument| argument.name == name)
            .map(|argument| &argument.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgumentValue,
}

/// Argument value as written in the query text.
///
/// Variables are kept by name; nothing binds them at projection time.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Literal(Value),
    Variable(String),
}

impl ArgumentValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgumentValue::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(name: &str, on: &str) -> FragmentDefinition {
        FragmentDefinition {
            name: name.into(),
            type_condition: on.into(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    #[test]
    fn test_type_matches() {
        assert!(type_matches(Some("Dog"), Some("Dog")));
        assert!(!type_matches(Some("Cat"), Some("Dog")));
        assert!(type_matches(Some("Cat"), None));
        assert!(type_matches(None, Some("Dog")));
    }

    #[test]
    fn test_applicable_fragment_picks_matching_type() {
        let document = Document {
            operations: Vec::new(),
            fragments: vec![fragment("Details", "Cat"), fragment("Details", "Dog")],
        };

        let found = document.applicable_fragment("Details", Some("Dog")).unwrap();
        assert_eq!(found.type_condition, "Dog");

        let first = document.applicable_fragment("Details", None).unwrap();
        assert_eq!(first.type_condition, "Cat");

        assert!(document.applicable_fragment("Details", Some("Bird")).is_none());
        assert!(document.applicable_fragment("Other", None).is_none());
    }
}
