//! JSON projection.
//!
//! Walks a query [`Document`] against a JSON document and produces the
//! filtered document together with the follow-up fetches discovered on the
//! way (`@GET` directives).
//!
//! # Type discrimination
//! There is no schema. Whether a fragment or inline fragment applies to a node
//! is decided by comparing its type condition with a *discriminator*: the
//! node's own `"type"` property when it is a scalar, otherwise the name of the
//! enclosing field (the operation name at the root). This is a heuristic.
//!
//! # Failure
//! Any error aborts the whole pass; a partially filtered document is never
//! returned.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::query::document::{type_matches, Directive, Document, Field, Selection, SelectionSet};
use crate::query::template;

/// Name of the directive that triggers a follow-up fetch.
pub const GET_DIRECTIVE: &str = "GET";

/// Errors that abort a projection pass.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProjectionError {
    #[error("response is missing field `{field}`")]
    MissingField { field: String },

    #[error("unsupported JSON shape: expected object or array, found {found}")]
    UnsupportedShape { found: &'static str },

    #[error("invalid @GET directive on `{}`: {reason}", field.as_deref().unwrap_or("<root>"))]
    InvalidDirective {
        field: Option<String>,
        reason: DirectiveError,
    },
}

/// Why a `@GET` directive could not be turned into a follow-up task.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DirectiveError {
    #[error("missing `fragment` argument")]
    MissingFragmentArgument,

    #[error("no `href` property on the node and no `href` argument")]
    MissingHref,

    #[error("no applicable fragment named `{0}`")]
    UnknownFragment(String),

    #[error("argument `{0}` must be a string literal")]
    NonStringArgument(String),

    #[error("placeholder `{{{0}}}` has no scalar value on the node")]
    UnresolvedPlaceholder(String),
}

/// Entry point of a projection pass: an operation or the fragment a
/// follow-up task re-enters with.
#[derive(Debug, Clone, PartialEq)]
pub struct RootOperation {
    pub name: Option<String>,
    pub selection_set: SelectionSet,
    pub directives: Vec<Directive>,
}

/// A deferred fetch-and-reproject discovered during a pass.
#[derive(Debug, Clone)]
pub struct FollowUpTask {
    /// Selection applied to the fetched document.
    pub root_operation: RootOperation,
    /// The node that carried the link, as it was when discovered.
    pub source_snapshot: Value,
    pub document: Arc<Document>,
    /// Target URL after placeholder substitution; may be relative.
    pub url: String,
}

/// Output of one projection pass.
#[derive(Debug, Clone)]
pub struct Projection {
    pub target: Value,
    pub follow_ups: Vec<FollowUpTask>,
}

/// Project `source` through the first `query` operation of `document`.
///
/// A document without a query operation is an identity projection.
pub fn project(source: &Value, document: &Arc<Document>) -> Result<Projection, ProjectionError> {
    let Some(operation) = document.query_operation() else {
        return Ok(Projection {
            target: source.clone(),
            follow_ups: Vec::new(),
        });
    };

    let root = RootOperation {
        name: operation.name.clone(),
        selection_set: operation.selection_set.clone(),
        directives: operation.directives.clone(),
    };
    Pass::new(document).run(&root, source)
}

/// Project a fetched document with the root operation stored in `task`.
pub fn project_follow_up(source: &Value, task: &FollowUpTask) -> Result<Projection, ProjectionError> {
    Pass::new(&task.document).run(&task.root_operation, source)
}

struct Pass<'d> {
    document: &'d Arc<Document>,
    follow_ups: Vec<FollowUpTask>,
}

impl<'d> Pass<'d> {
    fn new(document: &'d Arc<Document>) -> Self {
        Self {
            document,
            follow_ups: Vec::new(),
        }
    }

    fn run(mut self, root: &RootOperation, source: &Value) -> Result<Projection, ProjectionError> {
        let parent = root.name.as_deref();
        let target = match source {
            Value::Object(object) => {
                Value::Object(self.object(&root.selection_set, parent, &root.directives, object)?)
            }
            Value::Array(items) => {
                Value::Array(self.array(&root.selection_set, parent, &root.directives, items)?)
            }
            other => return Err(unsupported(other)),
        };
        Ok(Projection {
            target,
            follow_ups: self.follow_ups,
        })
    }

    /// Apply a selection set to one object, then its `@GET` directive.
    fn object(
        &mut self,
        selection_set: &SelectionSet,
        parent: Option<&str>,
        directives: &[Directive],
        source: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProjectionError> {
        let mut fields = Vec::new();
        self.collect_fields(selection_set, parent, source, &mut fields);

        let mut target = Map::new();
        for field in fields {
            let value = self.field(field, source)?;
            target.insert(field.response_key().to_string(), value);
        }

        self.follow_link(directives, parent, source)?;
        Ok(target)
    }

    /// Apply a selection set to every element of a top-level array.
    fn array(
        &mut self,
        selection_set: &SelectionSet,
        parent: Option<&str>,
        directives: &[Directive],
        items: &[Value],
    ) -> Result<Vec<Value>, ProjectionError> {
        items
            .iter()
            .map(|item| match item {
                Value::Object(object) => self
                    .object(selection_set, parent, directives, object)
                    .map(Value::Object),
                Value::Array(nested) => self
                    .array(selection_set, parent, directives, nested)
                    .map(Value::Array),
                other => Err(unsupported(other)),
            })
            .collect()
    }

    /// Flatten fragments into the fields that apply to `source`, in order.
    fn collect_fields<'s>(
        &self,
        selection_set: &'s SelectionSet,
        parent: Option<&str>,
        source: &Map<String, Value>,
        out: &mut Vec<&'s Field>,
    ) where
        'd: 's,
    {
        let document: &'d Document = self.document;
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => out.push(field),
                Selection::FragmentSpread(spread) => {
                    let discriminator = discriminator(source, parent);
                    // No applicable fragment: the spread contributes nothing.
                    if let Some(fragment) =
                        document.applicable_fragment(&spread.fragment_name, discriminator.as_deref())
                    {
                        self.collect_fields(&fragment.selection_set, parent, source, out);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let discriminator = discriminator(source, parent);
                    if type_matches(inline.type_condition.as_deref(), discriminator.as_deref()) {
                        self.collect_fields(&inline.selection_set, parent, source, out);
                    }
                }
            }
        }
    }

    fn field(&mut self, field: &Field, source: &Map<String, Value>) -> Result<Value, ProjectionError> {
        let value = source
            .get(&field.name)
            .ok_or_else(|| ProjectionError::MissingField {
                field: field.name.clone(),
            })?;
        self.field_value(field, value)
    }

    fn field_value(&mut self, field: &Field, value: &Value) -> Result<Value, ProjectionError> {
        match value {
            Value::Object(object) => match &field.selection_set {
                Some(selection_set) => self
                    .object(selection_set, Some(&field.name), &field.directives, object)
                    .map(Value::Object),
                None => {
                    self.follow_link(&field.directives, Some(&field.name), object)?;
                    Ok(value.clone())
                }
            },
            // Arrays under a field may hold scalars; those are copied as-is.
            Value::Array(items) => items
                .iter()
                .map(|item| self.field_value(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Record a follow-up task if `directives` carries `@GET`.
    fn follow_link(
        &mut self,
        directives: &[Directive],
        parent: Option<&str>,
        source: &Map<String, Value>,
    ) -> Result<(), ProjectionError> {
        let Some(get) = directives.iter().find(|d| d.name == GET_DIRECTIVE) else {
            return Ok(());
        };
        let invalid = |reason| ProjectionError::InvalidDirective {
            field: parent.map(str::to_string),
            reason,
        };

        let fragment_name = string_argument(get, "fragment")
            .map_err(invalid)?
            .ok_or_else(|| invalid(DirectiveError::MissingFragmentArgument))?;

        let href = match source.get("href") {
            Some(Value::String(href)) => href.as_str(),
            _ => string_argument(get, "href")
                .map_err(invalid)?
                .ok_or_else(|| invalid(DirectiveError::MissingHref))?,
        };
        let url = template::expand(href, source)
            .map_err(|key| invalid(DirectiveError::UnresolvedPlaceholder(key)))?;

        let type_hint = string_argument(get, "type").map_err(invalid)?;
        let document: &'d Document = self.document;
        let fragment = document
            .applicable_fragment(fragment_name, type_hint)
            .ok_or_else(|| invalid(DirectiveError::UnknownFragment(fragment_name.to_string())))?;

        self.follow_ups.push(FollowUpTask {
            root_operation: RootOperation {
                name: Some(fragment.type_condition.clone()),
                selection_set: fragment.selection_set.clone(),
                directives: fragment.directives.clone(),
            },
            source_snapshot: Value::Object(source.clone()),
            document: Arc::clone(self.document),
            url,
        });
        Ok(())
    }
}

fn string_argument<'a>(directive: &'a Directive, name: &str) -> Result<Option<&'a str>, DirectiveError> {
    match directive.argument(name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| DirectiveError::NonStringArgument(name.to_string())),
    }
}

fn discriminator(source: &Map<String, Value>, parent: Option<&str>) -> Option<String> {
    source
        .get("type")
        .filter(|value| !value.is_null())
        .and_then(template::scalar_text)
        .or_else(|| parent.map(str::to_string))
}

fn unsupported(value: &Value) -> ProjectionError {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ProjectionError::UnsupportedShape { found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_document;
    use serde_json::json;

    fn run(source: Value, query: &str) -> Result<Projection, ProjectionError> {
        let document = Arc::new(parse_document(query).unwrap());
        project(&source, &document)
    }

    #[test]
    fn test_passthrough_without_query_operation() {
        let source = json!({ "a": [1, { "b": null }], "c": "d" });
        let projection = run(source.clone(), "mutation { a }").unwrap();
        assert_eq!(projection.target, source);
        assert!(projection.follow_ups.is_empty());

        let projection = run(source.clone(), "fragment F on T { a }").unwrap();
        assert_eq!(projection.target, source);
    }

    #[test]
    fn test_missing_field_fails_whole_pass() {
        let err = run(json!({ "name": "a" }), "{ name age }").unwrap_err();
        assert_eq!(err, ProjectionError::MissingField { field: "age".into() });

        let err = run(json!({ "outer": { "x": 1 } }), "{ outer { x y } }").unwrap_err();
        assert_eq!(err, ProjectionError::MissingField { field: "y".into() });
    }

    #[test]
    fn test_alias_rewrite() {
        let projection = run(json!({ "name": "a", "age": 1 }), "{ n: name }").unwrap();
        assert_eq!(projection.target, json!({ "n": "a" }));
    }

    #[test]
    fn test_output_follows_selection_order() {
        let projection = run(json!({ "a": 1, "b": 2, "c": 3 }), "{ c a }").unwrap();
        let keys = projection
            .target
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn test_array_mapping() {
        let projection = run(json!([{ "a": 1, "b": 2 }, { "a": 3, "b": 4 }]), "{ a }").unwrap();
        assert_eq!(projection.target, json!([{ "a": 1 }, { "a": 3 }]));
    }

    #[test]
    fn test_nested_arrays_and_objects() {
        let source = json!({
            "owner": { "name": "x", "secret": 1 },
            "pets": [{ "name": "Rex", "age": 3 }, [{ "name": "Tom", "age": 2 }]],
            "tags": ["a", "b"]
        });
        let projection = run(source, "{ owner { name } pets { name } tags }").unwrap();
        assert_eq!(
            projection.target,
            json!({
                "owner": { "name": "x" },
                "pets": [{ "name": "Rex" }, [{ "name": "Tom" }]],
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_object_without_selection_is_copied() {
        let projection = run(json!({ "meta": { "a": 1, "b": [2] } }), "{ meta }").unwrap();
        assert_eq!(projection.target, json!({ "meta": { "a": 1, "b": [2] } }));
    }

    #[test]
    fn test_unsupported_shapes() {
        let err = run(json!("text"), "{ a }").unwrap_err();
        assert_eq!(err, ProjectionError::UnsupportedShape { found: "string" });

        let err = run(json!([{ "a": 1 }, 2]), "{ a }").unwrap_err();
        assert_eq!(err, ProjectionError::UnsupportedShape { found: "number" });
    }

    #[test]
    fn test_fragment_type_matching() {
        let query = r#"
            { ...DogFields ...CatFields ... on Dog { breed } ... on Cat { lives } }
            fragment DogFields on Dog { name }
            fragment CatFields on Cat { whiskers }
        "#;
        let projection = run(json!({ "type": "Dog", "name": "Rex", "breed": "lab" }), query).unwrap();
        assert_eq!(projection.target, json!({ "name": "Rex", "breed": "lab" }));
    }

    #[test]
    fn test_discriminator_falls_back_to_field_name() {
        let query = r#"
            { owner { ...Person } }
            fragment Person on owner { name }
            fragment Person on pet { species }
        "#;
        let projection = run(json!({ "owner": { "name": "Ann", "age": 40 } }), query).unwrap();
        assert_eq!(projection.target, json!({ "owner": { "name": "Ann" } }));
    }

    #[test]
    fn test_unknown_fragment_spread_is_skipped() {
        let projection = run(json!({ "a": 1 }), "{ a ...Nowhere }").unwrap();
        assert_eq!(projection.target, json!({ "a": 1 }));
    }

    #[test]
    fn test_follow_up_discovery_order() {
        let query = r#"
            {
                author @GET(fragment: "Person") { id }
                publisher @GET(fragment: "Company", href: "/companies/{id}") { id }
            }
            fragment Person on Person { name }
            fragment Company on Company { name }
        "#;
        let source = json!({
            "author": { "id": 1, "href": "/people/{id}" },
            "publisher": { "id": 9 }
        });
        let projection = run(source, query).unwrap();
        assert_eq!(projection.target, json!({ "author": { "id": 1 }, "publisher": { "id": 9 } }));

        let urls = projection
            .follow_ups
            .iter()
            .map(|task| task.url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(urls, vec!["/people/1", "/companies/9"]);

        let first = &projection.follow_ups[0];
        assert_eq!(first.root_operation.name.as_deref(), Some("Person"));
        assert_eq!(first.source_snapshot, json!({ "id": 1, "href": "/people/{id}" }));
    }

    #[test]
    fn test_follow_up_per_array_element() {
        let query = r#"
            { books @GET(fragment: "Book", href: "/books/{isbn}") { title } }
            fragment Book on Book { pages }
        "#;
        let source = json!({ "books": [{ "title": "A", "isbn": "1" }, { "title": "B", "isbn": "2" }] });
        let projection = run(source, query).unwrap();
        let urls = projection
            .follow_ups
            .iter()
            .map(|task| task.url.clone())
            .collect::<Vec<_>>();
        assert_eq!(urls, vec!["/books/1", "/books/2"]);
    }

    #[test]
    fn test_root_operation_directive() {
        let query = r#"
            query Order @GET(fragment: "Customer", href: "/customers/{customerId}") { id }
            fragment Customer on Customer { name }
        "#;
        let projection = run(json!({ "id": 5, "customerId": 42 }), query).unwrap();
        assert_eq!(projection.follow_ups.len(), 1);
        assert_eq!(projection.follow_ups[0].url, "/customers/42");
    }

    #[test]
    fn test_type_argument_selects_fragment() {
        let query = r#"
            { link @GET(fragment: "Details", type: "Cat") { id } }
            fragment Details on Dog { bark }
            fragment Details on Cat { meow }
        "#;
        let projection = run(json!({ "link": { "id": 1, "href": "/x" } }), query).unwrap();
        let task = &projection.follow_ups[0];
        assert_eq!(task.root_operation.name.as_deref(), Some("Cat"));
    }

    #[test]
    fn test_invalid_directives() {
        let err = run(json!({ "a": { "href": "/x" } }), "{ a @GET(href: \"/y\") { href } }").unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidDirective { reason: DirectiveError::MissingFragmentArgument, .. }
        ));

        let err = run(
            json!({ "a": { "id": 1 } }),
            "{ a @GET(fragment: \"F\") { id } } fragment F on T { id }",
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProjectionError::InvalidDirective {
                field: Some("a".into()),
                reason: DirectiveError::MissingHref,
            }
        );

        let err = run(json!({ "a": { "id": 1 } }), "{ a @GET(fragment: \"Nope\", href: \"/x\") { id } }")
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidDirective { reason: DirectiveError::UnknownFragment(_), .. }
        ));

        let err = run(
            json!({ "a": { "id": 1 } }),
            "{ a @GET(fragment: \"F\", href: \"/x/{missing}\") { id } } fragment F on T { id }",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidDirective { reason: DirectiveError::UnresolvedPlaceholder(_), .. }
        ));

        let err = run(json!({ "a": { "id": 1 } }), "{ a @GET(fragment: 3, href: \"/x\") { id } }").unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidDirective { reason: DirectiveError::NonStringArgument(_), .. }
        ));
    }

    #[test]
    fn test_unknown_directives_are_ignored() {
        let projection = run(json!({ "a": { "b": 1 } }), "{ a @cached(ttl: 5) { b } }").unwrap();
        assert_eq!(projection.target, json!({ "a": { "b": 1 } }));
        assert!(projection.follow_ups.is_empty());
    }

    #[test]
    fn test_project_follow_up_reenters_with_fragment() {
        let query = r#"
            { author @GET(fragment: "Person") { id } }
            fragment Person on Person { name friend @GET(fragment: "Person") { id } }
        "#;
        let projection = run(json!({ "author": { "id": 1, "href": "/people/1" } }), query).unwrap();
        let task = &projection.follow_ups[0];

        let fetched = json!({ "name": "Ann", "age": 30, "friend": { "id": 2, "href": "/people/2" } });
        let nested = project_follow_up(&fetched, task).unwrap();
        assert_eq!(nested.target, json!({ "name": "Ann", "friend": { "id": 2 } }));
        assert_eq!(nested.follow_ups.len(), 1);
        assert_eq!(nested.follow_ups[0].url, "/people/2");
    }
}
