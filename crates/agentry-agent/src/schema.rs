//! Output schema translation.
//!
//! An agent definition may declare the shape of the answer it expects from the
//! model as a small JSON-Schema dialect (`object`, `string`, `number`,
//! `integer`, `boolean`, `array`, each with an optional `description`).  This
//! module turns that description into a [`Validator`] in two steps:
//!
//! 1. [`OutputShape::parse`] reads the raw description into a tagged tree and
//!    rejects structurally malformed input with a [`SchemaError`].
//! 2. [`Validator::compile`] walks the tree and builds the runtime checker.
//!    Compilation is pure and cannot fail.
//!
//! Missing or unrecognised `type` tags compile to a validator that accepts
//! anything.
//!
//! ## Requiredness
//!
//! A field listed in `required` must be present and non-null.  Every other
//! declared field may be absent or `null`; when it carries a value that value
//! must match the field's shape.  Fields that are not declared are accepted
//! untouched.

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A structural problem in an output schema description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A schema node was not a mapping.
    #[error("schema node at `{path}` must be a mapping")]
    NotAMapping { path: String },

    /// The `type` field was neither a string nor a list of strings.
    #[error("`type` at `{path}` must be a string")]
    InvalidType { path: String },

    /// The `properties` field of an object node was not a mapping.
    #[error("`properties` at `{path}` must be a mapping")]
    InvalidProperties { path: String },

    /// The `required` field of an object node was not a list of strings.
    #[error("`required` at `{path}` must be a list of field names")]
    InvalidRequired { path: String },

    /// `required` names a field that is not declared in `properties`.
    #[error("`required` at `{path}` names undeclared field `{field}`")]
    UnknownRequired { path: String, field: String },

    /// The `description` field was not a string.
    #[error("`description` at `{path}` must be a string")]
    InvalidDescription { path: String },

    /// The `items` field of an array node was not a mapping.
    #[error("`items` at `{path}` must be a mapping")]
    InvalidItems { path: String },
}

/// A value that does not match a compiled [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is absent or `null`.
    #[error("missing required field at `{path}`")]
    MissingField { path: String },

    /// A value has the wrong JSON kind.
    #[error("expected {expected} at `{path}`, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Parsed shape
// ---------------------------------------------------------------------------

/// The tagged form of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    /// A mapping with declared fields, sorted by field name.
    Object {
        fields: Vec<(String, OutputShape)>,
        required: BTreeSet<String>,
    },
    String,
    Number,
    /// A number without a fractional part.
    Integer,
    Boolean,
    Array {
        items: Box<OutputShape>,
    },
    /// Accepts any value.  Used when `type` is absent or unrecognised.
    Any,
}

/// A parsed output schema node together with its description.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputShape {
    pub kind: ShapeKind,
    pub description: Option<String>,
}

impl OutputShape {
    /// A shape that accepts anything and has no description.
    pub fn any() -> Self {
        Self {
            kind: ShapeKind::Any,
            description: None,
        }
    }

    /// Parse a schema description.  `None` and `null` yield [`OutputShape::any`].
    pub fn parse(value: Option<&Value>) -> Result<Self, SchemaError> {
        match value {
            None | Some(Value::Null) => Ok(Self::any()),
            Some(v) => parse_node(v, "$"),
        }
    }
}

fn parse_node(value: &Value, path: &str) -> Result<OutputShape, SchemaError> {
    let node = value.as_object().ok_or_else(|| SchemaError::NotAMapping {
        path: path.to_owned(),
    })?;

    let description = match node.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(SchemaError::InvalidDescription {
                path: path.to_owned(),
            });
        }
    };

    let kind = match node.get("type") {
        None | Some(Value::Null) => ShapeKind::Any,
        Some(Value::String(tag)) => match tag.as_str() {
            "object" => parse_object(node, path)?,
            "array" => parse_array(node, path)?,
            "string" => ShapeKind::String,
            "number" => ShapeKind::Number,
            "integer" => ShapeKind::Integer,
            "boolean" => ShapeKind::Boolean,
            other => {
                tracing::debug!(path, tag = other, "unrecognised schema type, accepting any value");
                ShapeKind::Any
            }
        },
        // Union types (`["string", "null"]`) are outside the dialect.
        Some(Value::Array(tags)) if tags.iter().all(Value::is_string) => {
            tracing::debug!(path, "union schema type, accepting any value");
            ShapeKind::Any
        }
        Some(_) => {
            return Err(SchemaError::InvalidType {
                path: path.to_owned(),
            });
        }
    };

    Ok(OutputShape { kind, description })
}

fn parse_object(node: &Map<String, Value>, path: &str) -> Result<ShapeKind, SchemaError> {
    let mut fields = Vec::new();
    match node.get("properties") {
        None | Some(Value::Null) => {}
        Some(Value::Object(props)) => {
            for (name, child) in props {
                let child_path = format!("{path}.{name}");
                fields.push((name.clone(), parse_node(child, &child_path)?));
            }
        }
        Some(_) => {
            return Err(SchemaError::InvalidProperties {
                path: path.to_owned(),
            });
        }
    }

    let mut required = BTreeSet::new();
    match node.get("required") {
        None | Some(Value::Null) => {}
        Some(Value::Array(names)) => {
            for name in names {
                let name = name.as_str().ok_or_else(|| SchemaError::InvalidRequired {
                    path: path.to_owned(),
                })?;
                if !fields.iter().any(|(declared, _)| declared == name) {
                    return Err(SchemaError::UnknownRequired {
                        path: path.to_owned(),
                        field: name.to_owned(),
                    });
                }
                required.insert(name.to_owned());
            }
        }
        Some(_) => {
            return Err(SchemaError::InvalidRequired {
                path: path.to_owned(),
            });
        }
    }

    Ok(ShapeKind::Object { fields, required })
}

fn parse_array(node: &Map<String, Value>, path: &str) -> Result<ShapeKind, SchemaError> {
    let items = match node.get("items") {
        None | Some(Value::Null) => OutputShape::any(),
        Some(v @ Value::Object(_)) => parse_node(v, &format!("{path}[]"))?,
        Some(_) => {
            return Err(SchemaError::InvalidItems {
                path: path.to_owned(),
            });
        }
    };
    Ok(ShapeKind::Array {
        items: Box::new(items),
    })
}

// ---------------------------------------------------------------------------
// Compiled validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Check {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<Validator>),
    Object(Vec<Field>),
}

/// A declared object field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub required: bool,
    pub validator: Validator,
}

/// Runtime checker compiled from an [`OutputShape`].
#[derive(Debug, Clone)]
pub struct Validator {
    check: Check,
    description: Option<String>,
}

impl Validator {
    /// A validator that accepts any value.
    pub fn any() -> Self {
        Self {
            check: Check::Any,
            description: None,
        }
    }

    /// Compile a parsed shape.
    pub fn compile(shape: &OutputShape) -> Self {
        let check = match &shape.kind {
            ShapeKind::Any => Check::Any,
            ShapeKind::String => Check::String,
            ShapeKind::Number => Check::Number,
            ShapeKind::Integer => Check::Integer,
            ShapeKind::Boolean => Check::Boolean,
            ShapeKind::Array { items } => Check::Array(Box::new(Self::compile(items))),
            ShapeKind::Object { fields, required } => Check::Object(
                fields
                    .iter()
                    .map(|(name, child)| Field {
                        name: name.clone(),
                        required: required.contains(name),
                        validator: Self::compile(child),
                    })
                    .collect(),
            ),
        };
        Self {
            check,
            description: shape.description.clone(),
        }
    }

    /// The description attached to this node, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The name of the kind this node checks (`"object"`, `"any"`, ...).
    pub fn kind_name(&self) -> &'static str {
        match self.check {
            Check::Any => "any",
            Check::String => "string",
            Check::Number => "number",
            Check::Integer => "integer",
            Check::Boolean => "boolean",
            Check::Array(_) => "array",
            Check::Object(_) => "object",
        }
    }

    /// Declared fields of an object node.  Empty for every other kind.
    pub fn fields(&self) -> &[Field] {
        match &self.check {
            Check::Object(fields) => fields,
            _ => &[],
        }
    }

    /// Look up a declared field of an object node.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Element validator of an array node.
    pub fn items(&self) -> Option<&Validator> {
        match &self.check {
            Check::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Check a value, reporting the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), ValidationError> {
        let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
            path: path.to_owned(),
            expected,
            found: json_kind(value),
        };

        match &self.check {
            Check::Any => Ok(()),
            Check::String if value.is_string() => Ok(()),
            Check::Number if value.is_number() => Ok(()),
            Check::Integer if is_integral(value) => Ok(()),
            Check::Boolean if value.is_boolean() => Ok(()),
            Check::Array(items) => {
                let elements = value.as_array().ok_or_else(|| mismatch("array"))?;
                for (i, element) in elements.iter().enumerate() {
                    items.validate_at(element, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            Check::Object(fields) => {
                let object = value.as_object().ok_or_else(|| mismatch("object"))?;
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match object.get(&field.name) {
                        None | Some(Value::Null) if field.required => {
                            return Err(ValidationError::MissingField { path: field_path });
                        }
                        None | Some(Value::Null) => {}
                        Some(v) => field.validator.validate_at(v, &field_path)?,
                    }
                }
                Ok(())
            }
            _ => Err(mismatch(self.kind_name())),
        }
    }

    /// Render the validator back into the JSON-Schema dialect it was compiled
    /// from, descriptions included.  Used to tell providers what to produce.
    pub fn to_json_schema(&self) -> Value {
        let mut node = match &self.check {
            Check::Any => json!({}),
            Check::String => json!({ "type": "string" }),
            Check::Number => json!({ "type": "number" }),
            Check::Integer => json!({ "type": "integer" }),
            Check::Boolean => json!({ "type": "boolean" }),
            Check::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            Check::Object(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.name.clone(), f.validator.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| f.required)
                    .map(|f| f.name.as_str())
                    .collect();
                json!({ "type": "object", "properties": properties, "required": required })
            }
        };
        if let Some(description) = &self.description {
            node["description"] = json!(description);
        }
        node
    }
}

/// Parse and compile a schema description in one step.
pub fn compile_schema(value: Option<&Value>) -> Result<Validator, SchemaError> {
    OutputShape::parse(value).map(|shape| Validator::compile(&shape))
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(schema: Value) -> Validator {
        compile_schema(Some(&schema)).unwrap()
    }

    // -- Parsing -------------------------------------------------------------

    #[test]
    fn absent_and_null_schema_parse_to_any() {
        assert_eq!(OutputShape::parse(None).unwrap(), OutputShape::any());
        assert_eq!(
            OutputShape::parse(Some(&Value::Null)).unwrap(),
            OutputShape::any()
        );
    }

    #[test]
    fn missing_type_parses_to_any_and_keeps_description() {
        let shape = OutputShape::parse(Some(&json!({"description": "free form"}))).unwrap();
        assert_eq!(shape.kind, ShapeKind::Any);
        assert_eq!(shape.description.as_deref(), Some("free form"));
    }

    #[test]
    fn unknown_type_parses_to_any() {
        let shape = OutputShape::parse(Some(&json!({"type": "date-time"}))).unwrap();
        assert_eq!(shape.kind, ShapeKind::Any);

        let union = OutputShape::parse(Some(&json!({"type": ["string", "null"]}))).unwrap();
        assert_eq!(union.kind, ShapeKind::Any);
    }

    #[test]
    fn unknown_type_ignores_malformed_siblings() {
        let shape = OutputShape::parse(Some(&json!({"type": "tuple", "properties": 3}))).unwrap();
        assert_eq!(shape.kind, ShapeKind::Any);
    }

    #[test]
    fn object_fields_keep_requiredness() {
        let shape = OutputShape::parse(Some(&json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title"]
        })))
        .unwrap();

        match shape.kind {
            ShapeKind::Object { fields, required } => {
                assert_eq!(fields.len(), 2);
                assert!(required.contains("title"));
                assert!(!required.contains("tags"));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn malformed_descriptions_are_rejected() {
        let cases = [
            (json!("string"), SchemaError::NotAMapping { path: "$".into() }),
            (json!({"type": 7}), SchemaError::InvalidType { path: "$".into() }),
            (
                json!({"type": "object", "properties": []}),
                SchemaError::InvalidProperties { path: "$".into() },
            ),
            (
                json!({"type": "object", "properties": {}, "required": "a"}),
                SchemaError::InvalidRequired { path: "$".into() },
            ),
            (
                json!({"type": "object", "properties": {"a": {"type": "string"}}, "required": ["b"]}),
                SchemaError::UnknownRequired {
                    path: "$".into(),
                    field: "b".into(),
                },
            ),
            (
                json!({"type": "string", "description": 1}),
                SchemaError::InvalidDescription { path: "$".into() },
            ),
            (
                json!({"type": "array", "items": "string"}),
                SchemaError::InvalidItems { path: "$".into() },
            ),
        ];

        for (schema, expected) in cases {
            assert_eq!(OutputShape::parse(Some(&schema)).unwrap_err(), expected);
        }
    }

    #[test]
    fn nested_errors_report_the_path() {
        let err = OutputShape::parse(Some(&json!({
            "type": "object",
            "properties": {"inner": {"type": "object", "properties": 1}}
        })))
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidProperties {
                path: "$.inner".into()
            }
        );
    }

    // -- Validation ----------------------------------------------------------

    #[test]
    fn any_accepts_everything() {
        let v = compile_schema(None).unwrap();
        for value in [json!(null), json!(1), json!("x"), json!([1, "a"]), json!({"k": true})] {
            assert!(v.validate(&value).is_ok());
        }

        let unknown = compile(json!({"type": "mystery"}));
        assert!(unknown.validate(&json!({"anything": [1, 2]})).is_ok());
    }

    #[test]
    fn primitives_check_their_kind() {
        assert!(compile(json!({"type": "string"})).validate(&json!("hi")).is_ok());
        assert!(compile(json!({"type": "number"})).validate(&json!(1.5)).is_ok());
        assert!(compile(json!({"type": "boolean"})).validate(&json!(false)).is_ok());

        let err = compile(json!({"type": "number"}))
            .validate(&json!("1.5"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                path: "$".into(),
                expected: "number",
                found: "string",
            }
        );
    }

    #[test]
    fn integer_rejects_fractions() {
        let v = compile(json!({"type": "integer"}));
        assert!(v.validate(&json!(3)).is_ok());
        assert!(v.validate(&json!(3.0)).is_ok());
        assert!(v.validate(&json!(3.5)).is_err());
    }

    #[test]
    fn required_field_must_be_present_and_non_null() {
        let v = compile(json!({
            "type": "object",
            "properties": {"count": {"type": "number"}},
            "required": ["count"]
        }));

        assert!(v.validate(&json!({"count": 3})).is_ok());
        assert_eq!(
            v.validate(&json!({})).unwrap_err(),
            ValidationError::MissingField {
                path: "$.count".into()
            }
        );
        assert!(v.validate(&json!({"count": null})).is_err());
    }

    #[test]
    fn optional_field_may_be_absent_or_null_but_not_mistyped() {
        let v = compile(json!({
            "type": "object",
            "properties": {"note": {"type": "string"}}
        }));

        assert!(v.validate(&json!({})).is_ok());
        assert!(v.validate(&json!({"note": null})).is_ok());
        assert!(v.validate(&json!({"note": 4})).is_err());
    }

    #[test]
    fn undeclared_fields_are_accepted() {
        let v = compile(json!({"type": "object", "properties": {}}));
        assert!(v.validate(&json!({"extra": 1})).is_ok());
        assert!(v.validate(&json!([1])).is_err());
    }

    #[test]
    fn array_elements_are_checked_with_index_in_path() {
        let v = compile(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }
        }));

        assert!(v.validate(&json!([{"name": "a"}, {"name": "b"}])).is_ok());
        assert_eq!(
            v.validate(&json!([{"name": "a"}, {}])).unwrap_err(),
            ValidationError::MissingField {
                path: "$[1].name".into()
            }
        );
    }

    #[test]
    fn array_without_items_accepts_mixed_elements() {
        let v = compile(json!({"type": "array"}));
        assert!(v.validate(&json!([1, "two", null])).is_ok());
        assert_eq!(v.items().map(Validator::kind_name), Some("any"));
    }

    // -- Introspection -------------------------------------------------------

    #[test]
    fn descriptions_survive_compilation() {
        let v = compile(json!({
            "type": "object",
            "description": "summary result",
            "properties": {
                "summary": {"type": "string", "description": "one paragraph"},
                "points": {
                    "type": "array",
                    "description": "key points",
                    "items": {"type": "string", "description": "a point"}
                }
            },
            "required": ["summary"]
        }));

        assert_eq!(v.description(), Some("summary result"));
        let summary = v.field("summary").unwrap();
        assert!(summary.required);
        assert_eq!(summary.validator.description(), Some("one paragraph"));

        let points = &v.field("points").unwrap().validator;
        assert_eq!(points.description(), Some("key points"));
        assert_eq!(points.items().unwrap().description(), Some("a point"));
    }

    #[test]
    fn json_schema_rendering_reflects_the_shape() {
        let v = compile(json!({
            "type": "object",
            "properties": {"count": {"type": "number", "description": "how many"}},
            "required": ["count"]
        }));

        let schema = v.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["count"]["type"], "number");
        assert_eq!(schema["properties"]["count"]["description"], "how many");
        assert_eq!(schema["required"], json!(["count"]));
    }

    #[test]
    fn object_fields_are_sorted_by_name() {
        let v = compile(json!({
            "type": "object",
            "properties": {
                "zeta": {"type": "string"},
                "alpha": {"type": "number"},
                "mid": {"type": "boolean"}
            }
        }));
        let names: Vec<&str> = v.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
