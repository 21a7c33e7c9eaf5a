use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result alias used across the codec crate.
pub type CodecResult<T> = Result<T, CodecError>;

/// One step from an outer value to an inner one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a failure inside the value being converted, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push_front(&mut self, segment: PathSegment) {
        self.segments.insert(0, segment);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if is_plain_key(key) => {
                    if idx > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                PathSegment::Key(key) => write!(f, "[{key:?}]")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        && !key.starts_with(|c: char| c.is_ascii_digit())
}

/// Failure kinds raised while compiling or running a codec routine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// No registry handler matches the type.
    #[error("no handler registered for type `{type_name}`")]
    UnsupportedType { type_name: String },

    /// A record or enum name is not declared in the schema.
    #[error("type `{name}` is not declared in the schema")]
    UnknownType { name: String },

    /// A record was requested from an absent or null value.
    #[error("cannot decode `{record}` from a missing value")]
    MissingData { record: String },

    /// A single field failed its conversion.
    #[error("cannot convert field `{field}` of `{record}`{}: {cause}", value_note(.value))]
    FieldConversion {
        record: String,
        field: String,
        value: Option<Value>,
        #[source]
        cause: Box<ErrorKind>,
    },

    /// Leaf mismatch; becomes a `FieldConversion` at the nearest field.
    #[error("expected {expected}, found {}", describe(.found))]
    InvalidValue { expected: String, found: Value },

    /// Required fields without a value or default, all of them.
    #[error("`{record}` is missing required field(s): {}", .fields.join(", "))]
    MissingFields { record: String, fields: Vec<String> },

    /// No union arm accepted the value.
    #[error("no arm of `{union}` matched (tried {}){}", .arms.join(", "), tag_note(.tag_key, .tag))]
    UnionMatch {
        union: String,
        arms: Vec<String>,
        tag_key: Option<String>,
        tag: Option<String>,
    },

    /// Input key that maps to no declared field, under the `raise` policy.
    #[error("unknown key `{key}` for `{record}`")]
    UnknownKey { record: String, key: String },

    /// A configuration value is invalid for the record it is bound to.
    #[error("invalid configuration for `{record}`: {reason}")]
    InvalidConfiguration { record: String, reason: String },

    /// A record declaration breaks a structural rule.
    #[error("invalid declaration of `{record}`: {reason}")]
    InvalidSchema { record: String, reason: String },

    /// Two routines with one name in a single synthesis session.
    #[error("routine `{name}` is already defined in this synthesis session")]
    DuplicateRoutineName { name: String },

    /// Unbalanced blocks or a routine without output.
    #[error("malformed routine `{routine}`: {reason}")]
    MalformedRoutine { routine: String, reason: String },

    /// A routine reference was called before, or never, bound.
    #[error("routine `{name}` is not linked")]
    UnlinkedRoutine { name: String },

    /// Failure raised by a user-registered handler.
    #[error("{message}")]
    Custom { message: String },
}

fn value_note(value: &Option<Value>) -> String {
    match value {
        Some(v) => format!(" from {}", describe(v)),
        None => String::new(),
    }
}

fn tag_note(key: &Option<String>, tag: &Option<String>) -> String {
    match (key, tag) {
        (Some(key), Some(tag)) => format!("; discriminator `{key}` = `{tag}` names no arm"),
        (Some(key), None) => format!("; discriminator `{key}` was absent"),
        _ => String::new(),
    }
}

const PREVIEW_LIMIT: usize = 64;

/// Short rendering of a dynamic value for messages.
pub fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => return "null".to_string(),
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    let mut text = value.to_string();
    if text.len() > PREVIEW_LIMIT {
        let mut cut = PREVIEW_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push('…');
    }
    format!("{kind} `{text}`")
}

/// Structured codec failure: what went wrong and where.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecError {
    kind: Box<ErrorKind>,
    path: FieldPath,
}

impl CodecError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            path: FieldPath::new(),
        }
    }

    pub fn invalid(expected: impl Into<String>, found: &Value) -> Self {
        Self::new(ErrorKind::InvalidValue {
            expected: expected.into(),
            found: found.clone(),
        })
    }

    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedType {
            type_name: type_name.into(),
        })
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Custom {
            message: message.into(),
        })
    }

    pub fn invalid_config(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration {
            record: record.into(),
            reason: reason.into(),
        })
    }

    pub fn invalid_schema(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSchema {
            record: record.into(),
            reason: reason.into(),
        })
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// True for failures that have not yet been attributed to a field.
    pub fn is_leaf(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::InvalidValue { .. } | ErrorKind::Custom { .. }
        )
    }

    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.push_front(PathSegment::Key(key.into()));
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.path.push_front(PathSegment::Index(index));
        self
    }

    /// Attributes the failure to `record.field`: leaf failures become a
    /// `FieldConversion`, anything already structured keeps its kind, and
    /// the field name is prepended to the path either way.
    pub fn in_field(mut self, record: &str, field: &str) -> Self {
        if self.is_leaf() {
            let cause = std::mem::replace(
                &mut *self.kind,
                ErrorKind::Custom {
                    message: String::new(),
                },
            );
            let value = match &cause {
                ErrorKind::InvalidValue { found, .. } => Some(found.clone()),
                _ => None,
            };
            *self.kind = ErrorKind::FieldConversion {
                record: record.to_string(),
                field: field.to_string(),
                value,
                cause: Box::new(cause),
            };
        }
        self.at_key(field)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "at `{}`: {}", self.path, self.kind)
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

impl From<ErrorKind> for CodecError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths_render_outer_to_inner() {
        let err = CodecError::invalid("int", &json!("x"))
            .at_index(2)
            .in_field("Scroll", "deltas")
            .at_key("kind")
            .in_field("Event", "kind");
        assert_eq!(err.path().to_string(), "kind.kind.deltas[2]");
        match err.kind() {
            ErrorKind::FieldConversion { record, field, value, .. } => {
                assert_eq!(record, "Scroll");
                assert_eq!(field, "deltas");
                assert_eq!(value, &Some(json!("x")));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn structured_kinds_survive_field_context() {
        let err = CodecError::new(ErrorKind::MissingFields {
            record: "Point".into(),
            fields: vec!["x".into(), "y".into()],
        })
        .in_field("Line", "start");
        assert!(matches!(err.kind(), ErrorKind::MissingFields { .. }));
        assert_eq!(
            err.to_string(),
            "at `start`: `Point` is missing required field(s): x, y"
        );
    }

    #[test]
    fn odd_keys_are_bracketed() {
        let err = CodecError::invalid("int", &json!(null))
            .at_key("a b")
            .in_field("R", "tags");
        assert_eq!(err.path().to_string(), "tags[\"a b\"]");
    }

    #[test]
    fn long_values_are_truncated() {
        let long = json!("x".repeat(200));
        assert!(describe(&long).len() < 100);
    }
}
