use serde::{Deserialize as _, Deserializer};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeclError {
    #[error("failed to parse schema YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("failed to parse schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A schema document: every declaration a codec needs, as written on disk.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<RecordDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<CustomDecl>,
}

impl SchemaFile {
    pub fn from_yaml_str(text: &str) -> Result<Self, DeclError> {
        Ok(serde_yml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DeclError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, DeclError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn record(&self, name: &str) -> Option<&RecordDecl> {
        self.records.iter().find(|r| r.name == name)
    }
}

/* A written `null` is a value, not an absent key */
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKindDecl {
    /// Keyword-constructed record with named fields.
    #[default]
    Record,
    /// Fixed-order record, encoded as a sequence.
    Positional,
    /// Structurally keyed record with required and optional keys.
    Keyed,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RecordDecl {
    pub name: String,
    #[serde(default)]
    pub kind: RecordKindDecl,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Discriminator value when the record is an arm of a tagged union.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDecl {
    pub name: String,
    /// Type expression, e.g. `list[Optional[Node]]`.
    #[serde(rename = "type")]
    pub type_expr: String,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// One of `list`, `set`, `dict`, `tuple`, `str`, `int`, `float`, `bool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_factory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipDecl>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub catch_all: bool,
    /// Only meaningful for keyed records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Per-field discriminator key for union-typed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, type_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_expr: type_expr.into(),
            default: None,
            default_factory: None,
            alias: None,
            path: None,
            skip: None,
            catch_all: false,
            required: None,
            discriminator: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SkipDecl {
    #[serde(default)]
    pub always: bool,
    #[serde(default)]
    pub if_default: bool,
    #[serde(default)]
    pub if_none: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<VariantDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct VariantDecl {
    pub name: String,
    /// Dynamic value of the variant; defaults to the variant name.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A user scalar type. Without a registered handler it converts like its
/// nearest declared base.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct CustomDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

/// Per-record codec settings as written in a schema document. Values stay
/// strings here; the codec validates them when it binds the record.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_casing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode_casing: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub decode_aliases: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub encode_aliases: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_keys: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<DiscriminatorDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit_none: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode_by_alias: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positional_as_map: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_ambiguous_unions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DiscriminatorDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_tag: Option<bool>,
}
