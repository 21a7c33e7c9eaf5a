//! Record, enum and custom-type declarations the compiler works from.

use crate::config::CodecConfig;
use crate::errors::{CodecError, CodecResult};
use crate::value::Instance;
use morph_types::{
    FieldDecl, Primitive, RecordDecl, RecordKindDecl, SchemaFile, Shape, ShapeKind, TypeDescriptor,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Predicate deciding whether an encoded field is left out.
pub type SkipPredicate = Arc<dyn Fn(&Instance) -> bool + Send + Sync>;

/// Produces a fresh default each time a field is absent.
pub type DefaultFactory = Arc<dyn Fn() -> Instance + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordKind {
    /// Named fields, built by keyword.
    #[default]
    Record,
    /// Fixed field order; encodes as a sequence.
    Positional,
    /// Keyed structure with required and optional keys.
    Keyed,
}

impl From<RecordKindDecl> for RecordKind {
    fn from(kind: RecordKindDecl) -> Self {
        match kind {
            RecordKindDecl::Record => RecordKind::Record,
            RecordKindDecl::Positional => RecordKind::Positional,
            RecordKindDecl::Keyed => RecordKind::Keyed,
        }
    }
}

#[derive(Clone)]
pub enum FieldDefault {
    Value(Instance),
    Factory(DefaultFactory),
    /// Dynamic default, decoded through the field's own decoder on first use.
    Declared(Value),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
            FieldDefault::Declared(v) => f.debug_tuple("Declared").field(v).finish(),
        }
    }
}

/// Conditions under which an encoder leaves a field out. Any true
/// condition omits it.
#[derive(Clone, Default)]
pub struct SkipRule {
    pub always: bool,
    pub if_default: bool,
    pub if_none: bool,
    pub when: Option<SkipPredicate>,
}

impl fmt::Debug for SkipRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipRule")
            .field("always", &self.always)
            .field("if_default", &self.if_default)
            .field("if_none", &self.if_none)
            .field("when", &self.when.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub default: Option<FieldDefault>,
    pub alias: Option<String>,
    /// Nested input/output location, outermost key first.
    pub path: Option<Vec<String>>,
    pub skip: SkipRule,
    pub catch_all: bool,
    /// Keyed records only; keys are required unless marked otherwise.
    pub required: Option<bool>,
    /// Discriminator key override for a union-typed field.
    pub discriminator: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            alias: None,
            path: None,
            skip: SkipRule::default(),
            catch_all: false,
            required: None,
            discriminator: None,
        }
    }

    /// Field whose type is written as a type expression.
    pub fn parsed(name: impl Into<String>, expr: &str) -> CodecResult<Self> {
        let name = name.into();
        let ty = TypeDescriptor::parse(expr)
            .map_err(|e| CodecError::invalid_schema(&name, e.to_string()))?;
        Ok(Self::new(name, ty))
    }

    pub fn with_default(mut self, value: impl Into<Instance>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn with_factory(mut self, factory: impl Fn() -> Instance + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn with_declared_default(mut self, value: Value) -> Self {
        self.default = Some(FieldDefault::Declared(value));
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip_always(mut self) -> Self {
        self.skip.always = true;
        self
    }

    pub fn skip_if_default(mut self) -> Self {
        self.skip.if_default = true;
        self
    }

    pub fn skip_if_none(mut self) -> Self {
        self.skip.if_none = true;
        self
    }

    pub fn skip_when(mut self, predicate: impl Fn(&Instance) -> bool + Send + Sync + 'static) -> Self {
        self.skip.when = Some(Arc::new(predicate));
        self
    }

    pub fn as_catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn with_discriminator(mut self, key: impl Into<String>) -> Self {
        self.discriminator = Some(key.into());
        self
    }

    /// Whether an absent value is an error for a record of `kind`.
    pub fn is_required(&self, kind: RecordKind) -> bool {
        if self.catch_all || self.default.is_some() {
            return false;
        }
        match kind {
            RecordKind::Keyed => self.required.unwrap_or(true),
            RecordKind::Record | RecordKind::Positional => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordType {
    pub name: String,
    pub kind: RecordKind,
    pub fields: Vec<FieldDescriptor>,
    /// Discriminator value when used as a tagged-union arm.
    pub tag: Option<String>,
    pub config: Option<CodecConfig>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(RecordKind::Positional)
    }

    pub fn keyed(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(RecordKind::Keyed)
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn catch_all(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.catch_all)
    }

    /// The record's own settings, empty when it declares none.
    pub fn own_config(&self) -> CodecConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Tag written and read when this record is a union arm.
    pub fn effective_tag(&self, config: &CodecConfig) -> Option<String> {
        match &self.tag {
            Some(tag) => Some(tag.clone()),
            None if config.auto_tag() => Some(self.name.clone()),
            None => None,
        }
    }

    fn validate(&self) -> CodecResult<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(CodecError::invalid_schema(
                    &self.name,
                    format!("field `{}` is declared twice", field.name),
                ));
            }
            if let Some(path) = &field.path {
                if path.is_empty() || path.iter().any(String::is_empty) {
                    return Err(CodecError::invalid_schema(
                        &self.name,
                        format!("field `{}` has an empty path", field.name),
                    ));
                }
                if field.alias.is_some() {
                    debug!(record = %self.name, field = %field.name, "path overrides alias");
                }
            }
        }
        let catch_alls: Vec<&FieldDescriptor> = self.fields.iter().filter(|f| f.catch_all).collect();
        if catch_alls.len() > 1 {
            return Err(CodecError::invalid_schema(&self.name, "more than one catch-all field"));
        }
        if let Some(field) = catch_alls.first() {
            if self.kind == RecordKind::Positional {
                return Err(CodecError::invalid_schema(
                    &self.name,
                    "positional records cannot have a catch-all field",
                ));
            }
            if !matches!(field.ty.kind(), ShapeKind::Mapping | ShapeKind::DefaultMapping) {
                return Err(CodecError::invalid_schema(
                    &self.name,
                    format!("catch-all field `{}` must be a mapping, not `{}`", field.name, field.ty),
                ));
            }
            if field.path.is_some() {
                return Err(CodecError::invalid_schema(
                    &self.name,
                    format!("catch-all field `{}` cannot have a path", field.name),
                ));
            }
        }
        if let Some(config) = &self.config {
            config.validate_for(self)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    /// Variant name and its dynamic value, in declaration order.
    pub variants: Vec<(String, Value)>,
}

impl EnumType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variants.push((name.into(), value.into()));
        self
    }

    pub fn by_value(&self, value: &Value) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| v == value)
            .map(|(n, _)| n.as_str())
    }

    pub fn value_of(&self, variant: &str) -> Option<&Value> {
        self.variants.iter().find(|(n, _)| n == variant).map(|(_, v)| v)
    }
}

/// A scalar type defined outside the schema. Without its own handler it
/// converts through the nearest registered ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomType {
    pub name: String,
    pub base: Option<String>,
}

/// Every declared type a codec can compile against.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    records: BTreeMap<String, Arc<RecordType>>,
    enums: BTreeMap<String, Arc<EnumType>>,
    custom: BTreeMap<String, CustomType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: RecordType) -> CodecResult<()> {
        self.ensure_free(&record.name)?;
        record.validate()?;
        self.records.insert(record.name.clone(), Arc::new(record));
        Ok(())
    }

    pub fn add_enum(&mut self, enum_type: EnumType) -> CodecResult<()> {
        self.ensure_free(&enum_type.name)?;
        if enum_type.variants.is_empty() {
            return Err(CodecError::invalid_schema(&enum_type.name, "enum has no variants"));
        }
        self.enums.insert(enum_type.name.clone(), Arc::new(enum_type));
        Ok(())
    }

    pub fn add_custom(&mut self, name: impl Into<String>, base: Option<&str>) -> CodecResult<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.custom.insert(
            name.clone(),
            CustomType {
                name,
                base: base.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn with_record(mut self, record: RecordType) -> CodecResult<Self> {
        self.add_record(record)?;
        Ok(self)
    }

    pub fn with_enum(mut self, enum_type: EnumType) -> CodecResult<Self> {
        self.add_enum(enum_type)?;
        Ok(self)
    }

    fn ensure_free(&self, name: &str) -> CodecResult<()> {
        let taken = self.records.contains_key(name)
            || self.enums.contains_key(name)
            || self.custom.contains_key(name)
            || Primitive::from_name(name).is_some();
        if taken {
            return Err(CodecError::invalid_schema(name, "type name is already declared"));
        }
        Ok(())
    }

    pub fn record(&self, name: &str) -> Option<&Arc<RecordType>> {
        self.records.get(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&Arc<EnumType>> {
        self.enums.get(name)
    }

    pub fn custom_type(&self, name: &str) -> Option<&CustomType> {
        self.custom.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<RecordType>> {
        self.records.values()
    }

    /// Base chain of a custom type, nearest first. Stops at a cycle.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut current = self.custom.get(name).and_then(|c| c.base.clone());
        while let Some(base) = current {
            let base = Primitive::from_name(&base)
                .map(|p| p.name().to_string())
                .unwrap_or(base);
            if !seen.insert(base.clone()) {
                break;
            }
            current = self.custom.get(&base).and_then(|c| c.base.clone());
            chain.push(base);
        }
        chain
    }

    /// Replaces `Named` references with the shape their declaration gives
    /// them. Undeclared names stay `Named`.
    pub fn resolve(&self, desc: &TypeDescriptor) -> TypeDescriptor {
        desc.map_shapes(&mut |shape| match shape {
            Shape::Named(name) => self.classify(name),
            other => other.clone(),
        })
    }

    fn classify(&self, name: &str) -> Shape {
        if let Some(record) = self.records.get(name) {
            return match record.kind {
                RecordKind::Record => Shape::Record(name.to_string()),
                RecordKind::Positional => Shape::PositionalRecord(name.to_string()),
                RecordKind::Keyed => Shape::KeyedRecord(name.to_string()),
            };
        }
        if self.enums.contains_key(name) {
            return Shape::Enum(name.to_string());
        }
        if self.custom.contains_key(name) {
            return Shape::Custom(name.to_string());
        }
        Shape::Named(name.to_string())
    }

    /// Builds a schema from a schema document.
    pub fn from_file(file: &SchemaFile) -> CodecResult<Schema> {
        let mut schema = Schema::new();
        for decl in &file.enums {
            let mut enum_type = EnumType::new(&decl.name);
            for variant in &decl.variants {
                let value = variant
                    .value
                    .clone()
                    .unwrap_or_else(|| Value::String(variant.name.clone()));
                enum_type = enum_type.with_variant(&variant.name, value);
            }
            schema.add_enum(enum_type)?;
        }
        for decl in &file.custom {
            schema.add_custom(&decl.name, decl.base.as_deref())?;
        }
        for decl in &file.records {
            schema.add_record(record_from_decl(decl)?)?;
        }
        Ok(schema)
    }
}

fn record_from_decl(decl: &RecordDecl) -> CodecResult<RecordType> {
    let mut record = RecordType::new(&decl.name).with_kind(decl.kind.into());
    record.tag = decl.tag.clone();
    if let Some(config) = &decl.config {
        record.config = Some(CodecConfig::from_decl(&decl.name, config)?);
    }
    for field in &decl.fields {
        record.fields.push(field_from_decl(&decl.name, field)?);
    }
    Ok(record)
}

fn field_from_decl(record: &str, decl: &FieldDecl) -> CodecResult<FieldDescriptor> {
    let ty = TypeDescriptor::parse(&decl.type_expr).map_err(|e| {
        CodecError::invalid_schema(record, format!("field `{}`: {e}", decl.name))
    })?;
    let mut field = FieldDescriptor::new(&decl.name, ty);
    field.default = match (&decl.default, &decl.default_factory) {
        (Some(_), Some(_)) => {
            return Err(CodecError::invalid_schema(
                record,
                format!("field `{}` has both a default and a default factory", decl.name),
            ))
        }
        (Some(value), None) => Some(FieldDefault::Declared(value.clone())),
        (None, Some(factory)) => Some(FieldDefault::Factory(named_factory(record, factory)?)),
        (None, None) => None,
    };
    field.alias = decl.alias.clone();
    field.path = decl.path.clone();
    if let Some(skip) = &decl.skip {
        field.skip.always = skip.always;
        field.skip.if_default = skip.if_default;
        field.skip.if_none = skip.if_none;
    }
    field.catch_all = decl.catch_all;
    field.required = decl.required;
    field.discriminator = decl.discriminator.clone();
    Ok(field)
}

/* Default factories a schema document can name */
fn named_factory(record: &str, name: &str) -> CodecResult<DefaultFactory> {
    let factory: DefaultFactory = match name {
        "list" => Arc::new(|| Instance::Seq(Vec::new())),
        "set" | "frozenset" => Arc::new(|| Instance::Set(Vec::new())),
        "dict" => Arc::new(|| Instance::Map(Vec::new())),
        "tuple" => Arc::new(|| Instance::Tuple(Vec::new())),
        "str" => Arc::new(|| Instance::Str(String::new())),
        "int" => Arc::new(|| Instance::Int(0)),
        "float" => Arc::new(|| Instance::Float(0.0)),
        "bool" => Arc::new(|| Instance::Bool(false)),
        other => {
            return Err(CodecError::invalid_schema(
                record,
                format!("unknown default factory `{other}`"),
            ))
        }
    };
    Ok(factory)
}
