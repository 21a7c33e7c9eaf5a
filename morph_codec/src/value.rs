//! Typed runtime values produced by decoders and consumed by encoders.
//!
//! An [`Instance`] is the in-memory side of a conversion: scalars carry
//! their native Rust representation (`i64`, `chrono` types, raw bytes),
//! containers keep element order, and records hold their fields in
//! declaration order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use serde_json::{Map, Number, Value};

/// A decoded value of some schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    Duration(TimeDelta),
    /// Untyped payload of an `Any` position, kept as-is.
    Dynamic(Value),
    Enum(EnumValue),
    Seq(Vec<Instance>),
    /// Elements are unique; insertion order is kept.
    Set(Vec<Instance>),
    Tuple(Vec<Instance>),
    Map(Vec<(Instance, Instance)>),
    /// Mapping that produces `default` for keys it does not hold.
    DefaultMap {
        entries: Vec<(Instance, Instance)>,
        default: Box<Instance>,
    },
    Record(RecordValue),
}

/// One variant of a declared enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub type_name: String,
    pub variant: String,
    /// Dynamic representation of the variant.
    pub value: Value,
}

/// An instance of a record type.
#[derive(Debug, Clone, Default)]
pub struct RecordValue {
    pub type_name: String,
    pub fields: Vec<(String, Instance)>,
}

/* Field order is presentation only; names are unique within a record */
impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl RecordValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Instance>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any earlier value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Instance>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Instance {
    pub fn is_null(&self) -> bool {
        matches!(self, Instance::Null)
    }

    /// Short category name, used in messages and by union encoding.
    pub fn kind_name(&self) -> &str {
        match self {
            Instance::Null => "None",
            Instance::Bool(_) => "bool",
            Instance::Int(_) => "int",
            Instance::Float(_) => "float",
            Instance::Str(_) => "str",
            Instance::Bytes(_) => "bytes",
            Instance::Date(_) => "date",
            Instance::Time(_) => "time",
            Instance::DateTime(_) => "datetime",
            Instance::Duration(_) => "timedelta",
            Instance::Dynamic(_) => "Any",
            Instance::Enum(e) => &e.type_name,
            Instance::Seq(_) => "list",
            Instance::Set(_) => "set",
            Instance::Tuple(_) => "tuple",
            Instance::Map(_) => "dict",
            Instance::DefaultMap { .. } => "defaultdict",
            Instance::Record(r) => &r.type_name,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Instance::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Instance::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Instance::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Entries of either mapping flavour.
    pub fn map_entries(&self) -> Option<&[(Instance, Instance)]> {
        match self {
            Instance::Map(entries) | Instance::DefaultMap { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// Looks a key up in a mapping by its string form.
    pub fn map_get(&self, key: &str) -> Option<&Instance> {
        self.map_entries()?
            .iter()
            .find(|(k, _)| k.key_string() == key)
            .map(|(_, v)| v)
    }

    /// Text used when this value appears as a mapping key.
    pub fn key_string(&self) -> String {
        match self {
            Instance::Str(s) => s.clone(),
            other => match other.to_dynamic() {
                Value::String(s) => s,
                v => v.to_string(),
            },
        }
    }

    /// Generic conversion to the dynamic representation, without any type
    /// information. Compiled encoders only take this path for `Any`.
    pub fn to_dynamic(&self) -> Value {
        match self {
            Instance::Null => Value::Null,
            Instance::Bool(b) => Value::Bool(*b),
            Instance::Int(i) => Value::from(*i),
            Instance::Float(f) => float_value(*f),
            Instance::Str(s) => Value::String(s.clone()),
            Instance::Bytes(b) => Value::String(BASE64.encode(b)),
            Instance::Date(d) => Value::String(d.to_string()),
            Instance::Time(t) => Value::String(t.to_string()),
            Instance::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Instance::Duration(d) => duration_seconds(*d),
            Instance::Dynamic(v) => v.clone(),
            Instance::Enum(e) => e.value.clone(),
            Instance::Seq(items) | Instance::Set(items) | Instance::Tuple(items) => {
                Value::Array(items.iter().map(Instance::to_dynamic).collect())
            }
            Instance::Map(entries) | Instance::DefaultMap { entries, .. } => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.key_string(), v.to_dynamic()))
                    .collect::<Map<String, Value>>(),
            ),
            Instance::Record(r) => Value::Object(
                r.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_dynamic()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Scalar view of a dynamic value; containers stay dynamic.
    pub fn from_scalar(value: &Value) -> Instance {
        match value {
            Value::Null => Instance::Null,
            Value::Bool(b) => Instance::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Instance::Int(i),
                None => Instance::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Instance::Str(s.clone()),
            other => Instance::Dynamic(other.clone()),
        }
    }
}

/// JSON has no NaN or infinities; they encode as null.
pub fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

pub fn duration_seconds(d: TimeDelta) -> Value {
    match d.num_microseconds() {
        Some(us) if us % 1_000_000 == 0 => Value::from(us / 1_000_000),
        Some(us) => float_value(us as f64 / 1_000_000.0),
        None => Value::from(d.num_seconds()),
    }
}

impl From<bool> for Instance {
    fn from(v: bool) -> Self {
        Instance::Bool(v)
    }
}

impl From<i64> for Instance {
    fn from(v: i64) -> Self {
        Instance::Int(v)
    }
}

impl From<i32> for Instance {
    fn from(v: i32) -> Self {
        Instance::Int(v.into())
    }
}

impl From<f64> for Instance {
    fn from(v: f64) -> Self {
        Instance::Float(v)
    }
}

impl From<&str> for Instance {
    fn from(v: &str) -> Self {
        Instance::Str(v.to_string())
    }
}

impl From<String> for Instance {
    fn from(v: String) -> Self {
        Instance::Str(v)
    }
}

impl From<RecordValue> for Instance {
    fn from(v: RecordValue) -> Self {
        Instance::Record(v)
    }
}

impl From<EnumValue> for Instance {
    fn from(v: EnumValue) -> Self {
        Instance::Enum(v)
    }
}

impl From<Vec<Instance>> for Instance {
    fn from(v: Vec<Instance>) -> Self {
        Instance::Seq(v)
    }
}

impl<T: Into<Instance>> From<Option<T>> for Instance {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Instance::Null)
    }
}
