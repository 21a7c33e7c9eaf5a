use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Scalar types understood without any schema lookup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Primitive {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Date,
    Time,
    DateTime,
    Duration,
    Any,
}

impl Primitive {
    pub const ALL: [Primitive; 11] = [
        Primitive::Null,
        Primitive::Bool,
        Primitive::Int,
        Primitive::Float,
        Primitive::Str,
        Primitive::Bytes,
        Primitive::Date,
        Primitive::Time,
        Primitive::DateTime,
        Primitive::Duration,
        Primitive::Any,
    ];

    /// Canonical spelling, also the registry key of the built-in handler.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Null => "None",
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Str => "str",
            Primitive::Bytes => "bytes",
            Primitive::Date => "date",
            Primitive::Time => "time",
            Primitive::DateTime => "datetime",
            Primitive::Duration => "timedelta",
            Primitive::Any => "Any",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let prim = match name {
            "None" | "NoneType" => Primitive::Null,
            "bool" => Primitive::Bool,
            "int" => Primitive::Int,
            "float" => Primitive::Float,
            "str" => Primitive::Str,
            "bytes" | "bytearray" => Primitive::Bytes,
            "date" => Primitive::Date,
            "time" => Primitive::Time,
            "datetime" => Primitive::DateTime,
            "timedelta" | "duration" => Primitive::Duration,
            "Any" | "object" => Primitive::Any,
            _ => return None,
        };
        Some(prim)
    }
}

/// Field-less shape category, used as the fallback dispatch key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    Primitive,
    Optional,
    Union,
    Sequence,
    Set,
    Mapping,
    DefaultMapping,
    FixedTuple,
    VariadicTuple,
    Literal,
    Enum,
    PositionalRecord,
    KeyedRecord,
    Record,
    Custom,
    Named,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Primitive => "primitive",
            ShapeKind::Optional => "optional",
            ShapeKind::Union => "union",
            ShapeKind::Sequence => "sequence",
            ShapeKind::Set => "set",
            ShapeKind::Mapping => "mapping",
            ShapeKind::DefaultMapping => "default-mapping",
            ShapeKind::FixedTuple => "fixed-tuple",
            ShapeKind::VariadicTuple => "variadic-tuple",
            ShapeKind::Literal => "literal",
            ShapeKind::Enum => "enum",
            ShapeKind::PositionalRecord => "positional-record",
            ShapeKind::KeyedRecord => "keyed-record",
            ShapeKind::Record => "record",
            ShapeKind::Custom => "custom",
            ShapeKind::Named => "named",
        };
        f.write_str(name)
    }
}

/// Structural classification of one position in a type signature.
///
/// Container shapes keep their parameters in [`TypeDescriptor::args`];
/// named shapes carry the declared type name. `Named` is what the
/// expression parser produces for a bare identifier before a schema has
/// said whether it is a record, an enum or a custom scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Primitive(Primitive),
    Optional,
    Union,
    Sequence,
    Set,
    Mapping,
    DefaultMapping,
    FixedTuple,
    VariadicTuple,
    Literal,
    Enum(String),
    PositionalRecord(String),
    KeyedRecord(String),
    Record(String),
    Custom(String),
    Named(String),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Primitive(_) => ShapeKind::Primitive,
            Shape::Optional => ShapeKind::Optional,
            Shape::Union => ShapeKind::Union,
            Shape::Sequence => ShapeKind::Sequence,
            Shape::Set => ShapeKind::Set,
            Shape::Mapping => ShapeKind::Mapping,
            Shape::DefaultMapping => ShapeKind::DefaultMapping,
            Shape::FixedTuple => ShapeKind::FixedTuple,
            Shape::VariadicTuple => ShapeKind::VariadicTuple,
            Shape::Literal => ShapeKind::Literal,
            Shape::Enum(_) => ShapeKind::Enum,
            Shape::PositionalRecord(_) => ShapeKind::PositionalRecord,
            Shape::KeyedRecord(_) => ShapeKind::KeyedRecord,
            Shape::Record(_) => ShapeKind::Record,
            Shape::Custom(_) => ShapeKind::Custom,
            Shape::Named(_) => ShapeKind::Named,
        }
    }

    /// Concrete type name, if this shape denotes one specific type.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Shape::Primitive(p) => Some(p.name()),
            Shape::Enum(n)
            | Shape::PositionalRecord(n)
            | Shape::KeyedRecord(n)
            | Shape::Record(n)
            | Shape::Custom(n)
            | Shape::Named(n) => Some(n),
            _ => None,
        }
    }

    /// Name of the record type, for any of the three record shapes.
    pub fn record_name(&self) -> Option<&str> {
        match self {
            Shape::PositionalRecord(n) | Shape::KeyedRecord(n) | Shape::Record(n) => Some(n),
            _ => None,
        }
    }
}

/// A walkable description of one field position's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub shape: Shape,
    /// Generic parameters, in declaration order.
    pub args: Vec<TypeDescriptor>,
    /// Accepted values of a `Literal[...]` position.
    pub literals: Vec<Value>,
}

impl TypeDescriptor {
    pub fn new(shape: Shape, args: Vec<TypeDescriptor>) -> Self {
        Self {
            shape,
            args,
            literals: Vec::new(),
        }
    }

    pub fn primitive(prim: Primitive) -> Self {
        Self::new(Shape::Primitive(prim), Vec::new())
    }

    pub fn any() -> Self {
        Self::primitive(Primitive::Any)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Shape::Named(name.into()), Vec::new())
    }

    pub fn record(name: impl Into<String>) -> Self {
        Self::new(Shape::Record(name.into()), Vec::new())
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        Self::new(Shape::Optional, vec![inner])
    }

    pub fn union(arms: Vec<TypeDescriptor>) -> Self {
        Self::new(Shape::Union, arms)
    }

    pub fn sequence(item: TypeDescriptor) -> Self {
        Self::new(Shape::Sequence, vec![item])
    }

    pub fn set(item: TypeDescriptor) -> Self {
        Self::new(Shape::Set, vec![item])
    }

    pub fn mapping(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::new(Shape::Mapping, vec![key, value])
    }

    pub fn default_mapping(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::new(Shape::DefaultMapping, vec![key, value])
    }

    pub fn tuple(items: Vec<TypeDescriptor>) -> Self {
        Self::new(Shape::FixedTuple, items)
    }

    pub fn variadic(item: TypeDescriptor) -> Self {
        Self::new(Shape::VariadicTuple, vec![item])
    }

    pub fn literal(values: Vec<Value>) -> Self {
        Self {
            shape: Shape::Literal,
            args: Vec::new(),
            literals: values,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    pub fn arg(&self, index: usize) -> Option<&TypeDescriptor> {
        self.args.get(index)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.shape, Shape::Primitive(Primitive::Null))
    }

    /// True when `null` is an acceptable value for this position.
    pub fn accepts_null(&self) -> bool {
        match &self.shape {
            Shape::Optional | Shape::Primitive(Primitive::Null) | Shape::Primitive(Primitive::Any) => {
                true
            }
            Shape::Union => self.args.iter().any(TypeDescriptor::accepts_null),
            Shape::Literal => self.literals.iter().any(Value::is_null),
            _ => false,
        }
    }

    /// Rebuilds the descriptor bottom-up, replacing every shape through `f`.
    pub fn map_shapes(&self, f: &mut dyn FnMut(&Shape) -> Shape) -> TypeDescriptor {
        TypeDescriptor {
            shape: f(&self.shape),
            args: self.args.iter().map(|arg| arg.map_shapes(f)).collect(),
            literals: self.literals.clone(),
        }
    }

    /// Every declared type name referenced anywhere in this descriptor.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.shape {
            Shape::Primitive(_) => {}
            shape => {
                if let Some(name) = shape.type_name() {
                    out.push(name);
                }
            }
        }
        for arg in &self.args {
            arg.collect_names(out);
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Primitive(p) => f.write_str(p.name()),
            Shape::Enum(n)
            | Shape::PositionalRecord(n)
            | Shape::KeyedRecord(n)
            | Shape::Record(n)
            | Shape::Custom(n)
            | Shape::Named(n) => f.write_str(n),
            Shape::Optional => write_generic(f, "Optional", &self.args),
            Shape::Union => write_generic(f, "Union", &self.args),
            Shape::Sequence => write_generic(f, "list", &self.args),
            Shape::Set => write_generic(f, "set", &self.args),
            Shape::Mapping => write_generic(f, "dict", &self.args),
            Shape::DefaultMapping => write_generic(f, "defaultdict", &self.args),
            Shape::FixedTuple if self.args.is_empty() => f.write_str("tuple[()]"),
            Shape::FixedTuple => write_generic(f, "tuple", &self.args),
            Shape::VariadicTuple => {
                f.write_str("tuple[")?;
                match self.args.first() {
                    Some(item) => write!(f, "{item}")?,
                    None => f.write_str("Any")?,
                }
                f.write_str(", ...]")
            }
            Shape::Literal => {
                f.write_str("Literal[")?;
                for (idx, value) in self.literals.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

fn write_generic(f: &mut fmt::Formatter<'_>, head: &str, args: &[TypeDescriptor]) -> fmt::Result {
    f.write_str(head)?;
    f.write_str("[")?;
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str("]")
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("None"),
        Value::Bool(true) => f.write_str("True"),
        Value::Bool(false) => f.write_str("False"),
        Value::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => write!(f, "{other}"),
    }
}
