/* Dispatch registry: maps type shapes and concrete type names to handlers
 *
 * A handler turns one type descriptor into a decode closure and an encode
 * closure, asking the compile context for the closures of any inner types.
 * Lookup order is exact type name, then shape category, then the declared
 * base chain of a custom type.
 */

use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::handlers;
use crate::schema::Schema;
use crate::value::Instance;
use morph_types::{Primitive, Shape, ShapeKind, TypeDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type DecodeFn = Arc<dyn Fn(&Value) -> CodecResult<Instance> + Send + Sync>;
pub type EncodeFn = Arc<dyn Fn(&Instance) -> CodecResult<Value> + Send + Sync>;

/* Registry key: a concrete type, or every type of one shape */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Type(String),
    Shape(ShapeKind),
}

impl HandlerKey {
    pub fn of_type(name: impl Into<String>) -> Self {
        HandlerKey::Type(name.into())
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKey::Type(name) => f.write_str(name),
            HandlerKey::Shape(kind) => write!(f, "<{kind}>"),
        }
    }
}

/* Trait for shape handlers */
pub trait TypeHandler: Send + Sync {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn>;

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn>;
}

/* Handler built from a pair of closures, for user scalar types */
#[derive(Clone)]
pub struct FnHandler {
    decode: DecodeFn,
    encode: EncodeFn,
}

impl FnHandler {
    pub fn new(
        decode: impl Fn(&Value) -> CodecResult<Instance> + Send + Sync + 'static,
        encode: impl Fn(&Instance) -> CodecResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }
}

impl TypeHandler for FnHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::clone(&self.decode))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::clone(&self.encode))
    }
}

/* Registry of type handlers */
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn TypeHandler>>,
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("DispatchRegistry").field("handlers", &keys).finish()
    }
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /* Create registry with the built-in handlers */
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        handlers::register_defaults(&mut registry);
        registry
    }

    /* Register a handler; replaces any earlier one under the same key */
    pub fn register(&mut self, key: HandlerKey, handler: Arc<dyn TypeHandler>) {
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, key: &HandlerKey) -> Option<&Arc<dyn TypeHandler>> {
        self.handlers.get(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Finds the handler for a schema-resolved descriptor. Returns the
    /// descriptor the handler should compile, which is an ancestor's when
    /// the match came from the base chain.
    pub fn resolve(
        &self,
        ty: &TypeDescriptor,
        schema: &Schema,
    ) -> CodecResult<(Arc<dyn TypeHandler>, TypeDescriptor)> {
        if let Some(found) = self.lookup(ty) {
            return Ok((found, ty.clone()));
        }
        if let Shape::Custom(name) | Shape::Named(name) = &ty.shape {
            for ancestor in schema.ancestors(name) {
                let ancestor_ty = match Primitive::from_name(&ancestor) {
                    Some(prim) => TypeDescriptor::primitive(prim),
                    None => schema.resolve(&TypeDescriptor::named(ancestor.as_str())),
                };
                if let Some(found) = self.lookup(&ancestor_ty) {
                    return Ok((found, ancestor_ty));
                }
            }
        }
        match &ty.shape {
            Shape::Named(name) => Err(CodecError::new(ErrorKind::UnknownType { name: name.clone() })),
            _ => Err(CodecError::unsupported(ty.to_string())),
        }
    }

    fn lookup(&self, ty: &TypeDescriptor) -> Option<Arc<dyn TypeHandler>> {
        let exact = ty
            .shape
            .type_name()
            .and_then(|name| self.handlers.get(&HandlerKey::Type(name.to_string())));
        exact
            .or_else(|| self.handlers.get(&HandlerKey::Shape(ty.kind())))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_primitive_and_container() {
        let registry = DispatchRegistry::with_defaults();
        for prim in Primitive::ALL {
            assert!(registry.get(&HandlerKey::of_type(prim.name())).is_some(), "{}", prim.name());
        }
        for kind in [
            ShapeKind::Optional,
            ShapeKind::Union,
            ShapeKind::Sequence,
            ShapeKind::Set,
            ShapeKind::Mapping,
            ShapeKind::DefaultMapping,
            ShapeKind::FixedTuple,
            ShapeKind::VariadicTuple,
            ShapeKind::Literal,
            ShapeKind::Enum,
            ShapeKind::Record,
            ShapeKind::PositionalRecord,
            ShapeKind::KeyedRecord,
        ] {
            assert!(registry.get(&HandlerKey::Shape(kind)).is_some(), "{kind}");
        }
        assert!(registry.get(&HandlerKey::Shape(ShapeKind::Custom)).is_none());
    }

    #[test]
    fn resolution_order() {
        let mut schema = Schema::new();
        schema.add_custom("Email", Some("str")).expect("email");
        schema.add_custom("Opaque", None).expect("opaque");
        let registry = DispatchRegistry::with_defaults();

        let email = schema.resolve(&TypeDescriptor::named("Email"));
        let (_, used) = registry.resolve(&email, &schema).expect("ancestor match");
        assert_eq!(used, TypeDescriptor::primitive(Primitive::Str));

        let opaque = schema.resolve(&TypeDescriptor::named("Opaque"));
        let err = registry.resolve(&opaque, &schema).err().expect("unsupported");
        assert!(matches!(err.kind(), ErrorKind::UnsupportedType { .. }));

        let ghost = schema.resolve(&TypeDescriptor::named("Ghost"));
        let err = registry.resolve(&ghost, &schema).err().expect("unknown");
        assert!(matches!(err.kind(), ErrorKind::UnknownType { .. }));
    }
}
