/* Built-in shape handlers
 *
 * Categories:
 * - scalar: null, bool, int, float, str, bytes, Any
 * - temporal: date, time, datetime, timedelta
 * - collections: sequences, sets, tuples, mappings
 * - choice: optional, literal, enum
 * - records: nested, positional and keyed records
 *
 * Unions live in `crate::union`.
 */

pub mod choice;
pub mod collections;
pub mod records;
pub mod scalar;
pub mod temporal;

use crate::registry::{DispatchRegistry, HandlerKey};
use crate::union::UnionHandler;
use morph_types::{Primitive, ShapeKind};
use std::sync::Arc;

pub(crate) fn register_defaults(registry: &mut DispatchRegistry) {
    /* Scalars */
    registry.register(HandlerKey::of_type(Primitive::Null.name()), Arc::new(scalar::NullHandler));
    registry.register(HandlerKey::of_type(Primitive::Bool.name()), Arc::new(scalar::BoolHandler));
    registry.register(HandlerKey::of_type(Primitive::Int.name()), Arc::new(scalar::IntHandler));
    registry.register(HandlerKey::of_type(Primitive::Float.name()), Arc::new(scalar::FloatHandler));
    registry.register(HandlerKey::of_type(Primitive::Str.name()), Arc::new(scalar::StrHandler));
    registry.register(HandlerKey::of_type(Primitive::Bytes.name()), Arc::new(scalar::BytesHandler));
    registry.register(HandlerKey::of_type(Primitive::Any.name()), Arc::new(scalar::AnyHandler));

    /* Time types */
    registry.register(HandlerKey::of_type(Primitive::Date.name()), Arc::new(temporal::DateHandler));
    registry.register(HandlerKey::of_type(Primitive::Time.name()), Arc::new(temporal::TimeHandler));
    registry.register(
        HandlerKey::of_type(Primitive::DateTime.name()),
        Arc::new(temporal::DateTimeHandler),
    );
    registry.register(
        HandlerKey::of_type(Primitive::Duration.name()),
        Arc::new(temporal::DurationHandler),
    );

    /* Containers */
    registry.register(HandlerKey::Shape(ShapeKind::Sequence), Arc::new(collections::SequenceHandler));
    registry.register(HandlerKey::Shape(ShapeKind::Set), Arc::new(collections::SetHandler));
    registry.register(HandlerKey::Shape(ShapeKind::FixedTuple), Arc::new(collections::TupleHandler));
    registry.register(
        HandlerKey::Shape(ShapeKind::VariadicTuple),
        Arc::new(collections::VariadicTupleHandler),
    );
    registry.register(HandlerKey::Shape(ShapeKind::Mapping), Arc::new(collections::MappingHandler));
    registry.register(
        HandlerKey::Shape(ShapeKind::DefaultMapping),
        Arc::new(collections::DefaultMappingHandler),
    );

    /* Choices */
    registry.register(HandlerKey::Shape(ShapeKind::Optional), Arc::new(choice::OptionalHandler));
    registry.register(HandlerKey::Shape(ShapeKind::Literal), Arc::new(choice::LiteralHandler));
    registry.register(HandlerKey::Shape(ShapeKind::Enum), Arc::new(choice::EnumHandler));
    registry.register(HandlerKey::Shape(ShapeKind::Union), Arc::new(UnionHandler));

    /* Records */
    for kind in [ShapeKind::Record, ShapeKind::PositionalRecord, ShapeKind::KeyedRecord] {
        registry.register(HandlerKey::Shape(kind), Arc::new(records::RecordHandler));
    }
}

/// Splits an environment-style list, `"a, b,c"`; empty text is an empty list.
pub(crate) fn split_list(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.split(',').map(str::trim).collect()
}
