/* Morph Codec Library
 *
 * This library compiles conversion routines between typed record instances
 * and dynamic value trees (maps, sequences and scalars, as produced by JSON
 * or YAML parsing). Routines are compiled once per record type and
 * configuration, in both directions, and cached.
 */

pub mod cache;
pub mod casing;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod schema;
pub mod synth;
pub mod union;
pub mod value;

pub use casing::KeyCasing;
pub use codec::Codec;
pub use compiler::{Decoder, Encoder};
pub use config::{CodecConfig, UnknownKeyPolicy, DEFAULT_TAG_KEY};
pub use errors::{CodecError, CodecResult, ErrorKind, FieldPath, PathSegment};
pub use registry::{DecodeFn, DispatchRegistry, EncodeFn, FnHandler, HandlerKey, TypeHandler};
pub use schema::{EnumType, FieldDefault, FieldDescriptor, RecordKind, RecordType, Schema, SkipRule};
pub use value::{EnumValue, Instance, RecordValue};
