//! The [`Codec`] facade: schema, handler registry and routine cache.
//!
//! Every conversion goes through a compiled routine. A cache miss starts a
//! compile session against a snapshot of the registry; the routines that
//! session produces are published for every later call with the same
//! record and resolved configuration.

use crate::cache::RoutineCache;
use crate::compiler::{compile_decoder, compile_encoder, Decoder, Direction, Encoder, RoutineKey};
use crate::config::CodecConfig;
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::{DispatchRegistry, FnHandler, HandlerKey, TypeHandler};
use crate::schema::Schema;
use crate::value::Instance;
use arc_swap::ArcSwap;
use morph_types::SchemaFile;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct Codec {
    schema: Arc<Schema>,
    registry: ArcSwap<DispatchRegistry>,
    cache: RoutineCache,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("records", &self.schema.records().map(|r| r.name.as_str()).collect::<Vec<_>>())
            .field("handlers", &self.registry.load().len())
            .field("cached_routines", &self.cache.len())
            .finish()
    }
}

impl Codec {
    pub fn new(schema: Schema) -> Self {
        Self::with_registry(schema, DispatchRegistry::with_defaults())
    }

    pub fn with_registry(schema: Schema, registry: DispatchRegistry) -> Self {
        Self {
            schema: Arc::new(schema),
            registry: ArcSwap::from_pointee(registry),
            cache: RoutineCache::new(),
        }
    }

    pub fn from_file(file: &SchemaFile) -> CodecResult<Self> {
        Ok(Self::new(Schema::from_file(file)?))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Adds or replaces a handler. Every cached routine is dropped, since
    /// any of them may have been compiled through the replaced entry.
    pub fn register(&self, key: HandlerKey, handler: Arc<dyn TypeHandler>) {
        debug!(key = %key, "registering handler");
        self.registry.rcu(|current| {
            let mut next = DispatchRegistry::clone(current);
            next.register(key.clone(), Arc::clone(&handler));
            next
        });
        self.cache.invalidate();
    }

    /// Registers a scalar type given as a pair of closures.
    pub fn register_fn(
        &self,
        key: HandlerKey,
        decode: impl Fn(&Value) -> CodecResult<Instance> + Send + Sync + 'static,
        encode: impl Fn(&Instance) -> CodecResult<Value> + Send + Sync + 'static,
    ) {
        self.register(key, Arc::new(FnHandler::new(decode, encode)));
    }

    fn resolved_config(&self, record: &str, overrides: &CodecConfig) -> CodecResult<CodecConfig> {
        let declared = self.schema.record(record).ok_or_else(|| {
            CodecError::new(ErrorKind::UnknownType {
                name: record.to_string(),
            })
        })?;
        Ok(overrides.overlay(&declared.own_config()))
    }

    pub fn decoder(&self, record: &str) -> CodecResult<Decoder> {
        self.decoder_with(record, &CodecConfig::default())
    }

    /// Decoder of `record` with `overrides` laid over the record's own
    /// settings.
    pub fn decoder_with(&self, record: &str, overrides: &CodecConfig) -> CodecResult<Decoder> {
        let config = self.resolved_config(record, overrides)?;
        let key = RoutineKey {
            record: record.to_string(),
            config,
            direction: Direction::Decode,
        };
        if let Some(routine) = self.cache.decoder(&key) {
            trace!(record, "decoder cache hit");
            return Ok(routine);
        }
        let epoch = self.cache.epoch();
        let registry = self.registry.load_full();
        compile_decoder(&self.schema, &registry, &self.cache, epoch, record, key.config)
    }

    pub fn encoder(&self, record: &str) -> CodecResult<Encoder> {
        self.encoder_with(record, &CodecConfig::default())
    }

    pub fn encoder_with(&self, record: &str, overrides: &CodecConfig) -> CodecResult<Encoder> {
        let config = self.resolved_config(record, overrides)?;
        let key = RoutineKey {
            record: record.to_string(),
            config,
            direction: Direction::Encode,
        };
        if let Some(routine) = self.cache.encoder(&key) {
            trace!(record, "encoder cache hit");
            return Ok(routine);
        }
        let epoch = self.cache.epoch();
        let registry = self.registry.load_full();
        compile_encoder(&self.schema, &registry, &self.cache, epoch, record, key.config)
    }

    pub fn decode(&self, record: &str, value: &Value) -> CodecResult<Instance> {
        self.decoder(record)?.call(value)
    }

    pub fn decode_with(&self, record: &str, value: &Value, overrides: &CodecConfig) -> CodecResult<Instance> {
        self.decoder_with(record, overrides)?.call(value)
    }

    pub fn encode(&self, record: &str, value: &Instance) -> CodecResult<Value> {
        self.encoder(record)?.call(value)
    }

    pub fn encode_with(&self, record: &str, value: &Instance, overrides: &CodecConfig) -> CodecResult<Value> {
        self.encoder_with(record, overrides)?.call(value)
    }

    /// Decodes an already-acquired flat string map, such as environment
    /// variables. Every value is text; the string forms of the scalar and
    /// container handlers do the rest.
    pub fn decode_flat<I, K, V>(&self, record: &str, entries: I) -> CodecResult<Instance>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.decode_flat_with(record, entries, &CodecConfig::default())
    }

    pub fn decode_flat_with<I, K, V>(&self, record: &str, entries: I, overrides: &CodecConfig) -> CodecResult<Instance>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self.decode_with(record, &Value::Object(map), overrides)
    }

    /// Number of routines currently cached, both directions.
    pub fn cached_routines(&self) -> usize {
        self.cache.len()
    }
}
