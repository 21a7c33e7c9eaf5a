//! Per-record compilation.
//!
//! A [`CompileCx`] is one compile session. It walks a record's fields
//! through the dispatch registry, compiles nested records into routines of
//! the same session (or picks them up from the cache), and finally links
//! everything so the requested routine can be published and called.

pub mod decode;
pub mod encode;
pub mod guard;

use crate::cache::RoutineCache;
use crate::config::{CodecConfig, DEFAULT_TAG_KEY};
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::{DecodeFn, DispatchRegistry, EncodeFn};
use crate::schema::{FieldDescriptor, RecordType, Schema};
use crate::synth::{Environment, Routine, Synthesizer};
use crate::value::Instance;
use guard::RecursionGuard;
use morph_types::TypeDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

pub type Decoder = Routine<Value, Instance>;
pub type Encoder = Routine<Instance, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Decode,
    Encode,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Decode => "decode",
            Direction::Encode => "encode",
        })
    }
}

/// Identity of a compiled routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineKey {
    pub record: String,
    pub config: CodecConfig,
    pub direction: Direction,
}

/// The field whose type is being compiled.
#[derive(Debug, Clone)]
pub struct FieldSite {
    pub record: String,
    pub field: String,
    pub discriminator: Option<String>,
}

/// Unique routine names within a session: `decode::Node`, `decode::Node#2`.
#[derive(Debug, Default)]
pub struct NameScope {
    counts: HashMap<String, usize>,
}

impl NameScope {
    pub fn fresh(&mut self, direction: Direction, record: &str) -> String {
        let base = format!("{direction}::{record}");
        let count = self.counts.entry(base.clone()).or_insert(0);
        *count += 1;
        match *count {
            1 => base,
            n => format!("{base}#{n}"),
        }
    }

    /// Dotted diagnostic label of a field.
    pub fn label(record: &str, field: &str) -> String {
        format!("{record}.{field}")
    }
}

/// Discriminator key a record reads past and, as a union arm, writes.
pub(crate) fn record_tag_key(record: &RecordType, config: &CodecConfig) -> Option<String> {
    match config.tag_key() {
        Some(key) => Some(key.to_string()),
        None => record
            .effective_tag(config)
            .map(|_| DEFAULT_TAG_KEY.to_string()),
    }
}

pub struct CompileCx<'a> {
    schema: &'a Schema,
    registry: &'a DispatchRegistry,
    cache: &'a RoutineCache,
    config: CodecConfig,
    site: Option<FieldSite>,
    guard: RecursionGuard,
    names: NameScope,
    decoders: Synthesizer<Value, Instance>,
    encoders: Synthesizer<Instance, Value>,
    decode_env: Environment<Value, Instance>,
    encode_env: Environment<Instance, Value>,
    session: HashMap<RoutineKey, String>,
    compiled: Vec<(RoutineKey, String)>,
}

impl<'a> CompileCx<'a> {
    pub fn new(schema: &'a Schema, registry: &'a DispatchRegistry, cache: &'a RoutineCache) -> Self {
        Self {
            schema,
            registry,
            cache,
            config: CodecConfig::default(),
            site: None,
            guard: RecursionGuard::new(),
            names: NameScope::default(),
            decoders: Synthesizer::new(),
            encoders: Synthesizer::new(),
            decode_env: Environment::new(),
            encode_env: Environment::new(),
            session: HashMap::new(),
            compiled: Vec::new(),
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Resolved configuration of the record being compiled.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn site(&self) -> Option<&FieldSite> {
        self.site.as_ref()
    }

    /// Name of the record being compiled, for messages.
    pub fn owner(&self) -> &str {
        self.site.as_ref().map_or("<root>", |s| s.record.as_str())
    }

    pub fn decoder_for(&mut self, ty: &TypeDescriptor) -> CodecResult<DecodeFn> {
        let resolved = self.schema.resolve(ty);
        let (handler, target) = self.registry.resolve(&resolved, self.schema)?;
        handler.decoder(&target, self)
    }

    pub fn encoder_for(&mut self, ty: &TypeDescriptor) -> CodecResult<EncodeFn> {
        let resolved = self.schema.resolve(ty);
        let (handler, target) = self.registry.resolve(&resolved, self.schema)?;
        handler.encoder(&target, self)
    }

    /// Configuration `record` compiles under when nested in the current one.
    pub fn nested_config(&self, record: &str) -> CodecResult<CodecConfig> {
        let declared = self.lookup(record)?;
        Ok(declared.own_config().inherit(&self.config))
    }

    pub fn record_decoder(&mut self, record: &str) -> CodecResult<DecodeFn> {
        let config = self.nested_config(record)?;
        self.record_decoder_with(record, config)
    }

    pub fn record_decoder_with(&mut self, record: &str, config: CodecConfig) -> CodecResult<DecodeFn> {
        let name = self.ensure_routine(record, config, Direction::Decode)?;
        let handle = self.decoders.reference(&name);
        Ok(Arc::new(move |value: &Value| handle.call(value)))
    }

    pub fn record_encoder(&mut self, record: &str) -> CodecResult<EncodeFn> {
        let config = self.nested_config(record)?;
        self.record_encoder_with(record, config)
    }

    pub fn record_encoder_with(&mut self, record: &str, config: CodecConfig) -> CodecResult<EncodeFn> {
        let name = self.ensure_routine(record, config, Direction::Encode)?;
        let handle = self.encoders.reference(&name);
        Ok(Arc::new(move |value: &Instance| handle.call(value)))
    }

    fn lookup(&self, record: &str) -> CodecResult<Arc<RecordType>> {
        self.schema.record(record).cloned().ok_or_else(|| {
            CodecError::new(ErrorKind::UnknownType {
                name: record.to_string(),
            })
        })
    }

    /// Name of the routine for `(record, config, direction)` in this
    /// session, compiling it or adopting a cached one as needed.
    pub(crate) fn ensure_routine(
        &mut self,
        record: &str,
        config: CodecConfig,
        direction: Direction,
    ) -> CodecResult<String> {
        let key = RoutineKey {
            record: record.to_string(),
            config,
            direction,
        };
        if let Some(name) = self.guard.active(&key) {
            trace!(routine = %name, "recursive reference");
            return Ok(name.to_string());
        }
        if let Some(name) = self.session.get(&key) {
            return Ok(name.clone());
        }
        if let Some(alias) = self.adopt_cached(&key) {
            return Ok(alias);
        }

        let declared = self.lookup(record)?;
        key.config.validate_for(&declared)?;
        let name = self.names.fresh(direction, record);
        debug!(routine = %name, "compiling");
        self.guard.enter(key.clone(), name.clone());
        let saved_config = std::mem::replace(&mut self.config, key.config.clone());
        let saved_site = self.site.take();
        let built = match direction {
            Direction::Decode => decode::build(self, &declared, &name),
            Direction::Encode => encode::build(self, &declared, &name),
        };
        self.config = saved_config;
        self.site = saved_site;
        self.guard.leave(&key);
        built?;
        self.session.insert(key.clone(), name.clone());
        self.compiled.push((key, name.clone()));
        Ok(name)
    }

    fn adopt_cached(&mut self, key: &RoutineKey) -> Option<String> {
        match key.direction {
            Direction::Decode => {
                let routine = self.cache.decoder(key)?;
                let alias = self.names.fresh(key.direction, &key.record);
                self.decode_env.insert(alias.clone(), routine);
                self.session.insert(key.clone(), alias.clone());
                Some(alias)
            }
            Direction::Encode => {
                let routine = self.cache.encoder(key)?;
                let alias = self.names.fresh(key.direction, &key.record);
                self.encode_env.insert(alias.clone(), routine);
                self.session.insert(key.clone(), alias.clone());
                Some(alias)
            }
        }
    }

    pub(crate) fn enter_field(&mut self, record: &RecordType, field: &FieldDescriptor) -> Option<FieldSite> {
        self.site.replace(FieldSite {
            record: record.name.clone(),
            field: field.name.clone(),
            discriminator: field.discriminator.clone(),
        })
    }

    pub(crate) fn leave_field(&mut self, previous: Option<FieldSite>) {
        self.site = previous;
    }

    pub(crate) fn decoders_mut(&mut self) -> &mut Synthesizer<Value, Instance> {
        &mut self.decoders
    }

    pub(crate) fn encoders_mut(&mut self) -> &mut Synthesizer<Instance, Value> {
        &mut self.encoders
    }

    /// Links every routine of the session.
    pub fn finish(self) -> CodecResult<Session> {
        let decoders = self.decoders.finalize(&self.decode_env)?;
        let encoders = self.encoders.finalize(&self.encode_env)?;
        Ok(Session {
            decoders,
            encoders,
            decode_env: self.decode_env,
            encode_env: self.encode_env,
            compiled: self.compiled,
        })
    }
}

/// Linked output of a compile session.
pub struct Session {
    decoders: HashMap<String, Decoder>,
    encoders: HashMap<String, Encoder>,
    decode_env: Environment<Value, Instance>,
    encode_env: Environment<Instance, Value>,
    compiled: Vec<(RoutineKey, String)>,
}

impl Session {
    pub fn decoder(&self, name: &str) -> Option<Decoder> {
        self.decoders
            .get(name)
            .or_else(|| self.decode_env.get(name))
            .cloned()
    }

    pub fn encoder(&self, name: &str) -> Option<Encoder> {
        self.encoders
            .get(name)
            .or_else(|| self.encode_env.get(name))
            .cloned()
    }

    /// Routines compiled in this session, with their cache keys.
    pub fn compiled(&self) -> (Vec<(RoutineKey, Decoder)>, Vec<(RoutineKey, Encoder)>) {
        let mut decoders = Vec::new();
        let mut encoders = Vec::new();
        for (key, name) in &self.compiled {
            match key.direction {
                Direction::Decode => {
                    if let Some(routine) = self.decoders.get(name) {
                        decoders.push((key.clone(), routine.clone()));
                    }
                }
                Direction::Encode => {
                    if let Some(routine) = self.encoders.get(name) {
                        encoders.push((key.clone(), routine.clone()));
                    }
                }
            }
        }
        (decoders, encoders)
    }
}

fn unlinked(name: &str) -> CodecError {
    CodecError::new(ErrorKind::UnlinkedRoutine {
        name: name.to_string(),
    })
}

/// Compiles, links and publishes the decoder of `record` under `config`.
///
/// `epoch` must be read from `cache` before `registry` was loaded, so that a
/// registration in between makes the publication stale.
pub fn compile_decoder(
    schema: &Schema,
    registry: &DispatchRegistry,
    cache: &RoutineCache,
    epoch: u64,
    record: &str,
    config: CodecConfig,
) -> CodecResult<Decoder> {
    let mut cx = CompileCx::new(schema, registry, cache);
    let name = cx.ensure_routine(record, config, Direction::Decode)?;
    let session = cx.finish()?;
    let routine = session.decoder(&name).ok_or_else(|| unlinked(&name))?;
    cache.publish(epoch, &session);
    Ok(routine)
}

/// Compiles, links and publishes the encoder of `record` under `config`.
///
/// `epoch` must be read from `cache` before `registry` was loaded, so that a
/// registration in between makes the publication stale.
pub fn compile_encoder(
    schema: &Schema,
    registry: &DispatchRegistry,
    cache: &RoutineCache,
    epoch: u64,
    record: &str,
    config: CodecConfig,
) -> CodecResult<Encoder> {
    let mut cx = CompileCx::new(schema, registry, cache);
    let name = cx.ensure_routine(record, config, Direction::Encode)?;
    let session = cx.finish()?;
    let routine = session.encoder(&name).ok_or_else(|| unlinked(&name))?;
    cache.publish(epoch, &session);
    Ok(routine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_numbered() {
        let mut names = NameScope::default();
        assert_eq!(names.fresh(Direction::Decode, "Node"), "decode::Node");
        assert_eq!(names.fresh(Direction::Decode, "Node"), "decode::Node#2");
        assert_eq!(names.fresh(Direction::Encode, "Node"), "encode::Node");
        assert_eq!(NameScope::label("Event", "kind"), "Event.kind");
    }

    fn node_schema() -> Schema {
        Schema::new()
            .with_record(
                RecordType::new("Node")
                    .with_field(FieldDescriptor::parsed("value", "int").expect("value"))
                    .with_field(FieldDescriptor::parsed("next", "Optional[Node]").expect("next")),
            )
            .expect("Node")
    }

    #[test]
    fn self_reference_compiles_one_routine() {
        let schema = node_schema();
        let registry = DispatchRegistry::with_defaults();
        let cache = RoutineCache::new();
        let mut cx = CompileCx::new(&schema, &registry, &cache);
        let name = cx
            .ensure_routine("Node", CodecConfig::default(), Direction::Decode)
            .expect("compile");
        assert_eq!(name, "decode::Node");
        let session = cx.finish().expect("link");
        let (decoders, encoders) = session.compiled();
        assert_eq!(decoders.len(), 1);
        assert!(encoders.is_empty());
    }

    #[test]
    fn registration_during_compile_discards_publication() {
        let schema = node_schema();
        let registry = DispatchRegistry::with_defaults();
        let cache = RoutineCache::new();

        let epoch = cache.epoch();
        cache.invalidate();
        let stale = compile_decoder(&schema, &registry, &cache, epoch, "Node", CodecConfig::default())
            .expect("still callable");
        assert!(stale.call(&serde_json::json!({"value": 1, "next": null})).is_ok());
        assert_eq!(cache.len(), 0);

        compile_decoder(&schema, &registry, &cache, cache.epoch(), "Node", CodecConfig::default())
            .expect("compile");
        assert_eq!(cache.len(), 1);
    }
}
