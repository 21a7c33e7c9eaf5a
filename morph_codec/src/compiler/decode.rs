//! Record decoders: dynamic value in, `Instance::Record` out.

use super::{record_tag_key, CompileCx, NameScope};
use crate::config::{CodecConfig, UnknownKeyPolicy};
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::DecodeFn;
use crate::schema::{FieldDefault, FieldDescriptor, RecordKind, RecordType};
use crate::synth::{BlockKind, Location, Locals, RoutineDraft, Slot};
use crate::value::{Instance, RecordValue};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};

/* Where a field may be found in the input */
struct Locator {
    path: Option<Vec<String>>,
    keys: Vec<String>,
    insensitive: bool,
    index: Option<usize>,
}

impl Locator {
    fn new(field: &FieldDescriptor, config: &CodecConfig, index: Option<usize>) -> Self {
        let mut keys: Vec<String> = config
            .decode_aliases
            .get(&field.name)
            .cloned()
            .unwrap_or_default();
        if let Some(alias) = &field.alias {
            if !keys.contains(alias) {
                keys.push(alias.clone());
            }
        }
        if keys.is_empty() {
            keys.push(config.decode_casing().apply(&field.name));
        }
        Self {
            path: field.path.clone(),
            keys,
            insensitive: config.decode_casing() == crate::casing::KeyCasing::CaseInsensitive,
            index,
        }
    }

    fn locate(&self, input: &Value) -> Option<Location> {
        match input {
            Value::Array(items) => self.index.filter(|i| *i < items.len()).map(Location::Index),
            Value::Object(map) => {
                if let Some(path) = &self.path {
                    let location = Location::Path(path.clone());
                    return location.fetch(input).map(|_| location);
                }
                if let Some(key) = self.keys.iter().find(|k| map.contains_key(k.as_str())) {
                    return Some(Location::Key(key.clone()));
                }
                if self.insensitive {
                    for wanted in &self.keys {
                        let wanted = wanted.to_lowercase();
                        if let Some(found) = map.keys().find(|k| k.to_lowercase() == wanted) {
                            return Some(Location::Key(found.clone()));
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }
}

fn consumed_key(location: &Location) -> Option<&str> {
    match location {
        Location::Key(key) => Some(key),
        Location::Path(path) => path.first().map(String::as_str),
        Location::Index(_) => None,
    }
}

fn object_keys(input: &Value) -> Vec<String> {
    input
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn check_input(record: &str, input: &Value, positional: bool, arity: usize) -> CodecResult<()> {
    match input {
        Value::Null => Err(CodecError::new(ErrorKind::MissingData {
            record: record.to_string(),
        })),
        Value::Object(_) => Ok(()),
        Value::Array(items) if positional => {
            if items.len() > arity {
                Err(CodecError::invalid(
                    format!("at most {arity} element(s) for `{record}`"),
                    input,
                ))
            } else {
                Ok(())
            }
        }
        other if positional => Err(CodecError::invalid(
            format!("an array or object for `{record}`"),
            other,
        )),
        other => Err(CodecError::invalid(format!("an object for `{record}`"), other)),
    }
}

/// Emits the decoder of `record` into a new routine called `routine`.
pub(crate) fn build(cx: &mut CompileCx<'_>, record: &RecordType, routine: &str) -> CodecResult<()> {
    let config = cx.config().clone();
    let mut draft = cx.decoders_mut().open_routine(routine)?;
    let record_name: Arc<str> = Arc::from(record.name.as_str());
    let positional = record.kind == RecordKind::Positional;
    let tag_key = record_tag_key(record, &config);

    let arity = record.fields.len();
    let name = Arc::clone(&record_name);
    draft.emit(move |input, _| check_input(&name, input, positional, arity));

    let mut outputs: Vec<(String, usize)> = Vec::with_capacity(record.fields.len());
    let mut catch_all = None;
    for (index, field) in record.fields.iter().enumerate() {
        let previous = cx.enter_field(record, field);
        let decoder = cx.decoder_for(&field.ty);
        cx.leave_field(previous);
        let decoder = decoder.map_err(|e| e.at_key(&field.name))?;
        trace!(field = %NameScope::label(&record.name, &field.name), ty = %field.ty, "decode field");

        let slot = draft.allocate_slot();
        outputs.push((field.name.clone(), slot));
        if field.catch_all {
            catch_all = Some((field, slot, decoder));
            continue;
        }
        let index = positional.then_some(index);
        emit_field(&mut draft, record, field, &config, index, slot, decoder);
    }

    match catch_all {
        Some((field, slot, decoder)) => {
            emit_catch_all(&mut draft, &record_name, field, slot, decoder, tag_key);
        }
        None if config.unknown_keys() != UnknownKeyPolicy::Ignore => {
            emit_unknown_keys(&mut draft, &record_name, config.unknown_keys(), tag_key);
        }
        None => {}
    }

    let name = Arc::clone(&record_name);
    draft.finish(move |_, locals| {
        let missing = locals.take_missing();
        if !missing.is_empty() {
            return Err(CodecError::new(ErrorKind::MissingFields {
                record: name.to_string(),
                fields: missing,
            }));
        }
        let mut value = RecordValue::new(&*name);
        value.fields.reserve(outputs.len());
        for (field, slot) in &outputs {
            if let Slot::Instance(instance) = locals.take(*slot) {
                value.fields.push((field.clone(), instance));
            }
        }
        Ok(Instance::Record(value))
    });
    cx.decoders_mut().submit(draft);
    Ok(())
}

/* Field present: convert it. Absent: default, or record it as missing. */
fn emit_field(
    draft: &mut RoutineDraft<Value, Instance>,
    record: &RecordType,
    field: &FieldDescriptor,
    config: &CodecConfig,
    index: Option<usize>,
    slot: usize,
    decoder: DecodeFn,
) {
    let locator = Locator::new(field, config, index);
    draft.emit(move |input, locals| {
        if let Some(location) = locator.locate(input) {
            if let Some(key) = consumed_key(&location) {
                locals.consume(key);
            }
            locals.set(slot, Slot::Located(location));
        }
        Ok(())
    });

    let record_name = record.name.clone();
    let field_name = field.name.clone();
    let present = Arc::clone(&decoder);
    draft
        .block(BlockKind::when(move |_, locals: &Locals| !locals.is_vacant(slot)))
        .block(BlockKind::guard(move |err, _, _| Err(err.in_field(&record_name, &field_name))))
        .emit(move |input, locals| {
            let value = match locals.slot(slot) {
                Some(Slot::Located(location)) => location.fetch(input),
                _ => None,
            };
            if let Some(value) = value {
                let instance = present(value)?;
                locals.set(slot, Slot::Instance(instance));
            }
            Ok(())
        })
        .close_block()
        .otherwise();
    emit_absent(draft, record, field, slot, decoder);
    draft.close_block();
}

fn emit_absent(
    draft: &mut RoutineDraft<Value, Instance>,
    record: &RecordType,
    field: &FieldDescriptor,
    slot: usize,
    decoder: DecodeFn,
) {
    match &field.default {
        Some(FieldDefault::Value(default)) => {
            let default = default.clone();
            draft.emit(move |_, locals| {
                locals.set(slot, Slot::Instance(default.clone()));
                Ok(())
            });
        }
        Some(FieldDefault::Factory(factory)) => {
            let factory = Arc::clone(factory);
            draft.emit(move |_, locals| {
                locals.set(slot, Slot::Instance(factory()));
                Ok(())
            });
        }
        Some(FieldDefault::Declared(raw)) => {
            let raw = raw.clone();
            let decoded: Arc<OnceLock<Instance>> = Arc::new(OnceLock::new());
            let record_name = record.name.clone();
            let field_name = field.name.clone();
            draft.emit(move |_, locals| {
                let instance = match decoded.get() {
                    Some(instance) => instance.clone(),
                    None => {
                        let instance = decoder(&raw).map_err(|e| e.in_field(&record_name, &field_name))?;
                        let _ = decoded.set(instance.clone());
                        instance
                    }
                };
                locals.set(slot, Slot::Instance(instance));
                Ok(())
            });
        }
        None if field.is_required(record.kind) => {
            let field_name = field.name.clone();
            draft.emit(move |_, locals| {
                locals.mark_missing(field_name.as_str());
                Ok(())
            });
        }
        None => {}
    }
}

/* Every input key no declared field consumed, minus the discriminator,
 * gathered into an object and decoded as the catch-all mapping. */
fn emit_catch_all(
    draft: &mut RoutineDraft<Value, Instance>,
    record_name: &Arc<str>,
    field: &FieldDescriptor,
    slot: usize,
    decoder: DecodeFn,
    tag_key: Option<String>,
) {
    let owner = Arc::clone(record_name);
    let field_name = field.name.clone();
    draft
        .block(BlockKind::guard(move |err, _, _| Err(err.in_field(&owner, &field_name))))
        .emit(move |_, locals| {
            locals.set(slot, Slot::Dynamic(Value::Object(Map::new())));
            Ok(())
        })
        .block(BlockKind::for_each_key(|input: &Value, _| object_keys(input)))
        .block(BlockKind::when(move |_, locals: &Locals| {
            locals
                .current_key()
                .is_some_and(|key| !locals.is_consumed(key) && tag_key.as_deref() != Some(key))
        }))
        .emit(move |input, locals| {
            let Some(key) = locals.current_key().map(str::to_string) else {
                return Ok(());
            };
            let value = input.get(key.as_str()).cloned().unwrap_or(Value::Null);
            if let Slot::Dynamic(Value::Object(extra)) = locals.slot_mut(slot) {
                extra.insert(key, value);
            }
            Ok(())
        })
        .close_block()
        .close_block()
        .emit(move |_, locals| {
            if let Slot::Dynamic(extra) = locals.take(slot) {
                locals.set(slot, Slot::Instance(decoder(&extra)?));
            }
            Ok(())
        })
        .close_block();
}

fn emit_unknown_keys(
    draft: &mut RoutineDraft<Value, Instance>,
    record_name: &Arc<str>,
    policy: UnknownKeyPolicy,
    tag_key: Option<String>,
) {
    let owner = Arc::clone(record_name);
    draft
        .block(BlockKind::for_each_key(|input: &Value, _| object_keys(input)))
        .block(BlockKind::when(move |_, locals: &Locals| {
            locals
                .current_key()
                .is_some_and(|key| !locals.is_consumed(key) && tag_key.as_deref() != Some(key))
        }))
        .emit(move |_, locals| {
            let key = locals.current_key().unwrap_or_default();
            match policy {
                UnknownKeyPolicy::Raise => Err(CodecError::new(ErrorKind::UnknownKey {
                    record: owner.to_string(),
                    key: key.to_string(),
                })),
                UnknownKeyPolicy::Warn => {
                    warn!(record = %owner, key, "ignoring unknown key");
                    Ok(())
                }
                UnknownKeyPolicy::Ignore => Ok(()),
            }
        })
        .close_block()
        .close_block();
}
