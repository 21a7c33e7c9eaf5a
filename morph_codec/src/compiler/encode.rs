//! Record encoders: `Instance::Record` in, dynamic value out.

use super::{record_tag_key, CompileCx, NameScope};
use crate::config::CodecConfig;
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::EncodeFn;
use crate::schema::{DefaultFactory, FieldDefault, FieldDescriptor, RecordKind, RecordType, SkipPredicate};
use crate::synth::{BlockKind, Locals, RoutineDraft, Slot};
use crate::value::Instance;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

/* Where a field is written */
enum Target {
    Key(String),
    Path(Vec<String>),
    /// Next element of a positional array.
    Append,
}

impl Target {
    fn new(field: &FieldDescriptor, config: &CodecConfig, as_array: bool) -> Self {
        if as_array {
            return Target::Append;
        }
        if let Some(path) = &field.path {
            return Target::Path(path.clone());
        }
        if let Some(key) = config.encode_aliases.get(&field.name) {
            return Target::Key(key.clone());
        }
        match &field.alias {
            Some(alias) if config.encodes_by_alias() => Target::Key(alias.clone()),
            _ => Target::Key(config.encode_casing().apply(&field.name)),
        }
    }

    fn write(&self, out: &mut Value, value: Value) {
        match (self, out) {
            (Target::Append, Value::Array(items)) => items.push(value),
            (Target::Key(key), Value::Object(map)) => {
                map.insert(key.clone(), value);
            }
            (Target::Path(path), Value::Object(map)) => write_path(map, path, value),
            _ => {}
        }
    }
}

fn write_path(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = map;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

enum DefaultValue {
    Instance(Instance),
    Factory(DefaultFactory),
    Declared(Value),
}

impl DefaultValue {
    fn of(field: &FieldDescriptor) -> Option<Self> {
        match field.default.as_ref()? {
            FieldDefault::Value(v) => Some(DefaultValue::Instance(v.clone())),
            FieldDefault::Factory(f) => Some(DefaultValue::Factory(Arc::clone(f))),
            FieldDefault::Declared(raw) => Some(DefaultValue::Declared(raw.clone())),
        }
    }

    fn encode(&self, encoder: &EncodeFn) -> CodecResult<Value> {
        match self {
            DefaultValue::Instance(v) => encoder(v),
            DefaultValue::Factory(f) => encoder(&f()),
            DefaultValue::Declared(raw) => Ok(raw.clone()),
        }
    }
}

/* Omission rules of one field; any true condition skips it */
struct SkipCheck {
    if_none: bool,
    if_default: bool,
    default: Option<DefaultValue>,
    when: Option<SkipPredicate>,
}

impl SkipCheck {
    fn new(field: &FieldDescriptor, config: &CodecConfig) -> Self {
        Self {
            if_none: field.skip.if_none || config.omits_none(),
            if_default: field.skip.if_default || config.omits_default(),
            default: DefaultValue::of(field),
            when: field.skip.when.clone(),
        }
    }

    /// Checks that need only the runtime value.
    fn skips(&self, value: &Instance) -> bool {
        if self.if_none && value.is_null() {
            return true;
        }
        if self.if_default {
            let equal = match &self.default {
                Some(DefaultValue::Instance(default)) => value == default,
                Some(DefaultValue::Factory(factory)) => *value == factory(),
                _ => false,
            };
            if equal {
                return true;
            }
        }
        self.when.as_ref().is_some_and(|when| when(value))
    }

    /// Declared defaults are compared in their dynamic form.
    fn skips_encoded(&self, encoded: &Value) -> bool {
        match &self.default {
            Some(DefaultValue::Declared(raw)) => self.if_default && raw == encoded,
            _ => false,
        }
    }
}

fn field_of<'a>(input: &'a Instance, name: &str) -> Option<&'a Instance> {
    input.as_record()?.get(name)
}

/// Emits the encoder of `record` into a new routine called `routine`.
pub(crate) fn build(cx: &mut CompileCx<'_>, record: &RecordType, routine: &str) -> CodecResult<()> {
    let config = cx.config().clone();
    let mut draft = cx.encoders_mut().open_routine(routine)?;
    let record_name: Arc<str> = Arc::from(record.name.as_str());
    let as_array = record.kind == RecordKind::Positional && !config.positional_as_map();
    let out = draft.allocate_slot();

    let name = Arc::clone(&record_name);
    draft.emit(move |input, locals| {
        match input {
            Instance::Record(r) if *r.type_name == *name => {}
            other => {
                return Err(CodecError::invalid(
                    format!("a `{name}` record"),
                    &other.to_dynamic(),
                ))
            }
        }
        let empty = if as_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
        locals.set(out, Slot::Dynamic(empty));
        Ok(())
    });

    /* Only a configured discriminator key makes a record write its tag,
     * which is how union arms are compiled. */
    if !as_array && config.tag_key().is_some() {
        if let (Some(key), Some(tag)) = (record_tag_key(record, &config), record.effective_tag(&config)) {
            draft.emit(move |_, locals| {
                if let Slot::Dynamic(Value::Object(map)) = locals.slot_mut(out) {
                    map.insert(key.clone(), Value::String(tag.clone()));
                }
                Ok(())
            });
        }
    }

    let mut catch_all = None;
    for field in &record.fields {
        if field.skip.always && !as_array {
            continue;
        }
        let previous = cx.enter_field(record, field);
        let encoder = cx.encoder_for(&field.ty);
        cx.leave_field(previous);
        let encoder = encoder.map_err(|e| e.at_key(&field.name))?;
        trace!(field = %NameScope::label(&record.name, &field.name), ty = %field.ty, "encode field");

        if field.catch_all {
            catch_all = Some((field, encoder));
            continue;
        }
        if as_array {
            emit_element(&mut draft, record, field, out, encoder);
        } else {
            emit_field(&mut draft, record, field, &config, out, encoder);
        }
    }
    if let Some((field, encoder)) = catch_all {
        emit_splat(&mut draft, &record_name, field, out, encoder);
    }

    let name = Arc::clone(&record_name);
    let routine_name = routine.to_string();
    draft.finish(move |_, locals| {
        let missing = locals.take_missing();
        if !missing.is_empty() {
            return Err(CodecError::new(ErrorKind::MissingFields {
                record: name.to_string(),
                fields: missing,
            }));
        }
        match locals.take(out) {
            Slot::Dynamic(value) => Ok(value),
            _ => Err(CodecError::new(ErrorKind::MalformedRoutine {
                routine: routine_name.clone(),
                reason: "output was never initialized".to_string(),
            })),
        }
    });
    cx.encoders_mut().submit(draft);
    Ok(())
}

fn emit_missing_check(draft: &mut RoutineDraft<Instance, Value>, record: &RecordType, field: &FieldDescriptor) {
    if !field.is_required(record.kind) {
        return;
    }
    let field_name = field.name.clone();
    draft.emit(move |input, locals| {
        if field_of(input, &field_name).is_none() {
            locals.mark_missing(field_name.as_str());
        }
        Ok(())
    });
}

fn emit_field(
    draft: &mut RoutineDraft<Instance, Value>,
    record: &RecordType,
    field: &FieldDescriptor,
    config: &CodecConfig,
    out: usize,
    encoder: EncodeFn,
) {
    emit_missing_check(draft, record, field);

    let skip = Arc::new(SkipCheck::new(field, config));
    let target = Target::new(field, config, false);
    let cond_field = field.name.clone();
    let cond_skip = Arc::clone(&skip);
    let record_name = record.name.clone();
    let guard_field = field.name.clone();
    let field_name = field.name.clone();
    draft
        .block(BlockKind::when(move |input: &Instance, _: &Locals| {
            field_of(input, &cond_field).is_some_and(|value| !cond_skip.skips(value))
        }))
        .block(BlockKind::guard(move |err, _, _| Err(err.in_field(&record_name, &guard_field))))
        .emit(move |input, locals| {
            let Some(value) = field_of(input, &field_name) else {
                return Ok(());
            };
            let encoded = encoder(value)?;
            if skip.skips_encoded(&encoded) {
                return Ok(());
            }
            if let Slot::Dynamic(out) = locals.slot_mut(out) {
                target.write(out, encoded);
            }
            Ok(())
        })
        .close_block()
        .close_block();
}

/* Positional records: every field takes its place, absent ones as their
 * encoded default. */
fn emit_element(
    draft: &mut RoutineDraft<Instance, Value>,
    record: &RecordType,
    field: &FieldDescriptor,
    out: usize,
    encoder: EncodeFn,
) {
    emit_missing_check(draft, record, field);

    let default = DefaultValue::of(field);
    let record_name = record.name.clone();
    let guard_field = field.name.clone();
    let field_name = field.name.clone();
    draft
        .block(BlockKind::guard(move |err, _, _| Err(err.in_field(&record_name, &guard_field))))
        .emit(move |input, locals| {
            let encoded = match (field_of(input, &field_name), &default) {
                (Some(value), _) => encoder(value)?,
                (None, Some(default)) => default.encode(&encoder)?,
                (None, None) => Value::Null,
            };
            if let Slot::Dynamic(out) = locals.slot_mut(out) {
                Target::Append.write(out, encoded);
            }
            Ok(())
        })
        .close_block();
}

/* The catch-all mapping lands at the top level; declared keys win. */
fn emit_splat(
    draft: &mut RoutineDraft<Instance, Value>,
    record_name: &Arc<str>,
    field: &FieldDescriptor,
    out: usize,
    encoder: EncodeFn,
) {
    let owner = Arc::clone(record_name);
    let guard_field = field.name.clone();
    let field_name = field.name.clone();
    draft
        .block(BlockKind::guard(move |err, _, _| Err(err.in_field(&owner, &guard_field))))
        .emit(move |input, locals| {
            let Some(value) = field_of(input, &field_name) else {
                return Ok(());
            };
            let Value::Object(extra) = encoder(value)? else {
                return Err(CodecError::invalid("a mapping", &value.to_dynamic()));
            };
            if let Slot::Dynamic(Value::Object(map)) = locals.slot_mut(out) {
                for (key, value) in extra {
                    if !map.contains_key(&key) {
                        map.insert(key, value);
                    }
                }
            }
            Ok(())
        })
        .close_block();
}
