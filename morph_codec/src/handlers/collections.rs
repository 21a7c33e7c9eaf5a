/* Container handlers
 *
 * Element closures are compiled once, at handler time, and captured by the
 * container closure. Errors from an element get its index or key prepended
 * to their path.
 */

use super::split_list;
use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use crate::value::Instance;
use morph_types::{Primitive, Shape, TypeDescriptor};
use serde_json::{Map, Value};
use std::sync::Arc;

fn element_type(ty: &TypeDescriptor, index: usize) -> TypeDescriptor {
    ty.arg(index).cloned().unwrap_or_else(TypeDescriptor::any)
}

/// Items of a list-like input. Text is split on commas.
fn list_items(value: &Value, expected: &str) -> CodecResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(text) => Ok(split_list(text)
            .into_iter()
            .map(|item| Value::String(item.to_string()))
            .collect()),
        other => Err(CodecError::invalid(expected, other)),
    }
}

fn decode_items(items: &[Value], decode: &DecodeFn) -> CodecResult<Vec<Instance>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| decode(item).map_err(|e| e.at_index(i)))
        .collect()
}

fn encode_items(items: &[Instance], encode: &EncodeFn) -> CodecResult<Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| encode(item).map_err(|e| e.at_index(i)))
        .collect::<CodecResult<Vec<_>>>()
        .map(Value::Array)
}

fn list_like(value: &Instance) -> Option<&[Instance]> {
    match value {
        Instance::Seq(items) | Instance::Set(items) | Instance::Tuple(items) => Some(items),
        _ => None,
    }
}

fn list_encoder(expected: &'static str, encode: EncodeFn) -> EncodeFn {
    Arc::new(move |value: &Instance| match list_like(value) {
        Some(items) => encode_items(items, &encode),
        None => Err(CodecError::invalid(expected, &value.to_dynamic())),
    })
}

pub struct SequenceHandler;

impl TypeHandler for SequenceHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let item = cx.decoder_for(&element_type(ty, 0))?;
        Ok(Arc::new(move |value: &Value| {
            let items = list_items(value, "a list")?;
            decode_items(&items, &item).map(Instance::Seq)
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let item = cx.encoder_for(&element_type(ty, 0))?;
        Ok(list_encoder("a list", item))
    }
}

pub struct SetHandler;

fn unique(items: Vec<Instance>) -> Vec<Instance> {
    let mut out: Vec<Instance> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl TypeHandler for SetHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let item = cx.decoder_for(&element_type(ty, 0))?;
        Ok(Arc::new(move |value: &Value| {
            let items = list_items(value, "a set")?;
            decode_items(&items, &item).map(|items| Instance::Set(unique(items)))
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let item = cx.encoder_for(&element_type(ty, 0))?;
        Ok(list_encoder("a set", item))
    }
}

/* tuple[A, B, C]: one closure per position, length must match */
pub struct TupleHandler;

impl TypeHandler for TupleHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let items = ty
            .args
            .iter()
            .map(|arg| cx.decoder_for(arg))
            .collect::<CodecResult<Vec<_>>>()?;
        let expected = format!("a tuple of {} items", items.len());
        Ok(Arc::new(move |value: &Value| {
            let values = list_items(value, &expected)?;
            if values.len() != items.len() {
                return Err(CodecError::invalid(expected.clone(), value));
            }
            values
                .iter()
                .zip(items.iter())
                .enumerate()
                .map(|(i, (v, decode))| decode(v).map_err(|e| e.at_index(i)))
                .collect::<CodecResult<Vec<_>>>()
                .map(Instance::Tuple)
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let items = ty
            .args
            .iter()
            .map(|arg| cx.encoder_for(arg))
            .collect::<CodecResult<Vec<_>>>()?;
        let expected = format!("a tuple of {} items", items.len());
        Ok(Arc::new(move |value: &Instance| {
            let values = match list_like(value) {
                Some(values) if values.len() == items.len() => values,
                _ => return Err(CodecError::invalid(expected.clone(), &value.to_dynamic())),
            };
            values
                .iter()
                .zip(items.iter())
                .enumerate()
                .map(|(i, (v, encode))| encode(v).map_err(|e| e.at_index(i)))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array)
        }))
    }
}

pub struct VariadicTupleHandler;

impl TypeHandler for VariadicTupleHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let item = cx.decoder_for(&element_type(ty, 0))?;
        Ok(Arc::new(move |value: &Value| {
            let items = list_items(value, "a tuple")?;
            decode_items(&items, &item).map(Instance::Tuple)
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let item = cx.encoder_for(&element_type(ty, 0))?;
        Ok(list_encoder("a tuple", item))
    }
}

/// Key/value pairs of a mapping input; text takes the `k=v,k2=v2` form.
fn map_entries(value: &Value) -> CodecResult<Vec<(String, Value)>> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::String(text) => split_list(text)
            .into_iter()
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => Ok((k.trim().to_string(), Value::String(v.trim().to_string()))),
                None => Err(CodecError::invalid("`key=value` pairs", value)),
            })
            .collect(),
        other => Err(CodecError::invalid("a mapping", other)),
    }
}

fn decode_entries(value: &Value, key: &DecodeFn, item: &DecodeFn) -> CodecResult<Vec<(Instance, Instance)>> {
    map_entries(value)?
        .into_iter()
        .map(|(k, v)| {
            let decoded_key = key(&Value::String(k.clone())).map_err(|e| e.at_key(k.as_str()))?;
            let decoded = item(&v).map_err(|e| e.at_key(k.as_str()))?;
            Ok((decoded_key, decoded))
        })
        .collect()
}

fn encode_entries(entries: &[(Instance, Instance)], key: &EncodeFn, item: &EncodeFn) -> CodecResult<Value> {
    let mut out = Map::new();
    for (k, v) in entries {
        let label = k.key_string();
        let encoded_key = match key(k).map_err(|e| e.at_key(label.as_str()))? {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let encoded = item(v).map_err(|e| e.at_key(label.as_str()))?;
        out.insert(encoded_key, encoded);
    }
    Ok(Value::Object(out))
}

fn mapping_closures(ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<(DecodeFn, DecodeFn)> {
    Ok((cx.decoder_for(&element_type(ty, 0))?, cx.decoder_for(&element_type(ty, 1))?))
}

fn mapping_encoders(ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<(EncodeFn, EncodeFn)> {
    Ok((cx.encoder_for(&element_type(ty, 0))?, cx.encoder_for(&element_type(ty, 1))?))
}

pub struct MappingHandler;

impl TypeHandler for MappingHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let (key, item) = mapping_closures(ty, cx)?;
        Ok(Arc::new(move |value: &Value| decode_entries(value, &key, &item).map(Instance::Map)))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let (key, item) = mapping_encoders(ty, cx)?;
        Ok(Arc::new(move |value: &Instance| match value.map_entries() {
            Some(entries) => encode_entries(entries, &key, &item),
            None => Err(CodecError::invalid("a mapping", &value.to_dynamic())),
        }))
    }
}

/// Value a default-factory mapping produces for keys it does not hold.
pub(crate) fn zero_of(ty: &TypeDescriptor) -> Instance {
    match &ty.shape {
        Shape::Primitive(Primitive::Bool) => Instance::Bool(false),
        Shape::Primitive(Primitive::Int) => Instance::Int(0),
        Shape::Primitive(Primitive::Float) => Instance::Float(0.0),
        Shape::Primitive(Primitive::Str) => Instance::Str(String::new()),
        Shape::Primitive(Primitive::Bytes) => Instance::Bytes(Vec::new()),
        Shape::Sequence => Instance::Seq(Vec::new()),
        Shape::Set => Instance::Set(Vec::new()),
        Shape::VariadicTuple => Instance::Tuple(Vec::new()),
        Shape::Mapping => Instance::Map(Vec::new()),
        Shape::DefaultMapping => Instance::DefaultMap {
            entries: Vec::new(),
            default: Box::new(zero_of(&element_type(ty, 1))),
        },
        _ => Instance::Null,
    }
}

pub struct DefaultMappingHandler;

impl TypeHandler for DefaultMappingHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let (key, item) = mapping_closures(ty, cx)?;
        let default = zero_of(&element_type(ty, 1));
        Ok(Arc::new(move |value: &Value| {
            let entries = decode_entries(value, &key, &item)?;
            Ok(Instance::DefaultMap {
                entries,
                default: Box::new(default.clone()),
            })
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let (key, item) = mapping_encoders(ty, cx)?;
        Ok(Arc::new(move |value: &Instance| match value.map_entries() {
            Some(entries) => encode_entries(entries, &key, &item),
            None => Err(CodecError::invalid("a mapping", &value.to_dynamic())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_text_is_split() {
        let items = list_items(&json!("a, b,c"), "a list").expect("split");
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
        assert!(list_items(&json!(""), "a list").expect("empty").is_empty());
        assert!(list_items(&json!(3), "a list").is_err());
    }

    #[test]
    fn mapping_text_is_paired() {
        let entries = map_entries(&json!("a=1, b = two")).expect("pairs");
        assert_eq!(entries[0], ("a".to_string(), json!("1")));
        assert_eq!(entries[1], ("b".to_string(), json!("two")));
        assert!(map_entries(&json!("a")).is_err());
    }

    #[test]
    fn sets_drop_duplicates_in_order() {
        let items = unique(vec![Instance::Int(2), Instance::Int(1), Instance::Int(2)]);
        assert_eq!(items, vec![Instance::Int(2), Instance::Int(1)]);
    }

    #[test]
    fn zero_values() {
        let ty: TypeDescriptor = "list[int]".parse().expect("parse");
        assert_eq!(zero_of(&ty), Instance::Seq(Vec::new()));
        assert_eq!(zero_of(&TypeDescriptor::primitive(Primitive::Int)), Instance::Int(0));
        assert_eq!(zero_of(&TypeDescriptor::named("Node")), Instance::Null);
    }
}
