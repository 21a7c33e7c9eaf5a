/* Scalar handlers
 *
 * Strings are accepted for bool, int and float so that flat string maps
 * (environment variables, query strings) decode without a separate pass.
 * The string paths only run when the input value is itself a string.
 */

use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use crate::value::{float_value, Instance};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use morph_types::TypeDescriptor;
use serde_json::Value;
use std::sync::Arc;

fn mismatch(expected: &str, found: &Instance) -> CodecError {
    CodecError::invalid(expected, &found.to_dynamic())
}

pub struct NullHandler;

impl TypeHandler for NullHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| match value {
            Value::Null => Ok(Instance::Null),
            other => Err(CodecError::invalid("null", other)),
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Null => Ok(Value::Null),
            other => Err(mismatch("None", other)),
        }))
    }
}

pub struct BoolHandler;

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "y" | "t" => Some(true),
        "false" | "no" | "off" | "0" | "n" | "f" => Some(false),
        _ => None,
    }
}

pub(crate) fn decode_bool(value: &Value) -> CodecResult<Instance> {
    match value {
        Value::Bool(b) => Ok(Instance::Bool(*b)),
        Value::String(s) => parse_bool(s)
            .map(Instance::Bool)
            .ok_or_else(|| CodecError::invalid("a boolean", value)),
        other => Err(CodecError::invalid("a boolean", other)),
    }
}

impl TypeHandler for BoolHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(decode_bool))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(mismatch("bool", other)),
        }))
    }
}

pub struct IntHandler;

pub(crate) fn decode_int(value: &Value) -> CodecResult<Instance> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Instance::Int(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(Instance::Int(f as i64))
                }
                _ => Err(CodecError::invalid("an integer", value)),
            }
        }
        Value::String(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Instance::Int)
            .map_err(|_| CodecError::invalid("an integer", value)),
        other => Err(CodecError::invalid("an integer", other)),
    }
}

impl TypeHandler for IntHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(decode_int))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Int(i) => Ok(Value::from(*i)),
            other => Err(mismatch("int", other)),
        }))
    }
}

pub struct FloatHandler;

pub(crate) fn decode_float(value: &Value) -> CodecResult<Instance> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Instance::Float)
            .ok_or_else(|| CodecError::invalid("a number", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Instance::Float)
            .map_err(|_| CodecError::invalid("a number", value)),
        other => Err(CodecError::invalid("a number", other)),
    }
}

impl TypeHandler for FloatHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(decode_float))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Float(f) => Ok(float_value(*f)),
            Instance::Int(i) => Ok(Value::from(*i)),
            other => Err(mismatch("float", other)),
        }))
    }
}

pub struct StrHandler;

impl TypeHandler for StrHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| match value {
            Value::String(s) => Ok(Instance::Str(s.clone())),
            other => Err(CodecError::invalid("a string", other)),
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Str(s) => Ok(Value::String(s.clone())),
            other => Err(mismatch("str", other)),
        }))
    }
}

/* Bytes travel as base64 text; an array of octets is accepted too */
pub struct BytesHandler;

fn decode_bytes(value: &Value) -> CodecResult<Instance> {
    match value {
        Value::String(s) => BASE64
            .decode(s.trim())
            .map(Instance::Bytes)
            .map_err(|_| CodecError::invalid("base64 text", value)),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Instance::Bytes)
            .ok_or_else(|| CodecError::invalid("an array of octets", value)),
        other => Err(CodecError::invalid("base64 text", other)),
    }
}

impl TypeHandler for BytesHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(decode_bytes))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Bytes(b) => Ok(Value::String(BASE64.encode(b))),
            other => Err(mismatch("bytes", other)),
        }))
    }
}

/* Any: kept as a dynamic value; encodes through the generic fallback */
pub struct AnyHandler;

impl TypeHandler for AnyHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| Ok(Instance::Dynamic(value.clone()))))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| Ok(value.to_dynamic())))
    }
}
