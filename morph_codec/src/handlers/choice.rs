//! Optional, literal and enum positions.

use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use crate::schema::EnumType;
use crate::value::{EnumValue, Instance};
use morph_types::{Shape, TypeDescriptor};
use serde_json::Value;
use std::sync::Arc;

pub struct OptionalHandler;

impl TypeHandler for OptionalHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let inner = cx.decoder_for(&ty.arg(0).cloned().unwrap_or_else(TypeDescriptor::any))?;
        Ok(Arc::new(move |value: &Value| match value {
            Value::Null => Ok(Instance::Null),
            other => inner(other),
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let inner = cx.encoder_for(&ty.arg(0).cloned().unwrap_or_else(TypeDescriptor::any))?;
        Ok(Arc::new(move |value: &Instance| match value {
            Instance::Null => Ok(Value::Null),
            other => inner(other),
        }))
    }
}

/// Text form a literal is matched against when the input is a string.
fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

fn literal_expected(literals: &[Value]) -> String {
    let listed: Vec<String> = literals.iter().map(Value::to_string).collect();
    format!("one of [{}]", listed.join(", "))
}

pub struct LiteralHandler;

impl TypeHandler for LiteralHandler {
    fn decoder(&self, ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let literals = ty.literals.clone();
        let expected = literal_expected(&literals);
        Ok(Arc::new(move |value: &Value| {
            if literals.contains(value) {
                return Ok(Instance::from_scalar(value));
            }
            if let Value::String(text) = value {
                if let Some(found) = literals.iter().find(|l| literal_text(l) == *text) {
                    return Ok(Instance::from_scalar(found));
                }
            }
            Err(CodecError::invalid(expected.clone(), value))
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let literals = ty.literals.clone();
        let expected = literal_expected(&literals);
        Ok(Arc::new(move |value: &Instance| {
            let dynamic = value.to_dynamic();
            if literals.contains(&dynamic) {
                Ok(dynamic)
            } else {
                Err(CodecError::invalid(expected.clone(), &dynamic))
            }
        }))
    }
}

/* Enum: variants match by value, then by the text of the value, then by
 * variant name. Encoding writes the variant's value. */
pub struct EnumHandler;

impl TypeHandler for EnumHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let enum_type = Arc::clone(lookup(ty, cx)?);
        let expected = format!("a `{}` value", enum_type.name);
        Ok(Arc::new(move |value: &Value| {
            let variant = enum_type.by_value(value).or_else(|| {
                let text = value.as_str()?;
                enum_type
                    .variants
                    .iter()
                    .find(|(_, v)| literal_text(v) == text)
                    .or_else(|| enum_type.variants.iter().find(|(name, _)| name == text))
                    .map(|(name, _)| name.as_str())
            });
            let Some(variant) = variant else {
                return Err(CodecError::invalid(expected.clone(), value));
            };
            let value = enum_type.value_of(variant).cloned().unwrap_or(Value::Null);
            Ok(Instance::Enum(EnumValue {
                type_name: enum_type.name.clone(),
                variant: variant.to_string(),
                value,
            }))
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let enum_type = Arc::clone(lookup(ty, cx)?);
        let expected = format!("a `{}` value", enum_type.name);
        Ok(Arc::new(move |value: &Instance| match value {
            Instance::Enum(e) if e.type_name == enum_type.name => enum_type
                .value_of(&e.variant)
                .cloned()
                .ok_or_else(|| CodecError::invalid(expected.clone(), &e.value)),
            other => Err(CodecError::invalid(expected.clone(), &other.to_dynamic())),
        }))
    }
}

fn lookup<'s>(ty: &TypeDescriptor, cx: &CompileCx<'s>) -> CodecResult<&'s Arc<EnumType>> {
    let Shape::Enum(name) = &ty.shape else {
        return Err(CodecError::unsupported(ty.to_string()));
    };
    cx.schema()
        .enum_type(name)
        .ok_or_else(|| CodecError::new(ErrorKind::UnknownType { name: name.clone() }))
}
