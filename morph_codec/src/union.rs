/* Tagged-union resolution
 *
 * Arms are analysed once per compile: record arms get their tag (declared,
 * or the record name under auto-tagging) and compile with a configuration
 * that carries the discriminator key, so their encoders write it and their
 * decoders read past it.
 *
 * Decoding dispatches on the tag when the input carries a known one. An
 * unknown tag fails outright. Without a tag, arms whose shape matches the
 * runtime type of the input are tried first, then the rest in declaration
 * order. Encoding does the same with the runtime kind of the instance.
 */

use crate::compiler::CompileCx;
use crate::config::{CodecConfig, DEFAULT_TAG_KEY};
use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use crate::value::Instance;
use morph_types::{Primitive, Shape, TypeDescriptor};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

pub struct UnionHandler;

struct ArmPlan {
    ty: TypeDescriptor,
    label: String,
    record: Option<(String, CodecConfig)>,
    tag: Option<String>,
}

struct Plan {
    union: String,
    key: String,
    arms: Vec<ArmPlan>,
}

impl Plan {
    fn build(ty: &TypeDescriptor, cx: &CompileCx<'_>) -> CodecResult<Plan> {
        let key = cx
            .site()
            .and_then(|site| site.discriminator.clone())
            .or_else(|| cx.config().tag_key().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_TAG_KEY.to_string());
        let auto_tag = cx.config().auto_tag();

        let mut arms = Vec::with_capacity(ty.args.len());
        let mut untagged = Vec::new();
        let mut tags = HashSet::new();
        for arm in &ty.args {
            let mut plan = ArmPlan {
                ty: arm.clone(),
                label: arm.to_string(),
                record: None,
                tag: None,
            };
            if let Some(name) = arm.shape.record_name() {
                let mut config = cx.nested_config(name)?.with_tag_key(key.as_str());
                if auto_tag && config.discriminator.as_ref().and_then(|d| d.auto_tag).is_none() {
                    config = config.with_auto_tag(true);
                }
                let tag = cx
                    .schema()
                    .record(name)
                    .and_then(|record| record.effective_tag(&config));
                match &tag {
                    Some(tag) if !tags.insert(tag.clone()) => {
                        return Err(CodecError::invalid_config(
                            cx.owner(),
                            format!("union `{ty}` uses tag `{tag}` for more than one arm"),
                        ));
                    }
                    Some(_) => {}
                    None => untagged.push(name.to_string()),
                }
                plan.tag = tag;
                plan.record = Some((name.to_string(), config));
            }
            arms.push(plan);
        }

        if untagged.len() > 1 && !cx.config().allows_ambiguous_unions() {
            return Err(CodecError::invalid_config(
                cx.owner(),
                format!(
                    "union `{ty}` has untagged record arms {}; declare tags, enable auto-tag \
                     or allow ambiguous unions",
                    untagged.join(", ")
                ),
            ));
        }
        Ok(Plan {
            union: ty.to_string(),
            key,
            arms,
        })
    }

    fn is_tagged(&self) -> bool {
        self.arms.iter().any(|arm| arm.tag.is_some())
    }

    fn failure(&self, tag: Option<String>) -> CodecError {
        CodecError::new(ErrorKind::UnionMatch {
            union: self.union.clone(),
            arms: self.arms.iter().map(|arm| arm.label.clone()).collect(),
            tag_key: self.is_tagged().then(|| self.key.clone()),
            tag,
        })
    }
}

/// True when `value` has the runtime type an arm of this shape expects.
fn matches_value(ty: &TypeDescriptor, value: &Value) -> bool {
    match (&ty.shape, value) {
        (Shape::Primitive(Primitive::Null), Value::Null) => true,
        (Shape::Primitive(Primitive::Bool), Value::Bool(_)) => true,
        (Shape::Primitive(Primitive::Int), Value::Number(n)) => n.is_i64() || n.is_u64(),
        (Shape::Primitive(Primitive::Float), Value::Number(_)) => true,
        (Shape::Primitive(Primitive::Str), Value::String(_)) => true,
        (Shape::Sequence | Shape::Set | Shape::FixedTuple | Shape::VariadicTuple, Value::Array(_)) => true,
        (Shape::Mapping | Shape::DefaultMapping, Value::Object(_)) => true,
        (Shape::Literal, v) => ty.literals.contains(v),
        _ => false,
    }
}

/// True when `value` is the kind of instance an arm of this shape produces.
fn matches_instance(ty: &TypeDescriptor, value: &Instance) -> bool {
    match (&ty.shape, value) {
        (Shape::Primitive(prim), instance) => prim.name() == instance.kind_name(),
        (Shape::Record(name) | Shape::PositionalRecord(name) | Shape::KeyedRecord(name), Instance::Record(r)) => {
            *name == r.type_name
        }
        (Shape::Enum(name), Instance::Enum(e)) => *name == e.type_name,
        (Shape::Sequence, Instance::Seq(_)) => true,
        (Shape::Set, Instance::Set(_)) => true,
        (Shape::FixedTuple, Instance::Tuple(items)) => items.len() == ty.args.len(),
        (Shape::VariadicTuple, Instance::Tuple(_)) => true,
        (Shape::Mapping, Instance::Map(_)) => true,
        (Shape::DefaultMapping, Instance::DefaultMap { .. }) => true,
        (Shape::Literal, instance) => ty.literals.contains(&instance.to_dynamic()),
        _ => false,
    }
}

/// Arm indices in trial order: preferred arms first, then the rest.
fn trial_order(preferred: impl Fn(usize) -> bool, count: usize) -> Vec<usize> {
    let (mut first, rest): (Vec<usize>, Vec<usize>) = (0..count).partition(|&i| preferred(i));
    first.extend(rest);
    first
}

impl TypeHandler for UnionHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        let plan = Plan::build(ty, cx)?;
        let mut decoders = Vec::with_capacity(plan.arms.len());
        for arm in &plan.arms {
            let decode = match &arm.record {
                Some((name, config)) => cx.record_decoder_with(name, config.clone())?,
                None => cx.decoder_for(&arm.ty)?,
            };
            decoders.push(decode);
        }
        let plan = Arc::new(plan);

        Ok(Arc::new(move |value: &Value| {
            let tag = plan
                .is_tagged()
                .then(|| value.get(plan.key.as_str()).and_then(Value::as_str))
                .flatten();
            if let Some(tag) = tag {
                return match plan.arms.iter().position(|arm| arm.tag.as_deref() == Some(tag)) {
                    Some(i) => decoders[i](value),
                    None => Err(plan.failure(Some(tag.to_string()))),
                };
            }
            for i in trial_order(|i| matches_value(&plan.arms[i].ty, value), plan.arms.len()) {
                match decoders[i](value) {
                    Ok(instance) => return Ok(instance),
                    Err(err) => trace!(arm = %plan.arms[i].label, error = %err, "union arm rejected"),
                }
            }
            Err(plan.failure(None))
        }))
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        let plan = Plan::build(ty, cx)?;
        let mut encoders = Vec::with_capacity(plan.arms.len());
        for arm in &plan.arms {
            let encode = match &arm.record {
                Some((name, config)) => cx.record_encoder_with(name, config.clone())?,
                None => cx.encoder_for(&arm.ty)?,
            };
            encoders.push(encode);
        }
        let plan = Arc::new(plan);

        Ok(Arc::new(move |value: &Instance| {
            let order = trial_order(|i| matches_instance(&plan.arms[i].ty, value), plan.arms.len());
            for i in order {
                match encoders[i](value) {
                    Ok(encoded) => return Ok(encoded),
                    Err(err) => trace!(arm = %plan.arms[i].label, error = %err, "union arm rejected"),
                }
            }
            Err(plan.failure(None))
        }))
    }
}
