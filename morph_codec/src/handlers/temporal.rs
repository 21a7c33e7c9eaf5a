/* Temporal handlers
 *
 * ISO-8601 text is the fast path. Numbers, or numeric text, fall back to
 * Unix timestamps in seconds (UTC) for date and datetime, seconds since
 * midnight for time, and seconds for timedelta.
 */

use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use crate::value::{duration_seconds, Instance};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use morph_types::TypeDescriptor;
use serde_json::Value;
use std::sync::Arc;

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn from_timestamp(seconds: f64) -> Option<DateTime<FixedOffset>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999)).map(|dt| dt.fixed_offset())
}

pub(crate) fn parse_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    if let Value::String(text) = value {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt);
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Some(naive.and_utc().fixed_offset());
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(date.and_time(NaiveTime::MIN).and_utc().fixed_offset());
        }
    }
    numeric(value).and_then(from_timestamp)
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    if let Value::String(text) = value {
        if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    parse_datetime(value).map(|dt| dt.date_naive())
}

fn parse_time(value: &Value) -> Option<NaiveTime> {
    if let Value::String(text) = value {
        let text = text.trim();
        for format in ["%H:%M:%S%.f", "%H:%M"] {
            if let Ok(time) = NaiveTime::parse_from_str(text, format) {
                return Some(time);
            }
        }
    }
    let seconds = numeric(value)?;
    if !(0.0..86_400.0).contains(&seconds) {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(whole as u32, nanos.min(999_999_999))
}

/* `P[n]W[n]DT[n]H[n]M[n]S`; years and months have no fixed length */
fn parse_iso_duration(text: &str) -> Option<TimeDelta> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P').or_else(|| rest.strip_prefix('p'))?;
    let mut total = 0f64;
    let mut in_time = false;
    let mut number = String::new();
    let mut any = false;
    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' if number.is_empty() => in_time = true,
            '0'..='9' | '.' | ',' => number.push(if c == ',' { '.' } else { c }),
            unit => {
                let amount: f64 = number.parse().ok()?;
                number.clear();
                let scale = match (unit, in_time) {
                    ('W', false) => 604_800.0,
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return None,
                };
                total += amount * scale;
                any = true;
            }
        }
    }
    if !number.is_empty() || !any {
        return None;
    }
    let delta = delta_of_seconds(total)?;
    Some(if negative { -delta } else { delta })
}

fn delta_of_seconds(seconds: f64) -> Option<TimeDelta> {
    let micros = (seconds * 1e6).round();
    if !micros.is_finite() || micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return None;
    }
    Some(TimeDelta::microseconds(micros as i64))
}

fn parse_duration(value: &Value) -> Option<TimeDelta> {
    if let Value::String(text) = value {
        if let Some(delta) = parse_iso_duration(text.trim()) {
            return Some(delta);
        }
    }
    delta_of_seconds(numeric(value)?)
}

fn mismatch(expected: &str, found: &Instance) -> CodecError {
    CodecError::invalid(expected, &found.to_dynamic())
}

pub struct DateHandler;

impl TypeHandler for DateHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| {
            parse_date(value)
                .map(Instance::Date)
                .ok_or_else(|| CodecError::invalid("an ISO-8601 date", value))
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Date(d) => Ok(Value::String(d.format("%Y-%m-%d").to_string())),
            other => Err(mismatch("date", other)),
        }))
    }
}

pub struct TimeHandler;

impl TypeHandler for TimeHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| {
            parse_time(value)
                .map(Instance::Time)
                .ok_or_else(|| CodecError::invalid("an ISO-8601 time", value))
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Time(t) => Ok(Value::String(t.to_string())),
            other => Err(mismatch("time", other)),
        }))
    }
}

pub struct DateTimeHandler;

impl TypeHandler for DateTimeHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| {
            parse_datetime(value)
                .map(Instance::DateTime)
                .ok_or_else(|| CodecError::invalid("an ISO-8601 datetime or timestamp", value))
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::DateTime(dt) => Ok(Value::String(dt.to_rfc3339())),
            other => Err(mismatch("datetime", other)),
        }))
    }
}

pub struct DurationHandler;

impl TypeHandler for DurationHandler {
    fn decoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        Ok(Arc::new(|value: &Value| {
            parse_duration(value)
                .map(Instance::Duration)
                .ok_or_else(|| CodecError::invalid("seconds or an ISO-8601 duration", value))
        }))
    }

    fn encoder(&self, _ty: &TypeDescriptor, _cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        Ok(Arc::new(|value: &Instance| match value {
            Instance::Duration(d) => Ok(duration_seconds(*d)),
            other => Err(mismatch("timedelta", other)),
        }))
    }
}
