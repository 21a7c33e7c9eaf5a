/* Decode and normalize commands */

use super::common::{load_codec, load_flat, load_value, print_value, Overrides};
use anyhow::Context;
use morph_codec::{Codec, Instance};
use std::path::Path;

/// Where the input of a conversion comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputForm {
    /// A JSON or YAML document.
    Document,
    /// `KEY=VALUE` lines, as found in env files.
    Flat,
}

fn decode_input(
    codec: &Codec,
    record: &str,
    input: &Path,
    form: InputForm,
    overrides: &Overrides,
) -> anyhow::Result<Instance> {
    let decoded = match form {
        InputForm::Document => {
            let value = load_value(input)?;
            codec.decode_with(record, &value, &overrides.to_config())
        }
        InputForm::Flat => {
            let entries = load_flat(input)?;
            codec.decode_flat_with(record, entries, &overrides.to_config())
        }
    };
    decoded.with_context(|| format!("failed to decode {} as {record}", input.display()))
}

/// Decodes `input` and prints the resulting record with its field names.
pub fn run_decode(
    schema: &Path,
    record: &str,
    input: &Path,
    form: InputForm,
    overrides: &Overrides,
    pretty: bool,
) -> anyhow::Result<()> {
    let codec = load_codec(schema)?;
    let instance = decode_input(&codec, record, input, form, overrides)?;
    print_value(&instance.to_dynamic(), pretty)
}

/// Decodes `input` and encodes it again, printing the canonical document.
pub fn run_normalize(
    schema: &Path,
    record: &str,
    input: &Path,
    form: InputForm,
    overrides: &Overrides,
    pretty: bool,
) -> anyhow::Result<()> {
    let codec = load_codec(schema)?;
    let instance = decode_input(&codec, record, input, form, overrides)?;
    let encoded = codec
        .encode_with(record, &instance, &overrides.to_config())
        .with_context(|| format!("failed to encode {record}"))?;
    print_value(&encoded, pretty)
}
