/* Shared helpers for loading documents and printing results */

use anyhow::{Context, Result};
use morph_codec::{Codec, CodecConfig, KeyCasing, UnknownKeyPolicy};
use morph_types::SchemaFile;
use serde_json::Value;
use std::path::Path;

/* JSON when the extension says so, YAML otherwise (YAML also reads JSON) */
fn is_json(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

pub fn load_schema(path: &Path) -> Result<SchemaFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    let file = if is_json(path) {
        SchemaFile::from_json_str(&text)
    } else {
        SchemaFile::from_yaml_str(&text)
    };
    file.with_context(|| format!("invalid schema document {}", path.display()))
}

pub fn load_codec(path: &Path) -> Result<Codec> {
    let file = load_schema(path)?;
    Codec::from_file(&file).with_context(|| format!("cannot build codec from {}", path.display()))
}

pub fn load_value(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    parse_value(&text, is_json(path)).with_context(|| format!("invalid input {}", path.display()))
}

pub fn parse_value(text: &str, json: bool) -> Result<Value> {
    if json {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(serde_yml::from_str(text)?)
    }
}

/* Reads `KEY=VALUE` lines; blank lines and `#` comments are skipped */
pub fn load_flat(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    parse_flat(&text)
}

pub fn parse_flat(text: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            anyhow::bail!("line {}: expected KEY=VALUE", lineno + 1);
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        entries.push((key.trim().to_string(), value.to_string()));
    }
    Ok(entries)
}

pub fn parse_casing(text: &str) -> Result<KeyCasing, String> {
    text.parse().map_err(|e: morph_codec::casing::UnknownCasing| e.to_string())
}

pub fn parse_policy(text: &str) -> Result<UnknownKeyPolicy, String> {
    text.parse()
}

/// Settings given on the command line, layered over each record's own.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub decode_casing: Option<KeyCasing>,
    pub encode_casing: Option<KeyCasing>,
    pub unknown_keys: Option<UnknownKeyPolicy>,
    pub omit_default: bool,
}

impl Overrides {
    pub fn to_config(&self) -> CodecConfig {
        let mut config = CodecConfig::new();
        if let Some(casing) = self.decode_casing {
            config = config.with_decode_casing(casing);
        }
        if let Some(casing) = self.encode_casing {
            config = config.with_encode_casing(casing);
        }
        if let Some(policy) = self.unknown_keys {
            config = config.with_unknown_keys(policy);
        }
        if self.omit_default {
            config = config.with_omit_default(true);
        }
        config
    }
}

pub fn print_value(value: &Value, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_lines_are_parsed() {
        let entries = parse_flat("# app\nexport PORT=8080\n\nNAME=\"demo app\"\nEMPTY=\n").expect("parse");
        assert_eq!(
            entries,
            vec![
                ("PORT".to_string(), "8080".to_string()),
                ("NAME".to_string(), "demo app".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
        assert!(parse_flat("no equals sign").is_err());
    }

    #[test]
    fn overrides_only_set_what_was_given() {
        let overrides = Overrides {
            decode_casing: Some(KeyCasing::Camel),
            ..Overrides::default()
        };
        let config = overrides.to_config();
        assert_eq!(config.decode_casing, Some(KeyCasing::Camel));
        assert_eq!(config.encode_casing, None);
        assert_eq!(config.omit_default, None);
    }
}
