//! Per-record codec settings and their merge rules.
//!
//! Every setting is optional so that an absent value can be told apart from
//! an explicit one. A record compiles under its *resolved* configuration:
//! its own settings, filled in from a propagating parent when that parent's
//! configuration is marked `recursive`.

use crate::casing::KeyCasing;
use crate::errors::{CodecError, CodecResult};
use crate::schema::RecordType;
use morph_types::ConfigDecl;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Discriminator key used when no configuration names one.
pub const DEFAULT_TAG_KEY: &str = "__tag__";

/// What to do with input keys that map to no declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnknownKeyPolicy {
    #[default]
    Ignore,
    Warn,
    Raise,
}

impl FromStr for UnknownKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(UnknownKeyPolicy::Ignore),
            "warn" => Ok(UnknownKeyPolicy::Warn),
            "raise" | "forbid" | "error" => Ok(UnknownKeyPolicy::Raise),
            other => Err(format!("unknown key policy `{other}`")),
        }
    }
}

impl fmt::Display for UnknownKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnknownKeyPolicy::Ignore => "ignore",
            UnknownKeyPolicy::Warn => "warn",
            UnknownKeyPolicy::Raise => "raise",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Discriminator {
    pub key: Option<String>,
    /// Untagged record arms are tagged with their type name.
    pub auto_tag: Option<bool>,
}

/// Codec settings. Equality and hashing are structural, so two configs
/// with the same settings share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CodecConfig {
    pub decode_casing: Option<KeyCasing>,
    pub encode_casing: Option<KeyCasing>,
    /// Field name to accepted input keys, tried in order.
    pub decode_aliases: BTreeMap<String, Vec<String>>,
    /// Field name to output key.
    pub encode_aliases: BTreeMap<String, String>,
    pub unknown_keys: Option<UnknownKeyPolicy>,
    pub discriminator: Option<Discriminator>,
    pub omit_none: Option<bool>,
    pub omit_default: Option<bool>,
    /// Write fields under their declared alias.
    pub encode_by_alias: Option<bool>,
    pub positional_as_map: Option<bool>,
    pub allow_ambiguous_unions: Option<bool>,
    /// Hand this configuration down to nested records.
    pub recursive: Option<bool>,
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decode_casing(mut self, casing: KeyCasing) -> Self {
        self.decode_casing = Some(casing);
        self
    }

    pub fn with_encode_casing(mut self, casing: KeyCasing) -> Self {
        self.encode_casing = Some(casing);
        self
    }

    pub fn with_decode_alias<I, S>(mut self, field: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decode_aliases
            .insert(field.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_encode_alias(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
        self.encode_aliases.insert(field.into(), key.into());
        self
    }

    pub fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = Some(policy);
        self
    }

    pub fn with_tag_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator.get_or_insert_with(Discriminator::default).key = Some(key.into());
        self
    }

    pub fn with_auto_tag(mut self, on: bool) -> Self {
        self.discriminator.get_or_insert_with(Discriminator::default).auto_tag = Some(on);
        self
    }

    pub fn with_omit_none(mut self, on: bool) -> Self {
        self.omit_none = Some(on);
        self
    }

    pub fn with_omit_default(mut self, on: bool) -> Self {
        self.omit_default = Some(on);
        self
    }

    pub fn with_encode_by_alias(mut self, on: bool) -> Self {
        self.encode_by_alias = Some(on);
        self
    }

    pub fn with_positional_as_map(mut self, on: bool) -> Self {
        self.positional_as_map = Some(on);
        self
    }

    pub fn with_ambiguous_unions(mut self, on: bool) -> Self {
        self.allow_ambiguous_unions = Some(on);
        self
    }

    pub fn with_recursive(mut self, on: bool) -> Self {
        self.recursive = Some(on);
        self
    }

    pub fn decode_casing(&self) -> KeyCasing {
        self.decode_casing.unwrap_or_default()
    }

    pub fn encode_casing(&self) -> KeyCasing {
        self.encode_casing.unwrap_or_default()
    }

    pub fn unknown_keys(&self) -> UnknownKeyPolicy {
        self.unknown_keys.unwrap_or_default()
    }

    /// Explicitly configured discriminator key, if any.
    pub fn tag_key(&self) -> Option<&str> {
        self.discriminator.as_ref()?.key.as_deref()
    }

    pub fn auto_tag(&self) -> bool {
        self.discriminator
            .as_ref()
            .and_then(|d| d.auto_tag)
            .unwrap_or(false)
    }

    pub fn omits_none(&self) -> bool {
        self.omit_none.unwrap_or(false)
    }

    pub fn omits_default(&self) -> bool {
        self.omit_default.unwrap_or(false)
    }

    pub fn encodes_by_alias(&self) -> bool {
        self.encode_by_alias.unwrap_or(false)
    }

    pub fn positional_as_map(&self) -> bool {
        self.positional_as_map.unwrap_or(false)
    }

    pub fn allows_ambiguous_unions(&self) -> bool {
        self.allow_ambiguous_unions.unwrap_or(false)
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive.unwrap_or(false)
    }

    /// `self` over `base`, every setting included. Used for caller
    /// overrides, where nothing is record-local.
    pub fn overlay(&self, base: &CodecConfig) -> CodecConfig {
        let mut decode_aliases = base.decode_aliases.clone();
        decode_aliases.extend(self.decode_aliases.clone());
        let mut encode_aliases = base.encode_aliases.clone();
        encode_aliases.extend(self.encode_aliases.clone());
        let discriminator = match (&self.discriminator, &base.discriminator) {
            (Some(own), Some(base)) => Some(Discriminator {
                key: own.key.clone().or_else(|| base.key.clone()),
                auto_tag: own.auto_tag.or(base.auto_tag),
            }),
            (own, base) => own.clone().or_else(|| base.clone()),
        };
        CodecConfig {
            decode_aliases,
            encode_aliases,
            discriminator,
            ..self.fill_from(base)
        }
    }

    /// Resolved configuration of a nested record whose own settings are
    /// `self`, under a parent compiling with `parent`. Only a recursive
    /// parent propagates, and it never hands down aliases or the
    /// discriminator.
    pub fn inherit(&self, parent: &CodecConfig) -> CodecConfig {
        if !parent.is_recursive() {
            return self.clone();
        }
        CodecConfig {
            decode_aliases: self.decode_aliases.clone(),
            encode_aliases: self.encode_aliases.clone(),
            discriminator: self.discriminator.clone(),
            ..self.fill_from(parent)
        }
    }

    fn fill_from(&self, other: &CodecConfig) -> CodecConfig {
        CodecConfig {
            decode_casing: self.decode_casing.or(other.decode_casing),
            encode_casing: self.encode_casing.or(other.encode_casing),
            decode_aliases: BTreeMap::new(),
            encode_aliases: BTreeMap::new(),
            unknown_keys: self.unknown_keys.or(other.unknown_keys),
            discriminator: None,
            omit_none: self.omit_none.or(other.omit_none),
            omit_default: self.omit_default.or(other.omit_default),
            encode_by_alias: self.encode_by_alias.or(other.encode_by_alias),
            positional_as_map: self.positional_as_map.or(other.positional_as_map),
            allow_ambiguous_unions: self.allow_ambiguous_unions.or(other.allow_ambiguous_unions),
            recursive: self.recursive.or(other.recursive),
        }
    }

    /// Checks that this configuration makes sense for `record`.
    pub fn validate_for(&self, record: &RecordType) -> CodecResult<()> {
        if self.encode_casing == Some(KeyCasing::CaseInsensitive) {
            return Err(CodecError::invalid_config(
                &record.name,
                "`case-insensitive` casing is only valid for decoding",
            ));
        }
        let aliased = self.decode_aliases.keys().chain(self.encode_aliases.keys());
        for field in aliased {
            if record.field(field).is_none() {
                return Err(CodecError::invalid_config(
                    &record.name,
                    format!("alias given for undeclared field `{field}`"),
                ));
            }
        }
        if let Some(key) = self.tag_key() {
            if key.is_empty() {
                return Err(CodecError::invalid_config(&record.name, "empty discriminator key"));
            }
        }
        Ok(())
    }

    /// Builds a configuration from its schema-document form.
    pub fn from_decl(record: &str, decl: &ConfigDecl) -> CodecResult<CodecConfig> {
        let casing = |text: &Option<String>| -> CodecResult<Option<KeyCasing>> {
            text.as_deref()
                .map(|t| t.parse::<KeyCasing>())
                .transpose()
                .map_err(|e| CodecError::invalid_config(record, e.to_string()))
        };
        let unknown_keys = decl
            .unknown_keys
            .as_deref()
            .map(str::parse::<UnknownKeyPolicy>)
            .transpose()
            .map_err(|e| CodecError::invalid_config(record, e))?;
        Ok(CodecConfig {
            decode_casing: casing(&decl.decode_casing)?,
            encode_casing: casing(&decl.encode_casing)?,
            decode_aliases: decl.decode_aliases.clone(),
            encode_aliases: decl.encode_aliases.clone(),
            unknown_keys,
            discriminator: decl.discriminator.as_ref().map(|d| Discriminator {
                key: d.key.clone(),
                auto_tag: d.auto_tag,
            }),
            omit_none: decl.omit_none,
            omit_default: decl.omit_default,
            encode_by_alias: decl.encode_by_alias,
            positional_as_map: decl.positional_as_map,
            allow_ambiguous_unions: decl.allow_ambiguous_unions,
            recursive: decl.recursive,
        })
    }
}
