use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How field names map to keys in the dynamic representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyCasing {
    /// Keys are the field names, unchanged.
    #[default]
    Preserve,
    Snake,
    Camel,
    Pascal,
    Kebab,
    ScreamingSnake,
    /// Decode-only: the field name matched against input keys ignoring case.
    CaseInsensitive,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown key casing `{0}`")]
pub struct UnknownCasing(pub String);

impl KeyCasing {
    pub fn name(self) -> &'static str {
        match self {
            KeyCasing::Preserve => "preserve",
            KeyCasing::Snake => "snake",
            KeyCasing::Camel => "camel",
            KeyCasing::Pascal => "pascal",
            KeyCasing::Kebab => "kebab",
            KeyCasing::ScreamingSnake => "screaming-snake",
            KeyCasing::CaseInsensitive => "case-insensitive",
        }
    }

    /// Key spelling of `field` under this casing.
    pub fn apply(self, field: &str) -> String {
        match self {
            KeyCasing::Preserve | KeyCasing::CaseInsensitive => field.to_string(),
            KeyCasing::Snake => words(field).join("_"),
            KeyCasing::Kebab => words(field).join("-"),
            KeyCasing::ScreamingSnake => words(field)
                .iter()
                .map(|w| w.to_uppercase())
                .collect::<Vec<_>>()
                .join("_"),
            KeyCasing::Camel => {
                let mut out = String::new();
                for (idx, word) in words(field).iter().enumerate() {
                    if idx == 0 {
                        out.push_str(word);
                    } else {
                        out.push_str(&capitalize(word));
                    }
                }
                out
            }
            KeyCasing::Pascal => words(field).iter().map(|w| capitalize(w)).collect(),
        }
    }
}

impl fmt::Display for KeyCasing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyCasing {
    type Err = UnknownCasing;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let casing = match s {
            "preserve" | "none" | "identity" => KeyCasing::Preserve,
            "snake" | "snake_case" => KeyCasing::Snake,
            "camel" | "camelCase" => KeyCasing::Camel,
            "pascal" | "PascalCase" => KeyCasing::Pascal,
            "kebab" | "kebab-case" => KeyCasing::Kebab,
            "screaming-snake" | "SCREAMING_SNAKE_CASE" | "upper-snake" => KeyCasing::ScreamingSnake,
            "case-insensitive" | "ignore-case" => KeyCasing::CaseInsensitive,
            other => return Err(UnknownCasing(other.to_string())),
        };
        Ok(casing)
    }
}

/* Lowercased words of an identifier in any common style. Acronyms stay
 * together: `HTTPServer` splits as `http`, `server`. */
fn words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_styles() {
        assert_eq!(KeyCasing::Camel.apply("created_at_utc"), "createdAtUtc");
        assert_eq!(KeyCasing::Pascal.apply("created_at"), "CreatedAt");
        assert_eq!(KeyCasing::Kebab.apply("createdAt"), "created-at");
        assert_eq!(KeyCasing::ScreamingSnake.apply("maxRetries"), "MAX_RETRIES");
        assert_eq!(KeyCasing::Snake.apply("HTTPServer"), "http_server");
        assert_eq!(KeyCasing::Snake.apply("x"), "x");
        assert_eq!(KeyCasing::Preserve.apply("Keep_Me"), "Keep_Me");
    }

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("camelCase".parse::<KeyCasing>(), Ok(KeyCasing::Camel));
        assert_eq!("case-insensitive".parse::<KeyCasing>(), Ok(KeyCasing::CaseInsensitive));
        assert!("shouting".parse::<KeyCasing>().is_err());
        for casing in [KeyCasing::Snake, KeyCasing::ScreamingSnake, KeyCasing::Kebab] {
            assert_eq!(casing.name().parse::<KeyCasing>(), Ok(casing));
        }
    }
}
