use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::TraceConfig;

const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live_",
    "sk_test_",
    "AKIA",
    "ghp_",
    "gho_",
    "-----BEGIN",
    "xoxb-",
    "xoxp-",
    "AIza",
    "ya29.",
    "glpat-",
    "hf_",
    "npm_",
    "dckr_pat_",
    "eyJhbGci",
];

/// Key fragments that mark an argument as sensitive whatever the configured set says.
const SECRET_KEY_PARTS: &[&str] = &[
    "token", "secret", "password", "passwd", "apikey", "api_key", "bearer",
];

// Any secret prefix followed by non-delimiter characters, in one pass.
static SECRET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = SECRET_PREFIXES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let full = format!("(?:{pattern})[^\\s\"'`,;{{}}\\[\\]]*");
    Regex::new(&full).expect("secret redaction regex is valid")
});

static SECRET_WORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(token|secret|password|apikey|api_key|bearer)(?:[^a-z]|$)")
        .expect("secret word regex is valid")
});

/// Replace tokens starting with known credential prefixes with `[REDACTED]`.
///
/// Returns `Cow::Borrowed` when nothing matched.
#[must_use]
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    if !SECRET_PREFIXES.iter().any(|p| text.contains(p)) {
        return Cow::Borrowed(text);
    }
    SECRET_REGEX.replace_all(text, "[REDACTED]")
}

/// Which argument keys a span may show, and how.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    redact: HashSet<String>,
    omit: HashSet<String>,
    placeholder: String,
    max_value_len: usize,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new(&TraceConfig::default())
    }
}

impl RedactionPolicy {
    #[must_use]
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            redact: config.redact_keys.iter().map(|k| k.to_lowercase()).collect(),
            omit: config.omit_keys.iter().map(|k| k.to_lowercase()).collect(),
            placeholder: config.placeholder.clone(),
            max_value_len: config.max_value_len.max(1),
        }
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Filtered, redacted key/value view of `args`.
    ///
    /// Objects contribute one entry per field; any other value is recorded
    /// under `value`. Serialization failure yields an empty map.
    #[must_use]
    pub fn snapshot<T: Serialize + ?Sized>(&self, args: &T) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let value = match serde_json::to_value(args) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("span arguments not serializable: {e}");
                return out;
            }
        };
        match value {
            serde_json::Value::Object(map) => {
                for (key, value) in &map {
                    if let Some(rendered) = self.render(key, value) {
                        out.insert(key.clone(), rendered);
                    }
                }
            }
            other => {
                if let Some(rendered) = self.render("value", &other) {
                    out.insert("value".to_owned(), rendered);
                }
            }
        }
        out
    }

    /// `None` means the key is left out of the span entirely.
    fn render(&self, key: &str, value: &serde_json::Value) -> Option<String> {
        let lower = key.to_lowercase();
        if key.starts_with('_') || self.omit.contains(&lower) {
            return None;
        }
        if self.redact.contains(&lower) || SECRET_KEY_PARTS.iter().any(|p| lower.contains(p)) {
            return Some(self.placeholder.clone());
        }

        let text = match value {
            serde_json::Value::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        };
        if SECRET_WORD_REGEX.is_match(&text) {
            return Some(self.placeholder.clone());
        }
        Some(truncate(&redact_secrets(&text), self.max_value_len))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('\u{2026}');
    out
}
