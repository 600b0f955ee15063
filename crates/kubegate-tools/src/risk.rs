use std::collections::HashSet;

use glob::Pattern;

use crate::config::RiskConfig;
use crate::executor::CommandRequest;

/// A destructive-action match and its plain-language explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Risk {
    /// The verb or pattern that matched.
    pub matched: String,
    pub description: String,
}

/// Decides whether a request mutates remote state and needs confirmation.
///
/// Verbs are matched against the first positional argument, ignoring flags
/// and their values wherever they appear. Patterns are globs over all
/// positional arguments joined by single spaces. Both are case-insensitive.
///
/// A flag missing from `value_flags` that appears before the verb makes both
/// the next positional argument and the one after it candidates, so an
/// unlisted value flag can never hide a destructive verb.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    verbs: Vec<String>,
    patterns: Vec<Pattern>,
    value_flags: HashSet<String>,
}

impl RiskClassifier {
    #[must_use]
    pub fn new(config: &RiskConfig) -> Self {
        let mut verbs: Vec<String> = config
            .destructive_verbs
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        verbs.sort();
        verbs.dedup();

        let patterns = config
            .confirm_patterns
            .iter()
            .filter_map(|p| match Pattern::new(&p.to_lowercase()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("ignoring invalid confirm pattern {p:?}: {e}");
                    None
                }
            })
            .collect();

        Self {
            verbs,
            patterns,
            value_flags: config.value_flags.iter().cloned().collect(),
        }
    }

    fn takes_value(&self, flag: &str) -> bool {
        !flag.contains('=') && self.value_flags.contains(flag)
    }

    /// Positional arguments, in order, up to a `--` separator.
    #[must_use]
    pub fn positional<'a>(&self, args: &'a [String]) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--" {
                break;
            }
            if is_flag(arg) {
                if self.takes_value(arg) {
                    iter.next();
                }
                continue;
            }
            out.push(arg.as_str());
        }
        out
    }

    /// How many leading positional arguments may be the verb.
    ///
    /// One, plus one more for every unrecognized flag in front of them, since
    /// such a flag may have consumed the token after it as its value.
    fn verb_slots(&self, args: &[String]) -> usize {
        let mut slots = 0;
        let mut open = false;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--" {
                break;
            }
            if is_flag(arg) {
                if self.takes_value(arg) {
                    iter.next();
                } else if !arg.contains('=') {
                    open = true;
                }
                continue;
            }
            slots += 1;
            if !open {
                break;
            }
            open = false;
        }
        slots
    }

    #[must_use]
    pub fn classify(&self, request: &CommandRequest) -> Option<Risk> {
        let positional = self.positional(request.args());
        let slots = self.verb_slots(request.args()).min(positional.len());

        let verb = positional[..slots]
            .iter()
            .map(|token| token.to_lowercase())
            .find(|token| self.verbs.contains(token));
        let matched = match verb {
            Some(verb) => verb,
            None => (0..slots).find_map(|start| {
                let line = positional[start..].join(" ").to_lowercase();
                self.patterns
                    .iter()
                    .find(|p| p.matches(&line))
                    .map(|p| p.as_str().to_owned())
            })?,
        };

        let description = describe(&matched, request);
        Some(Risk {
            matched,
            description,
        })
    }
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1
}

fn effect(verb: &str) -> &'static str {
    match verb {
        "delete" => "permanently removes the targeted resources",
        "create" => "creates new resources in the cluster",
        "apply" => "creates or updates resources from the supplied configuration",
        "patch" => "modifies fields of existing resources in place",
        "replace" => "overwrites existing resources with new definitions",
        "scale" => "changes how many replicas of a workload are running",
        _ => "changes the state of the cluster",
    }
}

fn describe(matched: &str, request: &CommandRequest) -> String {
    let mut text = format!(
        "This command uses `{matched}`, which {}. Command: {}",
        effect(matched),
        request.display_line()
    );
    match (request.context(), request.namespace()) {
        (Some(c), Some(n)) => text.push_str(&format!(" (context {c}, namespace {n})")),
        (Some(c), None) => text.push_str(&format!(" (context {c})")),
        (None, Some(n)) => text.push_str(&format!(" (namespace {n})")),
        (None, None) => {}
    }
    text
}
