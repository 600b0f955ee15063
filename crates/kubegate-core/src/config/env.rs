use super::Config;

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KUBEGATE_TIMEOUT") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.tools.timeout = secs,
                _ => tracing::warn!("ignoring invalid KUBEGATE_TIMEOUT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("KUBEGATE_KUBECTL_BIN") {
            if v.trim().is_empty() {
                tracing::warn!("ignoring empty KUBEGATE_KUBECTL_BIN");
            } else {
                self.tools.kubectl.binary = v;
            }
        }
        if let Ok(v) = std::env::var("KUBEGATE_DESTRUCTIVE_VERBS") {
            let verbs = split_list(&v);
            if verbs.is_empty() {
                tracing::warn!("ignoring empty KUBEGATE_DESTRUCTIVE_VERBS");
            } else {
                self.tools.risk.destructive_verbs = verbs;
            }
        }
        if let Ok(v) = std::env::var("KUBEGATE_REDACT_KEYS") {
            self.tools.trace.redact_keys = split_list(&v);
        }
        if let Ok(v) = std::env::var("KUBEGATE_SPAN_DESTINATION") {
            self.tools.trace.destination = v.trim().to_owned();
        }
        if let Ok(v) = std::env::var("KUBEGATE_OTEL_EXPORTER") {
            self.observability.exporter = v.trim().to_owned();
        }
        if let Ok(v) = std::env::var("KUBEGATE_OTEL_ENDPOINT") {
            self.observability.endpoint = v;
        }
    }
}
