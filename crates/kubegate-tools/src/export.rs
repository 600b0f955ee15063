use std::path::Path;

use crate::config::TraceConfig;
use crate::trace::Span;

/// Append-only sink for finished spans. Safe to share between concurrent
/// invocations; export never fails the caller.
#[derive(Debug)]
pub struct SpanExporter {
    destination: Destination,
}

#[derive(Debug)]
enum Destination {
    Off,
    Tracing,
    Stdout(tokio::sync::Mutex<tokio::io::Stdout>),
    File(tokio::sync::Mutex<tokio::fs::File>),
    Buffer(std::sync::Mutex<Vec<Span>>),
}

impl SpanExporter {
    /// Exporter that drops every span.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            destination: Destination::Off,
        }
    }

    /// Exporter that keeps spans in memory until [`drain`](Self::drain)ed,
    /// for hosts that forward them elsewhere and for tests.
    #[must_use]
    pub fn buffer() -> Self {
        Self {
            destination: Destination::Buffer(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Create an exporter from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &TraceConfig) -> Result<Self, std::io::Error> {
        let destination = match config.destination.as_str() {
            "" | "off" | "none" => Destination::Off,
            "tracing" => Destination::Tracing,
            "stdout" => Destination::Stdout(tokio::sync::Mutex::new(tokio::io::stdout())),
            path => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(Path::new(path))
                    .await?;
                Destination::File(tokio::sync::Mutex::new(file))
            }
        };
        Ok(Self { destination })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self.destination, Destination::Off)
    }

    pub async fn export(&self, span: &Span) {
        use tokio::io::AsyncWriteExt;

        let line = match &self.destination {
            Destination::Off => return,
            Destination::Buffer(spans) => {
                if let Ok(mut guard) = spans.lock() {
                    guard.push(span.clone());
                }
                return;
            }
            _ => match serde_json::to_string(span) {
                Ok(json) => json,
                Err(e) => {
                    tracing::debug!("span not serializable: {e}");
                    return;
                }
            },
        };

        match &self.destination {
            Destination::Tracing => {
                tracing::info!(target: "kubegate::span", "{line}");
            }
            Destination::Stdout(out) => {
                let mut out = out.lock().await;
                let line = format!("{line}\n");
                if let Err(e) = out.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write span: {e}");
                }
                if let Err(e) = out.flush().await {
                    tracing::error!("failed to flush span: {e}");
                }
            }
            Destination::File(file) => {
                let mut f = file.lock().await;
                let line = format!("{line}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write span: {e}");
                }
            }
            Destination::Off | Destination::Buffer(_) => {}
        }
    }

    /// Take the spans collected so far by a [`SpanExporter::buffer`]
    /// exporter, oldest first, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Span> {
        match &self.destination {
            Destination::Buffer(spans) => spans
                .lock()
                .map(|mut g| std::mem::take(&mut *g))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Spans collected by a [`SpanExporter::buffer`] exporter, oldest first.
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        match &self.destination {
            Destination::Buffer(spans) => spans.lock().map(|g| g.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::trace::SpanStatus;

    fn span(name: &str) -> Span {
        Span {
            name: name.into(),
            started_at_ms: 1,
            ended_at_ms: 4,
            duration_ms: 3,
            attributes: BTreeMap::from([("kubegate.tool.arg.program".into(), "kubectl".into())]),
            status: SpanStatus::Ok,
        }
    }

    fn config(destination: &str) -> TraceConfig {
        TraceConfig {
            destination: destination.into(),
            ..TraceConfig::default()
        }
    }

    #[tokio::test]
    async fn off_destination_is_noop() {
        let exporter = SpanExporter::from_config(&config("off")).await.unwrap();
        assert!(!exporter.is_enabled());
        exporter.export(&span("run")).await;
        assert!(exporter.spans().is_empty());
    }

    #[tokio::test]
    async fn tracing_destination() {
        let exporter = SpanExporter::from_config(&config("tracing")).await.unwrap();
        assert!(exporter.is_enabled());
        exporter.export(&span("run")).await;
    }

    #[tokio::test]
    async fn buffer_keeps_spans_in_order() {
        let exporter = SpanExporter::buffer();
        exporter.export(&span("a")).await;
        exporter.export(&span("b")).await;
        let names: Vec<_> = exporter.spans().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn drain_empties_the_buffer() {
        let exporter = SpanExporter::buffer();
        exporter.export(&span("a")).await;
        exporter.export(&span("b")).await;
        assert_eq!(exporter.drain().len(), 2);
        assert!(exporter.spans().is_empty());
        exporter.export(&span("c")).await;
        let names: Vec<_> = exporter.drain().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["c"]);
    }

    #[tokio::test]
    async fn file_destination_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let exporter = SpanExporter::from_config(&config(&path.display().to_string()))
            .await
            .unwrap();
        for i in 0..3 {
            exporter.export(&span(&format!("op{i}"))).await;
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 3);
        let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["name"], "op0");
        assert_eq!(first["status"], "ok");
    }

    #[tokio::test]
    async fn unopenable_file_is_an_error() {
        let result = SpanExporter::from_config(&config("/nonexistent/dir/spans.jsonl")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_exports_are_all_recorded() {
        let exporter = std::sync::Arc::new(SpanExporter::buffer());
        let mut handles = Vec::new();
        for i in 0..16 {
            let exporter = exporter.clone();
            handles.push(tokio::spawn(async move {
                exporter.export(&span(&format!("op{i}"))).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(exporter.spans().len(), 16);
    }
}
