use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kubegate_core::{
    AssumeYes, ChannelError, CommandService, Config, Confirm, DEFAULT_CONFIG_PATH, Outcome,
};
use kubegate_tools::{CommandArgs, ConfirmationRequest, KubectlParams};

/// Session id for everything a single CLI invocation does.
const CLI_SESSION: &str = "cli";

#[derive(Debug, Parser)]
#[command(
    name = "kubegate",
    version,
    about = "Run kubectl with confirmation for destructive commands and redacted tracing"
)]
struct Cli {
    /// Config file [default: $KUBEGATE_CONFIG or kubegate.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a kubectl command, asking first if it changes cluster state
    Run(RunArgs),
    /// Print the current kubeconfig context
    Context,
    /// Print the effective configuration as TOML
    Config,
    /// Print the JSON schema of the run parameters
    Schema,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    context: Option<String>,

    #[arg(short, long)]
    namespace: Option<String>,

    /// Output format passed to kubectl; `json` is decoded, `none` adds no flag
    #[arg(short, long)]
    output: Option<String>,

    /// Timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Approve destructive commands without prompting
    #[arg(short, long)]
    yes: bool,

    /// kubectl arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn into_params(self) -> KubectlParams {
        KubectlParams {
            command: CommandArgs::Argv(self.command),
            context: self.context,
            namespace: self.namespace,
            output: self.output,
            timeout_secs: self.timeout,
        }
    }
}

/// Prompts on the controlling terminal. Anything but an explicit "yes",
/// including a missing terminal, declines.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    async fn confirm(&mut self, request: &ConfirmationRequest) -> Result<bool, ChannelError> {
        let prompt = format!("{}\nProceed?", request.risk);
        tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await
        .map_err(|e| ChannelError::Other(e.to_string()))?
        .map_err(|e| ChannelError::Other(e.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    init_subscriber(&config);
    config.validate()?;

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Context => {
            check_span_destination(&config)?;
            let service = CommandService::new(&config)
                .await
                .context("failed to open span destination")?;
            let context = service.current_context().await;
            print_json(&serde_json::json!({ "context": context }))?;
            Ok(if context.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            print_json(&schemars::schema_for!(KubectlParams))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &Config, args: RunArgs) -> anyhow::Result<ExitCode> {
    check_span_destination(config)?;
    let service = CommandService::new(config)
        .await
        .context("failed to open span destination")?;
    let yes = args.yes;
    let params = args.into_params();

    let outcome = if yes {
        service
            .run_interactive(params, CLI_SESSION, &mut AssumeYes)
            .await
    } else {
        service
            .run_interactive(params, CLI_SESSION, &mut TerminalConfirm)
            .await
    };
    service.end_session(CLI_SESSION);

    match outcome {
        Ok(outcome) => {
            print_json(&outcome)?;
            Ok(ExitCode::from(exit_status(&outcome)))
        }
        Err(e) => {
            tracing::debug!("command failed: {e}");
            print_json(&e)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// stdout carries the JSON result, so spans may not be written there too.
fn check_span_destination(config: &Config) -> anyhow::Result<()> {
    if config.tools.trace.destination == "stdout" {
        anyhow::bail!(
            "tools.trace.destination = \"stdout\" would mix spans into command output; \
             use \"tracing\" or a file path"
        );
    }
    Ok(())
}

fn exit_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Completed(_) => 0,
        Outcome::ConfirmationRequired(_) | Outcome::Declined { .. } => 2,
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("KUBEGATE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn init_subscriber(config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries JSON results
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    #[cfg(feature = "otel")]
    if config.observability.exporter == "otlp" {
        match setup_otel_tracer(&config.observability.endpoint) {
            Ok(tracer) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(otel_layer)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("OTel initialization failed, falling back to fmt: {e}");
            }
        }
    }

    #[cfg(not(feature = "otel"))]
    if config.observability.exporter == "otlp" {
        eprintln!("observability.exporter = \"otlp\" needs the `otel` feature; ignoring");
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(feature = "otel")]
fn setup_otel_tracer(endpoint: &str) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracer> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer("kubegate");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}
