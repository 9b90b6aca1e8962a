//! CLI entrypoint: runs one browser task and prints the loop's events.

mod config;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use agent::{Event, FunctionCallHandle, GeminiClient, LoopConfig, SafetyConfirmation, start_loop};
use anyhow::Context;
use clap::Parser;
use config::Config;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tools::CdpSession;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for surfloop.
#[derive(Parser, Debug)]
#[command(name = "surfloop")]
#[command(about = "Browser computer-use agent", version)]
struct Cli {
    /// The task for the browser agent to carry out
    #[arg(short, long)]
    query: String,

    /// Page loaded before the first model turn
    #[arg(long)]
    initial_url: Option<String>,

    /// Model to drive the browser with
    #[arg(short, long)]
    model: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug logging to ~/.surfloop/logs
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Show the browser window
    #[arg(long, default_value_t = false)]
    headful: bool,
}

impl Cli {
    /// Flags win over the config file and environment.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.initial_url {
            config.browser.initial_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.agent.model = model.clone();
        }
        if self.headful {
            config.browser.headless = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard = init_tracing(&cli);

    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    run(config, cli.query).await
}

/// Console logging filtered by `RUST_LOG` or `--log-level`; `--debug` adds a daily log file.
fn init_tracing(cli: &Cli) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let log_dir = cli.debug.then(config::home_dir).flatten().map(|dir| dir.join("logs"));
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry().with(console).init();
        return None;
    };

    std::fs::create_dir_all(&log_dir).ok();
    let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(EnvFilter::new(
            "debug,hyper_util=info,rustls=info,reqwest=info,chromiumoxide=info",
        ));
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %cli.log_level,
        "========== surfloop session start =========="
    );
    Some(guard)
}

async fn run(config: Config, query: String) -> anyhow::Result<ExitCode> {
    let session = Arc::new(
        CdpSession::launch(config.browser.session_config())
            .await
            .context("failed to start browser session")?,
    );

    let client = match config.agent.effective_base_url() {
        Some(base_url) => GeminiClient::with_base_url(&config.agent.api_key, base_url),
        None => GeminiClient::new(&config.agent.api_key),
    };

    let mut loop_config = LoopConfig::new(Arc::new(client), session.clone(), query);
    loop_config.model = config.agent.effective_model().to_string();
    loop_config.excluded_functions = config.agent.excluded_functions.clone();
    loop_config.max_recent_turns_with_screenshots = config.agent.max_recent_turns_with_screenshots;
    loop_config.custom_call_timeout = config.agent.custom_call_timeout();
    loop_config.max_turns = config.agent.max_turns;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        })
    };

    let mut handle = start_loop(loop_config, cancel.clone());
    let mut failed = false;
    while let Some(event) = handle.events.recv().await {
        match event {
            Event::Progress { text, calls } => {
                print!("{}", format_progress(&text, &calls));
                for call in calls.iter().filter(|call| call.needs_action()) {
                    // This binary declares no functions of its own.
                    let cause = format!("no handler for function {}", call.name());
                    if let Err(e) = call.reject(cause) {
                        warn!(name = call.name(), error = %e, "Failed to reject function call");
                    }
                }
            }
            Event::SafetyConfirmation {
                tool,
                explanation,
                confirmation,
            } => confirm(&tool, &explanation, &confirmation, &cancel).await,
            Event::Error(e) => {
                error!(error = %e, "Agent loop failed");
                eprintln!("Error: {e}");
                failed = true;
            }
        }
    }

    let history = handle.task.await.context("agent loop task panicked")?;
    info!(turns = history.len(), "Agent loop ended");
    ctrl_c.abort();

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close browser session");
    }

    if failed {
        return Ok(ExitCode::FAILURE);
    }
    println!("Agent Loop Complete");
    Ok(ExitCode::SUCCESS)
}

/// Asks on the terminal whether a flagged action may run. Cancellation stops
/// waiting for the answer.
async fn confirm(
    tool: &str,
    explanation: &str,
    confirmation: &SafetyConfirmation,
    cancel: &CancellationToken,
) {
    println!("\nSafety confirmation required for {tool}:\n{explanation}");
    println!("Proceed? [y/N]");

    let Some(answer) = await_answer(read_stdin_line(), cancel).await else {
        info!(tool, "Safety prompt abandoned");
        return;
    };
    let settled = if is_affirmative(&answer) {
        confirmation.approve()
    } else {
        confirmation.deny()
    };
    if let Err(e) = settled {
        warn!(tool, error = %e, "Failed to settle safety confirmation");
    }
}

/// Reads one line on a detached thread so a pending read never holds up exit.
fn read_stdin_line() -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            line.clear();
        }
        let _ = tx.send(line);
    });
    rx
}

/// `None` when cancelled first. A reader that gave up counts as an empty answer.
async fn await_answer(
    answer: oneshot::Receiver<String>,
    cancel: &CancellationToken,
) -> Option<String> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        line = answer => Some(line.unwrap_or_default()),
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn format_progress(text: &str, calls: &[FunctionCallHandle]) -> String {
    let mut out = String::new();
    if !text.is_empty() {
        out.push_str(&format!("\nReasoning:\n{text}\n"));
    }
    if !calls.is_empty() {
        out.push_str("\nFunction Call(s):\n");
        for call in calls {
            out.push_str(&format!("Name: {}\n", call.name()));
            if !call.args().is_empty() {
                out.push_str("Args:\n");
                for (key, value) in call.args() {
                    out.push_str(&format!("  {key}: {value}\n"));
                }
            }
        }
        out.push('\n');
    }
    out
}
