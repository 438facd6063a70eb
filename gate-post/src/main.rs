//! gate-post - Resolve, validate and dispatch posts from JSON requests

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libpostgate::logging::{LogFormat, LoggingConfig};
use libpostgate::platforms::telegram::{OutboxApi, TelegramPlatform};
use libpostgate::types::{ErrorResponse, PreviewOutcome};
use libpostgate::{Config, ContentConverter, GateError, GateService, PlatformRegistry, PostRequest};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit code for requests that could not be parsed
const EXIT_INVALID_INPUT: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "gate-post")]
#[command(version)]
#[command(about = "Resolve, validate and dispatch posts from JSON requests")]
#[command(long_about = "\
gate-post - Resolve, validate and dispatch posts from JSON requests

DESCRIPTION:
    gate-post reads post requests as JSON, resolves the target platform and
    credentials, detects the post type and dispatches the post. Responses are
    written to stdout as JSON; logs go to stderr.

    The Telegram adapter records each Bot API call it would make as a JSON
    line on stdout instead of sending it.

USAGE:
    # Publish a request read from stdin
    echo '{\"platform\":\"telegram\",\"channel\":\"news\",\"body\":\"Hello\"}' | gate-post publish

    # Dry run a request file
    gate-post preview request.json

    # Process newline-delimited requests until EOF or SIGTERM
    gate-post serve < requests.ndjson

CONFIGURATION:
    Configuration file: ~/.config/postgate/config.toml (or $POSTGATE_CONFIG)

    [idempotency]
    ttl_minutes = 10

    [channels.news]
    platform = \"telegram\"
    auth = { bot_token = \"123:abc\", chat_id = \"@news\" }

EXIT CODES:
    0 - Success (preview: request is valid)
    1 - Upstream or internal error
    2 - Authentication error or unknown channel
    3 - Invalid request
    4 - Shutting down
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log output format (text, json, pretty)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish one request read from FILE or stdin
    Publish {
        /// Request file (reads from stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Validate and render one request without publishing it
    Preview {
        /// Request file (reads from stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Process newline-delimited requests from stdin until EOF or a signal
    ///
    /// Each line is {"op": "publish"|"preview", "request": {...}}, with an
    /// optional "id" echoed back in the response line.
    Serve,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Op {
    Publish,
    Preview,
}

#[derive(Debug, Deserialize)]
struct ServeLine {
    #[serde(default)]
    id: Option<serde_json::Value>,
    op: Op,
    request: PostRequest,
}

#[derive(Debug, Serialize)]
struct ServeReply<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op: Option<Op>,
    response: T,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.verbose = cli.verbose;
    logging.init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<GateError>()
                .map(GateError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = GateService::from_config(&config, platforms(&config))?;

    match cli.command {
        Command::Publish { file } => publish(&service, file.as_deref()).await,
        Command::Preview { file } => preview(&service, file.as_deref()).await,
        Command::Serve => serve(service).await,
    }
}

/// Register the built-in adapters
fn platforms(config: &Config) -> PlatformRegistry {
    let converter = ContentConverter::new(config.content.strip_all_html);
    let telegram = TelegramPlatform::new(Arc::new(OutboxApi::stdout()), converter);
    PlatformRegistry::new().with(Arc::new(telegram))
}

async fn publish(service: &GateService, file: Option<&Path>) -> anyhow::Result<i32> {
    let request = match read_request(file).await? {
        Ok(request) => request,
        Err(response) => return print_json(&response).map(|_| EXIT_INVALID_INPUT),
    };

    let outcome = service.publish(&request).await;
    print_json(&outcome)?;
    Ok(outcome.exit_code())
}

async fn preview(service: &GateService, file: Option<&Path>) -> anyhow::Result<i32> {
    let request = match read_request(file).await? {
        Ok(request) => request,
        Err(response) => return print_json(&response).map(|_| EXIT_INVALID_INPUT),
    };

    let outcome = service.preview(&request).await;
    print_json(&outcome)?;
    Ok(match &outcome {
        PreviewOutcome::Previewed(response) if response.data.valid => 0,
        PreviewOutcome::Previewed(_) => EXIT_INVALID_INPUT,
        PreviewOutcome::Rejected(error) => error.exit_code(),
    })
}

/// Read one request; malformed JSON becomes an error response
async fn read_request(
    file: Option<&Path>,
) -> anyhow::Result<Result<PostRequest, ErrorResponse>> {
    let input = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read stdin")?;
            input
        }
    };

    Ok(parse_request(&input))
}

fn parse_request(input: &str) -> Result<PostRequest, ErrorResponse> {
    serde_json::from_str(input).map_err(|e| invalid_input(&e))
}

fn invalid_input(error: &serde_json::Error) -> ErrorResponse {
    ErrorResponse::new("VALIDATION_ERROR", format!("Invalid request JSON: {}", error))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Process request lines concurrently until EOF or a signal, then drain
///
/// A second signal during the drain cancels the requests still in flight.
async fn serve(service: GateService) -> anyhow::Result<i32> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            println!("{}", line);
        }
    });

    let mut signals = listen_for_signals()?;
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("gate-post serving requests from stdin");

    let reason = loop {
        tokio::select! {
            Some(signal) = signals.recv() => break signal,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => accept(&service, &line, &cancel, &out_tx, &mut tasks),
                Ok(None) => break "EOF",
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break "EOF";
                }
            },
        }
    };

    let drain = service.begin_shutdown(reason);
    tokio::pin!(drain);
    loop {
        tokio::select! {
            _ = &mut drain => break,
            Some(signal) = signals.recv() => {
                warn!("Received {} while draining, cancelling in-flight requests", signal);
                cancel.cancel();
            }
        }
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!("Request task failed: {}", e);
        }
    }
    drop(out_tx);
    writer.await.context("Response writer failed")?;

    info!("gate-post stopped");
    Ok(0)
}

/// Parse and admit one line, spawning its processing
///
/// Admission happens before the spawn so a drain that starts right after
/// still waits for this request.
fn accept(
    service: &GateService,
    line: &str,
    cancel: &CancellationToken,
    out: &mpsc::UnboundedSender<String>,
    tasks: &mut JoinSet<()>,
) {
    let parsed: ServeLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            send(out, None, None, &invalid_input(&e));
            return;
        }
    };

    let guard = match service.admit() {
        Ok(guard) => guard,
        Err(e) => {
            send(out, parsed.id, Some(parsed.op), &ErrorResponse::from(e));
            return;
        }
    };

    debug!(op = ?parsed.op, platform = %parsed.request.platform, "Accepted request");

    let service = service.clone();
    let cancel = cancel.child_token();
    let out = out.clone();
    tasks.spawn(async move {
        let ServeLine { id, op, request } = parsed;
        match op {
            Op::Publish => {
                let outcome = service.publish_admitted(guard, &request, &cancel).await;
                send(&out, id, Some(op), &outcome);
            }
            Op::Preview => {
                let outcome = service.preview_admitted(guard, &request).await;
                send(&out, id, Some(op), &outcome);
            }
        }
    });
}

fn send<T: Serialize>(
    out: &mpsc::UnboundedSender<String>,
    id: Option<serde_json::Value>,
    op: Option<Op>,
    response: &T,
) {
    let reply = ServeReply { id, op, response };
    match serde_json::to_string(&reply) {
        Ok(line) => {
            if out.send(line).is_err() {
                warn!("Response writer closed, dropping response");
            }
        }
        Err(e) => warn!("Failed to encode response: {}", e),
    }
}

/// Forward SIGINT and SIGTERM into the runtime
#[cfg(unix)]
fn listen_for_signals() -> anyhow::Result<mpsc::UnboundedReceiver<&'static str>> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for sig in signals.forever() {
            let name = if sig == SIGINT { "SIGINT" } else { "SIGTERM" };
            info!("Received {}, shutting down gracefully...", name);
            if tx.send(name).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(not(unix))]
fn listen_for_signals() -> anyhow::Result<mpsc::UnboundedReceiver<&'static str>> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send("CTRL_C").is_err() {
                break;
            }
        }
    });
    Ok(rx)
}
