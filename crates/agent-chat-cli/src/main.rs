//! Terminal front-end for an A2A agent runtime.
//!
//! Streams a message and renders each sub-agent's response as it arrives.
//! Ctrl-C aborts the stream.

mod render;

use std::sync::Arc;
use std::time::Duration;

use agent_chat_stream::prelude::*;
use agent_chat_stream::{ReaderStrategy, init_observability};
use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};

use crate::render::TerminalRenderer;

#[derive(Parser)]
#[command(name = "agent-chat", version, about = "Chat with an A2A agent runtime")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// JSON-RPC endpoint (overrides A2A_ENDPOINT).
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Bearer token (overrides A2A_BEARER_TOKEN).
    #[arg(long, global = true)]
    token: Option<String>,
    /// Body reader strategy: pipe or manual (overrides A2A_READER).
    #[arg(long, global = true, value_parser = parse_reader)]
    reader: Option<ReaderStrategy>,
    /// Inactivity window in seconds before a stream is abandoned.
    #[arg(long, global = true)]
    inactivity_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and stream the response.
    Send {
        text: String,
        /// Turn id to send under; a fresh one is generated when omitted.
        #[arg(long)]
        turn: Option<String>,
        /// Extra JSON data part sent after the text.
        #[arg(long, value_parser = parse_json)]
        data: Option<serde_json::Value>,
    },
    /// Ask the runtime to cancel a task.
    Cancel { task_id: String },
    /// Print a task snapshot.
    Get {
        task_id: String,
        /// Number of history messages to include.
        #[arg(long)]
        history: Option<u32>,
    },
}

fn parse_reader(raw: &str) -> Result<ReaderStrategy, String> {
    ReaderStrategy::parse(raw).ok_or_else(|| format!("expected pipe or manual, got {raw:?}"))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn build_config(args: ConnectionArgs) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env_with_endpoint(args.endpoint)
        .context("set A2A_ENDPOINT or pass --endpoint")?;
    if let Some(token) = args.token {
        config = config.bearer_token(token);
    }
    if let Some(reader) = args.reader {
        config = config.reader_strategy(reader);
    }
    if let Some(secs) = args.inactivity_secs {
        config = config.inactivity_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_observability();

    let cli = Cli::parse();
    let client = A2aClient::new(build_config(cli.connection)?)?;

    match cli.command {
        Command::Send { text, turn, data } => {
            let mut message = OutgoingMessage::text(text);
            if let Some(data) = data {
                message = message.with_json(data);
            }
            let turn = turn.map(TurnId::new).unwrap_or_else(TurnId::generate);
            send(&client, message, turn).await
        }
        Command::Cancel { task_id } => {
            let task = client.cancel_task(&task_id).await?;
            println!("{} {}", task.id, task.status.state.as_str());
            Ok(())
        }
        Command::Get { task_id, history } => {
            let task = client.get_task(&task_id, history).await?;
            println!("{} {}", task.id, task.status.state.as_str());
            if let Some(artifact) = task.display_artifact() {
                println!("{}", artifact.text());
            }
            Ok(())
        }
    }
}

async fn send(client: &A2aClient, message: OutgoingMessage, turn: TurnId) -> anyhow::Result<()> {
    let session = Arc::new(client.session());
    let stream = session.send(message, turn.clone()).await?;

    let interrupt = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; aborting stream");
                session.abort();
            }
        })
    };

    let mut renderer = TerminalRenderer::new(std::io::stdout());
    let mut content = ContentAccumulator::new();
    let outcome = stream.drive(&mut renderer, &mut content).await;
    interrupt.abort();

    if let Some(task_id) = renderer.task_id() {
        eprintln!("turn {turn} task {task_id}");
    }
    match outcome {
        StreamOutcome::Failed(failure) => bail!(failure),
        StreamOutcome::Completed { .. } | StreamOutcome::Cancelled => Ok(()),
    }
}
