//! Echo Bot
//!
//! Reads gateway updates as JSON, one per line, from stdin and routes them
//! through the local transport. Every API call the handlers make is printed
//! to stdout as JSON.
//!
//! # Usage
//!
//! ```bash
//! echo '{"update_id":1,"message":{"message_id":1,"date":0,"chat":{"id":5,"type":"private"},"text":"/echo hi"}}' \
//!     | cargo run --package echo-bot
//! ```
//!
//! Handlers:
//!
//! - `/start`: greets the chat
//! - `/echo <text>`: sends `<text>` back
//! - callback data `ping`: answers the query with "pong"
//! - edited messages: logged
//! - anything else: logged by the unmatched handler

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Parser;
use ferrogram::prelude::*;
use ferrogram::transport::LocalConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Echo bot fed from stdin", long_about = None)]
struct Args {
    /// Configuration file; defaults to searching the current directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bot identifier reported by the local client
    #[arg(long, default_value = "echo-bot")]
    bot_id: String,

    /// Maximum number of queued updates
    #[arg(long, default_value_t = 1024)]
    capacity: usize,
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Default)]
struct EchoBot {
    echoed: AtomicUsize,
}

impl EchoBot {
    async fn start(
        self: Arc<Self>,
        client: BoxedClient,
        message: Message,
        _cancel: CancellationToken,
    ) -> ApiResult<()> {
        client
            .send_message(message.chat.id, "Hi! Send /echo <text> and I'll repeat it.")
            .await?;
        Ok(())
    }

    async fn echo(
        self: Arc<Self>,
        client: BoxedClient,
        message: Message,
        _cancel: CancellationToken,
    ) -> ApiResult<()> {
        let content = message.plain_text().trim_start_matches("/echo").trim();
        if content.is_empty() {
            return Ok(());
        }
        client.send_message(message.chat.id, content).await?;
        let total = self.echoed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(chat_id = message.chat.id, total, "Echoed message");
        Ok(())
    }

    async fn ping(
        self: Arc<Self>,
        client: BoxedClient,
        query: CallbackQuery,
        _cancel: CancellationToken,
    ) -> ApiResult<()> {
        client.answer_callback_query(&query.id, Some("pong")).await?;
        Ok(())
    }

    async fn edited(
        self: Arc<Self>,
        _client: BoxedClient,
        message: Message,
        _cancel: CancellationToken,
    ) {
        info!(
            chat_id = message.chat.id,
            message_id = message.message_id,
            "Message edited: {}",
            message.plain_text()
        );
    }

    async fn other(self: Arc<Self>, _client: BoxedClient, update: Update, _cancel: CancellationToken) {
        info!(
            update_id = update.update_id,
            slot = update.slot_name(),
            "Unhandled update"
        );
    }
}

impl HandlerSet for EchoBot {
    fn declare(decl: &mut Declarations<Self>) {
        decl.command("/start", Self::start)
            .command("/echo", Self::echo)
            .callback("ping", Self::ping)
            .edited_message(Self::edited)
            .unmatched(Self::other);
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let transport = Arc::new(LocalTransport::new(
        args.bot_id,
        LocalConfig {
            capacity: args.capacity,
        },
    ));
    let feeder = transport.feeder();
    let bot = Arc::new(EchoBot::default());

    let mut container = Container::new();
    container.register_instance(Arc::clone(&bot));

    let mut builder = Supervisor::builder();
    if let Some(path) = args.config {
        builder = builder.config_file(path);
    }
    let supervisor = builder
        .transport(transport.clone())
        .container(container)
        .handlers::<EchoBot>()
        .build()?;

    supervisor.start(CancellationToken::new()).await?;
    if let Some(registry) = supervisor.registry() {
        info!("{}", registry.stats());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(e) = feeder.push_json(line.as_bytes()) {
                        warn!(error = %e, "Update rejected");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // Let the receiver drain what was already queued.
    feeder.close();
    transport.finished().cancelled().await;
    supervisor.stop(CancellationToken::new()).await?;

    for call in transport.local_client().take_sent() {
        println!(
            "{}",
            serde_json::json!({ "method": call.method, "params": call.params })
        );
    }
    info!(echoed = bot.echoed.load(Ordering::Relaxed), "Done");
    Ok(())
}
