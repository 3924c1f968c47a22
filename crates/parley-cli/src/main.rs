mod config;
mod logging;

use clap::{Parser, Subcommand};
use config::AppConfig;
use parley_agent::SessionManager;
use parley_core::Turn;
use parley_session::TranscriptStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Thread used by `parley demo`.
const DEMO_THREAD: &str = "42";

const DEMO_MESSAGES: [&str; 3] = [
    "Je cherche des vacances à la montagne",
    "J'aime le sport",
    "Est-ce accessible aux personnes handicapées?",
];

#[derive(Parser)]
#[command(
    name = "parley",
    version,
    about = "Parley: multi-thread conversation sessions over hosted LLMs"
)]
struct Cli {
    /// Path to config file (defaults to ./parley.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation on one thread
    Chat {
        /// Thread id (a fresh UUID when omitted)
        #[arg(short, long)]
        thread: Option<String>,
    },
    /// Run the scripted three-turn conversation on thread "42"
    Demo,
    /// Print the checkpointed transcript of a thread
    History {
        /// Thread id
        thread: String,
    },
    /// List checkpointed threads
    Threads,
    /// Delete the checkpoint of a thread
    Reset {
        /// Thread id
        thread: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).await?;
    logging::init_tracing(&config.logging, &config.agent.telemetry);

    let store = config.open_store().await?;

    match cli.command {
        Commands::Chat { thread } => {
            let manager = build_manager(&config, store)?;
            let thread = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            chat(&manager, &thread).await?;
        }
        Commands::Demo => {
            let manager = build_manager(&config, store)?;
            demo(&manager).await?;
        }
        Commands::History { thread } => {
            let store = require_store(store)?;
            match store.load(&thread).await? {
                Some(transcript) => print_transcript(transcript.get_all()),
                None => println!("No checkpoint for thread '{thread}'"),
            }
        }
        Commands::Threads => {
            let store = require_store(store)?;
            for id in store.list().await? {
                println!("{id}");
            }
        }
        Commands::Reset { thread } => {
            let store = require_store(store)?;
            store.delete(&thread).await?;
            println!("Thread '{thread}' reset");
        }
    }

    Ok(())
}

fn build_manager(
    config: &AppConfig,
    store: Option<Arc<dyn TranscriptStore>>,
) -> anyhow::Result<SessionManager> {
    let mut manager = SessionManager::new(&config.agent)?;
    if let Some(store) = store {
        manager = manager.with_store(store);
    }
    info!(
        provider = %config.agent.model.provider,
        model = %manager.context().model_id,
        durable = manager.is_durable(),
        "Session manager ready"
    );
    Ok(manager)
}

fn require_store(
    store: Option<Arc<dyn TranscriptStore>>,
) -> anyhow::Result<Arc<dyn TranscriptStore>> {
    store.ok_or_else(|| {
        anyhow::anyhow!("Persistence is disabled; set [persistence] enabled = true in parley.toml")
    })
}

async fn chat(manager: &SessionManager, thread: &str) -> anyhow::Result<()> {
    println!("Thread {thread}. Commands: /history, /reset, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                manager.reset(thread).await;
                println!("(history cleared)");
            }
            "/history" => print_transcript(&manager.get_transcript(thread).await),
            text => match manager.send(thread, text).await {
                Ok(reply) => println!("{}", reply.content()),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

async fn demo(manager: &SessionManager) -> anyhow::Result<()> {
    // Each run replays the exchange from an empty thread.
    manager.reset(DEMO_THREAD).await;

    for message in DEMO_MESSAGES {
        println!("> {message}");
        let reply = manager.send(DEMO_THREAD, message).await?;
        println!("{}\n", reply.content());
    }

    let count = manager.turn_count(DEMO_THREAD).await;
    println!("Thread {DEMO_THREAD} holds {count} messages");
    Ok(())
}

fn print_transcript(turns: &[Turn]) {
    if turns.is_empty() {
        println!("(empty)");
        return;
    }
    for turn in turns {
        println!("[{}] {}: {}", turn.sequence_index(), turn.role(), turn.content());
    }
}
