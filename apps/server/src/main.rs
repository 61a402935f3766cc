use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use courier_config::load as load_config;
use courier_database::{
    ConversationRepository, Participant, ParticipantRepository, ParticipantRole, UnreadCounters,
};
use courier_gateway::{create_router, GatewayState};
use courier_runtime::{telemetry, BackendServices};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "courier-server")]
#[command(about = "Courier messaging backend (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,
    /// Insert or update participants from a JSON file
    SeedParticipants {
        /// Path to a JSON array of `{ "id", "display_name", "role" }` objects
        #[arg(long)]
        file: PathBuf,
    },
    /// Print every conversation and audit its unread counters
    DumpConversations,
}

#[derive(Debug, Deserialize)]
struct SeedParticipant {
    id: String,
    display_name: String,
    #[serde(default)]
    role: Option<ParticipantRole>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::SeedParticipants { file } => seed_participants(file).await,
        Commands::DumpConversations => dump_conversations().await,
    }
}

async fn start_services() -> anyhow::Result<(courier_config::AppConfig, BackendServices)> {
    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    Ok((config, services))
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting Courier backend");

    let (config, services) = start_services().await?;

    let state = GatewayState::new(services.db_pool.clone(), services.core.clone());
    let app = create_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(courier_runtime::shutdown_signal())
        .await
        .context("http server error");

    services.shutdown().await;
    served?;

    info!("backend shut down");
    Ok(())
}

async fn seed_participants(file: PathBuf) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let seeds: Vec<SeedParticipant> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of participants", file.display()))?;

    let (_, services) = start_services().await?;
    let participants = ParticipantRepository::new(services.db_pool.clone());

    for seed in &seeds {
        let participant = Participant::new(
            seed.id.clone(),
            seed.display_name.clone(),
            seed.role.unwrap_or(ParticipantRole::User),
        );
        participants
            .upsert(&participant)
            .await
            .with_context(|| format!("failed to upsert participant {}", seed.id))?;
    }

    info!(count = seeds.len(), "participants seeded");
    services.shutdown().await;
    Ok(())
}

async fn dump_conversations() -> anyhow::Result<()> {
    let (_, services) = start_services().await?;
    let conversations = ConversationRepository::new(services.db_pool.clone())
        .list_all()
        .await
        .context("failed to fetch conversations")?;

    println!("=== CONVERSATIONS ===");
    if conversations.is_empty() {
        println!("No conversations found in database");
    } else {
        println!("Found {} conversations:", conversations.len());
        println!(
            "{:<26} {:<16} {:<16} {:>8} {:>8} {:<8} {:<8} {:<40}",
            "ID", "Participant A", "Participant B", "Unread A", "Unread B", "Starred", "Archived", "Last Message"
        );
        println!("{}", "-".repeat(140));
    }

    let mut drifted = 0usize;
    for conversation in &conversations {
        println!(
            "{:<26} {:<16} {:<16} {:>8} {:>8} {:<8} {:<8} {:<40}",
            conversation.id,
            conversation.participant_a,
            conversation.participant_b,
            conversation.unread_count_a,
            conversation.unread_count_b,
            conversation.is_starred,
            conversation.is_archived,
            conversation.last_message_preview.as_deref().unwrap_or("NULL"),
        );

        let sides = [
            (&conversation.participant_a, conversation.unread_count_a),
            (&conversation.participant_b, conversation.unread_count_b),
        ];
        for (participant_id, stored) in sides {
            let actual = UnreadCounters::recount(&services.db_pool, &conversation.id, participant_id)
                .await
                .with_context(|| format!("failed to recount conversation {}", conversation.id))?;
            if actual != stored {
                drifted += 1;
                warn!(
                    conversation_id = %conversation.id,
                    participant_id = %participant_id,
                    stored,
                    actual,
                    "unread counter drifted"
                );
            }
        }
    }

    if drifted == 0 {
        println!("All unread counters match their messages");
    } else {
        println!("{drifted} unread counters drifted from their messages");
    }

    services.shutdown().await;
    Ok(())
}
