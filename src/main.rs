use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journal_companion::{
    api::routes,
    config::{Config, IndexBackendKind},
    models::UserId,
    orchestrator::{import::read_import_file, JournalOrchestrator},
    services::{
        embedding_service::EmbeddingService,
        llm_client::{CompletionService, CompletionSettings, GeminiClient},
    },
    storage::{ChromaClient, EntryStore, LocalIndex, RowStore, VectorIndex},
};

#[derive(Parser)]
#[command(name = "journal-companion", version, about = "Conversational journaling assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Import old `date,title,content` entries from a CSV file
    Import {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Compare a user's entry rows with their index
    Reconcile {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load config
    let config = Arc::new(Config::load()?);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("journal_companion={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let llm = Arc::new(GeminiClient::new(CompletionSettings::from(config.as_ref()))?);
    let orchestrator = Arc::new(build_orchestrator(&config, llm.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, orchestrator, llm).await,
        Command::Import { user, file } => {
            let user = UserId::parse(&user)?;
            let entries = read_import_file(&file)?;
            tracing::info!("Importing {} entries for {}", entries.len(), user);

            let summary = orchestrator.import_entries(&user, entries).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.failed > 0 {
                anyhow::bail!("{} entries failed to import", summary.failed);
            }
            Ok(())
        }
        Command::Reconcile { user } => {
            let user = UserId::parse(&user)?;
            let report = orchestrator.reconcile(&user).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_consistent() {
                anyhow::bail!("entry rows and index disagree for {}", user);
            }
            Ok(())
        }
    }
}

fn build_orchestrator(config: &Config, llm: Arc<dyn CompletionService>) -> JournalOrchestrator {
    let index: Arc<dyn VectorIndex> = match config.index_backend {
        IndexBackendKind::Local => Arc::new(LocalIndex::new(config.index_dir())),
        IndexBackendKind::Chroma => Arc::new(ChromaClient::new(config.chroma_url.clone())),
    };

    let store = EntryStore::new(
        RowStore::new(config.entries_dir()),
        index,
        EmbeddingService::from_config(config),
    );

    JournalOrchestrator::new(
        llm,
        store,
        Duration::from_secs(config.analytics_timeout_secs),
        config.similar_entries_k,
    )
}

async fn serve(
    config: Arc<Config>,
    orchestrator: Arc<JournalOrchestrator>,
    llm: Arc<GeminiClient>,
) -> anyhow::Result<()> {
    // Verify the completion model on startup
    match llm.health_check().await {
        Ok(true) => tracing::info!("Completion model {} reachable", llm.model()),
        Ok(false) => tracing::warn!("Completion model {} health check failed", llm.model()),
        Err(e) => tracing::warn!(
            "Completion service not available: {}. Conversations will fail until it is.",
            e
        ),
    }

    if config.index_backend == IndexBackendKind::Chroma {
        if let Err(e) = ChromaClient::new(config.chroma_url.clone()).ping().await {
            tracing::warn!("Chroma at {} not reachable: {}", config.chroma_url, e);
        }
    }

    let state = routes::AppState::new(config.clone(), orchestrator);
    let app = routes::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Entries stored under {}", config.data_path().display());
    if config.api_key.is_none() {
        tracing::warn!("No api_key configured; /api/v1 is open to anyone who can reach it");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
