use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use record_service::{
    AppState, Datastore, DatastoreRecordRepository, EventBus, InMemoryRecordStore,
    PgRecordStore, RecordBusiness, RecordRepository, RecordSave, RecordStore, build_router,
    config::{AppConfig, DatabaseBackend},
    web::JwtVerifier,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "record_service", about = "Multi-tenant record service")]
struct Cli {
    /// Port to listen on; overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Dotenv file to load instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.env_file {
        Some(path) => AppConfig::from_env_file(path),
        None => AppConfig::from_env(),
    }
    .context("failed to load application configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let datastore = open_datastore(&config).await?;
    datastore
        .writer()
        .ensure_schema()
        .await
        .context("failed to initialize record schema")?;
    let repository: Arc<dyn RecordRepository> = Arc::new(DatastoreRecordRepository::new(datastore));

    let collaborators = Arc::new(config.collaborators());
    let bus = EventBus::builder(config.event_bus_config())
        .register(RecordSave::new(Arc::clone(&repository)))
        .with_collaborators(Arc::clone(&collaborators))
        .build()
        .context("failed to start event bus")?;
    let bus = Arc::new(bus);

    let business = RecordBusiness::builder()
        .event_bus(Arc::clone(&bus))
        .repository(repository)
        .build()
        .context("failed to wire record business")?;

    let mut state = AppState::new(business).with_collaborators(collaborators);
    match &config.jwt_secret {
        Some(secret) => {
            state = state.with_verifier(JwtVerifier::new(secret, config.jwt_issuer.as_deref()));
        }
        None => warn!("OAUTH2_JWT_SECRET is not set; every request is served anonymously"),
    }
    let app = build_router(state);

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(service = %config.service_name, address = %addr, "record service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    bus.shutdown().await;
    let stats = bus.stats();
    info!(
        published = stats.published,
        delivered = stats.delivered,
        dead_lettered = stats.dead_lettered,
        "event bus drained"
    );

    Ok(())
}

async fn open_datastore(config: &AppConfig) -> Result<Datastore> {
    match config.database_backend {
        DatabaseBackend::Memory => {
            info!("database backend: memory");
            Ok(Datastore::new(Arc::new(InMemoryRecordStore::new())))
        }
        DatabaseBackend::Postgres => {
            info!("database backend: postgres");
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let primary = PgRecordStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            let mut datastore = Datastore::new(Arc::new(primary));

            if let Some(replica_url) = &config.replica_database_url {
                info!("read replica configured");
                let replica = PgRecordStore::connect(replica_url, config.db_max_connections)
                    .await
                    .context("failed to connect to the PostgreSQL read replica")?;
                datastore = datastore.with_read_replica(Arc::new(replica));
            }
            Ok(datastore)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("record_service=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
