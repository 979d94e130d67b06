use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fg_server::{
    cache::new_cache,
    config::Config,
    database::Database,
    routes::{app, AppState},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the YAML configuration file. Defaults are used if it is missing.
    #[clap(long, default_value = "fg.yml")]
    config: String,

    /// The address and optionally port to bind to, overriding the configuration
    #[clap(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();
    let mut config = if std::fs::exists(&args.config)? {
        Config::load(&args.config).with_context(|| format!("Loading {}", args.config))?
    } else {
        Config::default()
    };
    if let Some(address) = args.address {
        config.server.address = address;
    }

    // initialize tracing
    let log_directory = match &config.logging.directory {
        Some(directory) => directory.into(),
        None => std::env::current_dir()?,
    };
    let file_appender = tracing_appender::rolling::daily(log_directory, "access.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // connect to the database
    let db = Database::connect(&config.database)
        .await
        .context("Connecting to database")?;

    let app = app(AppState {
        db,
        cache: new_cache(),
        api: Arc::new(config.api.clone()),
    });

    // Serve over TLS only if certificates are configured
    if let Some(tls) = &config.server.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = config.server.address.parse()?;
        tracing::info!("Listening on {} with TLS", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&config.server.address).await?;
        tracing::info!("Listening on {}", config.server.address);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
