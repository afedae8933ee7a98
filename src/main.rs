use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

use product_namer::{
    clipboard::Osc52Clipboard,
    config::Config,
    controller::NamerController,
    gemini::GeminiClient,
    models::{ImageUpload, RequestState},
    preview::PreviewStore,
    routes::{router, spawn_session_reaper, AppState},
};

#[derive(Parser)]
#[command(name = "product-namer")]
#[command(version, about = "Get a marketable product name from a photo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the upload page and API (default)
    Serve,

    /// Name a single image file and print the result
    Name {
        /// Product photo
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Also copy the name to the terminal clipboard (OSC 52)
        #[arg(long)]
        copy: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = Config::from_env()?;
    tracing::info!("Using API key: {}", config.redacted_key());
    let gemini = Arc::new(GeminiClient::new(&config).context("building HTTP client")?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, gemini).await,
        Commands::Name { image, copy } => name_file(gemini, image, copy).await,
    }
}

async fn serve(config: Config, gemini: Arc<GeminiClient>) -> anyhow::Result<()> {
    let state = AppState::new(gemini);
    let reaper = spawn_session_reaper(state.clone(), config.session_ttl);
    let app = router(state, config.max_upload_bytes);

    let addr = SocketAddr::new(config.bind_addr, config.port);
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");
    reaper.abort();
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn name_file(gemini: Arc<GeminiClient>, path: PathBuf, copy: bool) -> anyhow::Result<()> {
    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let controller = NamerController::new(PreviewStore::new(), gemini);
    controller.select_image(ImageUpload { file_name, declared_type: None, data: Bytes::from(data) })?;

    let view = controller.generate().await?;
    match (view.state, view.name, view.error) {
        (RequestState::Succeeded, Some(name), _) => {
            println!("{}", name);
            if copy {
                controller.copy(&Osc52Clipboard::stdout())?;
                eprintln!("Copied!");
            }
            Ok(())
        }
        (_, _, error) => anyhow::bail!(error.unwrap_or_else(|| "An unknown error occurred during analysis.".into())),
    }
}
