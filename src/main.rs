use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{info, LevelFilter};

use llama_sidecar::web::logger::setup_logging;
use llama_sidecar::web::{serve, AppState, ModelLoader, SidecarConfig};

/// Loopback inference sidecar for a host application.
#[derive(Debug, Parser)]
#[command(name = "llama_sidecar", version, about)]
struct Args {
    /// Port on 127.0.0.1
    #[arg(short, long, default_value_t = 5000, env = "SIDECAR_PORT")]
    port: u16,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// JSON file with generation defaults and backend options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Layers to offload to the GPU
    #[arg(long)]
    gpu_layers: Option<u32>,

    #[arg(long)]
    context_size: Option<u32>,

    /// CPU threads for decoding (0 = backend default)
    #[arg(long)]
    threads: Option<i32>,
}

impl Args {
    fn apply_overrides(&self, config: &mut SidecarConfig) {
        if let Some(layers) = self.gpu_layers {
            config.backend.gpu_layers = layers;
        }
        if let Some(size) = self.context_size {
            config.backend.context_size = size;
        }
        if let Some(threads) = self.threads {
            config.backend.threads = threads;
        }
    }
}

#[cfg(feature = "llama")]
fn make_loader(config: &SidecarConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    let loader = llama_sidecar::web::llama_backend::LlamaLoader::new(config.backend.clone())
        .map_err(|e| anyhow!(e))?;
    Ok(Arc::new(loader))
}

#[cfg(not(feature = "llama"))]
fn make_loader(_config: &SidecarConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    log::warn!("Built without an inference backend; /load will fail");
    Ok(Arc::new(llama_sidecar::web::NoBackendLoader))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_path = setup_logging(&args.log_dir, args.log_level)
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;
    info!("Logging to {}", log_path.display());

    let mut config = SidecarConfig::load(args.config.as_deref()).map_err(|e| anyhow!(e))?;
    args.apply_overrides(&mut config);
    config.validate().map_err(|e| anyhow!(e))?;

    let loader = make_loader(&config)?;
    info!("Inference backend: {}", loader.name());

    let state = Arc::new(AppState::new(loader, config.generation));

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, args.port));
    let listener = TcpListener::bind(addr).with_context(|| format!("Failed to bind {addr}"))?;
    listener.set_nonblocking(true)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    serve(listener, state.clone(), shutdown).await?;

    state.manager.shutdown().await;
    info!("Sidecar stopped");
    Ok(())
}
