use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jetty::{
    CanvasRenderer, Config, ConnectionManager, ExecutionSync, JpegPassthrough, SharedFramebuffer,
    SyncEvent, Target, topics,
};

/// Connect to a realtime sync target and log lifecycle and execution
/// state transitions.
#[derive(Parser, Debug)]
#[command(name = "jetty")]
struct Cli {
    /// API origin the socket URL is derived from.
    #[arg(long, env = "JETTY_API_ORIGIN")]
    origin: Option<String>,

    /// Workflow id to follow. Without it, joins the video session.
    #[arg(long, short = 'w')]
    workflow: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(origin) = cli.origin {
        config.api_origin = origin;
    }

    let manager = ConnectionManager::with_websocket(config);
    let execution = ExecutionSync::attach(&manager);
    let framebuffer = SharedFramebuffer::new();
    let _renderer = CanvasRenderer::attach(
        &manager,
        Box::new(framebuffer.clone()),
        Box::new(JpegPassthrough),
    );

    manager.on(topics::CONNECTED, |_| info!("connected"));
    manager.on(topics::DISCONNECTED, |_| info!("disconnected"));
    manager.on(topics::ERROR, |event| {
        if let SyncEvent::Error { message } = event {
            tracing::warn!(%message, "sync error");
        }
    });
    manager.on("state_sync", |_| info!("execution state synced"));
    manager.on("workflow_completed", |_| info!("workflow completed"));
    manager.on("workflow_failed", |_| info!("workflow failed"));

    let target = match cli.workflow {
        Some(id) => Target::workflow(id),
        None => Target::Video,
    };
    manager.connect(target);

    tokio::signal::ctrl_c().await?;
    let state = execution.snapshot();
    info!(
        status = ?state.status,
        completed = state.completed_nodes.len(),
        frames = framebuffer.presented(),
        "shutting down"
    );
    manager.disconnect();
    Ok(())
}
