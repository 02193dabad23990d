use anyhow::{Context, Result};
use renderer::{export_still, run_window, RenderPolicy, RendererConfig, StillRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config;

pub fn run(cli: Cli) -> Result<()> {
    let file = config::load(cli.config.as_deref())?;
    let renderer_config = config::resolve(&cli, &file)?;

    if let Some(path) = cli.still_export.as_deref() {
        let request = still_request(&renderer_config);
        let written = export_still(&request, path)
            .with_context(|| format!("failed to export still frame to {}", path.display()))?;
        println!("{}", written.display());
        return Ok(());
    }

    info!(
        width = renderer_config.surface_size.0,
        height = renderer_config.surface_size.1,
        power = %renderer_config.power,
        policy = ?renderer_config.policy,
        "launching horizon window"
    );
    run_window(&renderer_config)
}

fn still_request(config: &RendererConfig) -> StillRequest {
    let time = match config.policy {
        RenderPolicy::Still { time } => time,
        RenderPolicy::Animate => 0.0,
    };
    let mut request = StillRequest::new(config.surface_size, time);
    request.sources = config.sources.clone();
    request
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
