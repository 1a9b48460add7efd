use anyhow::Result;
use clap::Parser;
use flux_mcp::models::ParameterEncoding;
use flux_mcp::{Config, ToolServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "flux-mcp")]
#[command(about = "Serve image generation and chat completion tools over stdio")]
struct CliArgs {
    /// Folder for saved images (overrides FLUX_SAVE_FOLDER).
    #[arg(long, value_name = "DIR")]
    save_folder: Option<PathBuf>,

    /// How the aspect ratio is sent upstream: `structured` or `prompt-prefix`
    /// (overrides FLUX_PARAMETER_ENCODING).
    #[arg(long, value_name = "MODE")]
    parameter_encoding: Option<ParameterEncoding>,

    /// Largest accepted width/height (overrides FLUX_MAX_DIMENSION).
    #[arg(long, value_name = "PIXELS")]
    max_dimension: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flux_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting flux-mcp (upstream: {}, save folder: {}, encoding: {:?})",
        config.api_url,
        config.save_folder.display(),
        config.parameter_encoding
    );

    Arc::new(ToolServer::new(config)).serve_stdio().await?;
    Ok(())
}

fn load_config(args: CliArgs) -> flux_mcp::Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(folder) = args.save_folder {
        config = config.with_save_folder(folder);
    }
    if let Some(encoding) = args.parameter_encoding {
        config = config.with_parameter_encoding(encoding);
    }
    if let Some(max) = args.max_dimension {
        config = config.with_max_dimension(max);
    }

    config.validate()?;
    Ok(config)
}
