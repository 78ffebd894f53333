use std::path::PathBuf;

use clap::Parser;
use lib_core::{AppResult, Coldlink, PipelineConfig, RawTargetSpec, TargetSpec, VariantMap, config::STORAGE_DIR_VAR};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Remote image to fetch
    url: String,

    /// Base name shared by every generated file
    local_name: String,

    /// `orig`, `sm`, `xs`, `<name>=copy` or `<name>=<W>x<H>`, defaults to all presets
    #[arg(short, long = "target")]
    targets: Vec<RawTargetSpec>,

    /// Overrides COLDLINK_STORAGE_DIR
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Overrides COLDLINK_MAX_ORIG_IMAGE_SIZE, 0 for unlimited
    #[arg(long)]
    max_size: Option<u64>,
}

async fn run(cli: Cli) -> AppResult<VariantMap> {
    let storage_dir = cli.storage_dir.map(|dir| dir.display().to_string());
    let mut config = PipelineConfig::from_lookup(|key| match key {
        STORAGE_DIR_VAR if storage_dir.is_some() => storage_dir.clone(),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(max_size) = cli.max_size {
        config = config.with_max_orig_size(max_size);
    }

    let targets = if cli.targets.is_empty() {
        TargetSpec::presets().iter().map(RawTargetSpec::from).collect()
    } else {
        cli.targets
    };

    let coldlink = Coldlink::new(config).await?;
    coldlink.run_raw(&cli.url, &cli.local_name, &targets).await
}

fn main() {
    // initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json().flatten_event(true))
        .init();

    // load env
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build async rt")
        .block_on(run(cli));

    match result {
        Ok(results) => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Failed to serialize results: {err}");
                std::process::exit(1);
            }
        },
        Err(err) => {
            tracing::error!(err = %err, at = err.at(), "Failed to generate variants");
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
