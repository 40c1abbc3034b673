//! stash CLI entrypoint.

use clap::Parser;
use stash_cache::{CacheResolver, FilesystemStore, ObjectStore, S3Store};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

mod commands;
mod config;
mod handlers;
mod logging;

use commands::{CacheArgs, Verb};
use config::{Backend, CacheConfig};

#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about = "Save and restore CI caches in S3", long_about = None)]
struct Cli {
    #[command(flatten)]
    args: CacheArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(&cli.args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "stash failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &CacheArgs) -> stash_core::Result<()> {
    let working_dir = std::env::current_dir()?;
    let config = CacheConfig::from_args(args, &working_dir)?;

    let store: Arc<dyn ObjectStore> = match &config.backend {
        Backend::Filesystem(dir) => Arc::new(FilesystemStore::new(dir.clone())),
        Backend::S3(options) => Arc::new(S3Store::connect(options.clone()).await),
    };
    let resolver = CacheResolver::new(store);

    match config.verb {
        Verb::Save => handlers::save(&resolver, &config).await,
        Verb::Restore => handlers::restore(&resolver, &config).await,
        Verb::Evict => handlers::evict(&resolver, &config).await,
    }
}
