mod config;
mod endpoint;
mod session;
mod tracing_helper;

use std::{env::args, path::PathBuf, sync::Arc};

use anyhow::Result;
use redtide_lib::{host::NativeHost, MemoryAccessService, MAX_TRANSFER_SIZE};
use tracing::info;

use crate::config::{Config, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)?;
    tracing_helper::init_tracing(&config.log_dir, &config.log_file_name, true)?;
    info!(
        "{} {} (max transfer {} bytes)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        MAX_TRANSFER_SIZE
    );

    let service = Arc::new(MemoryAccessService::new(NativeHost::default()));
    endpoint::run(service, &config).await
}
