use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::*;

use consensus_analyzer::{
    cli, logger,
    server::{self, rate_limit::TokenBucket},
    store::catalog::Catalog,
};

#[actix_web::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everything else to register any log information
    logger::manager::init()?;

    let data_path = cli::manager::data_path();
    let catalog = Arc::new(
        Catalog::load(data_path)
            .with_context(|| format!("Failed loading simulations from {}", data_path.display()))?,
    );
    info!("Serving {} simulations", catalog.ids().len());

    if let Some(period) = cli::manager::catalog_refresh_interval() {
        catalog.clone().spawn_refresh(period);
    }

    let limiter = TokenBucket::new(cli::manager::rate_limit_burst());
    limiter.spawn_sweeper();

    server::manager::run(
        cli::manager::server_address(),
        catalog,
        limiter,
        cli::manager::rate_limit_per_minute(),
    )
    .await
    .context("REST server stopped")?;

    Ok(())
}
