mod app;
mod commands;
mod config;
mod render;

use std::path::Path;

use log::LevelFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    engine_logging::initialize(engine_logging::LogDestination::File, LevelFilter::Info);

    let config = config::load_config(Path::new(config::CONFIG_FILE))
        .with_backend_override(std::env::var(config::BACKEND_URL_ENV).ok());
    app::run(config).await
}
