use aukletd::{Cli, Settings, daemon, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(Cli::parse())?;
    logging::init(&settings.log);
    daemon::run(settings).await
}
