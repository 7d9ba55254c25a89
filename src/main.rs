use anyhow::Result;
use api_client::ApiClient;
use args::Cli;
use clap::Parser;
use runner::Runner;

mod api_client;
mod args;
mod extract;
mod runner;

fn main() -> Result<()> {
    let cli = Cli::try_parse()?;

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let client = ApiClient::new(&cli.server_url, &cli.api_key)?;
    Runner::new(client).run(cli.command)
}
