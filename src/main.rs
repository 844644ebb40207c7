use clap::Parser;

mod cli;
mod command;
mod github;
mod repo;
mod result;
mod trello;
mod version;

use crate::result::Result;

fn initialize_logger(debug: bool) -> Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("testable")
        .build();

    simplelog::TermLogger::init(
        filter,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = cli::Args::parse();

    initialize_logger(args.debug)?;

    command::testable::execute(&args).await
}
