use clap::Parser;

mod cli;
mod commands;
mod config;
mod retry;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::RtConfig::load_or_default(cli.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_max_level(config.log.max_level(cli.verbose)?)
        .with_writer(std::io::stderr)
        .init();
    commands::run_command(cli, config)
}
