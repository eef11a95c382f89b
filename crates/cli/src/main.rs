use anyhow::Result;
use clap::Parser;
use dbgmux_cli::cli::{Cli, Commands};
use dbgmux_cli::probe::{self, Probe};
use dbgmux_cli::{logging, relay};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match cli.command {
		Commands::Relay(args) => relay::run_relay_server(args.listen, (&args).into()).await,
		Commands::Probe(args) => {
			let result = probe::run_probe(&args.target, Probe::from(&args)).await?;
			println!("{}", serde_json::to_string_pretty(&result)?);
			Ok(())
		}
	}
}
