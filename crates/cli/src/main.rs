use clap::Parser;
use knugget_cli::{cli::Cli, commands, logging, output};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let name = cli.command.name();
	let format = cli.format;
	if let Err(err) = commands::dispatch(cli).await {
		error!(target = "knugget", error = %err, "command failed");
		output::print_failure(name, &err, format);
		std::process::exit(1);
	}
}
