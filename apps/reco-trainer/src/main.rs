use clap::Parser;

use reco_trainer::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	reco_trainer::run(args).await
}
