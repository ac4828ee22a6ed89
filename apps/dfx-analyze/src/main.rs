use clap::Parser;

use dfx_analyze::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	dfx_analyze::run(args).await
}
