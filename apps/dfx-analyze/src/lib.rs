use std::{fs, path::PathBuf};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

use dfx_service::Analyzer;

/// Analyze one lost-deal document and print the forensics report as JSON.
#[derive(Debug, Parser)]
#[command(
	version = dfx_cli::VERSION,
	rename_all = "kebab",
	styles = dfx_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// UTF-8 text of the deal record.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub document: PathBuf,
	/// Reference date used when the document carries none. Defaults to today (UTC).
	#[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
	pub as_of: Option<Date>,
	/// Write the report here instead of stdout.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub output: Option<PathBuf>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = dfx_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let text = fs::read_to_string(&args.document)
		.wrap_err_with(|| format!("Failed to read document {:?}.", args.document))?;
	let analyzer = Analyzer::open(config)?;
	let as_of = args.as_of.unwrap_or_else(|| OffsetDateTime::now_utc().date());
	let result = analyzer.analyze(&text, as_of).await?;
	let json = serde_json::to_string_pretty(&result)?;

	match &args.output {
		Some(path) => {
			fs::write(path, json).wrap_err_with(|| format!("Failed to write report {path:?}."))?;

			tracing::info!(path = %path.display(), "Wrote analysis report.");
		},
		None => println!("{json}"),
	}

	Ok(())
}

fn parse_date(raw: &str) -> Result<Date, String> {
	dfx_domain::iso_date::parse(raw)
		.map_err(|err| format!("Expected a date formatted as YYYY-MM-DD: {err}."))
}
