mod app;
mod commands;
mod config;
mod event;
mod logging;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgerq")]
#[command(about = "Browse a personal ledger API from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ledgerq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Rows fetched per page in the listings
  #[arg(long)]
  page_size: Option<usize>,

  /// View to open first: movements, transactions or accounts
  #[arg(short, long, default_value = "movements")]
  view: String,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.url = url;
  }
  if let Some(page_size) = args.page_size {
    config.pagination.page_size = page_size;
  }
  config.validate()?;

  let start = commands::find_command(&args.view)
    .filter(|cmd| cmd.opens_view())
    .ok_or_else(|| eyre!("Unknown view: {}", args.view))?;

  // Logs go to a file; the terminal belongs to the UI
  let _log_guard = logging::init(&config.log)?;

  let mut app = app::App::new(config, start.name)?;
  app.run().await?;

  Ok(())
}
