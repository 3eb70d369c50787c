//! table-harvest command line
//!
//! Launches (or connects to) Chrome, harvests every page of the configured table and
//! writes the results to the output directory.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use table_harvest::browser::{BrowserSession, ConnectionOptions, LaunchOptions, PageDriver};
use table_harvest::{FileSink, HarvestConfig, Harvester};

#[derive(Parser)]
#[command(name = "table-harvest")]
#[command(version)]
#[command(about = "Extract hierarchical records from a paginated HTML table", long_about = None)]
struct Cli {
    /// First page of the table (default: from config)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// JSON configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory (default: from config)
    #[arg(long, short = 'o', value_name = "DIR")]
    out: Option<PathBuf>,

    /// Save a screenshot here when a page never loads
    #[arg(long, value_name = "DIR")]
    diagnostics: Option<PathBuf>,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    chrome_path: Option<PathBuf>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,

    /// WebSocket endpoint URL for remote browser connection
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Log every selector attempt and poll
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn harvest_config(&self) -> anyhow::Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => HarvestConfig::default(),
        };
        if let Some(url) = &self.url {
            config = config.with_start_url(url);
        }
        if let Some(dir) = &self.out {
            config.output.dir = dir.clone();
        }
        if let Some(dir) = &self.diagnostics {
            config.output.diagnostics_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }

    fn open_session(&self) -> anyhow::Result<BrowserSession> {
        if let Some(endpoint) = &self.ws_endpoint {
            log::info!("Connecting to browser at {}", endpoint);
            return BrowserSession::connect(ConnectionOptions::new(endpoint.as_str()))
                .context("Failed to connect to browser");
        }

        let mut options = LaunchOptions::new().headless(!self.headed);
        if let Some(path) = &self.chrome_path {
            options = options.chrome_path(path.clone());
        }
        if let Some(dir) = &self.user_data_dir {
            options = options.user_data_dir(dir.clone());
        }
        log::info!("Launching {} browser", if options.headless { "headless" } else { "headed" });
        BrowserSession::launch(options).context("Failed to launch browser")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    log::info!("table-harvest v{}", env!("CARGO_PKG_VERSION"));
    let config = cli.harvest_config()?;
    let session = cli.open_session()?;

    let sink = FileSink::from_config(&config);
    let outcome = Harvester::new(&session, config, sink).run();

    // Close exactly once, whether the run succeeded or not
    if let Err(e) = session.close() {
        log::warn!("Failed to close browser tab: {}", e);
    }

    let (report, _state) = outcome.context("Harvest failed")?;
    println!("{}", report);
    Ok(())
}
