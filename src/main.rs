//! seoscout - Gather SEO data for a website from several APIs at once
//!
//! Probes the site, then queries the configured data providers in parallel
//! through a disk response cache and prints which sources contributed.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use seoscout::analysis::SeoAnalyzer;
use seoscout::cache::CacheKey;
use seoscout::cli::{parse_analysis_type, parse_params, AnalyzeArgs, Cli, Command};
use seoscout::config::Config;
use seoscout::report;

/// Initializes logging to stderr. RUST_LOG takes precedence over `-v`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    // Only fails if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let analysis_type = parse_analysis_type(&args.analysis_type)?;

    let mut config = Config::from_env().context("Invalid environment configuration")?;
    args.apply_overrides(&mut config);
    debug!(?config, "configuration loaded");

    let cache = Arc::new(config.response_cache());
    info!(
        dir = %cache.cache_dir().display(),
        enabled = cache.is_enabled(),
        "response cache ready"
    );

    let analyzer = SeoAnalyzer::from_config(&config, cache).with_country(args.country.as_str());
    let report = analyzer
        .analyze(&args.url, analysis_type)
        .await
        .context("Analysis could not be started")?;

    if args.json {
        println!("{}", report::render_json(&report)?);
    } else {
        println!("{}", report::render_text(&report));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
        Command::CacheKey { operation, params } => {
            let params = parse_params(&params)?;
            println!("{}", CacheKey::derive(&operation, &params));
            Ok(())
        }
    }
}
