mod cli;

use livetail::{
    config::{self, Config},
    origin::{OriginClient, PartLocator},
    server,
    streaming::LiveStreamer,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    origin: Option<String>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Command line overrides
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(origin) = origin {
        config.origin.base_url = Some(origin);
    }
    config::validate_config(&config)?;

    tracing::info!("Starting livetail");
    tracing::info!(
        "Proxying {} on {}:{}",
        config.origin.base_url.as_deref().unwrap_or("<unset>"),
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "livetail=trace,livetail_media=trace,tower_http=debug".to_string()
        } else {
            "livetail=debug,livetail_media=debug,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so `stream` can write video to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port, origin } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, origin, cli.config.as_deref()))
        }
        Commands::Probe { url, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_url(&url, json, cli.config.as_deref()))
        }
        Commands::Stream {
            url,
            output,
            fragments,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(stream_url(
                &url,
                output.as_deref(),
                fragments,
                cli.config.as_deref(),
            ))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("livetail {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Accept either a full URL or a path under `origin.base_url`.
fn resolve_url(config: &Config, input: &str) -> Result<String> {
    if input.contains("://") {
        return Ok(input.to_string());
    }
    let base = config
        .origin
        .base_url
        .as_deref()
        .context("Relative URL given but origin.base_url is not configured")?;
    Ok(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        input.trim_start_matches('/')
    ))
}

#[derive(Serialize)]
struct ProbeReport {
    url: String,
    live: bool,
    part_size: u64,
    last_part: u64,
    approximate_size: u64,
}

async fn probe_url(input: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let url = resolve_url(&config, input)?;

    let origin = Arc::new(OriginClient::new(&config.origin));
    let locator = PartLocator::new(origin, &config.locator);
    let layout = locator
        .locate(&url)
        .await
        .with_context(|| format!("Failed to probe {}", url))?;

    let report = ProbeReport {
        live: layout.is_live(),
        part_size: layout.part_size,
        last_part: layout.last_part,
        approximate_size: layout.approximate_size(),
        url,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("URL: {}", report.url);
        if report.live {
            println!("Live: yes");
            println!("Part size: {} bytes", report.part_size);
            println!("Last part: {}", report.last_part);
            println!("Approximate size: {} bytes", report.approximate_size);
        } else {
            println!("Live: no (origin reports no parts for this object)");
        }
    }

    Ok(())
}

async fn stream_url(
    input: &str,
    output: Option<&Path>,
    fragments: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let url = resolve_url(&config, input)?;

    let origin = Arc::new(OriginClient::new(&config.origin));
    let streamer = LiveStreamer::new(origin, &config);
    let Some(mut session) = streamer.open(&url).await? else {
        anyhow::bail!("{} is not a live object", url);
    };

    let mut out: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output file: {:?}", path))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    out.write_all(session.header()).await?;
    while fragments.map_or(true, |limit| session.fragments() < limit) {
        let (moof, mdat) = session.next_pair().await?;
        out.write_all(&moof).await?;
        out.write_all(&mdat).await?;
    }
    out.flush().await?;

    tracing::info!(url = %url, fragments = session.fragments(), "Stream complete");
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Origin: {}",
                config.origin.base_url.as_deref().unwrap_or("<unset>")
            );
            println!(
                "  Locator: upper bound {} bytes, cache {} entries / {}s",
                config.locator.upper_bound_bytes,
                config.locator.cache_max_entries,
                config.locator.cache_ttl_secs
            );
            match config.reader.max_fetch_attempts {
                Some(max) => println!(
                    "  Reader: retry every {}ms, at most {} attempts",
                    config.reader.retry_delay_ms, max
                ),
                None => println!(
                    "  Reader: retry every {}ms, no attempt limit",
                    config.reader.retry_delay_ms
                ),
            }
            println!(
                "  Intercepted extensions: {}",
                config.intercept.extensions.join(", ")
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
