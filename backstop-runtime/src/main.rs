use anyhow::{Context, Result};
use backstop::{ResponseEnvelope, classify};
use backstop_runtime::config::{Args, Command};
use backstop_runtime::{DecisionReport, LimiterConfig, LimiterRegistry, Settings};
use clap::Parser;
use futures::future::join_all;
use http::HeaderMap;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("backstop={}", args.log_level).parse()?)
                .add_directive(format!("backstop_runtime={}", args.log_level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Classify { status, headers } => classify_command(status, headers),
        Command::Simulate {
            limiter,
            callers,
            timeout_ms,
            remaining,
        } => {
            let settings = Settings::load(args.config.as_deref())
                .context("failed to load limiter settings")?;
            simulate(settings, limiter, callers, timeout_ms, remaining).await
        }
    }
}

fn classify_command(status: u16, headers: Vec<(String, String)>) -> Result<()> {
    let envelope = headers
        .iter()
        .fold(ResponseEnvelope::builder(status), |builder, (name, value)| {
            builder.header(name, value)
        })
        .build()?;

    let report = DecisionReport::from(&classify(&envelope));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(
    settings: Settings,
    limiter: String,
    callers: usize,
    timeout_ms: Option<u64>,
    remaining: Option<u64>,
) -> Result<()> {
    let mut registry = LimiterRegistry::from_settings(&settings)?;
    if registry.get(&limiter).is_none() {
        tracing::warn!(
            limiter = %limiter,
            "Limiter not found in settings, using defaults"
        );
        registry.register(LimiterConfig::new(limiter.as_str()))?;
    }

    if let Some(remaining) = remaining {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", remaining.into());
        registry.update_from_headers(&limiter, &headers)?;
    }

    let timeout = timeout_ms.map(Duration::from_millis);
    tracing::info!(limiter = %limiter, callers, ?timeout, "Starting simulation");

    let results = join_all((0..callers).map(|_| registry.acquire(&limiter, timeout))).await;

    let mut granted = 0usize;
    let mut timed_out = 0usize;
    for result in results {
        match result {
            Ok(()) => granted += 1,
            Err(e) if e.is_timeout() => timed_out += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let state = registry.get_state(&limiter).await?;
    let summary = serde_json::json!({
        "granted": granted,
        "timed_out": timed_out,
        "state": state,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    registry.shutdown();
    Ok(())
}
