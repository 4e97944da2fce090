use anyhow::Context;
use clap::Parser;
use lyrics_guard::utils::{logger, validation::Validate};
use lyrics_guard::{
    BreakerRegistry, CircuitState, CliConfig, Clock, ContentCache, HttpLyricsSource, LyricsFetcher,
    RateLimiter, SystemClock,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();
    let config = cli.load().context("Failed to load configuration")?;

    // 初始化日誌
    if config.logging.json {
        logger::init_json_logger(&config.logging.level);
    } else {
        logger::init_cli_logger(matches!(config.logging.level.as_str(), "debug" | "trace"));
    }

    tracing::info!("Starting lyrics-guard CLI");
    tracing::debug!("Effective config: {:?}", config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    if cli.tracks.is_empty() {
        eprintln!("No tracks given, use --track \"TITLE::ARTIST\"");
        std::process::exit(2);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = BreakerRegistry::new(clock.clone());

    let source = HttpLyricsSource::new(
        &config.source.endpoint,
        config.source_timeout(),
        &config.source.user_agent,
    )
    .context("Failed to build lyrics source")?;
    let cache = Arc::new(ContentCache::new(config.cache_config()));
    let rate_limiter = Arc::new(
        RateLimiter::try_new(config.rate_limiter_config(), clock)
            .context("Invalid rate limit settings")?,
    );

    let mut fetcher = LyricsFetcher::new(source, cache, rate_limiter);
    if config.circuit_breaker.enabled {
        let breaker =
            registry.get_or_create(&config.circuit_breaker.name, config.breaker_config());
        fetcher = fetcher.with_circuit_breaker(breaker);
    }
    let fetcher = Arc::new(fetcher);

    let results = fetcher.fetch_many(cli.tracks.clone(), cli.concurrency).await;

    let mut found = 0;
    for (query, lyrics) in cli.tracks.iter().zip(&results) {
        match lyrics {
            Some(text) => {
                found += 1;
                println!("✅ {} - {}\n{}\n", query.artist, query.title, text);
            }
            None => println!("❌ {} - {}: no lyrics\n", query.artist, query.title),
        }
    }

    tracing::info!(found, total = results.len(), "Lookup finished");

    let circuit = fetcher.circuit_breaker().map(|breaker| breaker.get_state());
    if let Some(snapshot) = &circuit {
        if snapshot.state != CircuitState::Closed {
            tracing::warn!(
                breaker = %snapshot.name,
                state = %snapshot.state,
                failures = snapshot.failure_count,
                "Circuit not closed at exit"
            );
        }
    }

    if cli.stats {
        let stats = json!({
            "cache": fetcher.get_cache_stats(),
            "circuit": circuit,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
