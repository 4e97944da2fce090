use crate::config::toml_config::LyricsGuardConfig;
use crate::domain::model::TrackQuery;
use crate::utils::error::{ResilienceError, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "lyrics-guard")]
#[command(about = "Fetch song lyrics through a rate limiter, a circuit breaker and a cache")]
pub struct CliConfig {
    #[arg(long, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long = "track",
        value_name = "TITLE::ARTIST",
        value_parser = parse_track,
        help = "Track to look up, may be repeated"
    )]
    pub tracks: Vec<TrackQuery>,

    #[arg(long, help = "Override the upstream lyrics endpoint")]
    pub endpoint: Option<String>,

    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    #[arg(long, help = "Print cache and circuit statistics as JSON")]
    pub stats: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliConfig {
    /// 載入 TOML 配置 (若有) 並套用命令列覆寫
    pub fn load(&self) -> Result<LyricsGuardConfig> {
        let mut config = match &self.config {
            Some(path) => LyricsGuardConfig::from_file(path)?,
            None => LyricsGuardConfig::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config.source.endpoint = endpoint.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if self.json_logs {
            config.logging.json = true;
        }

        Ok(config)
    }
}

/// 解析 "title::artist" 格式
pub fn parse_track(raw: &str) -> Result<TrackQuery> {
    let invalid = |reason: &str| ResilienceError::InvalidConfigValueError {
        field: "track".to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let (title, artist) = raw
        .split_once("::")
        .ok_or_else(|| invalid("Expected TITLE::ARTIST"))?;

    let (title, artist) = (title.trim(), artist.trim());
    if title.is_empty() || artist.is_empty() {
        return Err(invalid("Title and artist must both be non-empty"));
    }

    Ok(TrackQuery::new(title, artist))
}
