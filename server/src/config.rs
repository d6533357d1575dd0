//! Server configuration, loaded from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_READY_QUORUM: usize = 3;
const DEFAULT_LOAD_COUNTDOWN_MS: u64 = 3000;
const DEFAULT_PLAY_DURATION_MS: u64 = 0;

/// Brush colors handed out to connecting players, round-robin by chance.
const DEFAULT_PALETTE: &str = "#ff5533,#ffd23f,#3fa7ff,#7dff6a,#ff7ae0,#f2f2f2";

/// Typed runtime configuration. Built once in `main` and passed down; no
/// global lookups after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Distinct ready signals required for Waiting → Loading.
    pub ready_quorum: usize,
    /// How long Loading lasts before Playing begins.
    pub load_countdown: Duration,
    /// Optional round length; `None` means rounds end only by admin.
    pub play_duration: Option<Duration>,
    /// Brush colors assigned to connecting players.
    pub palette: Vec<String>,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults for
    /// anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let play_ms = env_parse("PLAY_DURATION_MS", DEFAULT_PLAY_DURATION_MS);
        let palette_raw =
            std::env::var("BRUSH_PALETTE").unwrap_or_else(|_| DEFAULT_PALETTE.to_owned());

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            ready_quorum: env_parse("READY_QUORUM", DEFAULT_READY_QUORUM).max(1),
            load_countdown: Duration::from_millis(env_parse(
                "LOAD_COUNTDOWN_MS",
                DEFAULT_LOAD_COUNTDOWN_MS,
            )),
            play_duration: match play_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            palette: parse_palette(&palette_raw),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ready_quorum: DEFAULT_READY_QUORUM,
            load_countdown: Duration::from_millis(DEFAULT_LOAD_COUNTDOWN_MS),
            play_duration: None,
            palette: parse_palette(DEFAULT_PALETTE),
        }
    }
}

fn parse_palette(raw: &str) -> Vec<String> {
    let colors: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect();
    if colors.is_empty() {
        parse_palette(DEFAULT_PALETTE)
    } else {
        colors
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
