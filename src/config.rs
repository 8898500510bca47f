//! Process-wide configuration, loaded once at boot. Every knob has a
//! sane default and is overridable through an environment variable,
//! parsed leniently: a bad or missing value falls back to the default
//! rather than failing startup.

use std::env;
use std::time::Duration;

/// Timers and sweep intervals for the call engine and presence tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an `initiated` call waits before unaccepted participants
    /// are dropped. Default 30s.
    pub call_not_accepted_timeout: Duration,
    /// How long a `connecting` participant may sit before being
    /// disconnected for inactivity. Default 30s.
    pub call_reconnecting_timeout: Duration,
    /// How often the presence sweeper scans for stale devices. Default 10s.
    pub presence_sweep_interval: Duration,
    /// How long a device must be offline before it's considered gone.
    /// Default 15s.
    pub presence_grace_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_not_accepted_timeout: Duration::from_secs(30),
            call_reconnecting_timeout: Duration::from_secs(30),
            presence_sweep_interval: Duration::from_secs(10),
            presence_grace_period: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Build a `Config` from environment variables, falling back to
    /// defaults for anything missing or unparsable.
    ///
    /// - `CALL_NOT_ACCEPTED_TIMEOUT_SECS`
    /// - `CALL_RECONNECTING_TIMEOUT_SECS`
    /// - `PRESENCE_SWEEP_INTERVAL_SECS`
    /// - `PRESENCE_GRACE_PERIOD_SECS`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = read_secs("CALL_NOT_ACCEPTED_TIMEOUT_SECS") {
            config.call_not_accepted_timeout = Duration::from_secs(v);
        }
        if let Some(v) = read_secs("CALL_RECONNECTING_TIMEOUT_SECS") {
            config.call_reconnecting_timeout = Duration::from_secs(v);
        }
        if let Some(v) = read_secs("PRESENCE_SWEEP_INTERVAL_SECS") {
            config.presence_sweep_interval = Duration::from_secs(v);
        }
        if let Some(v) = read_secs("PRESENCE_GRACE_PERIOD_SECS") {
            config.presence_grace_period = Duration::from_secs(v);
        }

        config
    }
}

fn read_secs(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}

/// Process-wide feature flags, computed once at boot and never mutated
/// afterward (mutating `with_group_calls` at runtime, as some historical
/// variants did, is deliberately not supported here).
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub with_reactions: bool,
    pub with_files: bool,
    pub with_bots: bool,
    pub with_group_calls: bool,
    pub with_voice_messages: bool,
}

impl FeatureFlags {
    /// Resolve flags from the environment, auto-disabling group calls
    /// when no SFU is configured (an enabled-but-unusable flag is worse
    /// than a disabled one).
    pub fn from_env(sfu_configured: bool) -> Self {
        let mut flags = Self {
            with_reactions: read_bool("WITH_REACTIONS", true),
            with_files: read_bool("WITH_FILES", true),
            with_bots: read_bool("WITH_BOTS", false),
            with_group_calls: read_bool("WITH_GROUP_CALLS", true),
            with_voice_messages: read_bool("WITH_VOICE_MESSAGES", true),
        };

        if flags.with_group_calls && !sfu_configured {
            tracing::warn!("WithGroupCalls requested but no SFU is configured; disabling");
            flags.with_group_calls = false;
        }

        flags
    }
}

fn read_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"),
        Err(_) => default,
    }
}
