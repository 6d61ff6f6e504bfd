use clap::Parser;
use std::time::Duration;

use crate::connection::ManagerConfig;
use crate::connection::manager::DEFAULT_GREETING;
use crate::models::websocket::FrameFormat;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Connection Args ---
    /// WebSocket endpoint of the assistant (ws:// or wss://)
    #[arg(long, env = "CHAT_ENDPOINT", default_value = "ws://127.0.0.1:4000")]
    pub endpoint: String,

    /// Consecutive failed connection attempts before giving up until a manual reconnect.
    #[arg(long, env = "RECONNECT_MAX_ATTEMPTS", default_value = "5")]
    pub max_attempts: u32,

    /// Fixed delay between reconnection attempts, in milliseconds.
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value = "3000")]
    pub retry_delay_ms: u64,

    /// Interval used to size how long a send waits for the connection, in milliseconds.
    #[arg(long, env = "CONNECT_POLL_INTERVAL_MS", default_value = "100")]
    pub connect_poll_interval_ms: u64,

    /// Number of intervals a send waits for the connection before giving up.
    #[arg(long, env = "CONNECT_POLL_CHECKS", default_value = "50")]
    pub connect_poll_checks: u32,

    /// Outbound frame format: raw text, or a {"action":"sendMessage"} JSON envelope.
    #[arg(long, value_enum, env = "FRAME_FORMAT", default_value = "text")]
    pub frame_format: FrameFormat,

    // --- Session Args ---
    /// Greeting shown at the start of every new conversation.
    #[arg(long, env = "CHAT_GREETING", default_value = DEFAULT_GREETING)]
    pub greeting: String,

    /// Path to the JSON file holding UI preferences.
    #[arg(long, env = "PREFS_PATH", default_value = ".chat_prefs.json")]
    pub prefs_path: String,

    /// Signed-in user name. Without it the session is unauthenticated.
    #[arg(long, env = "CHAT_USER")]
    pub user: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            endpoint: self.endpoint.clone(),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            connect_poll_interval: Duration::from_millis(self.connect_poll_interval_ms),
            connect_poll_checks: self.connect_poll_checks,
            frame_format: self.frame_format,
            greeting: self.greeting.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_manager_defaults() {
        let args = Args::parse_from(["wayfarer-chat"]);
        let config = args.manager_config();
        let defaults = ManagerConfig::default();
        assert_eq!(config.endpoint, defaults.endpoint);
        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.retry_delay, defaults.retry_delay);
        assert_eq!(config.ensure_connected_timeout(), Duration::from_secs(5));
        assert_eq!(config.frame_format, FrameFormat::Text);
        assert_eq!(config.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "wayfarer-chat",
            "--endpoint",
            "wss://example.com/production/",
            "--max-attempts",
            "2",
            "--retry-delay-ms",
            "250",
            "--frame-format",
            "json",
        ]);
        let config = args.manager_config();
        assert_eq!(config.endpoint, "wss://example.com/production/");
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.frame_format, FrameFormat::Json);
    }
}
