//! Automation session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one automation session
///
/// Each session is bound to one external identity and one channel; the fleet is
/// built from a list of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bridge executable and arguments
    pub bridge_command: Vec<String>,

    /// Identity token injected at open
    pub token: String,

    /// Channel the session navigates to
    pub channel_id: String,

    /// Author id of the checker bot
    pub bot_user_id: String,

    /// Display name of the checker bot, matched inside rendered content when
    /// no author id is exposed
    pub bot_name: String,

    /// How long to wait for the ready indicator after open
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: Duration,

    /// Fixed polling interval for ready checks and reply observation
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1500)
}

impl SessionConfig {
    /// Create a configuration builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for session configuration
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    bridge_command: Vec<String>,
    token: String,
    channel_id: String,
    bot_user_id: String,
    bot_name: String,
    ready_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl SessionConfigBuilder {
    /// Set the bridge executable and arguments
    pub fn with_bridge_command(mut self, command: Vec<String>) -> Self {
        self.bridge_command = command;
        self
    }

    /// Set the identity token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the target channel
    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Set the checker bot's author id
    pub fn with_bot_user_id(mut self, bot_user_id: impl Into<String>) -> Self {
        self.bot_user_id = bot_user_id.into();
        self
    }

    /// Set the checker bot's display name
    pub fn with_bot_name(mut self, bot_name: impl Into<String>) -> Self {
        self.bot_name = bot_name.into();
        self
    }

    /// Set the ready-indicator timeout
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Set the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            bridge_command: self.bridge_command,
            token: self.token,
            channel_id: self.channel_id,
            bot_user_id: self.bot_user_id,
            bot_name: self.bot_name,
            ready_timeout: self.ready_timeout.unwrap_or_else(default_ready_timeout),
            poll_interval: self.poll_interval.unwrap_or_else(default_poll_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SessionConfig::builder()
            .with_token("tok")
            .with_channel_id("chan")
            .with_bot_user_id("42")
            .with_bot_name("checkbot")
            .build();

        assert_eq!(config.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.bot_name, "checkbot");
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig::builder()
            .with_bridge_command(vec!["bridge".to_string(), "--headless".to_string()])
            .with_ready_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(100))
            .build();

        assert_eq!(config.bridge_command.len(), 2);
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let json = r#"{
            "bridge_command": ["bridge"],
            "token": "tok",
            "channel_id": "chan",
            "bot_user_id": "42",
            "bot_name": "checkbot"
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ready_timeout, Duration::from_secs(30));
    }
}
