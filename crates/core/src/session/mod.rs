//! Automation session module
//!
//! `BotSession` owns one interactive session with the checker bot: it can
//! launch the session, submit a check command, and observe the bot's reply as
//! it is progressively edited in place. Reply authorship is decided by an
//! ordered OR of independent signals, each testable on its own.

use tokio::time::{Instant, sleep};

pub mod config;
pub mod error;
pub mod observer;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{SessionError, SessionResult};
pub use observer::{ReplyBaseline, ReplyContent};

use crate::surface::{RenderedMessage, Surface};

/// Explicit author-id match against the target actor
pub(crate) fn author_id_matches(message: &RenderedMessage, bot_user_id: &str) -> bool {
    message.author_id.as_deref() == Some(bot_user_id)
}

/// Automated-actor badge present with no conflicting author id
pub(crate) fn badge_without_conflict(message: &RenderedMessage, bot_user_id: &str) -> bool {
    message.app_badge
        && match message.author_id.as_deref() {
            None => true,
            Some(id) => id == bot_user_id,
        }
}

/// Target identifier appears inside the rendered content
pub(crate) fn mentions_target(message: &RenderedMessage, bot_name: &str) -> bool {
    !bot_name.is_empty()
        && (message.content.contains(bot_name)
            || message
                .fragments
                .iter()
                .any(|f| f.rendered().contains(bot_name)))
}

/// Whether a rendered message was authored by the checker bot.
///
/// Signals are tried in order; the first match wins.
pub fn is_from_target(message: &RenderedMessage, config: &SessionConfig) -> bool {
    author_id_matches(message, &config.bot_user_id)
        || badge_without_conflict(message, &config.bot_user_id)
        || mentions_target(message, &config.bot_name)
}

/// One automation session bound to one external identity
pub struct BotSession {
    config: SessionConfig,
    surface: Box<dyn Surface>,
}

impl BotSession {
    /// Create a session over an already-constructed surface
    pub fn new(config: SessionConfig, surface: Box<dyn Surface>) -> Self {
        Self { config, surface }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Establish the session and wait for the ready indicator.
    ///
    /// Fails with `SessionError::Launch` when the indicator does not appear
    /// within the configured ready timeout.
    pub async fn launch(&mut self) -> SessionResult<()> {
        self.surface.open().await?;

        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            if self.surface.is_ready().await? {
                tracing::info!(channel = %self.config.channel_id, "session ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Launch(format!(
                    "ready indicator absent after {:?}",
                    self.config.ready_timeout
                )));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Submit a command through the text-entry surface.
    ///
    /// The visible message count is captured *before* submission so the reply
    /// observer can ignore pre-existing history. Acceptance is verified by the
    /// entry surface becoming empty; submission is retried exactly once.
    pub async fn send_command(&mut self, text: &str) -> SessionResult<ReplyBaseline> {
        let baseline = ReplyBaseline(self.surface.message_count().await?);

        for attempt in 0..2 {
            self.surface.set_entry_text(text).await?;
            self.surface.submit_entry().await?;

            if self.surface.entry_text().await?.is_empty() {
                return Ok(baseline);
            }
            if attempt == 0 {
                tracing::warn!("command not accepted by entry surface, resubmitting");
            }
        }

        Err(SessionError::Send(format!(
            "entry surface still holds text after resubmission: {text:?}"
        )))
    }

    /// Cheap liveness probe against the surface
    pub async fn ping(&mut self) -> SessionResult<()> {
        self.surface.ping().await?;
        Ok(())
    }

    /// Release all session resources
    pub async fn close(&mut self) -> SessionResult<()> {
        self.surface.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
