//! Reply observation state machine
//!
//! The checker bot answers by posting one message and then editing it in place
//! as vendor verdicts trickle in, sometimes pausing for seconds between edits.
//! Observation therefore runs in two phases: find the reply among messages
//! newer than the send-time baseline, then re-read that one slot until the
//! caller reports the content complete and it has stayed stable for a number
//! of polls. An incomplete reply is only ever ended by the hard timeout.

use tokio::time::{Instant, sleep};

use super::{BotSession, SessionError, SessionResult, is_from_target};
use crate::surface::RenderedMessage;

/// Count of visible messages at command-send time.
///
/// Messages at or below this index are pre-existing history and never
/// considered as the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyBaseline(pub usize);

/// Extracted content of the tracked reply message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyContent {
    /// Plain message text
    pub text: String,

    /// Rendered rich-content fragments, in attachment order
    pub fragments: Vec<String>,
}

impl ReplyContent {
    pub(crate) fn from_message(message: &RenderedMessage) -> Self {
        Self {
            text: message.content.clone(),
            fragments: message
                .fragments
                .iter()
                .map(|f| f.rendered())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Full reply text, plain text first, fragments appended in order
    pub fn combined(&self) -> String {
        let mut combined = self.text.clone();
        for fragment in &self.fragments {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(fragment);
        }
        combined
    }
}

impl BotSession {
    /// Observe the reply to a previously-sent command.
    ///
    /// `on_update` is invoked every time the tracked content changes and
    /// returns whether the content is complete. While incomplete, stability
    /// never ends the wait; only the hard `timeout` does. Once complete, the
    /// wait ends after `stable_exit` consecutive unchanged polls.
    ///
    /// Returns the best content captured so far on timeout, and
    /// `SessionError::NoReply` when no matching message ever appeared.
    pub async fn observe_reply<F>(
        &mut self,
        baseline: ReplyBaseline,
        mut on_update: F,
        timeout: std::time::Duration,
        stable_exit: u32,
    ) -> SessionResult<ReplyContent>
    where
        F: FnMut(&ReplyContent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut tracked: Option<(usize, ReplyContent)> = None;
        let mut unchanged = 0u32;
        let mut complete = false;

        loop {
            if tracked.is_none() {
                // WaitingForFirstMessage: scan newer messages, newest first.
                let newer = self.surface.read_messages_from(baseline.0).await?;
                let found = newer
                    .iter()
                    .enumerate()
                    .rev()
                    .find(|(_, message)| is_from_target(message, &self.config));

                if let Some((offset, message)) = found {
                    let slot = baseline.0 + offset;
                    let content = ReplyContent::from_message(message);
                    tracing::debug!(slot, "tracking reply message");
                    complete = on_update(&content);
                    tracked = Some((slot, content));
                    unchanged = 0;
                }
            } else if let Some((slot, last)) = tracked.as_mut() {
                // TrackingEdits: re-read the same slot; the bot edits in place.
                match self.surface.read_message_at(*slot).await? {
                    Some(message) => {
                        let content = ReplyContent::from_message(&message);
                        if content != *last {
                            complete = on_update(&content);
                            *last = content;
                            unchanged = 0;
                        } else {
                            unchanged += 1;
                        }
                    }
                    // Slot no longer readable; treat as an unchanged poll.
                    None => unchanged += 1,
                }

                if complete && unchanged >= stable_exit {
                    return Ok(last.clone());
                }
            }

            if Instant::now() >= deadline {
                return match tracked {
                    Some((_, content)) => Ok(content),
                    None => Err(SessionError::NoReply),
                };
            }

            sleep(self.config.poll_interval).await;
        }
    }
}
