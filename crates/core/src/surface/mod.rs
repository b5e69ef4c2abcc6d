//! Observable session surface abstraction
//!
//! The checker bot is only reachable through a rendered interactive session.
//! Everything the automation layer needs from that session is expressed as the
//! `Surface` trait, so the reply observer and the pool can be driven against a
//! live bridge process or a scripted test double interchangeably.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bridge;

pub use bridge::BridgeSurface;

/// Errors raised by a session surface
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// Bridge process could not be started
    #[error("Failed to spawn bridge process: {0}")]
    Spawn(String),

    /// IO error on the bridge channel
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame on the bridge channel
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The bridge reported an operation failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// The surface was closed and can no longer be used
    #[error("Surface closed")]
    Closed,
}

/// One rich-content fragment attached to a rendered message
///
/// The bot attaches structured cards next to its plain text; only their
/// rendered text matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Fragment {
    /// Rendered text of this fragment, title first
    pub fn rendered(&self) -> String {
        match (&self.title, &self.body) {
            (Some(t), Some(b)) => format!("{t}\n{b}"),
            (Some(t), None) => t.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => String::new(),
        }
    }
}

/// One message as currently rendered in the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Author id, when the renderer exposes one
    #[serde(default)]
    pub author_id: Option<String>,

    /// Whether the rendered "automated actor" badge is present
    #[serde(default)]
    pub app_badge: bool,

    /// Plain message text
    #[serde(default)]
    pub content: String,

    /// Rich-content fragments attached to the message
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

/// Capability contract for one interactive session
///
/// All methods take `&mut self`: a surface serves exactly one caller at a time,
/// which the pool enforces one level up.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Establish the session: inject the identity and navigate to the
    /// configured channel.
    async fn open(&mut self) -> Result<(), SurfaceError>;

    /// Whether the ready indicator is currently visible.
    async fn is_ready(&mut self) -> Result<bool, SurfaceError>;

    /// Number of messages currently visible in the channel.
    async fn message_count(&mut self) -> Result<usize, SurfaceError>;

    /// Messages newer than `baseline`, oldest first.
    async fn read_messages_from(
        &mut self,
        baseline: usize,
    ) -> Result<Vec<RenderedMessage>, SurfaceError>;

    /// Re-read the message at an absolute slot index. The bot edits one
    /// message in place, so the same slot is read repeatedly.
    async fn read_message_at(
        &mut self,
        index: usize,
    ) -> Result<Option<RenderedMessage>, SurfaceError>;

    /// Current contents of the text-entry field.
    async fn entry_text(&mut self) -> Result<String, SurfaceError>;

    /// Replace the contents of the text-entry field.
    async fn set_entry_text(&mut self, text: &str) -> Result<(), SurfaceError>;

    /// Submit the text-entry field.
    async fn submit_entry(&mut self) -> Result<(), SurfaceError>;

    /// Cheap liveness probe.
    async fn ping(&mut self) -> Result<(), SurfaceError>;

    /// Release all session resources.
    async fn close(&mut self) -> Result<(), SurfaceError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_rendered() {
        let fragment = Fragment {
            title: Some("Results".to_string()),
            body: Some("FortiGuard".to_string()),
        };
        assert_eq!(fragment.rendered(), "Results\nFortiGuard");

        let empty = Fragment::default();
        assert_eq!(empty.rendered(), "");
    }

    #[test]
    fn test_rendered_message_serialization() {
        let msg = RenderedMessage {
            author_id: Some("42".to_string()),
            app_badge: true,
            content: "checking".to_string(),
            fragments: vec![],
        };

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: RenderedMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_rendered_message_defaults() {
        let parsed: RenderedMessage = serde_json::from_str("{}").unwrap();
        assert!(parsed.author_id.is_none());
        assert!(!parsed.app_badge);
        assert!(parsed.content.is_empty());
        assert!(parsed.fragments.is_empty());
    }
}
