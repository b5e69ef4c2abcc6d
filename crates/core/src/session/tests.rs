//! Unit tests for the session module

use std::time::Duration;

use super::*;
use crate::surface::testing::{ScriptedSurface, Step};
use crate::surface::{Fragment, RenderedMessage};

fn test_config() -> SessionConfig {
    SessionConfig::builder()
        .with_bridge_command(vec!["bridge".to_string()])
        .with_token("tok")
        .with_channel_id("chan")
        .with_bot_user_id("42")
        .with_bot_name("checkbot")
        .with_ready_timeout(Duration::from_secs(1))
        .with_poll_interval(Duration::from_millis(100))
        .build()
}

fn session_over(surface: &ScriptedSurface) -> BotSession {
    BotSession::new(test_config(), Box::new(surface.clone()))
}

fn bot_message(content: &str) -> RenderedMessage {
    RenderedMessage {
        author_id: Some("42".to_string()),
        app_badge: true,
        content: content.to_string(),
        fragments: vec![],
    }
}

fn user_message(content: &str) -> RenderedMessage {
    RenderedMessage {
        author_id: Some("7".to_string()),
        app_badge: false,
        content: content.to_string(),
        fragments: vec![],
    }
}

#[test]
fn test_author_id_predicate() {
    assert!(author_id_matches(&bot_message("hi"), "42"));
    assert!(!author_id_matches(&user_message("hi"), "42"));
    assert!(!author_id_matches(&RenderedMessage::default(), "42"));
}

#[test]
fn test_badge_predicate() {
    let badged_anonymous = RenderedMessage {
        author_id: None,
        app_badge: true,
        ..RenderedMessage::default()
    };
    assert!(badge_without_conflict(&badged_anonymous, "42"));

    let badged_conflicting = RenderedMessage {
        author_id: Some("7".to_string()),
        app_badge: true,
        ..RenderedMessage::default()
    };
    assert!(!badge_without_conflict(&badged_conflicting, "42"));

    let unbadged = RenderedMessage::default();
    assert!(!badge_without_conflict(&unbadged, "42"));
}

#[test]
fn test_mention_predicate() {
    let in_text = RenderedMessage {
        content: "checkbot is thinking".to_string(),
        ..RenderedMessage::default()
    };
    assert!(mentions_target(&in_text, "checkbot"));

    let in_fragment = RenderedMessage {
        fragments: vec![Fragment {
            title: Some("checkbot results".to_string()),
            body: None,
        }],
        ..RenderedMessage::default()
    };
    assert!(mentions_target(&in_fragment, "checkbot"));

    assert!(!mentions_target(&RenderedMessage::default(), "checkbot"));
    // An empty target name must not match everything.
    assert!(!mentions_target(&in_text, ""));
}

#[test]
fn test_is_from_target_ordered_or() {
    let config = test_config();

    // Id signal alone suffices.
    let by_id = RenderedMessage {
        author_id: Some("42".to_string()),
        ..RenderedMessage::default()
    };
    assert!(is_from_target(&by_id, &config));

    // Mention signal is the last resort.
    let by_mention = RenderedMessage {
        author_id: Some("7".to_string()),
        content: "checkbot: scanning".to_string(),
        ..RenderedMessage::default()
    };
    assert!(is_from_target(&by_mention, &config));

    assert!(!is_from_target(&user_message("unrelated"), &config));
}

#[tokio::test]
async fn test_launch_ready() {
    let surface = ScriptedSurface::new();
    let mut session = session_over(&surface);

    session.launch().await.unwrap();
    assert_eq!(surface.state.lock().unwrap().opened, 1);
}

#[tokio::test(start_paused = true)]
async fn test_launch_times_out_without_ready_indicator() {
    let surface = ScriptedSurface::new();
    surface.state.lock().unwrap().ready = false;
    let mut session = session_over(&surface);

    let err = session.launch().await.unwrap_err();
    assert!(matches!(err, SessionError::Launch(_)));
}

#[tokio::test]
async fn test_send_command_captures_baseline_before_send() {
    let surface = ScriptedSurface::new();
    {
        let mut state = surface.state.lock().unwrap();
        state.messages.push(user_message("old 1"));
        state.messages.push(user_message("old 2"));
    }
    let mut session = session_over(&surface);

    let baseline = session.send_command("check example.com").await.unwrap();
    assert_eq!(baseline, ReplyBaseline(2));
    assert_eq!(surface.state.lock().unwrap().submits, 1);
}

#[tokio::test]
async fn test_send_command_retries_once() {
    let surface = ScriptedSurface::new();
    surface.state.lock().unwrap().accept_from_submit = 2;
    let mut session = session_over(&surface);

    session.send_command("check example.com").await.unwrap();
    assert_eq!(surface.state.lock().unwrap().submits, 2);
}

#[tokio::test]
async fn test_send_command_fails_after_two_attempts() {
    let surface = ScriptedSurface::new();
    surface.state.lock().unwrap().accept_from_submit = u32::MAX;
    let mut session = session_over(&surface);

    let err = session.send_command("check example.com").await.unwrap_err();
    assert!(matches!(err, SessionError::Send(_)));
    assert_eq!(surface.state.lock().unwrap().submits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_observe_no_reply_times_out() {
    let surface = ScriptedSurface::new();
    let mut session = session_over(&surface);

    let err = session
        .observe_reply(
            ReplyBaseline(0),
            |_| true,
            Duration::from_secs(1),
            2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoReply));
}

#[tokio::test(start_paused = true)]
async fn test_observe_ignores_pre_existing_history() {
    let surface = ScriptedSurface::new();
    surface
        .state
        .lock()
        .unwrap()
        .messages
        .push(bot_message("stale reply"));
    let mut session = session_over(&surface);

    // Baseline sits above the stale reply, so nothing matches.
    let err = session
        .observe_reply(
            ReplyBaseline(1),
            |_| true,
            Duration::from_secs(1),
            2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoReply));
}

#[tokio::test(start_paused = true)]
async fn test_observe_tracks_edits_and_reports_each_change() {
    let surface = ScriptedSurface::with_steps(vec![
        Step::Post(user_message("someone else")),
        Step::Post(bot_message("checking...")),
        Step::Edit(1, bot_message("checking...\nVendorA done")),
        Step::Edit(1, bot_message("checking...\nVendorA done\nVendorB done")),
    ]);
    let mut session = session_over(&surface);

    let mut updates = Vec::new();
    let content = session
        .observe_reply(
            ReplyBaseline(0),
            |content| {
                updates.push(content.text.clone());
                content.text.contains("VendorB")
            },
            Duration::from_secs(10),
            2,
        )
        .await
        .unwrap();

    assert_eq!(updates.len(), 3);
    assert!(content.text.ends_with("VendorB done"));
}

#[tokio::test(start_paused = true)]
async fn test_observe_picks_newest_matching_message() {
    // Both candidates are already visible when the first scan runs.
    let surface = ScriptedSurface::new();
    surface.state.lock().unwrap().messages = vec![
        bot_message("older reply"),
        bot_message("newest reply"),
    ];
    let mut session = session_over(&surface);

    let content = session
        .observe_reply(
            ReplyBaseline(0),
            |_| true,
            Duration::from_secs(5),
            1,
        )
        .await
        .unwrap();
    assert_eq!(content.text, "newest reply");
}

#[tokio::test(start_paused = true)]
async fn test_observe_incomplete_returns_partial_at_timeout() {
    let surface = ScriptedSurface::with_steps(vec![
        Step::Post(bot_message("partial 1")),
        Step::Edit(0, bot_message("partial 2")),
    ]);
    let mut session = session_over(&surface);

    let started = tokio::time::Instant::now();
    let content = session
        .observe_reply(
            ReplyBaseline(0),
            |_| false,
            Duration::from_secs(2),
            2,
        )
        .await
        .unwrap();

    // Stability alone must not end an incomplete observation.
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(content.text, "partial 2");
}

#[test]
fn test_reply_content_combined_text_first() {
    let content = ReplyContent {
        text: "header".to_string(),
        fragments: vec!["fragment a".to_string(), "fragment b".to_string()],
    };
    assert_eq!(content.combined(), "header\nfragment a\nfragment b");

    let bare = ReplyContent {
        text: String::new(),
        fragments: vec!["only fragment".to_string()],
    };
    assert_eq!(bare.combined(), "only fragment");
}
