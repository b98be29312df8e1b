// Integration tests for the voice session lifecycle
//
// Every collaborator is an in-memory fake and time is paused, so the
// chunk timer, the debounce window and playback durations are exact.

mod common;

use anyhow::{Context, Result};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use talkback::{Error, SessionCommand, SessionState, SessionUpdate};
use tokio::time::{sleep, sleep_until, Instant};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_reply_is_spoken() -> Result<()> {
    let (fakes, mut peer) = Fakes::new();
    let session = fakes.session();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    let listening_at = Instant::now();
    assert_eq!(fakes.connector.keys(), vec!["abc"]);

    // Audio flows once the first chunk interval has passed
    let audio = peer.audio.recv().await.context("no audio reached the recognizer")?;
    assert!(!audio.is_empty());
    assert!(Instant::now() >= listening_at + ms(250));

    sleep_until(listening_at + ms(2000)).await;
    peer.messages.send(final_transcript("turn on the lights")).await?;

    let transcript =
        expect_update(&mut updates, |u| matches!(u, SessionUpdate::Transcript { .. })).await;
    assert_eq!(
        transcript,
        SessionUpdate::Transcript {
            text: "turn on the lights".to_string(),
            sentiment: "neutral".to_string(),
        }
    );
    expect_update(&mut updates, |u| *u == SessionUpdate::Thinking).await;
    let reply = expect_update(&mut updates, |u| matches!(u, SessionUpdate::Reply { .. })).await;
    assert_eq!(
        reply,
        SessionUpdate::Reply {
            text: REPLY.to_string()
        }
    );
    assert_eq!(
        fakes.relay.asks(),
        vec![("turn on the lights".to_string(), "neutral".to_string())]
    );

    let sink = Arc::clone(&fakes.sink);
    wait_until(move || sink.rendered().len() == 1).await;
    assert_eq!(fakes.sink.rendered()[0], REPLY.as_bytes());
    assert_eq!(fakes.synthesizer.keys(), vec!["abc"]);

    // Inside the debounce window
    sleep_until(listening_at + ms(2800)).await;
    peer.messages.send(final_transcript("and the fan")).await?;
    sleep(ms(100)).await;
    assert_eq!(fakes.relay.asks().len(), 1);

    // 1600 ms after the last accepted transcript
    sleep_until(listening_at + ms(3600)).await;
    peer.messages.send(final_transcript("thanks")).await?;
    let transcript =
        expect_update(&mut updates, |u| matches!(u, SessionUpdate::Transcript { .. })).await;
    assert!(matches!(transcript, SessionUpdate::Transcript { text, .. } if text == "thanks"));
    expect_update(&mut updates, |u| matches!(u, SessionUpdate::Reply { .. })).await;

    // The first reply finished long ago, so the second one plays too
    let sink = Arc::clone(&fakes.sink);
    wait_until(move || sink.rendered().len() == 2).await;

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    let stats = result?;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_speaking());
    assert!(!peer.is_open());
    assert!(fakes.source.is_released());

    assert_eq!(stats.state, SessionState::Idle);
    assert_eq!(stats.transcripts_accepted, 2);
    assert_eq!(stats.exchanges_count, 2);
    assert!(stats.chunks_sent > 0);

    let exchanges = session.exchanges();
    let exchanges = exchanges.read().await;
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges[0].user, "turn on the lights");
    assert_eq!(exchanges[0].sentiment, "neutral");
    assert_eq!(exchanges[0].ai, REPLY);
    assert_eq!(exchanges[0].session_id, "session-test");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reply_during_playback_is_not_spoken() -> Result<()> {
    let (mut fakes, peer) = Fakes::new();
    fakes.sink = Arc::new(TimedSink::new(Duration::from_secs(10)));
    let session = fakes.session();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;

    peer.messages.send(final_transcript("what time is it")).await?;
    expect_update(&mut updates, |u| matches!(u, SessionUpdate::Reply { .. })).await;
    let sink = Arc::clone(&fakes.sink);
    wait_until(move || sink.rendered().len() == 1).await;

    sleep(ms(1600)).await;
    peer.messages.send(final_transcript("and the date")).await?;
    expect_update(&mut updates, |u| matches!(u, SessionUpdate::Reply { .. })).await;
    sleep(ms(500)).await;

    // The second reply is recorded but the first keeps playing alone
    assert_eq!(fakes.sink.rendered().len(), 1);
    assert!(fakes.sink.completed().is_empty());

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    let stats = result?;

    assert_eq!(stats.exchanges_count, 2);
    assert!(!stats.speaking);
    assert!(!session.is_speaking());

    // Teardown cut the long reply short
    sleep(Duration::from_secs(15)).await;
    assert!(fakes.sink.completed().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting_releases_media() -> Result<()> {
    let (mut fakes, _peer) = Fakes::new();
    fakes.connector = Arc::new(ChannelConnector::hanging());
    let session = fakes.session();
    let stats = session.watch_stats();
    let (commands, task) = spawn_session(session);

    let source = Arc::clone(&fakes.source);
    wait_until(move || source.acquisitions() == 1).await;
    assert_eq!(stats.borrow().state, SessionState::Connecting);

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    let final_stats = result?;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(final_stats.state, SessionState::Idle);
    assert!(fakes.source.is_released());
    assert!(!session.is_speaking());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_aborts_start() -> Result<()> {
    let (mut fakes, _peer) = Fakes::new();
    fakes.credentials = Arc::new(StaticCredentials::missing());
    let (_commands, task) = spawn_session(fakes.session());

    let (session, result) = task.await?;

    assert!(matches!(result, Err(Error::Auth(msg)) if msg == "No API key returned"));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(fakes.source.acquisitions(), 0);
    assert!(fakes.connector.keys().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_media_failure_aborts_start() -> Result<()> {
    let (mut fakes, _peer) = Fakes::new();
    fakes.source = Arc::new(ToneSource::failing());
    let (_commands, task) = spawn_session(fakes.session());

    let (session, result) = task.await?;

    assert!(matches!(result, Err(Error::Media(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(fakes.connector.keys().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_releases_media() -> Result<()> {
    let (mut fakes, _peer) = Fakes::new();
    fakes.connector = Arc::new(ChannelConnector::failing());
    let (_commands, task) = spawn_session(fakes.session());

    let (session, result) = task.await?;

    assert!(matches!(result, Err(Error::Connection(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(fakes.source.acquisitions(), 1);
    assert!(fakes.source.is_released());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_inference_failure_keeps_listening() -> Result<()> {
    let (fakes, peer) = Fakes::new();
    fakes.relay.set_failing(true);
    let session = fakes.session();
    let stats = session.watch_stats();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;

    peer.messages.send(final_transcript("hello?")).await?;
    let failed =
        expect_update(&mut updates, |u| matches!(u, SessionUpdate::InferenceFailed { .. })).await;
    assert_eq!(failed.to_string(), "AI Error.");
    assert_eq!(stats.borrow().state, SessionState::Listening);
    assert!(fakes.sink.rendered().is_empty());

    fakes.relay.set_failing(false);
    sleep(ms(1600)).await;
    peer.messages.send(final_transcript("hello again")).await?;
    expect_update(&mut updates, |u| matches!(u, SessionUpdate::Reply { .. })).await;

    commands.send(SessionCommand::Stop).await?;
    let (_session, result) = task.await?;
    let final_stats = result?;
    assert_eq!(final_stats.transcripts_accepted, 2);
    assert_eq!(final_stats.exchanges_count, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_chunks_dropped_while_connection_not_writable() -> Result<()> {
    let (fakes, mut peer) = Fakes::new();
    let session = fakes.session();
    let stats = session.watch_stats();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    peer.set_writable(false);

    sleep(ms(1100)).await;
    {
        let stats = stats.borrow();
        assert_eq!(stats.chunks_sent, 0);
        assert!(stats.chunks_dropped >= 3);
    }
    assert!(peer.audio.try_recv().is_err());

    peer.set_writable(true);
    let audio = peer.audio.recv().await.context("audio did not resume")?;
    assert!(!audio.is_empty());

    commands.send(SessionCommand::Stop).await?;
    let (_session, result) = task.await?;
    assert!(result?.chunks_sent >= 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_do_not_reset_the_gate() -> Result<()> {
    let (fakes, peer) = Fakes::new();
    let session = fakes.session();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    let start = Instant::now();

    peer.messages.send(final_transcript("first")).await?;
    expect_update(&mut updates, |u| matches!(u, SessionUpdate::Transcript { .. })).await;

    sleep_until(start + ms(500)).await;
    peer.messages.send("not json at all".to_string()).await?;
    peer.messages.send(r#"{"type":"Metadata"}"#.to_string()).await?;
    peer.messages.send(interim_transcript("sec")).await?;
    peer.messages.send(final_transcript("   ")).await?;

    sleep_until(start + ms(1000)).await;
    peer.messages.send(final_transcript("second")).await?;
    sleep(ms(100)).await;
    assert_eq!(fakes.relay.asks().len(), 1);

    sleep_until(start + ms(1600)).await;
    peer.messages.send(final_transcript("third")).await?;
    let transcript =
        expect_update(&mut updates, |u| matches!(u, SessionUpdate::Transcript { .. })).await;
    assert!(matches!(transcript, SessionUpdate::Transcript { text, .. } if text == "third"));

    commands.send(SessionCommand::Stop).await?;
    let (_session, result) = task.await?;
    assert_eq!(result?.transcripts_accepted, 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_ends_session() -> Result<()> {
    let (fakes, peer) = Fakes::new();
    let session = fakes.session();
    let mut updates = session.subscribe();
    let (_commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    sleep(ms(600)).await;
    drop(peer);

    expect_update(&mut updates, |u| *u == SessionUpdate::Ended).await;
    let (session, result) = task.await?;

    assert_eq!(result?.state, SessionState::Idle);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(fakes.source.is_released());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_stop_is_discarded() -> Result<()> {
    let (mut fakes, peer) = Fakes::new();
    fakes.relay = Arc::new(ScriptedRelay::delayed(REPLY, Duration::from_secs(2)));
    let session = fakes.session();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    peer.messages.send(final_transcript("tell me a story")).await?;
    expect_update(&mut updates, |u| *u == SessionUpdate::Thinking).await;

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    assert_eq!(result?.exchanges_count, 0);

    sleep(Duration::from_secs(3)).await;
    assert!(session.exchanges().read().await.is_empty());
    assert!(fakes.sink.rendered().is_empty());
    assert!(!session.is_speaking());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reply_from_previous_run_is_ignored_after_restart() -> Result<()> {
    let (mut fakes, _peer) = Fakes::new();
    let (connector, mut peers) = ChannelConnector::with_links(2);
    fakes.connector = Arc::new(connector);
    fakes.relay = Arc::new(ScriptedRelay::delayed(REPLY, Duration::from_secs(2)));
    let _second = peers.pop().context("missing second link")?;
    let first = peers.pop().context("missing first link")?;

    let session = fakes.session();
    let mut updates = session.subscribe();
    let (commands, task) = spawn_session(session);

    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    first.messages.send(final_transcript("tell me a story")).await?;
    expect_update(&mut updates, |u| *u == SessionUpdate::Thinking).await;

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    result?;

    // Same session, new run, while the first reply is still on its way
    let (commands, task) = spawn_session(session);
    expect_update(&mut updates, |u| *u == SessionUpdate::Listening).await;
    assert_eq!(fakes.connector.keys().len(), 2);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(fakes.relay.asks().len(), 1);
    assert!(fakes.sink.rendered().is_empty());

    commands.send(SessionCommand::Stop).await?;
    let (session, result) = task.await?;
    assert_eq!(result?.exchanges_count, 0);
    assert!(session.exchanges().read().await.is_empty());
    assert!(!session.is_speaking());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_a_no_op() {
    let (fakes, _peer) = Fakes::new();
    let mut session = fakes.session();

    session.stop().await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(fakes.source.acquisitions(), 0);
}
