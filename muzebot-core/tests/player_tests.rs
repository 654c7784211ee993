// muzebot-core/tests/player_tests.rs
//
// State-machine scenarios for the per-guild player session, driven through
// mock resolver/transport/notifier doubles. Transport completion is fed
// back manually with the generation stamp the mock captured, exactly as
// the real voice layer reports it.

use std::sync::{Arc, Mutex};

use songbird::input::Input;
use twilight_model::id::Id;
use twilight_model::id::marker::GuildMarker;

use muzebot_common::error::ResolveError;
use muzebot_common::models::{LoopMode, PlayerStateKind, Track};
use muzebot_core::eventbus::{BotEvent, EventBus};
use muzebot_core::player::session::PlayerSession;
use muzebot_core::player::transport::{MockAudioTransport, TransportEventKind};
use muzebot_core::resolver::{MockResolver, ResolvedSource};
use muzebot_core::services::notifier::MockNotifier;

const GUILD: u64 = 7777;

fn guild_id() -> Id<GuildMarker> {
    Id::new(GUILD)
}

fn track(name: &str) -> Track {
    Track::new(format!("https://tracks.example/{name}.mp3"), name, None)
}

fn dummy_source() -> ResolvedSource {
    ResolvedSource {
        input: Input::from(Vec::new()),
    }
}

/// Resolver that succeeds for every track except those whose URL contains
/// "bad".
fn resolver_ok() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_resolve().returning(|track| {
        if track.url.contains("bad") {
            Err(ResolveError::NotFound(format!("no stream for {}", track.url)))
        } else {
            Ok(dummy_source())
        }
    });
    resolver
}

/// Transport that accepts everything and records the generation stamp of
/// the latest hand-off, like the real songbird layer does for its events.
fn transport_ok(last_gen: &Arc<Mutex<u64>>) -> MockAudioTransport {
    let mut transport = MockAudioTransport::new();
    let lg = last_gen.clone();
    transport.expect_play().returning(move |_, _, generation| {
        *lg.lock().unwrap() = generation;
        Ok(())
    });
    transport.expect_join().returning(|_, _| Ok(()));
    transport.expect_pause().returning(|_| Ok(()));
    transport.expect_resume().returning(|_| Ok(()));
    transport.expect_stop().returning(|_| Ok(()));
    transport.expect_leave().returning(|_| Ok(()));
    transport
}

fn notifier_ok() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_track_changed().returning(|_, _, _| ());
    notifier.expect_queue_empty().returning(|_| ());
    notifier.expect_voice_empty().returning(|_| ());
    notifier.expect_stopped().returning(|_| ());
    notifier.expect_error().returning(|_, _| ());
    notifier.expect_controls_changed().returning(|_, _| ());
    notifier
}

fn make_session(
    resolver: MockResolver,
    transport: MockAudioTransport,
    notifier: MockNotifier,
    bus: Arc<EventBus>,
) -> PlayerSession {
    PlayerSession::new(
        guild_id(),
        Arc::new(resolver),
        Arc::new(transport),
        Arc::new(notifier),
        bus,
    )
}

fn current_gen(last_gen: &Arc<Mutex<u64>>) -> u64 {
    *last_gen.lock().unwrap()
}

#[tokio::test]
async fn advance_plays_tracks_in_insertion_order() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.enqueue(track("first"));
    session.enqueue(track("second"));
    session.advance().await;

    assert_eq!(session.state(), PlayerStateKind::Playing);
    assert_eq!(session.now_playing().unwrap().title, "first");
    assert_eq!(session.tracks().len(), 1);

    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "second");
    assert!(session.tracks().is_empty());

    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.state(), PlayerStateKind::Idle);
    assert!(session.now_playing().is_none());
}

#[tokio::test]
async fn repeat_current_replays_same_track() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.set_loop_mode(LoopMode::Track).await;
    session.enqueue(track("looped"));
    session.enqueue(track("waiting"));
    session.advance().await;
    assert_eq!(session.now_playing().unwrap().title, "looped");

    // N completions without new enqueues keep yielding the same track
    for _ in 0..4 {
        session
            .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
            .await;
        assert_eq!(session.now_playing().unwrap().title, "looped");
        assert_eq!(session.state(), PlayerStateKind::Playing);
    }
    // the next track never surfaced
    assert_eq!(session.tracks()[0].title, "waiting");
}

#[tokio::test]
async fn repeat_all_preserves_the_cycle() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.set_loop_mode(LoopMode::Queue).await;
    session.enqueue(track("a"));
    session.enqueue(track("b"));
    session.advance().await;
    assert_eq!(session.now_playing().unwrap().title, "a");

    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "b");
    // "a" went to the back instead of being discarded
    assert_eq!(session.tracks()[0].title, "a");

    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "a");
    assert_eq!(session.tracks()[0].title, "b");
}

#[tokio::test]
async fn off_mode_drains_to_idle_with_notification() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut notifier = MockNotifier::new();
    notifier.expect_track_changed().returning(|_, _, _| ());
    notifier.expect_error().returning(|_, _| ());
    notifier.expect_controls_changed().returning(|_, _| ());
    notifier.expect_voice_empty().returning(|_| ());
    notifier.expect_stopped().returning(|_| ());
    notifier.expect_queue_empty().times(1).returning(|_| ());

    let bus = Arc::new(EventBus::new());
    let mut bus_rx = bus.subscribe(Some(16)).await;
    let mut session = make_session(resolver_ok(), transport_ok(&last_gen), notifier, bus);

    session.enqueue(track("only"));
    session.advance().await;
    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;

    assert_eq!(session.state(), PlayerStateKind::Idle);
    assert!(session.now_playing().is_none());
    assert!(session.tracks().is_empty());

    // lifecycle events made it onto the bus: started, then emptied
    let mut saw_started = false;
    let mut saw_emptied = false;
    while let Ok(event) = bus_rx.try_recv() {
        match event {
            BotEvent::TrackStarted { guild_id, .. } => {
                assert_eq!(guild_id, GUILD);
                saw_started = true;
            }
            BotEvent::QueueEmptied { guild_id } => {
                assert_eq!(guild_id, GUILD);
                saw_emptied = true;
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_emptied);
}

#[tokio::test]
async fn resolver_failure_drops_track_and_plays_next() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut notifier = MockNotifier::new();
    notifier.expect_track_changed().returning(|_, _, _| ());
    notifier.expect_queue_empty().returning(|_| ());
    notifier.expect_controls_changed().returning(|_, _| ());
    notifier.expect_voice_empty().returning(|_| ());
    notifier.expect_stopped().returning(|_| ());
    notifier.expect_error().times(1).returning(|_, _| ());

    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier,
        Arc::new(EventBus::new()),
    );

    session.enqueue(track("bad-locator"));
    session.enqueue(track("healthy"));
    session.advance().await;

    // no stall: the broken track was reported once and dropped
    assert_eq!(session.state(), PlayerStateKind::Playing);
    assert_eq!(session.now_playing().unwrap().title, "healthy");
    assert!(session.tracks().is_empty());
}

#[tokio::test]
async fn all_failures_reach_idle_instead_of_stalling() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.enqueue(track("bad-1"));
    session.enqueue(track("bad-2"));
    session.advance().await;

    assert_eq!(session.state(), PlayerStateKind::Idle);
    assert!(session.now_playing().is_none());
    assert!(session.tracks().is_empty());
}

#[tokio::test]
async fn failed_track_is_not_requeued_by_loop_modes() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.set_loop_mode(LoopMode::Track).await;
    session.enqueue(track("bad-on-purpose"));
    session.enqueue(track("healthy"));
    session.advance().await;

    // under loop-track a requeued failure would resolve forever; instead the
    // healthy track plays and the broken one is gone
    assert_eq!(session.now_playing().unwrap().title, "healthy");
    assert!(session.tracks().is_empty());
}

#[tokio::test]
async fn stop_clears_queue_and_reaches_stopped() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.enqueue(track("a"));
    session.enqueue(track("b"));
    session.advance().await;
    let gen_before_stop = current_gen(&last_gen);

    session.stop().await;
    assert_eq!(session.state(), PlayerStateKind::Stopped);
    assert!(session.now_playing().is_none());
    assert!(session.tracks().is_empty());

    // the stop-triggered end event for the old track is stale and ignored
    session
        .handle_transport_event(gen_before_stop, TransportEventKind::Ended)
        .await;
    assert_eq!(session.state(), PlayerStateKind::Stopped);

    // a new play reinitializes the machine
    session.enqueue(track("fresh"));
    session.advance().await;
    assert_eq!(session.state(), PlayerStateKind::Playing);
    assert_eq!(session.now_playing().unwrap().title, "fresh");
}

#[tokio::test]
async fn stop_works_from_idle_too() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.stop().await;
    assert_eq!(session.state(), PlayerStateKind::Stopped);
    assert!(session.tracks().is_empty());
}

#[tokio::test]
async fn enqueue_advance_skip_drain_scenario() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut notifier = MockNotifier::new();
    notifier.expect_track_changed().returning(|_, _, _| ());
    notifier.expect_error().returning(|_, _| ());
    notifier.expect_controls_changed().returning(|_, _| ());
    notifier.expect_voice_empty().returning(|_| ());
    notifier.expect_stopped().returning(|_| ());
    notifier.expect_queue_empty().times(1).returning(|_| ());

    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier,
        Arc::new(EventBus::new()),
    );

    // enqueue A, B with no current
    session.enqueue(track("A"));
    session.enqueue(track("B"));

    // advance -> current=A, pending=[B]
    session.advance().await;
    assert_eq!(session.now_playing().unwrap().title, "A");
    assert_eq!(session.tracks().len(), 1);

    // skip -> transport stop; its end event drives the advance -> current=B
    session.skip().await;
    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "B");
    assert!(session.tracks().is_empty());

    // completion -> current empty, Idle, queue-empty notification fired
    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.state(), PlayerStateKind::Idle);
    assert!(session.now_playing().is_none());
}

#[tokio::test]
async fn stale_generation_events_are_ignored() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    session.enqueue(track("one"));
    session.enqueue(track("two"));
    session.advance().await;
    let first_gen = current_gen(&last_gen);

    session
        .handle_transport_event(first_gen, TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "two");

    // duplicate idle signal for the already-finished hand-off must not
    // double-advance
    session
        .handle_transport_event(first_gen, TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "two");
    assert_eq!(session.state(), PlayerStateKind::Playing);
}

#[tokio::test]
async fn transport_error_is_reported_and_dropped() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut notifier = MockNotifier::new();
    notifier.expect_track_changed().returning(|_, _, _| ());
    notifier.expect_queue_empty().returning(|_| ());
    notifier.expect_controls_changed().returning(|_, _| ());
    notifier.expect_voice_empty().returning(|_| ());
    notifier.expect_stopped().returning(|_| ());
    notifier.expect_error().times(1).returning(|_, _| ());

    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier,
        Arc::new(EventBus::new()),
    );

    session.set_loop_mode(LoopMode::Queue).await;
    session.enqueue(track("dies-midway"));
    session.enqueue(track("survivor"));
    session.advance().await;

    session
        .handle_transport_event(
            current_gen(&last_gen),
            TransportEventKind::Errored("decode blew up".into()),
        )
        .await;

    // even under repeat-all, the broken track is dropped rather than cycled
    assert_eq!(session.now_playing().unwrap().title, "survivor");
    assert!(session.tracks().is_empty());
}

#[tokio::test]
async fn test_tone_hand_off_then_queue_takes_over() {
    let last_gen = Arc::new(Mutex::new(0));
    let mut session = make_session(
        resolver_ok(),
        transport_ok(&last_gen),
        notifier_ok(),
        Arc::new(EventBus::new()),
    );

    let tone = ResolvedSource::test_tone(440.0, 1).unwrap();
    session.play_source(tone).await.unwrap();
    assert_eq!(session.state(), PlayerStateKind::Playing);

    session.enqueue(track("queued-behind-tone"));
    session
        .handle_transport_event(current_gen(&last_gen), TransportEventKind::Ended)
        .await;
    assert_eq!(session.now_playing().unwrap().title, "queued-behind-tone");
}
