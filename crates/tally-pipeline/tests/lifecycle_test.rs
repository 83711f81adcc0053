//! Lifecycle tests: enable/disable, the data-collection consent gate,
//! policy setters, and shutdown.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use tally_core::errors::TallyError;
use tally_core::traits::TallyListener;
use tally_core::{properties, Properties};

// ── Policy ────────────────────────────────────────────────────────────────

#[test]
fn invalid_policy_values_keep_the_previous_setting() {
    let (tally, _) = pipeline();

    tally.set_session_interval_time(60_000);
    tally.set_session_interval_time(9_999);
    tally.set_session_interval_time(300_001);
    assert_eq!(tally.session_interval_time(), 60_000);

    tally.set_flush_bulk_size(20);
    tally.set_flush_bulk_size(0);
    assert_eq!(tally.flush_bulk_size(), 20);

    tally.set_flush_interval(5_000);
    tally.set_flush_interval(999);
    assert_eq!(tally.flush_interval(), Duration::from_millis(5_000));

    tally.set_max_cache_rows(0);
    assert_eq!(tally.max_cache_rows(), 10_000);
}

// ── Enable / disable ──────────────────────────────────────────────────────

#[test]
fn disabled_pipeline_drops_calls_and_enable_restarts_it() {
    let transport = RecordingTransport::new();
    let listener = RecordingListener::new();
    let remote = Arc::new(CountingRemoteConfig::default());
    let tally = builder(quiet_config(), &transport)
        .listener(listener.clone())
        .remote_config(remote.clone())
        .build()
        .unwrap();

    tally.track("Before", Properties::new());
    assert!(tally.wait_idle(WAIT));

    tally.disable();
    tally.disable();
    assert!(!tally.is_enabled());
    tally.track("WhileDisabled", Properties::new());
    tally.timer_start("Lost");

    tally.enable();
    tally.enable();
    assert!(tally.is_enabled());
    tally.timer_end("Lost", Properties::new());

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["Before", "Lost"]);
    assert!(events[1]["properties"].get("event_duration").is_none());
    assert_eq!(listener.count("disabled"), 1);
    assert_eq!(listener.count("enabled"), 1);
    assert_eq!(remote.pulls.load(Ordering::SeqCst), 1);
    assert!(tally.queue_stats().discarded >= 1);
}

#[test]
fn disabled_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet_config();
    config.storage.path = Some(dir.path().join("tally.db"));
    let transport = RecordingTransport::new();

    {
        let tally = builder(config.clone(), &transport).build().unwrap();
        tally.disable();
    }

    let tally = builder(config, &transport).build().unwrap();
    assert!(!tally.is_enabled());
    tally.track("Dropped", Properties::new());
    assert!(tally.flush_sync(Duration::from_millis(200)));
    assert_eq!(tally.buffered_count().unwrap(), 0);

    tally.enable();
    tally.track("Kept", Properties::new());
    assert_eq!(names(&delivered(&tally, &transport)), vec!["Kept"]);
}

// ── Install ───────────────────────────────────────────────────────────────

#[test]
fn app_install_is_recorded_once_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet_config();
    config.storage.path = Some(dir.path().join("tally.db"));
    let transport = RecordingTransport::new();

    {
        let tally = builder(config.clone(), &transport).build().unwrap();
        tally.track_app_install(properties! { "channel" => "store" });
        tally.track_app_install(properties! { "channel" => "again" });
        assert!(tally.wait_idle(WAIT));
        tally.shutdown();
    }

    let tally = builder(config, &transport).build().unwrap();
    tally.track_app_install(Properties::new());
    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "$AppInstall");
    assert_eq!(events[0]["properties"]["channel"], "store");
    assert_eq!(events[0]["properties"]["$lib"], "rust");
    assert_eq!(events[1]["type"], "profile_set_once");
    assert_eq!(events[1]["properties"]["channel"], "store");
    assert!(events[1]["properties"]["$first_visit_time"].is_string());
}

#[test]
fn preset_properties_come_from_the_device() {
    let (tally, _) = pipeline();
    let presets = tally.preset_properties();
    assert_eq!(presets.get("$lib"), Some(&tally_core::Value::from("rust")));
    assert!(presets.contains_key("$os"));
}

// ── Consent gate ──────────────────────────────────────────────────────────

#[test]
fn work_is_held_until_data_collection_is_consented() {
    let transport = RecordingTransport::new();
    let listener = RecordingListener::new();
    let mut config = quiet_config();
    config.privacy.data_collect_enabled = Some(false);
    let tally = builder(config, &transport)
        .listener(listener.clone())
        .build()
        .unwrap();

    assert!(!tally.is_data_collect_enabled());
    assert_eq!(tally.anonymous_id(), "");
    tally.track("Held", properties! { "n" => 1 });
    tally.profile_set(properties! { "name" => "Ada" });
    assert!(!tally.wait_idle(Duration::from_millis(100)));
    assert_eq!(tally.buffered_count().unwrap(), 0);

    tally.enable_data_collect();
    tally.enable_data_collect();
    assert!(tally.is_data_collect_enabled());
    assert_eq!(tally.anonymous_id(), "device-1");

    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "Held");
    assert_eq!(events[1]["type"], "profile_set");
    assert_eq!(listener.count("data_collect"), 1);
}

// ── Listeners ─────────────────────────────────────────────────────────────

struct PanickingListener;

impl TallyListener for PanickingListener {
    fn on_login(&self, _login_id: &str) {
        panic!("listener bug");
    }
    fn on_error(&self, _error: &TallyError) {}
}

#[test]
fn a_panicking_listener_does_not_stop_the_pipeline() {
    let transport = RecordingTransport::new();
    let recording = RecordingListener::new();
    let tally = builder(quiet_config(), &transport)
        .listener(Arc::new(PanickingListener))
        .listener(recording.clone())
        .build()
        .unwrap();

    tally.login("alice");
    tally.track("After", Properties::new());

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["$SignUp", "After"]);
    assert_eq!(recording.count("login:alice"), 1);
}

#[test]
fn removed_listeners_stop_hearing_events() {
    let (tally, _) = pipeline();
    let listener = RecordingListener::new();
    let as_dyn: Arc<dyn TallyListener> = listener.clone();
    tally.add_listener(Arc::clone(&as_dyn));
    tally.identify("first");
    assert!(tally.wait_idle(WAIT));

    tally.remove_listener(&as_dyn);
    tally.identify("second");
    assert!(tally.wait_idle(WAIT));
    assert_eq!(listener.calls(), vec!["identify:first"]);
}

// ── Shutdown ──────────────────────────────────────────────────────────────

#[test]
fn shutdown_runs_queued_work_then_rejects_more() {
    let (tally, _) = pipeline();
    for i in 0..10 {
        tally.track("E", properties! { "i" => i });
    }
    let stats = tally.shutdown();
    assert!(stats.executed >= 10);
    assert_eq!(tally.buffered_count().unwrap(), 10);

    let discarded = tally.queue_stats().discarded;
    tally.track("Late", Properties::new());
    assert_eq!(tally.queue_stats().discarded, discarded + 1);
    assert_eq!(tally.buffered_count().unwrap(), 10);
}
