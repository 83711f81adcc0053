//! End-to-end event tests: enrichment, ordering, batching, delivery, and
//! the buffer limits.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use tally_core::traits::{DynamicProperties, EventInterceptor, Transport};
use tally_core::{properties, NetworkType, Properties, Value};
use tally_pipeline::TimeUnit;

// ── Enrichment ────────────────────────────────────────────────────────────

#[test]
fn track_delivers_an_enriched_event() {
    let (tally, transport) = pipeline();
    tally.track("Purchase", properties! { "price" => 9.5, "sku" => "A-1" });

    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["type"], "track");
    assert_eq!(event["event"], "Purchase");
    assert_eq!(event["distinct_id"], tally.distinct_id().as_str());
    assert_eq!(event["anonymous_id"], tally.anonymous_id().as_str());
    assert!(event.get("login_id").is_none());
    assert!(event["time"].as_i64().unwrap() > 0);
    assert!(event["_track_id"].as_u64().unwrap() >= 1);

    let props = &event["properties"];
    assert_eq!(props["price"].as_f64(), Some(9.5));
    assert_eq!(props["sku"], "A-1");
    assert_eq!(props["$lib"], "rust");
    assert_eq!(props["$network_type"], "WIFI");
    assert_eq!(props["$is_login_id"], false);
    assert_eq!(props["$is_first_day"], true);
}

struct SourceProvider;

impl DynamicProperties for SourceProvider {
    fn properties(&self) -> Properties {
        properties! { "source" => "dynamic", "screen" => "home" }
    }
}

#[test]
fn property_layers_apply_in_precedence_order() {
    let (tally, transport) = pipeline();
    tally.register_super_properties(properties! {
        "plan" => "free",
        "source" => "super",
        "$lib" => "overridden",
    });
    tally.register_dynamic_super_properties(Arc::new(SourceProvider));
    tally.track("Open", properties! { "plan" => "pro", "$is_login_id" => true });

    let events = delivered(&tally, &transport);
    let props = &events[0]["properties"];
    assert_eq!(props["plan"], "pro");
    assert_eq!(props["source"], "dynamic");
    assert_eq!(props["screen"], "home");
    assert_eq!(props["$lib"], "overridden");
    // Reserved keys cannot be overridden by the caller.
    assert_eq!(props["$is_login_id"], false);

    assert_eq!(
        tally.super_properties().get("plan"),
        Some(&Value::from("free"))
    );
}

struct UnrulyProvider;

impl DynamicProperties for UnrulyProvider {
    fn properties(&self) -> Properties {
        properties! {
            "bad key!" => "x",
            "huge" => "y".repeat(20_000),
            "nan" => f64::NAN,
            "kept" => "ok",
        }
    }
}

#[test]
fn dynamic_properties_are_validated_like_caller_properties() {
    let (tally, transport) = pipeline();
    tally.register_dynamic_super_properties(Arc::new(UnrulyProvider));
    tally.track("Open", Properties::new());
    tally.login("alice");

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["Open", "$SignUp"]);
    for event in &events {
        let props = &event["properties"];
        assert!(props.get("bad key!").is_none());
        assert!(props.get("huge").is_none());
        assert!(props.get("nan").is_none());
        assert_eq!(props["kept"], "ok");
    }
}

#[test]
fn super_properties_can_be_removed_and_cleared() {
    let (tally, transport) = pipeline();
    tally.register_super_properties(properties! { "a" => 1, "b" => 2 });
    tally.unregister_super_property("a");
    tally.track("First", Properties::new());
    tally.clear_super_properties();
    tally.track("Second", Properties::new());

    let events = delivered(&tally, &transport);
    assert!(events[0]["properties"].get("a").is_none());
    assert_eq!(events[0]["properties"]["b"].as_f64(), Some(2.0));
    assert!(events[1]["properties"].get("b").is_none());
    assert!(tally.super_properties().is_empty());
}

#[test]
fn invalid_properties_are_dropped_but_the_event_is_kept() {
    let (tally, transport) = pipeline();
    tally.track(
        "Search",
        properties! { "query" => "shoes", "bad key" => "x", "distinct_id" => "spoof" },
    );

    let events = delivered(&tally, &transport);
    let props = &events[0]["properties"];
    assert_eq!(props["query"], "shoes");
    assert!(props.get("bad key").is_none());
    assert!(props.get("distinct_id").is_none());
}

#[test]
fn invalid_event_name_is_rejected_and_reported() {
    let transport = RecordingTransport::new();
    let listener = RecordingListener::new();
    let tally = builder(quiet_config(), &transport)
        .listener(listener.clone())
        .build()
        .unwrap();
    tally.track("not a valid name", Properties::new());
    tally.track("Valid", Properties::new());

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["Valid"]);
    assert_eq!(listener.count("error:"), 1);
    assert_eq!(tally.queue_stats().failed, 1);
}

struct DropSecrets;

impl EventInterceptor for DropSecrets {
    fn on_track_event(&self, event_name: &str, properties: &mut Properties) -> bool {
        properties.insert("intercepted".to_string(), Value::Boolean(true));
        event_name != "Secret"
    }
}

#[test]
fn interceptor_can_drop_and_edit_track_events() {
    let transport = RecordingTransport::new();
    let tally = builder(quiet_config(), &transport)
        .interceptor(Arc::new(DropSecrets))
        .build()
        .unwrap();
    tally.track("Secret", Properties::new());
    tally.track("Public", Properties::new());
    tally.profile_set(properties! { "name" => "Ada" });

    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "Public");
    assert_eq!(events[0]["properties"]["intercepted"], true);
    // Profile events bypass the interceptor.
    assert!(events[1]["properties"].get("intercepted").is_none());
}

#[test]
fn view_screen_carries_the_previous_url_as_referrer() {
    let (tally, transport) = pipeline();
    tally.track_view_screen("app://home", Properties::new());
    tally.track_view_screen("app://cart", Properties::new());
    tally.track_app_click(properties! { "$element_id" => "buy" });

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["$AppViewScreen", "$AppViewScreen", "$AppClick"]);
    assert_eq!(events[0]["properties"]["$url"], "app://home");
    assert!(events[0]["properties"].get("$referrer").is_none());
    assert_eq!(events[1]["properties"]["$url"], "app://cart");
    assert_eq!(events[1]["properties"]["$referrer"], "app://home");
}

// ── Profiles and items ────────────────────────────────────────────────────

#[test]
fn profile_and_item_operations_use_their_wire_types() {
    let (tally, transport) = pipeline();
    tally.profile_set(properties! { "name" => "Ada" });
    tally.profile_set_once(properties! { "first_seen" => "2026-01-01" });
    tally.profile_increment(properties! { "logins" => 1, "label" => "ignored" });
    tally.profile_append(properties! {
        "tags" => vec!["a".to_string(), "b".to_string()],
        "score" => 3,
    });
    tally.profile_unset("name");
    tally.profile_delete();
    tally.item_set("book", "isbn-1", properties! { "title" => "Dune" });
    tally.item_delete("book", "isbn-1");

    let events = delivered(&tally, &transport);
    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec![
            "profile_set",
            "profile_set_once",
            "profile_increment",
            "profile_append",
            "profile_unset",
            "profile_delete",
            "item_set",
            "item_delete",
        ]
    );
    assert!(events.iter().all(|e| e.get("event").is_none()));

    // Increment keeps numbers, append keeps lists.
    assert_eq!(events[2]["properties"]["logins"].as_f64(), Some(1.0));
    assert!(events[2]["properties"].get("label").is_none());
    assert_eq!(events[3]["properties"]["tags"][1], "b");
    assert!(events[3]["properties"].get("score").is_none());
    assert_eq!(events[4]["properties"]["name"], true);

    // Profiles are not enriched with presets.
    assert!(events[0]["properties"].get("$lib").is_none());

    assert_eq!(events[6]["item_type"], "book");
    assert_eq!(events[6]["item_id"], "isbn-1");
    assert_eq!(events[6]["properties"]["title"], "Dune");
}

// ── Timers ────────────────────────────────────────────────────────────────

#[test]
fn timer_end_adds_event_duration() {
    let (tally, transport) = pipeline();
    tally.timer_start_with_unit("Watch", TimeUnit::Milliseconds);
    thread::sleep(Duration::from_millis(30));
    tally.timer_end("Watch", properties! { "video" => "intro" });
    tally.timer_end("Untimed", Properties::new());

    let events = delivered(&tally, &transport);
    let duration = events[0]["properties"]["event_duration"].as_f64().unwrap();
    assert!(duration >= 30.0, "duration {duration}");
    assert_eq!(events[0]["properties"]["video"], "intro");
    assert!(events[1]["properties"].get("event_duration").is_none());
}

#[test]
fn removed_timer_yields_no_duration() {
    let (tally, transport) = pipeline();
    tally.timer_start("Read");
    tally.timer_remove("Read");
    tally.timer_end("Read", Properties::new());

    let events = delivered(&tally, &transport);
    assert!(events[0]["properties"].get("event_duration").is_none());
}

// ── Ordering ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_tracks_keep_per_thread_order() {
    let (tally, transport) = pipeline();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tally = tally.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    tally.track("Tick", properties! { "thread" => t, "n" => n });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 200);

    let ids: Vec<u64> = events.iter().map(|e| e["_track_id"].as_u64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "track ids must increase");

    let mut last_seen: HashMap<i64, f64> = HashMap::new();
    for event in &events {
        let thread = event["properties"]["thread"].as_f64().unwrap() as i64;
        let n = event["properties"]["n"].as_f64().unwrap();
        if let Some(prev) = last_seen.insert(thread, n) {
            assert!(prev < n, "thread {thread} delivered {n} after {prev}");
        }
    }
}

// ── Flush ─────────────────────────────────────────────────────────────────

#[test]
fn successful_flush_empties_the_buffer() {
    let (tally, transport) = pipeline();
    for i in 0..3 {
        tally.track("E", properties! { "i" => i });
    }
    assert!(tally.wait_idle(WAIT));
    assert_eq!(tally.buffered_count().unwrap(), 3);

    let events = delivered(&tally, &transport);
    assert_eq!(events.len(), 3);
    assert_eq!(transport.bodies().len(), 1);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn failed_flush_keeps_the_batch_and_retries_it_unchanged() {
    let transport = RecordingTransport::new();
    let listener = RecordingListener::new();
    let tally = builder(quiet_config(), &transport)
        .listener(listener.clone())
        .build()
        .unwrap();
    transport.set_failing(true);
    for i in 0..3 {
        tally.track("E", properties! { "i" => i });
    }
    assert!(tally.flush_sync(WAIT));
    assert_eq!(tally.buffered_count().unwrap(), 3);
    assert_eq!(listener.count("error:"), 1);

    transport.set_failing(false);
    assert!(tally.flush_sync(WAIT));
    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn reaching_bulk_size_flushes_without_being_asked() {
    let transport = RecordingTransport::new();
    let mut config = quiet_config();
    config.flush.bulk_size = Some(3);
    let tally = builder(config, &transport).build().unwrap();

    for i in 0..3 {
        tally.track("E", properties! { "i" => i });
    }
    assert!(tally.wait_idle(WAIT));
    assert_eq!(transport.bodies().len(), 1);
    assert_eq!(transport.events().len(), 3);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn backlog_drains_in_bulk_sized_batches() {
    let transport = RecordingTransport::new();
    let mut config = quiet_config();
    config.flush.bulk_size = Some(2);
    let tally = builder(config, &transport).build().unwrap();

    transport.set_failing(true);
    for i in 0..5 {
        tally.track("E", properties! { "i" => i });
    }
    assert!(tally.wait_idle(WAIT));
    assert_eq!(tally.buffered_count().unwrap(), 5);
    let attempts = transport.bodies().len();

    transport.set_failing(false);
    assert!(tally.flush_sync(WAIT));
    let sizes: Vec<usize> = transport.bodies()[attempts..]
        .iter()
        .map(|b| serde_json::from_str::<Vec<serde_json::Value>>(b).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn spent_drain_budget_continues_in_later_rounds() {
    let transport = RecordingTransport::new();
    let mut config = quiet_config();
    config.flush.bulk_size = Some(2);
    config.flush.drain_budget_ms = Some(0);
    let tally = builder(config, &transport).build().unwrap();

    transport.set_failing(true);
    for i in 0..5 {
        tally.track("E", properties! { "i" => i });
    }
    assert!(tally.wait_idle(WAIT));
    let attempts = transport.bodies().len();
    let executed = tally.queue_stats().executed;

    transport.set_failing(false);
    assert!(tally.flush_sync(WAIT));
    for _ in 0..3 {
        assert!(tally.wait_idle(WAIT));
    }
    assert_eq!(transport.bodies().len(), attempts + 3);
    assert_eq!(tally.buffered_count().unwrap(), 0);
    // One manual round plus two continuations, one batch each.
    assert_eq!(tally.queue_stats().executed, executed + 3);
}

#[test]
fn upload_answered_after_disable_keeps_the_batch() {
    let transport = BlockingTransport::new();
    let tally = builder_with(quiet_config(), transport.clone()).build().unwrap();
    for i in 0..3 {
        tally.track("E", properties! { "i" => i });
    }
    tally.flush();
    assert!(transport.wait_started());

    tally.disable();
    transport.release();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(tally.buffered_count().unwrap(), 3);

    tally.enable();
    assert!(tally.flush_sync(WAIT));
    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn restarted_worker_skips_flushing_while_an_upload_is_out() {
    let transport = BlockingTransport::new();
    let tally = builder_with(quiet_config(), transport.clone()).build().unwrap();
    tally.track("E", Properties::new());
    tally.flush();
    assert!(transport.wait_started());

    // The new generation's enable flush finds the old upload in flight.
    tally.disable();
    tally.enable();
    assert!(tally.flush_sync(WAIT));
    assert_eq!(transport.bodies().len(), 1);

    transport.release();
    thread::sleep(Duration::from_millis(200));
    assert!(tally.flush_sync(WAIT));
    assert_eq!(transport.bodies().len(), 2);
    assert_eq!(tally.buffered_count().unwrap(), 0);
}

#[test]
fn network_policy_blocks_delivery_until_allowed() {
    let (tally, transport) = pipeline();
    tally.set_flush_network_policy(NetworkType::TYPE_4G | NetworkType::TYPE_5G);
    assert_eq!(
        tally.flush_network_policy(),
        NetworkType::TYPE_4G | NetworkType::TYPE_5G
    );
    tally.track("E", Properties::new());
    assert!(tally.flush_sync(WAIT));
    assert!(transport.bodies().is_empty());
    assert_eq!(tally.buffered_count().unwrap(), 1);

    tally.set_flush_network_policy(NetworkType::ALL);
    assert_eq!(delivered(&tally, &transport).len(), 1);
}

#[test]
fn without_a_transport_events_stay_buffered() {
    let tally = tally_pipeline::TallyBuilder::new(quiet_config())
        .build()
        .unwrap();
    tally.track("E", Properties::new());
    assert!(tally.flush_sync(WAIT));
    assert_eq!(tally.buffered_count().unwrap(), 1);

    let transport = RecordingTransport::new();
    tally.set_transport(Some(transport.clone() as Arc<dyn Transport>));
    assert_eq!(delivered(&tally, &transport).len(), 1);
}

#[test]
fn periodic_timer_flushes_on_its_own() {
    let transport = RecordingTransport::new();
    let mut config = quiet_config();
    config.flush.interval_ms = Some(1_000);
    let tally = builder(config, &transport).build().unwrap();
    assert_eq!(tally.flush_interval(), Duration::from_millis(1_000));

    tally.track("E", Properties::new());
    thread::sleep(Duration::from_millis(1_600));
    assert!(tally.wait_idle(WAIT));
    assert_eq!(transport.events().len(), 1);
}

// ── Buffer limits ─────────────────────────────────────────────────────────

#[test]
fn max_cache_rows_evicts_the_oldest_events() {
    let (tally, transport) = pipeline();
    tally.set_max_cache_rows(3);
    assert_eq!(tally.max_cache_rows(), 3);
    for i in 0..5 {
        tally.track(&format!("E{i}"), Properties::new());
    }
    assert!(tally.wait_idle(WAIT));
    assert_eq!(tally.buffered_count().unwrap(), 3);

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["E2", "E3", "E4"]);
}

#[test]
fn delete_all_discards_buffered_events() {
    let (tally, transport) = pipeline();
    tally.track("Gone", Properties::new());
    tally.delete_all();
    tally.track("Kept", Properties::new());

    let events = delivered(&tally, &transport);
    assert_eq!(names(&events), vec!["Kept"]);
}
