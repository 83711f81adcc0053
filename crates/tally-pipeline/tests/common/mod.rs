//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tally_core::errors::{TallyError, TransportError};
use tally_core::traits::{RemoteConfig, StaticDeviceInfo, TallyListener, Transport};
use tally_core::TallyConfig;
use tally_pipeline::{Tally, TallyBuilder};

pub const WAIT: Duration = Duration::from_secs(5);

/// Records every uploaded body; fails while `failing` is set.
#[derive(Default)]
pub struct RecordingTransport {
    bodies: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Every delivered or attempted event, in upload order.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.bodies()
            .iter()
            .flat_map(|body| {
                let batch: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();
                batch
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn upload(&self, batch: &str) -> Result<(), TransportError> {
        self.bodies.lock().unwrap().push(batch.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Parks uploads until [`BlockingTransport::release`], then accepts all.
pub struct BlockingTransport {
    bodies: Mutex<Vec<String>>,
    holding: AtomicBool,
    started: (Sender<()>, Receiver<()>),
    release: (Sender<()>, Receiver<()>),
}

impl BlockingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bodies: Mutex::new(Vec::new()),
            holding: AtomicBool::new(true),
            started: unbounded(),
            release: unbounded(),
        })
    }

    /// Block until an upload has begun.
    pub fn wait_started(&self) -> bool {
        self.started.1.recv_timeout(WAIT).is_ok()
    }

    pub fn release(&self) {
        self.holding.store(false, Ordering::SeqCst);
        let _ = self.release.0.send(());
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

impl Transport for BlockingTransport {
    fn upload(&self, batch: &str) -> Result<(), TransportError> {
        self.bodies.lock().unwrap().push(batch.to_string());
        let _ = self.started.0.send(());
        if self.holding.load(Ordering::SeqCst) {
            let _ = self.release.1.recv_timeout(WAIT);
        }
        Ok(())
    }
}

/// Counts listener callbacks by name.
#[derive(Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TallyListener for RecordingListener {
    fn on_identify(&self, anonymous_id: &str) {
        self.push(format!("identify:{anonymous_id}"));
    }
    fn on_login(&self, login_id: &str) {
        self.push(format!("login:{login_id}"));
    }
    fn on_logout(&self) {
        self.push("logout".to_string());
    }
    fn on_reset_anonymous_id(&self, anonymous_id: &str) {
        self.push(format!("reset:{anonymous_id}"));
    }
    fn on_collection_disabled(&self) {
        self.push("disabled".to_string());
    }
    fn on_collection_enabled(&self) {
        self.push("enabled".to_string());
    }
    fn on_data_collect_enabled(&self) {
        self.push("data_collect".to_string());
    }
    fn on_error(&self, error: &TallyError) {
        self.push(format!("error:{error}"));
    }
}

#[derive(Default)]
pub struct CountingRemoteConfig {
    pub pulls: AtomicUsize,
}

impl RemoteConfig for CountingRemoteConfig {
    fn pull(&self) {
        self.pulls.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory config that never flushes on its own: large batches and an
/// hour-long timer.
pub fn quiet_config() -> TallyConfig {
    let mut config = TallyConfig::default();
    config.flush.bulk_size = Some(1_000);
    config.flush.interval_ms = Some(3_600_000);
    config.privacy.data_collect_enabled = Some(true);
    config
}

pub fn builder(config: TallyConfig, transport: &Arc<RecordingTransport>) -> TallyBuilder {
    builder_with(config, Arc::clone(transport) as Arc<dyn Transport>)
}

pub fn builder_with(config: TallyConfig, transport: Arc<dyn Transport>) -> TallyBuilder {
    TallyBuilder::new(config)
        .transport(transport)
        .device(Arc::new(
            StaticDeviceInfo::new().with_device_id("device-1"),
        ))
}

/// Pipeline over in-memory storage with a recording transport.
pub fn pipeline() -> (Tally, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let tally = builder(quiet_config(), &transport).build().unwrap();
    (tally, transport)
}

/// Flush everything and return what the collector saw.
pub fn delivered(tally: &Tally, transport: &RecordingTransport) -> Vec<serde_json::Value> {
    assert!(tally.flush_sync(WAIT), "queue did not drain");
    transport.events()
}

pub fn names(events: &[serde_json::Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e["event"].as_str().map(str::to_string))
        .collect()
}
