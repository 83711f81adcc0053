//! Public API.
//!
//! Every method is fire-and-forget: it reads snapshots on the calling
//! thread, then enqueues the mutation. Failures are logged and surfaced
//! through [`TallyListener::on_error`], never returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;

use tally_core::constants::{event_names, property_keys};
use tally_core::errors::{StorageError, TallyError, TallyResult};
use tally_core::events::ListenerDispatcher;
use tally_core::traits::{
    DeviceInfo, DynamicProperties, EventInterceptor, EventStore, KeyValueStore, RemoteConfig,
    StaticDeviceInfo, TallyListener, Transport,
};
use tally_core::validation::{sanitize_properties, validate_id, validate_key};
use tally_core::{EventKind, NetworkType, Properties, TallyConfig, Value};
use tally_storage::{SqliteEventBuffer, SqliteKeyValueStore, StorageManager};

use crate::engine::{keys as engine_keys, Engine, EventDraft};
use crate::flush::{FlushEngine, FlushOutcome, FlushReport, FlushScheduler, FlushTrigger};
use crate::identity::{generate_anonymous_id, IdentitySnapshot, IdentityStore};
use crate::policy::{keys, FlushPolicy};
use crate::properties::PropertyRegistry;
use crate::queue::{CancellationToken, QueueStats, TaskQueue};
use crate::timers::{TimeUnit, TimerRegistry};
use crate::transport;

/// Name of the task-queue worker thread.
pub const WORKER_THREAD_NAME: &str = "tally-worker";

/// Shared state behind every [`Tally`] handle and captured by queued units.
struct Core {
    config: TallyConfig,
    queue: TaskQueue,
    engine: Mutex<Engine>,
    identity: IdentityStore,
    properties: PropertyRegistry,
    timers: TimerRegistry,
    policy: Arc<FlushPolicy>,
    flusher: FlushEngine,
    dispatcher: Arc<ListenerDispatcher>,
    device: Arc<dyn DeviceInfo>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    remote_config: Option<Arc<dyn RemoteConfig>>,
    data_collect: AtomicBool,
    last_screen_url: Mutex<Option<String>>,
    scheduler: Mutex<Option<FlushScheduler>>,
}

impl Core {
    fn lock_engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .map(|t| t.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Enqueue a unit that gets the shared state.
    fn submit<F>(self: &Arc<Self>, label: &'static str, task: F)
    where
        F: FnOnce(&Arc<Core>, &CancellationToken) -> TallyResult<()> + Send + 'static,
    {
        let core = Arc::clone(self);
        if self
            .queue
            .enqueue(label, move |token| task(&core, token))
            .is_err()
        {
            tracing::debug!(task = label, "client: collection disabled, dropped");
        }
    }

    /// Enqueue a unit together with the caller-side change it persists.
    ///
    /// `commit` runs under the queue lock only if the unit is accepted, so
    /// a refused unit leaves memory untouched and accepted ones land in
    /// enqueue order. See [`TaskQueue::enqueue_with`].
    fn submit_with<T, C, F>(self: &Arc<Self>, label: &'static str, commit: C, task: F)
    where
        T: Send + 'static,
        C: FnOnce() -> Option<T>,
        F: FnOnce(&Arc<Core>, T, &CancellationToken) -> TallyResult<()> + Send + 'static,
    {
        let core = Arc::clone(self);
        let enqueued = self
            .queue
            .enqueue_with(label, commit, move |value, token| task(&core, value, token));
        if enqueued.is_err() {
            tracing::debug!(task = label, "client: collection disabled, dropped");
        }
    }

    /// Identity write from a queued unit. Skipped once the unit's
    /// generation is stopped: `disable` has already reloaded memory from
    /// storage and a late write would split them again.
    fn commit_identity<R>(
        &self,
        token: &CancellationToken,
        write: impl FnOnce(&mut Engine) -> Result<R, StorageError>,
    ) -> TallyResult<Option<R>> {
        let mut engine = self.lock_engine();
        if token.is_cancelled() {
            tracing::debug!("identity: worker stopped, write skipped");
            return Ok(None);
        }
        Ok(Some(write(&mut *engine)?))
    }

    /// Point the caller-visible identity back at what storage holds.
    fn reload_identity(&self, engine: &Engine) {
        match engine.persisted_identity() {
            Ok(Some(persisted)) => self.identity.restore(persisted),
            Ok(None) => {}
            Err(e) => tracing::warn!("identity: failed to reload persisted identity: {e}"),
        }
    }

    /// Dynamic super properties plus the current network type.
    fn dynamic_snapshot(&self) -> Properties {
        let mut dynamic = self.properties.dynamic_properties();
        dynamic.insert(
            property_keys::NETWORK_TYPE.to_string(),
            Value::from(self.device.network_type().label()),
        );
        dynamic
    }

    fn track_event(self: &Arc<Self>, name: String, properties: Properties, duration: Option<f64>) {
        let mut draft = EventDraft::new(EventKind::Track, self.identity.snapshot())
            .named(name)
            .with_properties(properties);
        draft.dynamic = self.dynamic_snapshot();
        draft.duration = duration;
        self.submit_draft("track", draft);
    }

    fn submit_draft(self: &Arc<Self>, label: &'static str, draft: EventDraft) {
        self.submit(label, move |core, token| core.record(draft, token));
    }

    /// Append on the worker; flush inline once a batch is full.
    fn record(self: &Arc<Self>, draft: EventDraft, token: &CancellationToken) -> TallyResult<()> {
        let buffered = {
            let mut engine = self.lock_engine();
            match engine.record(draft)? {
                Some(_) => engine.store().count()?,
                None => return Ok(()),
            }
        };
        if buffered >= self.policy.bulk_size() {
            self.flush_now(FlushTrigger::BulkSize, token)?;
        }
        Ok(())
    }

    fn flush_now(
        self: &Arc<Self>,
        trigger: FlushTrigger,
        token: &CancellationToken,
    ) -> TallyResult<FlushReport> {
        let transport = self.transport();
        let report = self.flusher.run(
            trigger,
            &self.engine,
            &self.policy,
            self.device.as_ref(),
            transport.as_ref(),
            token,
        )?;
        match &report.outcome {
            FlushOutcome::MorePending => self.enqueue_flush(FlushTrigger::Continue),
            FlushOutcome::Failed(e) => self.dispatcher.emit_error(&TallyError::Transport(e.clone())),
            _ => {}
        }
        Ok(report)
    }

    fn enqueue_flush(self: &Arc<Self>, trigger: FlushTrigger) {
        self.submit("flush", move |core, token| core.flush_now(trigger, token).map(|_| ()));
    }

    fn persist(self: &Arc<Self>, key: &'static str, value: String) {
        self.submit("persist", move |core, _| {
            core.lock_engine().set_value(key, &value)?;
            Ok(())
        });
    }

    fn start_scheduler(self: &Arc<Self>) {
        let mut slot = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let policy = Arc::clone(&self.policy);
        let weak = Arc::downgrade(self);
        let spawned = FlushScheduler::spawn(
            move || policy.interval(),
            move || match weak.upgrade() {
                Some(core) => {
                    core.enqueue_flush(FlushTrigger::Timer);
                    true
                }
                None => false,
            },
        );
        match spawned {
            Ok(scheduler) => *slot = Some(scheduler),
            Err(e) => tracing::error!("client: failed to start flush timer: {e}"),
        }
    }

    fn stop_scheduler(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
    }
}

/// Handle to a telemetry pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Tally {
    core: Arc<Core>,
}

impl Tally {
    pub fn builder(config: TallyConfig) -> TallyBuilder {
        TallyBuilder::new(config)
    }

    /// Pipeline with default collaborators derived from `config`.
    pub fn new(config: TallyConfig) -> TallyResult<Self> {
        TallyBuilder::new(config).build()
    }

    pub fn config(&self) -> &TallyConfig {
        &self.core.config
    }

    // ---- Events ----

    /// Record a custom event.
    pub fn track(&self, event_name: &str, properties: Properties) {
        self.core.track_event(event_name.to_string(), properties, None);
    }

    /// Record a screen view. `$referrer` is the previously viewed url.
    pub fn track_view_screen(&self, url: &str, mut properties: Properties) {
        let referrer = self
            .core
            .last_screen_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(url.to_string());
        properties.insert(property_keys::URL.to_string(), Value::from(url));
        if let Some(referrer) = referrer {
            properties.insert(property_keys::REFERRER.to_string(), Value::from(referrer));
        }
        self.core
            .track_event(event_names::APP_VIEW_SCREEN.to_string(), properties, None);
    }

    /// Record a click reported by the host's UI layer.
    pub fn track_app_click(&self, properties: Properties) {
        self.core
            .track_event(event_names::APP_CLICK.to_string(), properties, None);
    }

    /// Record `$AppInstall` plus a `profile_set_once` of the same properties
    /// and `$first_visit_time`, then flush. Only the first call per install
    /// does anything, across restarts.
    pub fn track_app_install(&self, properties: Properties) {
        let core = &self.core;
        let identity = core.identity.snapshot();
        let mut install = EventDraft::new(EventKind::Track, identity.clone())
            .named(event_names::APP_INSTALL)
            .with_properties(properties.clone());
        install.dynamic = core.dynamic_snapshot();

        let mut profile = properties;
        profile.insert(
            property_keys::FIRST_VISIT_TIME.to_string(),
            Value::from(install.timestamp),
        );
        let profile = EventDraft::new(EventKind::ProfileSetOnce, identity).with_properties(profile);

        core.submit("track_app_install", move |core, token| {
            if core.lock_engine().get_value(engine_keys::INSTALLED)?.is_some() {
                tracing::debug!("client: install already recorded");
                return Ok(());
            }
            core.record(install, token)?;
            core.record(profile, token)?;
            core.lock_engine().set_value(engine_keys::INSTALLED, "true")?;
            core.flush_now(FlushTrigger::Manual, token).map(|_| ())
        });
    }

    /// Environment properties every track event starts from.
    pub fn preset_properties(&self) -> Properties {
        self.core.device.preset_properties()
    }

    // ---- Profiles ----

    fn profile(&self, kind: EventKind, properties: Properties) {
        let draft = EventDraft::new(kind, self.core.identity.snapshot()).with_properties(properties);
        self.core.submit_draft("profile", draft);
    }

    pub fn profile_set(&self, properties: Properties) {
        self.profile(EventKind::ProfileSet, properties);
    }

    pub fn profile_set_once(&self, properties: Properties) {
        self.profile(EventKind::ProfileSetOnce, properties);
    }

    /// Numeric properties only; others are dropped.
    pub fn profile_increment(&self, properties: Properties) {
        self.profile(EventKind::ProfileIncrement, properties);
    }

    /// List properties only; others are dropped.
    pub fn profile_append(&self, properties: Properties) {
        self.profile(EventKind::ProfileAppend, properties);
    }

    pub fn profile_unset(&self, key: &str) {
        let mut properties = Properties::new();
        properties.insert(key.to_string(), Value::Boolean(true));
        self.profile(EventKind::ProfileUnset, properties);
    }

    pub fn profile_delete(&self) {
        self.profile(EventKind::ProfileDelete, Properties::new());
    }

    // ---- Items ----

    fn item(&self, kind: EventKind, item_type: &str, item_id: &str, properties: Properties) {
        let mut draft =
            EventDraft::new(kind, self.core.identity.snapshot()).with_properties(properties);
        draft.item = Some((item_type.to_string(), item_id.to_string()));
        self.core.submit_draft("item", draft);
    }

    pub fn item_set(&self, item_type: &str, item_id: &str, properties: Properties) {
        self.item(EventKind::ItemSet, item_type, item_id, properties);
    }

    pub fn item_delete(&self, item_type: &str, item_id: &str) {
        self.item(EventKind::ItemDelete, item_type, item_id, Properties::new());
    }

    // ---- Identity ----

    /// Current anonymous id; empty while data collection is not consented.
    pub fn anonymous_id(&self) -> String {
        if !self.core.data_collect.load(Ordering::SeqCst) {
            return String::new();
        }
        self.core.identity.anonymous_id()
    }

    pub fn login_id(&self) -> Option<String> {
        self.core.identity.login_id()
    }

    pub fn distinct_id(&self) -> String {
        self.core.identity.distinct_id()
    }

    /// Replace the anonymous id. Listeners hear about it only if it changed.
    pub fn identify(&self, anonymous_id: &str) {
        if let Err(e) = validate_id("anonymous_id", anonymous_id) {
            tracing::warn!("identity: identify rejected: {e}");
            return;
        }
        let core = &self.core;
        let id = anonymous_id.to_string();
        core.submit_with(
            "identify",
            || core.identity.replace_anonymous_id(anonymous_id).map(|_| ()),
            move |core, (), token| {
                if core
                    .commit_identity(token, |engine| engine.persist_anonymous_id(&id))?
                    .is_some()
                {
                    core.dispatcher.emit_identify(&id);
                }
                Ok(())
            },
        );
    }

    /// Regenerate the anonymous id (device id when usable, else a UUID).
    pub fn reset_anonymous_id(&self) {
        let core = &self.core;
        let id = generate_anonymous_id(core.device.as_ref());
        let swapped = id.clone();
        core.submit_with(
            "reset_anonymous_id",
            move || core.identity.replace_anonymous_id(&swapped).map(|_| ()),
            move |core, (), token| {
                if core
                    .commit_identity(token, |engine| engine.persist_anonymous_id(&id))?
                    .is_some()
                {
                    core.dispatcher.emit_reset_anonymous_id(&id);
                }
                Ok(())
            },
        );
    }

    pub fn login(&self, login_id: &str) {
        self.login_with_properties(login_id, Properties::new());
    }

    /// Attribute subsequent events to `login_id`. The first login with a
    /// given id emits one `$SignUp` carrying `properties`.
    pub fn login_with_properties(&self, login_id: &str, properties: Properties) {
        if let Err(e) = validate_id("login_id", login_id) {
            tracing::warn!("identity: login rejected: {e}");
            return;
        }
        let core = &self.core;
        let dynamic = core.dynamic_snapshot();
        let timestamp = Utc::now();
        let id = login_id.to_string();
        core.submit_with(
            "login",
            || {
                let original = core.identity.begin_login(login_id);
                if original.is_none() {
                    tracing::debug!("identity: login id equals anonymous id, ignoring");
                }
                original
            },
            move |core, original_id, token| {
                let committed = core.commit_identity(token, |engine| engine.commit_login(&id))?;
                if committed != Some(true) {
                    return Ok(());
                }
                let snapshot = IdentitySnapshot {
                    anonymous_id: original_id.clone(),
                    login_id: Some(id.clone()),
                };
                let mut draft = EventDraft::new(EventKind::SignUp, snapshot)
                    .named(event_names::SIGN_UP)
                    .with_properties(properties);
                draft.dynamic = dynamic;
                draft.timestamp = timestamp;
                draft.original_id = Some(original_id);
                let recorded = core.record(draft, token);
                core.dispatcher.emit_login(&id);
                recorded
            },
        );
    }

    pub fn logout(&self) {
        let core = &self.core;
        core.submit_with(
            "logout",
            || {
                core.identity.clear_login_id();
                Some(())
            },
            |core, (), token| {
                if core.commit_identity(token, Engine::commit_logout)? == Some(true) {
                    core.dispatcher.emit_logout();
                }
                Ok(())
            },
        );
    }

    // ---- Super properties ----

    /// Merge into the super properties (last write wins).
    pub fn register_super_properties(&self, properties: Properties) {
        self.core.submit("register_super_properties", move |core, _| {
            let (accepted, _) = sanitize_properties(properties);
            let next = core
                .lock_engine()
                .update_super_properties(|supers| supers.extend(accepted))?;
            core.properties.publish(next);
            Ok(())
        });
    }

    pub fn unregister_super_property(&self, key: &str) {
        let key = key.to_string();
        self.core.submit("unregister_super_property", move |core, _| {
            let next = core.lock_engine().update_super_properties(|supers| {
                supers.remove(&key);
            })?;
            core.properties.publish(next);
            Ok(())
        });
    }

    pub fn clear_super_properties(&self) {
        self.core.submit("clear_super_properties", |core, _| {
            let next = core
                .lock_engine()
                .update_super_properties(|supers| supers.clear())?;
            core.properties.publish(next);
            Ok(())
        });
    }

    /// Snapshot as of the last committed mutation.
    pub fn super_properties(&self) -> Properties {
        self.core.properties.super_properties().as_ref().clone()
    }

    /// Provider evaluated on the calling thread for every track call.
    pub fn register_dynamic_super_properties(&self, provider: Arc<dyn DynamicProperties>) {
        self.core.properties.set_dynamic(Some(provider));
    }

    pub fn set_track_interceptor(&self, interceptor: Option<Arc<dyn EventInterceptor>>) {
        self.core.submit("set_track_interceptor", move |core, _| {
            core.lock_engine().set_interceptor(interceptor);
            Ok(())
        });
    }

    // ---- Timers ----

    /// Start timing `event_name` in seconds.
    pub fn timer_start(&self, event_name: &str) {
        self.timer_start_with_unit(event_name, TimeUnit::Seconds);
    }

    pub fn timer_start_with_unit(&self, event_name: &str, unit: TimeUnit) {
        if !self.core.policy.is_enabled() {
            return;
        }
        if let Err(e) = validate_key(event_name) {
            tracing::warn!("timers: start rejected: {e}");
            return;
        }
        self.core.timers.start(event_name, unit);
    }

    pub fn timer_pause(&self, event_name: &str) {
        self.core.timers.pause(event_name);
    }

    pub fn timer_resume(&self, event_name: &str) {
        self.core.timers.resume(event_name);
    }

    /// Track `event_name`, with `event_duration` if a timer was running.
    pub fn timer_end(&self, event_name: &str, properties: Properties) {
        let duration = self.core.timers.end(event_name).map(|r| r.value());
        self.core
            .track_event(event_name.to_string(), properties, duration);
    }

    pub fn timer_remove(&self, event_name: &str) {
        self.core.timers.remove(event_name);
    }

    pub fn timer_clear(&self) {
        self.core.timers.clear();
    }

    // ---- Flush ----

    pub fn flush(&self) {
        self.core.enqueue_flush(FlushTrigger::Manual);
    }

    /// Flush and wait for the queue to drain. False on timeout.
    pub fn flush_sync(&self, timeout: Duration) -> bool {
        self.flush();
        self.core.queue.wait_idle(timeout)
    }

    /// Host signal that the application moved to the background.
    pub fn app_backgrounded(&self) {
        self.core.enqueue_flush(FlushTrigger::Background);
    }

    /// Drop every buffered event.
    pub fn delete_all(&self) {
        self.core.submit("delete_all", |core, _| {
            let removed = core.lock_engine().store_mut().clear()?;
            tracing::info!(removed, "client: buffer cleared");
            Ok(())
        });
    }

    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        *self
            .core
            .transport
            .write()
            .unwrap_or_else(|e| e.into_inner()) = transport;
    }

    /// Events currently buffered. Diagnostic; takes the engine lock.
    pub fn buffered_count(&self) -> TallyResult<usize> {
        Ok(self.core.lock_engine().store().count()?)
    }

    // ---- Policy ----

    pub fn set_flush_bulk_size(&self, size: usize) {
        match self.core.policy.set_bulk_size(size) {
            Ok(()) => self.core.persist(keys::FLUSH_BULK_SIZE, size.to_string()),
            Err(e) => tracing::warn!("policy: {e}"),
        }
    }

    pub fn flush_bulk_size(&self) -> usize {
        self.core.policy.bulk_size()
    }

    pub fn set_flush_interval(&self, interval_ms: u64) {
        match self.core.policy.set_interval_ms(interval_ms) {
            Ok(()) => self
                .core
                .persist(keys::FLUSH_INTERVAL_MS, interval_ms.to_string()),
            Err(e) => tracing::warn!("policy: {e}"),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.core.policy.interval()
    }

    pub fn set_flush_network_policy(&self, mask: NetworkType) {
        self.core.policy.set_network_policy(mask);
        self.core
            .persist(keys::NETWORK_POLICY, mask.bits().to_string());
    }

    pub fn flush_network_policy(&self) -> NetworkType {
        self.core.policy.network_policy()
    }

    /// Shrinking evicts the oldest buffered events.
    pub fn set_max_cache_rows(&self, rows: usize) {
        if let Err(e) = self.core.policy.set_max_cache_rows(rows) {
            tracing::warn!("policy: {e}");
            return;
        }
        self.core.submit("set_max_cache_rows", move |core, _| {
            let mut engine = core.lock_engine();
            engine.set_value(keys::MAX_CACHE_ROWS, &rows.to_string())?;
            engine.store_mut().set_capacity(rows)?;
            Ok(())
        });
    }

    pub fn max_cache_rows(&self) -> usize {
        self.core.policy.max_cache_rows()
    }

    pub fn set_session_interval_time(&self, interval_ms: u64) {
        match self.core.policy.set_session_interval_ms(interval_ms) {
            Ok(()) => self
                .core
                .persist(keys::SESSION_INTERVAL_MS, interval_ms.to_string()),
            Err(e) => tracing::warn!("policy: {e}"),
        }
    }

    pub fn session_interval_time(&self) -> u64 {
        self.core.policy.session_interval_ms()
    }

    // ---- Lifecycle ----

    pub fn is_enabled(&self) -> bool {
        self.core.policy.is_enabled()
    }

    /// Stop collecting: pending work is discarded, timers cleared, the
    /// periodic flush stopped. Idempotent.
    pub fn disable(&self) {
        let core = &self.core;
        if !core.policy.try_disable() {
            return;
        }
        core.timers.clear();
        core.stop_scheduler();
        core.queue.stop();
        // The worker is gone; this thread is now the only mutator. Identity
        // swaps whose units were just discarded never reached storage.
        {
            let mut engine = core.lock_engine();
            if let Err(e) = engine.set_value(keys::ENABLED, "false") {
                tracing::warn!("client: failed to persist disabled flag: {e}");
            }
            core.reload_identity(&engine);
        }
        tracing::info!("client: collection disabled");
        core.dispatcher.emit_collection_disabled();
    }

    /// Resume collecting after [`Tally::disable`]. Idempotent.
    pub fn enable(&self) {
        let core = &self.core;
        if !core.policy.try_enable() {
            return;
        }
        if let Err(e) = core.lock_engine().set_value(keys::ENABLED, "true") {
            tracing::warn!("client: failed to persist enabled flag: {e}");
        }
        if let Err(e) = core.queue.start() {
            tracing::error!("client: failed to restart worker: {e}");
        }
        core.start_scheduler();
        if let Some(remote) = core.remote_config.clone() {
            core.submit("remote_config_pull", move |_, _| {
                remote.pull();
                Ok(())
            });
        }
        tracing::info!("client: collection enabled");
        core.dispatcher.emit_collection_enabled();
        core.enqueue_flush(FlushTrigger::Enable);
    }

    pub fn is_data_collect_enabled(&self) -> bool {
        self.core.data_collect.load(Ordering::SeqCst)
    }

    /// Grant consent: held work runs in order, then a flush.
    pub fn enable_data_collect(&self) {
        let core = &self.core;
        if core.data_collect.swap(true, Ordering::SeqCst) {
            return;
        }
        core.queue.open_gate();
        core.dispatcher.emit_data_collect_enabled();
        core.enqueue_flush(FlushTrigger::Manual);
    }

    // ---- Listeners ----

    pub fn add_listener(&self, listener: Arc<dyn TallyListener>) {
        self.core.dispatcher.register(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TallyListener>) {
        self.core.dispatcher.unregister(listener);
    }

    // ---- Queue ----

    /// Wait until everything enqueued so far has run. False on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.core.queue.wait_idle(timeout)
    }

    /// Stop the periodic flush, run all queued work, and stop the worker.
    pub fn shutdown(&self) -> QueueStats {
        self.core.stop_scheduler();
        let stats = self.core.queue.shutdown();
        // Held units discarded by the shutdown never persisted their swaps.
        self.core.reload_identity(&self.core.lock_engine());
        tracing::info!(
            executed = stats.executed,
            failed = stats.failed,
            discarded = stats.discarded,
            "client: shut down"
        );
        stats
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.core.queue.stats()
    }
}

/// Assembles a [`Tally`] from config plus optional collaborators.
pub struct TallyBuilder {
    config: TallyConfig,
    transport: Option<Arc<dyn Transport>>,
    device: Option<Arc<dyn DeviceInfo>>,
    remote_config: Option<Arc<dyn RemoteConfig>>,
    interceptor: Option<Arc<dyn EventInterceptor>>,
    storage: Option<(Box<dyn EventStore>, Box<dyn KeyValueStore>)>,
    listeners: Vec<Arc<dyn TallyListener>>,
}

impl TallyBuilder {
    pub fn new(config: TallyConfig) -> Self {
        Self {
            config,
            transport: None,
            device: None,
            remote_config: None,
            interceptor: None,
            storage: None,
            listeners: Vec::new(),
        }
    }

    /// Overrides the transport built from `collector.server_url`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn device(mut self, device: Arc<dyn DeviceInfo>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn remote_config(mut self, remote_config: Arc<dyn RemoteConfig>) -> Self {
        self.remote_config = Some(remote_config);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn EventInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Overrides the SQLite storage opened from `storage.path`.
    pub fn storage(mut self, store: Box<dyn EventStore>, kv: Box<dyn KeyValueStore>) -> Self {
        self.storage = Some((store, kv));
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TallyListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> TallyResult<Tally> {
        let Self {
            config,
            transport,
            device,
            remote_config,
            interceptor,
            storage,
            listeners,
        } = self;

        let (store, kv) = match storage {
            Some(pair) => pair,
            None => {
                let db = match &config.storage.path {
                    Some(path) => StorageManager::open(path)?,
                    None => StorageManager::open_in_memory()?,
                };
                let store = SqliteEventBuffer::new(
                    Arc::clone(&db),
                    config.flush.effective_max_cache_rows(),
                )?;
                let kv = SqliteKeyValueStore::new(db);
                (
                    Box::new(store) as Box<dyn EventStore>,
                    Box::new(kv) as Box<dyn KeyValueStore>,
                )
            }
        };
        let device = device.unwrap_or_else(|| Arc::new(StaticDeviceInfo::new()));
        let transport = transport.or_else(|| transport::from_config(&config));

        let mut engine = Engine::load(store, kv, Arc::clone(&device))?;
        engine.set_interceptor(interceptor);
        let anonymous_id =
            engine.load_or_create_anonymous_id(|| generate_anonymous_id(device.as_ref()))?;
        let login_id = engine.persisted_login_id().map(str::to_string);

        // Persisted policy values win over config.
        let policy = FlushPolicy::from_config(&config);
        for key in [
            keys::ENABLED,
            keys::FLUSH_BULK_SIZE,
            keys::FLUSH_INTERVAL_MS,
            keys::NETWORK_POLICY,
            keys::MAX_CACHE_ROWS,
            keys::SESSION_INTERVAL_MS,
        ] {
            if let Some(value) = engine.get_value(key)? {
                policy.apply_persisted(key, &value);
            }
        }
        if engine.store().capacity() != policy.max_cache_rows() {
            engine.store_mut().set_capacity(policy.max_cache_rows())?;
        }
        let supers = engine.super_properties().clone();

        let dispatcher = Arc::new(ListenerDispatcher::new());
        for listener in listeners {
            dispatcher.register(listener);
        }
        let hook_dispatcher = Arc::clone(&dispatcher);
        let queue = TaskQueue::new(WORKER_THREAD_NAME)
            .with_error_hook(Arc::new(move |e: &TallyError| hook_dispatcher.emit_error(e)));

        let data_collect = config.privacy.effective_data_collect_enabled();
        if !data_collect {
            queue.close_gate();
        }
        let enabled = policy.is_enabled();
        if enabled {
            queue.start()?;
        }

        tracing::info!(
            distinct_id = %login_id.as_deref().unwrap_or(&anonymous_id),
            enabled,
            data_collect,
            has_transport = transport.is_some(),
            "client: started"
        );

        let core = Arc::new(Core {
            config,
            queue,
            engine: Mutex::new(engine),
            identity: IdentityStore::new(anonymous_id, login_id),
            properties: PropertyRegistry::new(supers),
            timers: TimerRegistry::new(),
            policy: Arc::new(policy),
            flusher: FlushEngine::new(),
            dispatcher,
            device,
            transport: RwLock::new(transport),
            remote_config,
            data_collect: AtomicBool::new(data_collect),
            last_screen_url: Mutex::new(None),
            scheduler: Mutex::new(None),
        });
        if enabled {
            core.start_scheduler();
        }
        Ok(Tally { core })
    }
}
