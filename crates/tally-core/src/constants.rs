/// Tally library version, reported in preset properties.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name reported as `$lib`.
pub const LIB_NAME: &str = "rust";

/// Maximum length (in chars) of a string property value.
pub const MAX_STRING_VALUE_LEN: usize = 8192;

/// Maximum length of a distinct, login, or item id.
pub const MAX_ID_LEN: usize = 255;

/// Maximum length of a property key or event name.
pub const MAX_KEY_LEN: usize = 100;

/// Default number of events per delivery batch.
pub const DEFAULT_FLUSH_BULK_SIZE: usize = 100;

/// Default periodic flush interval.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 15_000;

/// Lowest accepted flush interval.
pub const MIN_FLUSH_INTERVAL_MS: u64 = 1_000;

/// Default capacity of the durable buffer, in rows.
pub const DEFAULT_MAX_CACHE_ROWS: usize = 10_000;

/// Wall-clock budget for one draining flush before yielding to other queue work.
pub const DEFAULT_DRAIN_BUDGET_MS: u64 = 10_000;

/// Default session interval.
pub const DEFAULT_SESSION_INTERVAL_MS: u64 = 30_000;

/// Session interval bounds (inclusive).
pub const MIN_SESSION_INTERVAL_MS: u64 = 10_000;
pub const MAX_SESSION_INTERVAL_MS: u64 = 300_000;

/// Default transport timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Reserved event names emitted by the pipeline itself.
pub mod event_names {
    pub const SIGN_UP: &str = "$SignUp";
    pub const APP_VIEW_SCREEN: &str = "$AppViewScreen";
    pub const APP_CLICK: &str = "$AppClick";
    pub const APP_INSTALL: &str = "$AppInstall";
}

/// Reserved property keys set by the pipeline.
pub mod property_keys {
    pub const LIB: &str = "$lib";
    pub const LIB_VERSION: &str = "$lib_version";
    pub const OS: &str = "$os";
    pub const NETWORK_TYPE: &str = "$network_type";
    pub const IS_LOGIN_ID: &str = "$is_login_id";
    pub const IS_FIRST_DAY: &str = "$is_first_day";
    pub const EVENT_DURATION: &str = "event_duration";
    pub const URL: &str = "$url";
    pub const REFERRER: &str = "$referrer";
    pub const FIRST_VISIT_TIME: &str = "$first_visit_time";
}
