use crate::errors::TallyError;

/// Host-facing notifications. All methods have no-op defaults so listeners
/// implement only what they care about.
///
/// Identity callbacks run on the task-queue worker after the mutation is
/// committed, once per actual change.
pub trait TallyListener: Send + Sync {
    fn on_identify(&self, _anonymous_id: &str) {}
    fn on_login(&self, _login_id: &str) {}
    fn on_logout(&self) {}
    fn on_reset_anonymous_id(&self, _anonymous_id: &str) {}
    fn on_collection_disabled(&self) {}
    fn on_collection_enabled(&self) {}
    fn on_data_collect_enabled(&self) {}
    /// Errors absorbed by the pipeline (never returned to callers).
    fn on_error(&self, _error: &TallyError) {}
}
