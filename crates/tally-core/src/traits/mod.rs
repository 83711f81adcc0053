//! Collaborator seams: everything the pipeline talks to but does not own.

pub mod device;
pub mod interceptor;
pub mod listener;
pub mod remote_config;
pub mod storage;
pub mod transport;

pub use device::{DeviceInfo, StaticDeviceInfo};
pub use interceptor::{DynamicProperties, EventInterceptor};
pub use listener::TallyListener;
pub use remote_config::RemoteConfig;
pub use storage::{EventStore, KeyValueStore};
pub use transport::Transport;
