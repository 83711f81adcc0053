//! Super properties, dynamic properties, and the enrichment merge.

use std::sync::{Arc, RwLock};

use tally_core::traits::DynamicProperties;
use tally_core::Properties;

/// Caller-visible super-property snapshot plus the dynamic provider.
///
/// The authoritative super-property map lives with the worker; it pushes a
/// fresh snapshot here after every committed mutation.
#[derive(Default)]
pub struct PropertyRegistry {
    supers: RwLock<Arc<Properties>>,
    dynamic: RwLock<Option<Arc<dyn DynamicProperties>>>,
}

impl PropertyRegistry {
    pub fn new(initial: Properties) -> Self {
        Self {
            supers: RwLock::new(Arc::new(initial)),
            dynamic: RwLock::new(None),
        }
    }

    /// Immutable snapshot of the super properties.
    pub fn super_properties(&self) -> Arc<Properties> {
        self.supers
            .read()
            .map(|s| Arc::clone(&s))
            .unwrap_or_else(|e| Arc::clone(&e.into_inner()))
    }

    pub(crate) fn publish(&self, supers: Properties) {
        let mut guard = self.supers.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(supers);
    }

    pub fn set_dynamic(&self, provider: Option<Arc<dyn DynamicProperties>>) {
        *self.dynamic.write().unwrap_or_else(|e| e.into_inner()) = provider;
    }

    /// Evaluate the dynamic provider. A panicking provider contributes nothing.
    pub fn dynamic_properties(&self) -> Properties {
        let provider = self
            .dynamic
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|e| e.into_inner().clone());
        let Some(provider) = provider else {
            return Properties::new();
        };
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| provider.properties()))
            .unwrap_or_else(|_| {
                tracing::warn!("properties: dynamic provider panicked, ignoring");
                Properties::new()
            })
    }
}

/// The layers of an outgoing event's properties, lowest precedence first.
#[derive(Debug, Default)]
pub struct PropertyLayers<'a> {
    pub presets: Option<&'a Properties>,
    pub supers: Option<&'a Properties>,
    pub dynamic: Option<&'a Properties>,
    pub caller: Properties,
    pub reserved: Properties,
}

/// Merge layers so later layers win. Reserved system properties always win.
pub fn enrich(layers: PropertyLayers<'_>) -> Properties {
    let PropertyLayers {
        presets,
        supers,
        dynamic,
        caller,
        reserved,
    } = layers;

    let mut merged = Properties::new();
    for layer in [presets, supers, dynamic].into_iter().flatten() {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged.extend(caller);
    merged.extend(reserved);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{properties, Value};

    #[test]
    fn later_layers_override_earlier() {
        let presets = properties! { "$os" => "linux", "k" => "preset" };
        let supers = properties! { "k" => "super", "plan" => "free" };
        let dynamic = properties! { "k" => "dynamic" };
        let merged = enrich(PropertyLayers {
            presets: Some(&presets),
            supers: Some(&supers),
            dynamic: Some(&dynamic),
            caller: properties! { "plan" => "pro" },
            reserved: properties! { "$is_login_id" => false },
        });
        assert_eq!(merged["k"], Value::from("dynamic"));
        assert_eq!(merged["plan"], Value::from("pro"));
        assert_eq!(merged["$os"], Value::from("linux"));
    }

    #[test]
    fn callers_cannot_override_reserved() {
        let merged = enrich(PropertyLayers {
            caller: properties! { "$is_login_id" => true, "event_duration" => 99 },
            reserved: properties! { "$is_login_id" => false, "event_duration" => 1.5 },
            ..Default::default()
        });
        assert_eq!(merged["$is_login_id"], Value::from(false));
        assert_eq!(merged["event_duration"], Value::from(1.5));
    }

    struct Panicky;
    impl DynamicProperties for Panicky {
        fn properties(&self) -> Properties {
            panic!("boom")
        }
    }

    #[test]
    fn panicking_dynamic_provider_is_contained() {
        let registry = PropertyRegistry::default();
        registry.set_dynamic(Some(Arc::new(Panicky)));
        assert!(registry.dynamic_properties().is_empty());
    }
}
