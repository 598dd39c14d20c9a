use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};

/// Shared handle to a constructed backend.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability.
    pub fn backend_for_capability(&self, capability: DetectionCapability) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            let supports = {
                let guard = default_backend
                    .lock()
                    .map_err(|_| anyhow!("default backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            let Some(backend) = self.get(&name) else {
                continue;
            };
            let supports = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(backend);
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectorOptions, StubBackend};
    use image::RgbaImage;

    struct Classifier;

    impl DetectorBackend for Classifier {
        fn name(&self) -> &'static str {
            "classifier"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            matches!(capability, DetectionCapability::Classification)
        }

        fn detect(&mut self, _: &RgbaImage, _: &DetectorOptions) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(Classifier);
        registry.register(StubBackend::new());
        let default = registry.default_backend().unwrap();
        assert_eq!(default.lock().unwrap().name(), "classifier");
        assert_eq!(registry.list(), vec!["classifier", "stub"]);
    }

    #[test]
    fn capability_falls_back_past_the_default() {
        let mut registry = BackendRegistry::new();
        registry.register(Classifier);
        registry.register(StubBackend::centered("cat", 0.9));
        let backend = registry
            .backend_for_capability(DetectionCapability::ObjectDetection)
            .unwrap();
        let detections = backend
            .lock()
            .unwrap()
            .detect(&RgbaImage::new(4, 4), &DetectorOptions::default())
            .unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::new();
        assert!(registry.set_default("tract").is_err());
        assert!(registry
            .backend_for_capability(DetectionCapability::ObjectDetection)
            .is_err());
    }
}
