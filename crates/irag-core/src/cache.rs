use std::collections::HashMap;
use std::sync::Mutex;

use crate::traits::ResponseCache;

/// Process-local [`ResponseCache`] backed by a mutexed map. Suitable for the
/// CLI and for tests; a deployment may inject a persistent implementation.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.lock() {
            Ok(map) => map.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn put(&self, key: &str, value: String) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), value);
        }
    }
}
