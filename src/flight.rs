use crate::error::RemoteOperation;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of keys with a save or publish currently running. Clones share the
/// same registry, so controllers editing the same quiz exclude each other.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<DashMap<String, RemoteOperation>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every key or none of them.
    pub fn try_acquire(&self, keys: &[String], operation: RemoteOperation) -> Result<FlightGuard, String> {
        let mut guard = FlightGuard {
            keys: Arc::clone(&self.keys),
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let claimed = match self.keys.entry(key.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(operation);
                    true
                }
            };
            if !claimed {
                return Err(key.clone());
            }
            guard.held.push(key.clone());
        }
        Ok(guard)
    }

    pub fn running(&self, key: &str) -> Option<RemoteOperation> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    pub fn is_idle(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug)]
pub struct FlightGuard {
    keys: Arc<DashMap<String, RemoteOperation>>,
    held: Vec<String>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        for key in &self.held {
            self.keys.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn second_claim_on_same_key_is_refused() {
        let flights = InFlight::new();
        let guard = flights.try_acquire(&keys(&["quiz:Q1"]), RemoteOperation::Update).unwrap();
        assert_eq!(flights.running("quiz:Q1"), Some(RemoteOperation::Update));
        let refused = flights.try_acquire(&keys(&["quiz:Q1"]), RemoteOperation::Publish).unwrap_err();
        assert_eq!(refused, "quiz:Q1");
        drop(guard);
        assert!(flights.is_idle());
    }

    #[test]
    fn partial_claim_is_rolled_back() {
        let flights = InFlight::new();
        let _held = flights.try_acquire(&keys(&["quiz:Q1"]), RemoteOperation::Update).unwrap();
        let refused = flights
            .try_acquire(&keys(&["session:abc", "quiz:Q1"]), RemoteOperation::Publish)
            .unwrap_err();
        assert_eq!(refused, "quiz:Q1");
        assert_eq!(flights.running("session:abc"), None);
    }
}
