use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::executor::{StateFetchError, StateFetcher};
use crate::model::ComputationId;

/// An in-memory [`StateFetcher`] double, seeded like [`crate::MockWorkService`].
///
/// Not a production wire client: it has no notion of the service's actual
/// storage layer, just a map a test can seed ahead of time and read back.
type StateKey = (ComputationId, Vec<u8>);

#[derive(Default)]
pub struct MockStateFetcher {
    state: Mutex<BTreeMap<StateKey, Vec<u8>>>,
}

impl MockStateFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value as if a prior work item had already committed it.
    pub fn seed_state(&self, computation_id: ComputationId, key: Vec<u8>, value: Vec<u8>) {
        self.state.lock().unwrap().insert((computation_id, key), value);
    }
}

impl StateFetcher for MockStateFetcher {
    fn fetch_state(&self, computation_id: &ComputationId, key: &[u8]) -> Result<Option<Vec<u8>>, StateFetchError> {
        Ok(self.state.lock().unwrap().get(&(computation_id.clone(), key.to_vec())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseeded_key_fetches_none() {
        let fetcher = MockStateFetcher::new();
        assert_eq!(fetcher.fetch_state(&"c1".to_string(), b"k").unwrap(), None);
    }

    #[test]
    fn seeded_key_is_returned_verbatim() {
        let fetcher = MockStateFetcher::new();
        fetcher.seed_state("c1".to_string(), b"k".to_vec(), b"v".to_vec());
        assert_eq!(fetcher.fetch_state(&"c1".to_string(), b"k").unwrap(), Some(b"v".to_vec()));
    }
}
