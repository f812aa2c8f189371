//! Local copy of the signed-in user's profile, kept as JSON in the plain
//! keystore so the app can render the account offline.

use std::sync::Arc;

use crate::backend::UserProfile;
use crate::storage::util::map_json_err;
use crate::storage::{KeyValueStore, StorageResult};

const PROFILE_KEY: &str = "userData";

pub(crate) struct ProfileCache {
    store: Arc<dyn KeyValueStore>,
}

impl ProfileCache {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub(crate) fn save(&self, profile: &UserProfile) -> StorageResult<()> {
        let json = serde_json::to_string(profile).map_err(|err| map_json_err(&err))?;
        self.store.set(PROFILE_KEY.to_string(), json)
    }

    /// The cached profile. An unreadable or undecodable entry counts as absent.
    pub(crate) fn load(&self) -> Option<UserProfile> {
        let raw = match self.store.get(PROFILE_KEY.to_string()) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("profile cache unreadable: {err}");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .inspect_err(|err| log::warn!("discarding undecodable cached profile: {err}"))
            .ok()
    }

    pub(crate) fn clear(&self) -> StorageResult<()> {
        self.store.delete(PROFILE_KEY.to_string())
    }
}
