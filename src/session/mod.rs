use log::warn;
use serde::{Deserialize, Serialize};

use crate::route::MapProvider;
use crate::store::SessionDb;

pub const KEY_ADDRESSES: &str = "flex2map.addresses";
pub const KEY_DESTINATION_STATE: &str = "flex2map.destination_state";
pub const KEY_PROVIDER: &str = "flex2map.provider";

/// Operator preferences carried across the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub destination_state: String,
    pub provider: MapProvider,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            destination_state: "CA".into(),
            provider: MapProvider::AppleMaps,
        }
    }
}

/// Mirrors the roster and the two preference values to the session store.
///
/// Reads happen once at startup: a present key overwrites the in-memory
/// default, an absent key keeps the default and is deliberately not written
/// back. Writes happen on every change. A failing read or write is logged
/// and swallowed, never retried; the in-memory state stays authoritative for
/// the rest of the session. `teardown` deletes all three keys so the next
/// session starts clean.
#[derive(Clone)]
pub struct SessionPersistence {
    db: SessionDb,
}

impl SessionPersistence {
    pub fn new(db: SessionDb) -> Self {
        Self { db }
    }

    pub fn restore_addresses(&self) -> Vec<String> {
        match self.db.get(KEY_ADDRESSES) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(items) => items,
                Err(err) => {
                    warn!("ignoring unreadable persisted address list: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("failed to read persisted address list: {err}");
                Vec::new()
            }
        }
    }

    pub fn restore_preferences(&self) -> Preferences {
        let mut prefs = Preferences::default();

        match self.db.get(KEY_DESTINATION_STATE) {
            Ok(Some(code)) => prefs.destination_state = code,
            Ok(None) => {}
            Err(err) => warn!("failed to read persisted destination state: {err}"),
        }

        match self.db.get(KEY_PROVIDER) {
            Ok(Some(token)) => match MapProvider::parse(&token) {
                Some(provider) => prefs.provider = provider,
                None => warn!("ignoring unknown persisted provider token {token:?}"),
            },
            Ok(None) => {}
            Err(err) => warn!("failed to read persisted provider: {err}"),
        }

        prefs
    }

    pub fn save_addresses(&self, items: &[String]) {
        let serialized = match serde_json::to_string(items) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!("failed to serialize address list: {err}");
                return;
            }
        };
        if let Err(err) = self.db.set(KEY_ADDRESSES, &serialized) {
            warn!("failed to persist address list: {err}");
        }
    }

    pub fn save_destination_state(&self, code: &str) {
        if let Err(err) = self.db.set(KEY_DESTINATION_STATE, code) {
            warn!("failed to persist destination state: {err}");
        }
    }

    pub fn save_provider(&self, provider: MapProvider) {
        if let Err(err) = self.db.set(KEY_PROVIDER, provider.as_str()) {
            warn!("failed to persist provider: {err}");
        }
    }

    /// Session-end cleanup, driven by the host's "about to be destroyed"
    /// signal rather than a graceful command.
    pub fn teardown(&self) {
        for key in [KEY_ADDRESSES, KEY_DESTINATION_STATE, KEY_PROVIDER] {
            if let Err(err) = self.db.remove(key) {
                warn!("failed to clear session key {key}: {err}");
            }
        }
    }
}
