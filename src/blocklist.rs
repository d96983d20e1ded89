use std::{collections::HashSet, sync::RwLock};

use log::*;

/// In-memory set of revoked token ids (`jti`). Cleared on restart.
#[derive(Default)]
pub struct Blocklist(RwLock<HashSet<String>>);

impl Blocklist {
    pub fn revoke(&self, jti: &str) {
        match self.0.write() {
            Ok(mut set) => {
                set.insert(jti.to_owned());
            }
            Err(e) => error!("Blocklist lock poisoned, cannot revoke {jti}: {e}"),
        }
    }

    pub fn contains(&self, jti: &str) -> bool {
        // poisoned means a writer panicked mid-insert; treat as revoked
        self.0.read().map(|set| set.contains(jti)).unwrap_or(true)
    }
}
