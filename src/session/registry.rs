//! Cookie handle to [`SessionManager`] map with idle expiry.
//!
//! Visitors without a known handle get a guest manager that lives for one
//! request. It is only admitted under a new handle once it holds something
//! worth keeping, so anonymous traffic does not grow the map.

use super::SessionManager;
use crate::backend::Backend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use ulid::Ulid;

struct Entry {
    manager: Arc<SessionManager>,
    last_seen: Instant,
}

/// A registered manager and the handle its cookie carries.
pub struct Resolved {
    pub handle: String,
    pub manager: Arc<SessionManager>,
}

pub struct SessionRegistry {
    backend: Arc<dyn Backend>,
    reset_redirect: String,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, reset_redirect: String, idle_ttl: Duration) -> Self {
        Self {
            backend,
            reset_redirect,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Manager for `handle` when it is known and not idle past the TTL.
    /// Expired entries found along the way are stopped and dropped.
    pub async fn find(&self, handle: Option<&str>) -> Option<Resolved> {
        let now = Instant::now();

        let (found, expired) = {
            let mut sessions = self.sessions.lock().await;

            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_seen) > self.idle_ttl)
                .map(|(key, _)| key.clone())
                .collect();
            let expired: Vec<Arc<SessionManager>> = stale
                .iter()
                .filter_map(|key| sessions.remove(key))
                .map(|entry| entry.manager)
                .collect();

            let found = handle.and_then(|handle| {
                sessions.get_mut(handle).map(|entry| {
                    entry.last_seen = now;
                    Resolved {
                        handle: handle.to_string(),
                        manager: Arc::clone(&entry.manager),
                    }
                })
            });

            (found, expired)
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "expiring idle sessions");
        }
        for manager in expired {
            manager.stop().await;
        }

        found
    }

    /// A started manager that is not registered under any handle.
    pub async fn guest(&self) -> Arc<SessionManager> {
        let manager = Arc::new(SessionManager::new(
            Arc::clone(&self.backend),
            self.reset_redirect.clone(),
        ));
        manager.start().await;
        manager
    }

    /// Register `manager` under a fresh handle and return the handle.
    pub async fn admit(&self, manager: Arc<SessionManager>) -> String {
        let handle = Ulid::new().to_string();
        self.sessions.lock().await.insert(
            handle.clone(),
            Entry {
                manager,
                last_seen: Instant::now(),
            },
        );
        debug!("admitted visitor session");
        handle
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
