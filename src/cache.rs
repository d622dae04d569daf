use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub fn default_window() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<T>,
}

impl<T> Snapshot<T> {
    /// A snapshot stamped after `now` is stale, not fresh for longer.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.fetched_at && now - self.fetched_at < window
    }
}

/// Single-slot cache for a fetched record set. Entries only leave the slot by
/// expiring; a failed fetch never replaces a snapshot.
#[derive(Debug)]
pub struct SnapshotCache<T> {
    window: Duration,
    slot: Option<Snapshot<T>>,
    path: Option<PathBuf>,
}

impl<T> SnapshotCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn in_memory(window: Duration) -> Self {
        Self {
            window,
            slot: None,
            path: None,
        }
    }

    /// Backs the slot with a JSON file so separate runs share one snapshot.
    pub fn with_file(path: PathBuf, window: Duration) -> Self {
        let slot = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Snapshot<T>>(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring unreadable cache file");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable cache file");
                None
            }
        };

        Self {
            window,
            slot,
            path: Some(path),
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot<T>> {
        self.slot.as_ref()
    }

    pub async fn get_or_fetch<F, Fut, E>(&mut self, now: DateTime<Utc>, fetch: F) -> Result<&[T], E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let fresh = self
            .slot
            .as_ref()
            .is_some_and(|snapshot| snapshot.is_fresh(now, self.window));

        if fresh {
            debug!("serving records from cached snapshot");
        } else {
            let records = fetch().await?;
            let snapshot = Snapshot {
                fetched_at: now,
                records,
            };
            self.persist(&snapshot);
            self.slot = Some(snapshot);
        }

        Ok(self
            .slot
            .as_ref()
            .map(|snapshot| snapshot.records.as_slice())
            .unwrap_or(&[]))
    }

    fn persist(&self, snapshot: &Snapshot<T>) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_vec(snapshot)
            .map_err(|err| err.to_string())
            .and_then(|bytes| std::fs::write(path, bytes).map_err(|err| err.to_string()));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to persist cache snapshot");
        }
    }
}
