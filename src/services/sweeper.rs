//! Background eviction of expired uploads.
//!
//! Two entry points:
//! - [`Sweeper::reconcile_startup`] empties the upload directory once at
//!   boot, because the in-memory index of a previous process is gone.
//! - [`Sweeper::sweep_once`] evicts every index entry older than the TTL;
//!   [`Sweeper::spawn`] runs it on a fixed period until cancelled.
//!
//! Per-object failures are logged and skipped. Nothing here is ever
//! reported to a client.

use crate::services::{
    clock::Clock,
    object_store::{ObjectStore, StoreError},
    retention_index::RetentionIndex,
};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default retention window (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired entries found in the index.
    pub examined: usize,
    /// Files deleted by this pass.
    pub evicted: usize,
    /// Entries whose file was already gone.
    pub already_missing: usize,
    /// Entries left in the index because the delete failed.
    pub failed: usize,
}

pub struct Sweeper {
    store: Arc<ObjectStore>,
    index: Arc<RetentionIndex>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<ObjectStore>,
        index: Arc<RetentionIndex>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            index,
            clock,
            ttl,
        }
    }

    /// Delete every entry of the upload directory, whatever its age.
    pub async fn reconcile_startup(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let names = match self.store.entries().await {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    "startup reconciliation could not list {}: {}",
                    self.store.base_path().display(),
                    err
                );
                return report;
            }
        };

        for name in names {
            match self.store.purge(&name).await {
                Ok(()) => {
                    debug!("reconcile: removed orphan {:?}", name);
                    report.removed += 1;
                }
                Err(err) => {
                    warn!("reconcile: could not remove {:?}: {}", name, err);
                    report.failed += 1;
                }
            }
        }

        info!(
            "startup reconciliation removed {} orphaned entries ({} failed)",
            report.removed, report.failed
        );
        report
    }

    /// One eviction pass over the retention index.
    pub async fn sweep_once(&self) -> SweepReport {
        if self.index.is_empty() {
            return SweepReport::default();
        }
        let now = self.clock.now();
        let expired = self.index.expired(self.ttl, now);
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        for id in expired {
            match self.store.delete(&id).await {
                Ok(()) => {
                    self.index.remove(&id);
                    info!("evicted {}", id);
                    report.evicted += 1;
                }
                Err(StoreError::NotFound(_)) => {
                    self.index.remove(&id);
                    debug!("{} already gone from disk", id);
                    report.already_missing += 1;
                }
                Err(err) => {
                    // stays indexed; retried next pass
                    warn!("could not evict {}: {}", id, err);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            debug!(?report, "sweep finished");
        }
        report
    }

    /// Run [`Sweeper::sweep_once`] now and then every `period` until
    /// `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("sweeper started (ttl {:?}, period {:?})", self.ttl, period);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }

            info!("sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::object_id::ObjectId,
        services::{clock::ManualClock, id_generator::IdGenerator},
    };
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(600);

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        store: Arc<ObjectStore>,
        index: Arc<RetentionIndex>,
        sweeper: Arc<Sweeper>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let ids = IdGenerator::new(12, clock.clone());
        let store = Arc::new(ObjectStore::new(dir.path(), ids, 1024));
        let index = Arc::new(RetentionIndex::new());
        let sweeper = Arc::new(Sweeper::new(
            store.clone(),
            index.clone(),
            clock.clone(),
            TTL,
        ));
        Fixture {
            _dir: dir,
            clock,
            store,
            index,
            sweeper,
        }
    }

    async fn upload(fx: &Fixture, bytes: &[u8]) -> ObjectId {
        let id = fx
            .store
            .put(bytes, Some("image/png"), Some("a.png"))
            .await
            .unwrap();
        fx.index.record(id.clone(), id.created_at());
        id
    }

    #[tokio::test]
    async fn object_survives_until_ttl_then_is_evicted() {
        let fx = fixture();
        let id = upload(&fx, b"0123456789").await;

        fx.clock.advance(TTL - Duration::from_millis(1));
        let report = fx.sweeper.sweep_once().await;
        assert_eq!(report.examined, 0);
        assert_eq!(fx.store.get(&id).await.unwrap().as_ref(), b"0123456789");

        fx.clock.advance(Duration::from_millis(2));
        let report = fx.sweeper.sweep_once().await;
        assert_eq!(report.evicted, 1);
        assert!(matches!(fx.store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(fx.index.is_empty());
    }

    #[tokio::test]
    async fn missing_file_does_not_abort_the_sweep() {
        let fx = fixture();
        let first = upload(&fx, b"one").await;
        let second = upload(&fx, b"two").await;
        let ghost = ObjectId::parse("ghost0000000_1.png").unwrap();
        fx.index.record(ghost.clone(), ghost.created_at());

        // deleted behind the index's back
        fx.store.delete(&first).await.unwrap();
        fx.clock.advance(TTL + Duration::from_secs(1));

        let report = fx.sweeper.sweep_once().await;

        assert_eq!(report.examined, 3);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.already_missing, 2);
        assert_eq!(report.failed, 0);
        assert!(fx.index.is_empty());
        assert!(fx.store.get(&second).await.is_err());
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_objects_alone() {
        let fx = fixture();
        let old = upload(&fx, b"old").await;
        fx.clock.advance(Duration::from_secs(300));
        let fresh = upload(&fx, b"fresh").await;
        fx.clock.advance(Duration::from_secs(301));

        let report = fx.sweeper.sweep_once().await;

        assert_eq!(report.evicted, 1);
        assert!(fx.store.get(&old).await.is_err());
        assert!(fx.index.contains(&fresh));
        assert_eq!(fx.store.get(&fresh).await.unwrap().as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn sweep_of_empty_index_touches_nothing() {
        let fx = fixture();
        // an unindexed file is not the sweeper's business
        let stray = fx.store.base_path().join("stray");
        std::fs::write(&stray, b"x").unwrap();
        fx.clock.advance(TTL * 10);

        let report = fx.sweeper.sweep_once().await;

        assert_eq!(report.examined, 0);
        assert!(stray.exists());
    }

    #[tokio::test]
    async fn startup_reconciliation_empties_the_directory() {
        let fx = fixture();
        let base = fx.store.base_path().to_path_buf();
        // a future timestamp would never expire on its own
        std::fs::write(base.join("abcdefghijkl_99999999999999.png"), b"x").unwrap();
        std::fs::write(base.join("abcdefghijkl_1.png"), b"x").unwrap();
        std::fs::write(base.join("not-an-id"), b"x").unwrap();
        std::fs::create_dir(base.join("subdir")).unwrap();
        std::fs::write(base.join("subdir").join("file"), b"x").unwrap();

        let report = fx.sweeper.reconcile_startup().await;

        assert_eq!(
            report,
            ReconcileReport {
                removed: 4,
                failed: 0
            }
        );
        assert_eq!(std::fs::read_dir(&base).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reconciliation_of_missing_directory_is_harmless() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let dir = TempDir::new().unwrap();
        let ids = IdGenerator::new(12, clock.clone());
        let store = Arc::new(ObjectStore::new(dir.path().join("absent"), ids, 1024));
        let sweeper = Sweeper::new(store, Arc::new(RetentionIndex::new()), clock, TTL);

        assert_eq!(sweeper.reconcile_startup().await, ReconcileReport::default());
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_immediately_and_stops_on_cancel() {
        let fx = fixture();
        let id = upload(&fx, b"bytes").await;
        fx.clock.advance(TTL * 2);

        let shutdown = CancellationToken::new();
        let handle = fx
            .sweeper
            .clone()
            .spawn(Duration::from_secs(3600), shutdown.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while fx.index.contains(&id) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first sweep should run without waiting a full period");
        assert!(fx.store.get(&id).await.is_err());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop after cancellation")
            .unwrap();
    }
}
