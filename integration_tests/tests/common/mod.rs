#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Once,
};
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use world_core::{
    GeoDistance, GeoPoint, GeoProjector, InMemoryGeoIndex, IndexCallPolicy, IndexError,
    ObjectDirectory, ObjectId, SpatialIndex,
};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("world=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn fast_policy() -> IndexCallPolicy {
    IndexCallPolicy {
        timeout: Duration::from_millis(20),
        max_attempts: 2,
        backoff: Duration::ZERO,
    }
}

pub fn directory_over(
    index: Arc<dyn SpatialIndex>,
    width: u32,
    height: u32,
) -> ObjectDirectory {
    ObjectDirectory::new(index, Arc::new(GeoProjector::new(width, height)))
        .with_policy(fast_policy())
}

/// Index double that can be switched into an outage, or made to time out
/// after applying writes.
#[derive(Default)]
pub struct ControlledIndex {
    pub inner: InMemoryGeoIndex,
    down: AtomicBool,
    /// Writes land in `inner` but the call still reports a timeout.
    lossy_acks: AtomicBool,
    pub calls: AtomicU32,
}

impl ControlledIndex {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_lossy_acks(&self, lossy: bool) {
        self.lossy_acks.store(lossy, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("index offline".to_string()));
        }
        Ok(())
    }

    fn ack<T>(&self, result: T, timeout: Duration) -> Result<T, IndexError> {
        if self.lossy_acks.load(Ordering::SeqCst) {
            return Err(IndexError::Timeout(timeout));
        }
        Ok(result)
    }
}

impl SpatialIndex for ControlledIndex {
    fn add(&self, id: ObjectId, point: GeoPoint, timeout: Duration) -> Result<(), IndexError> {
        self.check()?;
        let applied = self.inner.add(id, point, timeout)?;
        self.ack(applied, timeout)
    }

    fn remove(&self, id: ObjectId, timeout: Duration) -> Result<bool, IndexError> {
        self.check()?;
        let removed = self.inner.remove(id, timeout)?;
        self.ack(removed, timeout)
    }

    fn nearest_within(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        timeout: Duration,
    ) -> Result<Option<ObjectId>, IndexError> {
        self.check()?;
        self.inner.nearest_within(point, radius, timeout)
    }

    fn query_radius(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError> {
        self.check()?;
        self.inner.query_radius(point, radius, timeout)
    }

    fn query_box(
        &self,
        corner_a: GeoPoint,
        corner_b: GeoPoint,
        timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError> {
        self.check()?;
        self.inner.query_box(corner_a, corner_b, timeout)
    }
}
