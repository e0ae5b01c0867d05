//! Authoritative registry of movable objects.
//!
//! The directory owns the `id -> MapObject` map and keeps an injected
//! [`SpatialIndex`] in step with it. Writes are two-phase: the local slot is
//! reserved (or marked busy) first, the index call runs without holding the
//! map lock, and the local change is committed only once the index accepted
//! it. A failed index call releases the slot and issues a best-effort
//! compensating call, because a timed-out write may still have landed.
//!
//! Queries take grid units. Radii are converted through the projector, the
//! index answers in its native units and every hit is re-checked against the
//! exact grid geometry of the local record.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
    time::Duration,
};

use thiserror::Error;
use world_schema::{GridBox, MapObject, ObjectId};

use crate::{
    events::{CancellationToken, EventHub, ObjectEvent, Subscription},
    projection::GeoProjector,
    spatial_index::{IndexError, SpatialIndex},
};

pub const DEFAULT_LOOKUP_RADIUS: u32 = 1;

/// How index calls are bounded and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCallPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for IndexCallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            max_attempts: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("object {0} not found")]
    NotFound(ObjectId),
    #[error("object {0} already exists")]
    Duplicate(ObjectId),
    #[error("object {0} has another write in flight")]
    Busy(ObjectId),
    #[error("object {id} at ({x}, {y}) lies outside the {width}x{height} grid")]
    OutOfBounds {
        id: ObjectId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("spatial index rejected the change for object {id}: {source}")]
    Index {
        id: ObjectId,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Clone)]
enum Slot {
    /// Add in flight; invisible to readers.
    Reserved,
    Live(MapObject),
    /// Remove or update in flight; readers still see the current record.
    Busy(MapObject),
}

impl Slot {
    fn visible(&self) -> Option<&MapObject> {
        match self {
            Slot::Reserved => None,
            Slot::Live(object) | Slot::Busy(object) => Some(object),
        }
    }
}

pub struct ObjectDirectory {
    index: Arc<dyn SpatialIndex>,
    projector: Arc<GeoProjector>,
    records: RwLock<HashMap<ObjectId, Slot>>,
    events: EventHub,
    policy: IndexCallPolicy,
}

impl std::fmt::Debug for ObjectDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDirectory")
            .field("objects", &self.len())
            .field("projector", &self.projector)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ObjectDirectory {
    pub fn new(index: Arc<dyn SpatialIndex>, projector: Arc<GeoProjector>) -> Self {
        Self {
            index,
            projector,
            records: RwLock::new(HashMap::new()),
            events: EventHub::default(),
            policy: IndexCallPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: IndexCallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound each subscriber queue; `None` keeps them unbounded.
    pub fn with_event_capacity(mut self, capacity: Option<usize>) -> Self {
        self.events = EventHub::new(capacity);
        self
    }

    pub fn projector(&self) -> &GeoProjector {
        &self.projector
    }

    pub fn policy(&self) -> IndexCallPolicy {
        self.policy
    }

    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, Slot>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<ObjectId, Slot>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_bounds(&self, object: &MapObject) -> Result<(), DirectoryError> {
        let (width, height) = self.projector.dimensions();
        if object.x >= width || object.y >= height {
            return Err(DirectoryError::OutOfBounds {
                id: object.id,
                x: object.x,
                y: object.y,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Run an index call under the retry policy.
    fn call_index<T>(
        &self,
        op: &'static str,
        mut call: impl FnMut(Duration) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(self.policy.timeout) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    tracing::debug!(
                        target: "world::directory",
                        op,
                        attempt,
                        error = %err,
                        "directory.index.retry"
                    );
                    thread::sleep(self.policy.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn compensate(
        &self,
        op: &'static str,
        id: ObjectId,
        call: impl FnOnce(Duration) -> Result<(), IndexError>,
    ) {
        if let Err(err) = call(self.policy.timeout) {
            tracing::warn!(
                target: "world::directory",
                op,
                object_id = id.0,
                error = %err,
                "directory.compensation_failed"
            );
        }
    }

    /// Insert a new object. Publishes [`ObjectEvent::Added`] on success.
    pub fn add(&self, object: MapObject) -> Result<(), DirectoryError> {
        self.check_bounds(&object)?;
        let id = object.id;
        let pending = {
            let mut records = self.write_records();
            match records.entry(id) {
                Entry::Occupied(entry) => {
                    return Err(match entry.get() {
                        Slot::Live(_) => DirectoryError::Duplicate(id),
                        _ => DirectoryError::Busy(id),
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(Slot::Reserved);
                }
            }
            PendingWrite::new(self, id, None)
        };

        let point = self.projector.to_geo(object.x, object.y);
        if let Err(source) = self.call_index("add", |timeout| self.index.add(id, point, timeout)) {
            self.compensate("add", id, |timeout| self.index.remove(id, timeout).map(|_| ()));
            return Err(DirectoryError::Index { id, source });
        }

        pending.commit(Some(object.clone()));
        tracing::debug!(
            target: "world::directory",
            object_id = id.0,
            x = object.x,
            y = object.y,
            "directory.added"
        );
        self.events.publish(ObjectEvent::Added(object));
        Ok(())
    }

    /// [`add`](Self::add) reduced to a flag; failures are logged.
    pub fn try_add(&self, object: MapObject) -> bool {
        let id = object.id;
        match self.add(object) {
            Ok(()) => true,
            Err(err) => {
                log_rejection("add", id, &err);
                false
            }
        }
    }

    /// Remove an object and return its last record. Publishes
    /// [`ObjectEvent::Removed`] on success.
    pub fn remove(&self, id: ObjectId) -> Result<MapObject, DirectoryError> {
        let (object, pending) = self.begin_write(id)?;

        if let Err(source) = self.call_index("remove", |timeout| self.index.remove(id, timeout)) {
            let point = self.projector.to_geo(object.x, object.y);
            self.compensate("remove", id, |timeout| self.index.add(id, point, timeout));
            return Err(DirectoryError::Index { id, source });
        }

        pending.commit(None);
        tracing::debug!(target: "world::directory", object_id = id.0, "directory.removed");
        self.events.publish(ObjectEvent::Removed(id));
        Ok(object)
    }

    pub fn try_remove(&self, id: ObjectId) -> bool {
        match self.remove(id) {
            Ok(_) => true,
            Err(err) => {
                log_rejection("remove", id, &err);
                false
            }
        }
    }

    /// Replace the record for `object.id`, moving it in the index when its
    /// position changed. Publishes [`ObjectEvent::Updated`] on success.
    pub fn update(&self, object: MapObject) -> Result<(), DirectoryError> {
        self.check_bounds(&object)?;
        let id = object.id;
        let (previous, pending) = self.begin_write(id)?;

        if previous.position() != object.position() {
            let point = self.projector.to_geo(object.x, object.y);
            if let Err(source) =
                self.call_index("update", |timeout| self.index.add(id, point, timeout))
            {
                let old_point = self.projector.to_geo(previous.x, previous.y);
                self.compensate("update", id, |timeout| self.index.add(id, old_point, timeout));
                return Err(DirectoryError::Index { id, source });
            }
        }

        pending.commit(Some(object.clone()));
        tracing::debug!(target: "world::directory", object_id = id.0, "directory.updated");
        self.events.publish(ObjectEvent::Updated(object));
        Ok(())
    }

    pub fn try_update(&self, object: MapObject) -> bool {
        let id = object.id;
        match self.update(object) {
            Ok(()) => true,
            Err(err) => {
                log_rejection("update", id, &err);
                false
            }
        }
    }

    /// Mark a live record busy and hand back its current value together with
    /// the guard that restores it unless the write commits.
    fn begin_write(&self, id: ObjectId) -> Result<(MapObject, PendingWrite<'_>), DirectoryError> {
        let mut records = self.write_records();
        let slot = records.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        match slot {
            Slot::Live(object) => {
                let object = object.clone();
                *slot = Slot::Busy(object.clone());
                Ok((object.clone(), PendingWrite::new(self, id, Some(object))))
            }
            Slot::Reserved => Err(DirectoryError::NotFound(id)),
            Slot::Busy(_) => Err(DirectoryError::Busy(id)),
        }
    }

    pub fn get_by_id(&self, id: ObjectId) -> Result<MapObject, DirectoryError> {
        self.read_records()
            .get(&id)
            .and_then(Slot::visible)
            .cloned()
            .ok_or(DirectoryError::NotFound(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get_by_id(id).is_ok()
    }

    /// Visible objects, in-flight adds excluded.
    pub fn len(&self) -> usize {
        self.read_records()
            .values()
            .filter(|slot| slot.visible().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every visible object, ordered by id.
    pub fn objects(&self) -> Vec<MapObject> {
        let mut objects: Vec<MapObject> = self
            .read_records()
            .values()
            .filter_map(Slot::visible)
            .cloned()
            .collect();
        objects.sort_unstable_by_key(|object| object.id);
        objects
    }

    /// Overlap test between a stored object and `[x, x + w) × [y, y + h)`.
    pub fn intersects_area(
        &self,
        id: ObjectId,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<bool, DirectoryError> {
        self.read_records()
            .get(&id)
            .and_then(Slot::visible)
            .map(|object| object.intersects(x, y, w, h))
            .ok_or(DirectoryError::NotFound(id))
    }

    /// Object nearest to `(x, y)` within `radius` grid units
    /// ([`DEFAULT_LOOKUP_RADIUS`] when `None`). Ties go to the lowest id.
    ///
    /// The projection scales the axes differently, so the index's nearest
    /// point is not necessarily the nearest cell. Candidates come from a
    /// radius query and are ranked by grid distance here.
    ///
    /// `None` also covers index failures and ids that vanished locally
    /// between the index answer and the lookup.
    pub fn first_or_default_by_position(
        &self,
        x: u32,
        y: u32,
        radius: Option<u32>,
    ) -> Option<MapObject> {
        let radius = radius.unwrap_or(DEFAULT_LOOKUP_RADIUS);
        self.objects_within(x, y, radius, "nearest")?
            .into_iter()
            .map(|object| (grid_distance(&object, x, y), object))
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.id.cmp(&b.id)))
            .map(|(_, object)| object)
    }

    /// Every object whose anchor lies within `radius` grid units of `(x, y)`,
    /// ordered by id. Index failures yield an empty list.
    pub fn get_all_objects_in_area(&self, x: u32, y: u32, radius: u32) -> Vec<MapObject> {
        self.objects_within(x, y, radius, "query_radius")
            .unwrap_or_default()
    }

    /// `None` when the index call failed.
    fn objects_within(
        &self,
        x: u32,
        y: u32,
        radius: u32,
        op: &'static str,
    ) -> Option<Vec<MapObject>> {
        let center = self.projector.to_geo(x, y);
        let geo_radius = self.projector.grid_radius_to_geo(f64::from(radius));
        let ids = match self.call_index(op, |timeout| {
            self.index.query_radius(center, geo_radius, timeout)
        }) {
            Ok(ids) => ids,
            Err(err) => {
                log_query_failure(op, &err);
                return None;
            }
        };
        Some(self.resolve(&ids, |object| {
            grid_distance(object, x, y) <= f64::from(radius)
        }))
    }

    /// Every object whose anchor lies in the inclusive box, ordered by id.
    ///
    /// The index stores anchors only, so an object whose footprint reaches
    /// into the box from an anchor outside it is not returned.
    pub fn objects_in_box(&self, bounds: GridBox) -> Vec<MapObject> {
        let b = bounds.normalized();
        let corner_a = self.projector.to_geo(b.x1, b.y1);
        let corner_b = self.projector.to_geo(b.x2, b.y2);
        let ids = match self.call_index("query_box", |timeout| {
            self.index.query_box(corner_a, corner_b, timeout)
        }) {
            Ok(ids) => ids,
            Err(err) => {
                log_query_failure("query_box", &err);
                return Vec::new();
            }
        };
        self.resolve(&ids, |object| {
            (b.x1..=b.x2).contains(&object.x) && (b.y1..=b.y2).contains(&object.y)
        })
    }

    fn resolve(&self, ids: &[ObjectId], keep: impl Fn(&MapObject) -> bool) -> Vec<MapObject> {
        let records = self.read_records();
        let mut objects: Vec<MapObject> = ids
            .iter()
            .filter_map(|id| records.get(id).and_then(Slot::visible))
            .filter(|object| keep(*object))
            .cloned()
            .collect();
        drop(records);
        objects.sort_unstable_by_key(|object| object.id);
        objects.dedup_by_key(|object| object.id);
        objects
    }

    /// Re-upsert every live record into the index. Returns how many were
    /// written; failures are logged and skipped.
    pub fn resync(&self) -> usize {
        let live: Vec<MapObject> = self
            .read_records()
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(object) => Some(object.clone()),
                _ => None,
            })
            .collect();

        let mut written = 0;
        for object in &live {
            let point = self.projector.to_geo(object.x, object.y);
            match self.call_index("resync", |timeout| self.index.add(object.id, point, timeout)) {
                Ok(()) => written += 1,
                Err(err) => tracing::warn!(
                    target: "world::directory",
                    object_id = object.id.0,
                    error = %err,
                    "directory.resync.failed"
                ),
            }
        }
        tracing::info!(
            target: "world::directory",
            written,
            total = live.len(),
            "directory.resync.completed"
        );
        written
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn subscribe_with(&self, token: CancellationToken) -> Subscription {
        self.events.subscribe_with(token)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }
}

/// Holds a `Reserved` or `Busy` slot for the duration of a write. Dropping
/// it without [`commit`](Self::commit), including during a panic in the
/// index, puts the slot back the way it was.
struct PendingWrite<'a> {
    directory: &'a ObjectDirectory,
    id: ObjectId,
    /// `None` for an add, whose rollback is removal.
    previous: Option<MapObject>,
    committed: bool,
}

impl<'a> PendingWrite<'a> {
    fn new(directory: &'a ObjectDirectory, id: ObjectId, previous: Option<MapObject>) -> Self {
        Self {
            directory,
            id,
            previous,
            committed: false,
        }
    }

    /// Store `object` as the live record, or drop the record when `None`.
    fn commit(mut self, object: Option<MapObject>) {
        self.committed = true;
        let mut records = self.directory.write_records();
        match object {
            Some(object) => records.insert(self.id, Slot::Live(object)),
            None => records.remove(&self.id),
        };
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut records = self.directory.write_records();
        match self.previous.take() {
            Some(previous) => records.insert(self.id, Slot::Live(previous)),
            None => records.remove(&self.id),
        };
    }
}

fn grid_distance(object: &MapObject, x: u32, y: u32) -> f64 {
    let dx = f64::from(object.x) - f64::from(x);
    let dy = f64::from(object.y) - f64::from(y);
    (dx * dx + dy * dy).sqrt()
}

fn log_rejection(op: &'static str, id: ObjectId, err: &DirectoryError) {
    match err {
        DirectoryError::Index { .. } => tracing::warn!(
            target: "world::directory",
            op,
            object_id = id.0,
            error = %err,
            "directory.write.index_failed"
        ),
        _ => tracing::debug!(
            target: "world::directory",
            op,
            object_id = id.0,
            error = %err,
            "directory.write.rejected"
        ),
    }
}

fn log_query_failure(op: &'static str, err: &IndexError) {
    tracing::warn!(
        target: "world::directory",
        op,
        error = %err,
        "directory.query.index_failed"
    );
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Mutex,
        },
    };

    use world_schema::GeoPoint;

    use super::*;
    use crate::{projection::GeoDistance, spatial_index::InMemoryGeoIndex};

    /// Wraps the in-memory index and fails the next `failures` calls.
    #[derive(Default)]
    struct FlakyIndex {
        inner: InMemoryGeoIndex,
        failures: AtomicU32,
        panic_next: AtomicBool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FlakyIndex {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Self::default()
            }
        }

        fn gate(&self, op: &'static str) -> Result<(), IndexError> {
            self.calls.lock().unwrap().push(op);
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("index crashed during {op}");
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(IndexError::Unavailable("injected".into()));
            }
            Ok(())
        }
    }

    impl SpatialIndex for FlakyIndex {
        fn add(&self, id: ObjectId, point: GeoPoint, timeout: Duration) -> Result<(), IndexError> {
            self.gate("add")?;
            self.inner.add(id, point, timeout)
        }

        fn remove(&self, id: ObjectId, timeout: Duration) -> Result<bool, IndexError> {
            self.gate("remove")?;
            self.inner.remove(id, timeout)
        }

        fn nearest_within(
            &self,
            point: GeoPoint,
            radius: GeoDistance,
            timeout: Duration,
        ) -> Result<Option<ObjectId>, IndexError> {
            self.gate("nearest")?;
            self.inner.nearest_within(point, radius, timeout)
        }

        fn query_radius(
            &self,
            point: GeoPoint,
            radius: GeoDistance,
            timeout: Duration,
        ) -> Result<Vec<ObjectId>, IndexError> {
            self.gate("query_radius")?;
            self.inner.query_radius(point, radius, timeout)
        }

        fn query_box(
            &self,
            corner_a: GeoPoint,
            corner_b: GeoPoint,
            timeout: Duration,
        ) -> Result<Vec<ObjectId>, IndexError> {
            self.gate("query_box")?;
            self.inner.query_box(corner_a, corner_b, timeout)
        }
    }

    fn quick_policy(max_attempts: u32) -> IndexCallPolicy {
        IndexCallPolicy {
            timeout: Duration::from_millis(5),
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    fn directory_with(index: Arc<FlakyIndex>, attempts: u32) -> ObjectDirectory {
        ObjectDirectory::new(index, Arc::new(GeoProjector::new(100, 100)))
            .with_policy(quick_policy(attempts))
    }

    fn object(id: u64, x: u32, y: u32) -> MapObject {
        MapObject::new(ObjectId(id), x, y, 2, 2)
    }

    #[test]
    fn duplicate_add_is_rejected_before_the_index() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);
        assert!(directory.try_add(object(1, 5, 5)));
        assert_eq!(
            directory.add(object(1, 9, 9)),
            Err(DirectoryError::Duplicate(ObjectId(1)))
        );
        assert_eq!(index.calls.lock().unwrap().len(), 1);
        assert_eq!(directory.get_by_id(ObjectId(1)).unwrap().x, 5);
    }

    #[test]
    fn failed_index_add_leaves_no_local_record() {
        let index = Arc::new(FlakyIndex::failing(1));
        let directory = directory_with(index.clone(), 1);
        let events = directory.subscribe();

        let err = directory.add(object(7, 1, 1)).unwrap_err();
        assert!(matches!(err, DirectoryError::Index { id: ObjectId(7), .. }));
        assert!(directory.is_empty());
        assert!(index.inner.is_empty());
        assert_eq!(events.try_recv(), None);
        assert_eq!(*index.calls.lock().unwrap(), vec!["add", "remove"]);
    }

    #[test]
    fn transient_failures_are_retried() {
        let index = Arc::new(FlakyIndex::failing(2));
        let directory = directory_with(index.clone(), 3);
        assert!(directory.try_add(object(3, 4, 4)));
        assert_eq!(index.inner.len(), 1);
    }

    #[test]
    fn failed_index_remove_restores_the_record() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);
        directory.add(object(2, 10, 10)).unwrap();

        index.failures.store(1, Ordering::SeqCst);
        assert!(!directory.try_remove(ObjectId(2)));
        assert_eq!(directory.get_by_id(ObjectId(2)).unwrap(), object(2, 10, 10));
        assert!(index.inner.position(ObjectId(2)).is_some());

        assert_eq!(directory.remove(ObjectId(2)).unwrap(), object(2, 10, 10));
        assert_eq!(
            directory.remove(ObjectId(2)),
            Err(DirectoryError::NotFound(ObjectId(2)))
        );
    }

    #[test]
    fn out_of_grid_objects_are_rejected() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        assert!(matches!(
            directory.add(object(1, 100, 0)),
            Err(DirectoryError::OutOfBounds { x: 100, .. })
        ));
    }

    #[test]
    fn update_moves_the_index_entry_and_publishes() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);
        directory.add(object(4, 10, 10)).unwrap();
        let events = directory.subscribe();

        assert!(directory.try_update(object(4, 60, 60)));
        assert_eq!(events.try_recv(), Some(ObjectEvent::Updated(object(4, 60, 60))));
        assert!(directory.get_all_objects_in_area(10, 10, 5).is_empty());
        assert_eq!(directory.get_all_objects_in_area(60, 60, 5), vec![object(4, 60, 60)]);
        assert!(!directory.try_update(object(99, 1, 1)));
    }

    #[test]
    fn query_failures_degrade_to_empty_results() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);
        directory.add(object(1, 50, 50)).unwrap();

        index.failures.store(2, Ordering::SeqCst);
        assert!(directory.get_all_objects_in_area(50, 50, 10).is_empty());
        assert!(directory.first_or_default_by_position(50, 50, None).is_none());
        assert_eq!(directory.get_all_objects_in_area(50, 50, 10).len(), 1);
    }

    #[test]
    fn nearest_uses_a_one_cell_default_radius() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        directory.add(object(1, 20, 20)).unwrap();

        assert_eq!(
            directory.first_or_default_by_position(21, 20, None).map(|o| o.id),
            Some(ObjectId(1))
        );
        assert!(directory.first_or_default_by_position(25, 20, None).is_none());
        assert!(directory.first_or_default_by_position(25, 20, Some(5)).is_some());
    }

    #[test]
    fn box_query_is_inclusive() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        for (id, x, y) in [(1, 10, 10), (2, 20, 20), (3, 21, 20), (4, 5, 30)] {
            directory.add(object(id, x, y)).unwrap();
        }
        let ids: Vec<_> = directory
            .objects_in_box(GridBox::new(20, 20, 10, 10))
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![ObjectId(1), ObjectId(2)]);
    }

    #[test]
    fn intersects_area_requires_a_known_id() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        directory.add(MapObject::new(ObjectId(1), 10, 10, 10, 10)).unwrap();
        assert_eq!(directory.intersects_area(ObjectId(1), 15, 15, 10, 10), Ok(true));
        assert_eq!(directory.intersects_area(ObjectId(1), 0, 0, 5, 5), Ok(false));
        assert_eq!(
            directory.intersects_area(ObjectId(2), 0, 0, 5, 5),
            Err(DirectoryError::NotFound(ObjectId(2)))
        );
    }

    #[test]
    fn resync_restores_a_wiped_index() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);
        directory.add(object(1, 1, 1)).unwrap();
        directory.add(object(2, 2, 2)).unwrap();
        index.inner.remove(ObjectId(1), Duration::ZERO).unwrap();
        index.inner.remove(ObjectId(2), Duration::ZERO).unwrap();

        assert_eq!(directory.resync(), 2);
        assert_eq!(index.inner.len(), 2);
    }

    #[test]
    fn nearest_ranks_candidates_by_grid_distance() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        // x spans 180 degrees and y only 90, so (54, 50) is farther than
        // (50, 56) in index units but closer on the grid.
        directory.add(object(1, 54, 50)).unwrap();
        directory.add(object(2, 50, 56)).unwrap();

        assert_eq!(
            directory.first_or_default_by_position(50, 50, Some(5)).map(|o| o.id),
            Some(ObjectId(1))
        );
        assert_eq!(
            directory.first_or_default_by_position(50, 50, Some(10)).map(|o| o.id),
            Some(ObjectId(1))
        );
        assert_eq!(
            directory.first_or_default_by_position(50, 57, Some(10)).map(|o| o.id),
            Some(ObjectId(2))
        );
    }

    #[test]
    fn nearest_breaks_distance_ties_by_lowest_id() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        directory.add(object(8, 32, 30)).unwrap();
        directory.add(object(3, 28, 30)).unwrap();
        assert_eq!(
            directory.first_or_default_by_position(30, 30, Some(2)).map(|o| o.id),
            Some(ObjectId(3))
        );
    }

    #[test]
    fn box_query_matches_anchors_not_footprints() {
        let directory = directory_with(Arc::new(FlakyIndex::default()), 1);
        directory.add(MapObject::new(ObjectId(1), 8, 8, 5, 5)).unwrap();
        directory.add(MapObject::new(ObjectId(2), 12, 12, 1, 1)).unwrap();
        let ids: Vec<_> = directory
            .objects_in_box(GridBox::new(10, 10, 20, 20))
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![ObjectId(2)]);
    }

    #[test]
    fn panicking_index_releases_the_slot() {
        let index = Arc::new(FlakyIndex::default());
        let directory = directory_with(index.clone(), 1);

        index.panic_next.store(true, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| directory.add(object(1, 5, 5))));
        assert!(outcome.is_err());
        assert!(directory.is_empty());
        assert!(directory.try_add(object(1, 5, 5)));

        index.panic_next.store(true, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| directory.remove(ObjectId(1))));
        assert!(outcome.is_err());
        assert_eq!(directory.get_by_id(ObjectId(1)), Ok(object(1, 5, 5)));
        assert!(directory.try_update(object(1, 6, 6)));
        assert_eq!(directory.remove(ObjectId(1)), Ok(object(1, 6, 6)));
    }
}
