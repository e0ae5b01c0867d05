//! Point index contract used by the object directory, plus an in-process
//! implementation.
//!
//! All distances are in the index's native units ([`GeoDistance`]). Every
//! call carries a timeout; remote implementations must give up and report
//! [`IndexError::Timeout`] once it elapses, after which the outcome of a write
//! is unknown.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use thiserror::Error;
use world_schema::{GeoPoint, ObjectId};

use crate::projection::GeoDistance;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index call timed out after {0:?}")]
    Timeout(Duration),
    #[error("index unavailable: {0}")]
    Unavailable(String),
}

pub trait SpatialIndex: Send + Sync {
    /// Insert or move `id` to `point`.
    fn add(&self, id: ObjectId, point: GeoPoint, timeout: Duration) -> Result<(), IndexError>;

    /// Remove `id`. Returns whether the id was present.
    fn remove(&self, id: ObjectId, timeout: Duration) -> Result<bool, IndexError>;

    /// Closest id within `radius` of `point`, if any.
    fn nearest_within(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        timeout: Duration,
    ) -> Result<Option<ObjectId>, IndexError>;

    /// Every id within `radius` of `point`.
    fn query_radius(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError>;

    /// Every id inside the box spanned by two corners, edges included.
    fn query_box(
        &self,
        corner_a: GeoPoint,
        corner_b: GeoPoint,
        timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError>;
}

/// Linear-scan index over planar distance. Calls complete immediately, so the
/// timeout is never reached.
#[derive(Debug, Default)]
pub struct InMemoryGeoIndex {
    points: RwLock<HashMap<ObjectId, GeoPoint>>,
}

impl InMemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self, id: ObjectId) -> Option<GeoPoint> {
        self.points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }
}

impl SpatialIndex for InMemoryGeoIndex {
    fn add(&self, id: ObjectId, point: GeoPoint, _timeout: Duration) -> Result<(), IndexError> {
        self.points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, point);
        Ok(())
    }

    fn remove(&self, id: ObjectId, _timeout: Duration) -> Result<bool, IndexError> {
        Ok(self
            .points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some())
    }

    fn nearest_within(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        _timeout: Duration,
    ) -> Result<Option<ObjectId>, IndexError> {
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        let nearest = points
            .iter()
            .map(|(id, p)| (p.distance(&point), *id))
            .filter(|(distance, _)| *distance <= radius.value())
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id);
        Ok(nearest)
    }

    fn query_radius(
        &self,
        point: GeoPoint,
        radius: GeoDistance,
        _timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError> {
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ObjectId> = points
            .iter()
            .filter(|(_, p)| p.distance(&point) <= radius.value())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn query_box(
        &self,
        corner_a: GeoPoint,
        corner_b: GeoPoint,
        _timeout: Duration,
    ) -> Result<Vec<ObjectId>, IndexError> {
        let (lat_min, lat_max) = ordered(corner_a.latitude, corner_b.latitude);
        let (lon_min, lon_max) = ordered(corner_a.longitude, corner_b.longitude);
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ObjectId> = points
            .iter()
            .filter(|(_, p)| {
                (lat_min..=lat_max).contains(&p.latitude)
                    && (lon_min..=lon_max).contains(&p.longitude)
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    fn seeded() -> InMemoryGeoIndex {
        let index = InMemoryGeoIndex::new();
        index.add(ObjectId(1), GeoPoint::new(0.0, 0.0), T).unwrap();
        index.add(ObjectId(2), GeoPoint::new(3.0, 4.0), T).unwrap();
        index.add(ObjectId(3), GeoPoint::new(10.0, 10.0), T).unwrap();
        index
    }

    #[test]
    fn add_is_an_upsert() {
        let index = seeded();
        index.add(ObjectId(2), GeoPoint::new(50.0, 50.0), T).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.position(ObjectId(2)), Some(GeoPoint::new(50.0, 50.0)));
    }

    #[test]
    fn remove_reports_presence() {
        let index = seeded();
        assert!(index.remove(ObjectId(1), T).unwrap());
        assert!(!index.remove(ObjectId(1), T).unwrap());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn radius_query_includes_boundary() {
        let index = seeded();
        let ids = index
            .query_radius(GeoPoint::new(0.0, 0.0), GeoDistance(5.0), T)
            .unwrap();
        assert_eq!(ids, vec![ObjectId(1), ObjectId(2)]);
    }

    #[test]
    fn nearest_prefers_closest_then_lowest_id() {
        let index = seeded();
        let near = index
            .nearest_within(GeoPoint::new(2.9, 3.9), GeoDistance(1.0), T)
            .unwrap();
        assert_eq!(near, Some(ObjectId(2)));

        index.add(ObjectId(0), GeoPoint::new(3.0, 4.0), T).unwrap();
        let tie = index
            .nearest_within(GeoPoint::new(3.0, 4.0), GeoDistance(0.5), T)
            .unwrap();
        assert_eq!(tie, Some(ObjectId(0)));

        let none = index
            .nearest_within(GeoPoint::new(80.0, 80.0), GeoDistance(1.0), T)
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn box_query_accepts_corners_in_any_order() {
        let index = seeded();
        let ids = index
            .query_box(GeoPoint::new(10.0, 10.0), GeoPoint::new(3.0, 4.0), T)
            .unwrap();
        assert_eq!(ids, vec![ObjectId(2), ObjectId(3)]);
    }
}
