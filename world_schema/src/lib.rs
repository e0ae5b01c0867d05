//! Data contracts shared between the world core and the service boundary.
//!
//! Everything in here is plain serde data: no locking, no index access. The
//! RPC facade that exposes box queries and the object event stream is an
//! external collaborator; it only ever sees these types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a movable object tracked by the object directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a named territory. `0` is reserved for "no territory".
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TerritoryId(pub u32);

impl TerritoryId {
    pub const NONE: TerritoryId = TerritoryId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geospatial re-encoding of a grid position. Carries no identity of its own.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Planar distance in projected units.
    pub fn distance(&self, other: &GeoPoint) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

pub const DEFAULT_OBJECT_KIND: &str = "Generic";

fn default_kind() -> String {
    DEFAULT_OBJECT_KIND.to_string()
}

/// A movable object positioned over the grid.
///
/// The footprint is the half-open rectangle `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapObject {
    pub id: ObjectId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl MapObject {
    pub fn new(id: ObjectId, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            id,
            x,
            y,
            width,
            height,
            kind: default_kind(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Overlap test against the half-open rectangle `[x, x + w) × [y, y + h)`.
    pub fn intersects(&self, x: u32, y: u32, w: u32, h: u32) -> bool {
        let (ox, oy) = (self.x as u64, self.y as u64);
        let (ow, oh) = (self.width as u64, self.height as u64);
        let (x, y, w, h) = (x as u64, y as u64, w as u64, h as u64);
        if ox >= x + w || ox + ow <= x {
            return false;
        }
        if oy >= y + h || oy + oh <= y {
            return false;
        }
        true
    }
}

/// Metadata for a named region referenced by tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryInfo {
    pub id: TerritoryId,
    pub name: String,
    pub tile_count: u64,
}

/// Inclusive box `(x1, y1)..=(x2, y2)` as used by the box queries.
///
/// Corners may be given in any order; [`GridBox::normalized`] sorts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl GridBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    /// Width and height of the normalized box, counting both edges.
    pub fn extent(self) -> (u32, u32) {
        let b = self.normalized();
        (
            (b.x2 - b.x1).saturating_add(1),
            (b.y2 - b.y1).saturating_add(1),
        )
    }
}

/// Response to a box query for objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapObjectsResponse {
    pub objects: Vec<MapObject>,
}

/// Response to a box query for territories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoriesResponse {
    pub territories: Vec<TerritoryInfo>,
}

/// One message of the object event stream. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<MapObject>,
}

impl ObjectEventMessage {
    pub fn added(id: ObjectId) -> Self {
        Self {
            added_id: Some(id),
            ..Self::default()
        }
    }

    pub fn removed(id: ObjectId) -> Self {
        Self {
            removed_id: Some(id),
            ..Self::default()
        }
    }

    pub fn updated(object: MapObject) -> Self {
        Self {
            updated: Some(object),
            ..Self::default()
        }
    }
}

/// Encode an event message as a single JSON line for streaming transports.
pub fn encode_event_line(message: &ObjectEventMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_event_line(bytes: &[u8]) -> Result<ObjectEventMessage, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_full_partial_none() {
        let obj = MapObject::new(ObjectId(4), 10, 10, 10, 10);

        assert!(obj.intersects(10, 10, 10, 10));
        assert!(obj.intersects(15, 15, 10, 10));
        assert!(!obj.intersects(0, 0, 5, 5));
        // Touching edges do not overlap.
        assert!(!obj.intersects(20, 10, 5, 5));
        assert!(!obj.intersects(0, 0, 10, 10));
        // A single cell at the far corner lies outside the footprint.
        assert!(obj.intersects(19, 19, 1, 1));
        assert!(!obj.intersects(20, 20, 1, 1));
    }

    #[test]
    fn intersects_does_not_overflow_at_u32_max() {
        let obj = MapObject::new(ObjectId(9), u32::MAX - 1, u32::MAX - 1, u32::MAX, u32::MAX);
        assert!(obj.intersects(u32::MAX - 1, u32::MAX - 1, 1, 1));
    }

    #[test]
    fn kind_defaults_when_missing_from_json() {
        let obj: MapObject =
            serde_json::from_str(r#"{"id":7,"x":1,"y":2,"width":3,"height":4}"#).unwrap();
        assert_eq!(obj.kind, DEFAULT_OBJECT_KIND);
        assert_eq!(obj.id, ObjectId(7));
    }

    #[test]
    fn event_message_serializes_only_set_field() {
        let json = serde_json::to_string(&ObjectEventMessage::removed(ObjectId(3))).unwrap();
        assert_eq!(json, r#"{"removed_id":3}"#);

        let line = encode_event_line(&ObjectEventMessage::added(ObjectId(5))).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let decoded = decode_event_line(&line).unwrap();
        assert_eq!(decoded.added_id, Some(ObjectId(5)));
        assert!(decoded.removed_id.is_none());
        assert!(decoded.updated.is_none());
    }

    #[test]
    fn grid_box_normalizes_corners() {
        let b = GridBox::new(9, 2, 3, 8).normalized();
        assert_eq!(b, GridBox::new(3, 2, 9, 8));
        assert_eq!(b.extent(), (7, 7));
        assert_eq!(GridBox::new(4, 4, 4, 4).extent(), (1, 1));
    }
}
