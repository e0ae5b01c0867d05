//! Linear re-keying of grid coordinates into the coordinate space of a
//! geospatial point index.
//!
//! The mapping has no geographic meaning. `y` scales onto `[0, lat_span)` and
//! `x` onto `[0, lon_span)`, which lets an off-the-shelf point index answer
//! radius and box queries over grid positions.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use world_schema::GeoPoint;

pub const DEFAULT_LAT_SPAN: f64 = 90.0;
pub const DEFAULT_LON_SPAN: f64 = 180.0;
const COVER_SLACK: f64 = 1e-9;

/// Distance in the index's native units. Grid-unit radii must go through
/// [`GeoProjector::grid_radius_to_geo`] first.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoDistance(pub f64);

impl GeoDistance {
    pub fn value(self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSettings {
    #[serde(default = "default_lat_span")]
    pub lat_span: f64,
    #[serde(default = "default_lon_span")]
    pub lon_span: f64,
}

const fn default_lat_span() -> f64 {
    DEFAULT_LAT_SPAN
}

const fn default_lon_span() -> f64 {
    DEFAULT_LON_SPAN
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ProjectionError {
    #[error("projection.{axis} must be finite and positive, got {value}")]
    InvalidSpan { axis: &'static str, value: f64 },
}

impl ProjectionSettings {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        for (axis, value) in [("lat_span", self.lat_span), ("lon_span", self.lon_span)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ProjectionError::InvalidSpan { axis, value });
            }
        }
        Ok(())
    }
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            lat_span: DEFAULT_LAT_SPAN,
            lon_span: DEFAULT_LON_SPAN,
        }
    }
}

/// Projector bound to one grid's dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoProjector {
    width: u32,
    height: u32,
    lat_span: f64,
    lon_span: f64,
}

impl GeoProjector {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_settings(width, height, ProjectionSettings::default())
    }

    /// Zero dimensions are treated as one so the scales stay finite. Spans
    /// that fail [`ProjectionSettings::validate`] are replaced by the defaults.
    pub fn with_settings(width: u32, height: u32, settings: ProjectionSettings) -> Self {
        let settings = match settings.validate() {
            Ok(()) => settings,
            Err(err) => {
                tracing::warn!(
                    target: "world::projection",
                    error = %err,
                    "projection.settings_rejected"
                );
                ProjectionSettings::default()
            }
        };
        Self {
            width: width.max(1),
            height: height.max(1),
            lat_span: settings.lat_span,
            lon_span: settings.lon_span,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Native units per grid unit along `y`.
    pub fn lat_scale(&self) -> f64 {
        self.lat_span / f64::from(self.height)
    }

    /// Native units per grid unit along `x`.
    pub fn lon_scale(&self) -> f64 {
        self.lon_span / f64::from(self.width)
    }

    pub fn to_geo(&self, x: u32, y: u32) -> GeoPoint {
        GeoPoint::new(
            f64::from(y) * self.lat_scale(),
            f64::from(x) * self.lon_scale(),
        )
    }

    /// Nearest grid cell to `point`, clamped onto the grid.
    pub fn from_geo(&self, point: GeoPoint) -> (u32, u32) {
        let x = axis_from_geo(point.longitude, self.lon_scale(), self.width);
        let y = axis_from_geo(point.latitude, self.lat_scale(), self.height);
        (x, y)
    }

    /// Convert a grid-unit radius using the larger axis scale, so the native
    /// circle always covers the grid circle. A small relative slack absorbs
    /// rounding in [`to_geo`](Self::to_geo). Callers refine results by exact
    /// grid distance afterwards.
    pub fn grid_radius_to_geo(&self, radius: f64) -> GeoDistance {
        let scale = self.lat_scale().max(self.lon_scale());
        GeoDistance(radius.max(0.0) * scale * (1.0 + COVER_SLACK))
    }
}

fn axis_from_geo(value: f64, scale: f64, extent: u32) -> u32 {
    let cell = (value / scale).round();
    if !cell.is_finite() || cell <= 0.0 {
        return 0;
    }
    let max = f64::from(extent - 1);
    cell.min(max) as u32
}

/// Stateless form of [`GeoProjector::to_geo`] with the default spans.
pub fn to_geo(x: u32, y: u32, width: u32, height: u32) -> GeoPoint {
    GeoProjector::new(width, height).to_geo(x, y)
}

/// Stateless form of [`GeoProjector::from_geo`] with the default spans.
pub fn from_geo(point: GeoPoint, width: u32, height: u32) -> (u32, u32) {
    GeoProjector::new(width, height).from_geo(point)
}
