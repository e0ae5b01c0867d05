//! Core crate for the tile world.
//!
//! Holds the packed tile grid, territory metadata, and the object directory
//! that keeps movable objects in step with an external point index.

pub mod codec;
pub mod directory;
pub mod events;
pub mod grid;
pub mod mapgen;
pub mod projection;
pub mod spatial_index;
pub mod territory;
pub mod tile_catalog;
mod world;
pub mod world_config;

pub use codec::{decode, encode, territory_id, CodecError, PackedTile, Tile, TileType};
pub use directory::{DirectoryError, IndexCallPolicy, ObjectDirectory, DEFAULT_LOOKUP_RADIUS};
pub use events::{CancellationToken, EventHub, ObjectEvent, Subscription, SubscriptionError};
pub use grid::{
    Area, ConcurrencyPolicy, Grid, GridError, LocalGrid, Locked, SharedGrid, Unsynchronized,
};
pub use mapgen::{generate_map, GeneratedMap, MapGenConfig, MapGenError};
pub use projection::{GeoDistance, GeoProjector, ProjectionError, ProjectionSettings};
pub use spatial_index::{InMemoryGeoIndex, IndexError, SpatialIndex};
pub use territory::{TerritoryError, TerritoryRegistry};
pub use tile_catalog::{load_tile_catalog_from_env, TileCatalog, TileDefinition, TileFlags};
pub use world::World;
pub use world_config::{load_world_config_from_env, WorldConfig, WorldConfigError};

pub use world_schema::{
    GeoPoint, GridBox, MapObject, MapObjectsResponse, ObjectEventMessage, ObjectId,
    TerritoriesResponse, TerritoryId, TerritoryInfo,
};
