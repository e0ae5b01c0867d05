//! Tile-type metadata.
//!
//! Loaded from `tile_catalog.json` with support for an environment variable
//! override. The catalog decides which tile types block object placement.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use bitflags::bitflags;
use serde::Deserialize;
use thiserror::Error;

use crate::codec::TileType;

pub const BUILTIN_TILE_CATALOG: &str = include_str!("data/tile_catalog.json");

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TileFlags: u16 {
        const PASSABLE = 1 << 0;
        const BUILDABLE = 1 << 1;
        const BLOCKING = 1 << 2;
        const WATER = 1 << 3;
        const FERTILE = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDefinition {
    pub tile_type: TileType,
    pub name: String,
    pub flags: TileFlags,
    pub movement_cost: u32,
    pub texture_key: String,
}

impl TileDefinition {
    /// Entry returned for tile types the catalog does not know about.
    pub fn unknown(tile_type: TileType) -> Self {
        Self {
            tile_type,
            name: "unknown".to_string(),
            flags: TileFlags::BLOCKING,
            movement_cost: u32::MAX,
            texture_key: "unknown".to_string(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.flags.contains(TileFlags::BLOCKING)
    }
}

#[derive(Debug, Deserialize)]
struct TileCatalogFile {
    tiles: Vec<RawTileDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawTileDefinition {
    id: u8,
    name: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default = "default_movement_cost")]
    movement_cost: u32,
    #[serde(default)]
    texture_key: Option<String>,
}

const fn default_movement_cost() -> u32 {
    1
}

#[derive(Debug, Error)]
pub enum TileCatalogError {
    #[error("failed to parse tile catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read tile catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tile {tile} declares unknown flag {flag:?}")]
    UnknownFlag { tile: u8, flag: String },
    #[error("tile {0} is declared more than once")]
    DuplicateTile(u8),
}

/// Lookup table of tile definitions indexed by tile type.
#[derive(Debug, Clone)]
pub struct TileCatalog {
    definitions: Vec<Option<TileDefinition>>,
    blocking: [bool; 256],
}

impl Default for TileCatalog {
    /// Empty catalog: every tile type is unknown and therefore blocking.
    fn default() -> Self {
        Self {
            definitions: vec![None; 256],
            blocking: [true; 256],
        }
    }
}

impl TileCatalog {
    pub fn builtin() -> Arc<Self> {
        static BUILTIN: OnceLock<Arc<TileCatalog>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| {
            Arc::new(
                TileCatalog::from_json_str(BUILTIN_TILE_CATALOG)
                    .expect("builtin tile catalog should parse"),
            )
        }))
    }

    pub fn from_json_str(json: &str) -> Result<Self, TileCatalogError> {
        let file: TileCatalogFile = serde_json::from_str(json)?;
        let mut catalog = TileCatalog::default();
        for raw in file.tiles {
            if catalog.definitions[raw.id as usize].is_some() {
                return Err(TileCatalogError::DuplicateTile(raw.id));
            }
            let mut flags = TileFlags::empty();
            for name in &raw.flags {
                let flag = TileFlags::from_name(name).ok_or_else(|| {
                    TileCatalogError::UnknownFlag {
                        tile: raw.id,
                        flag: name.clone(),
                    }
                })?;
                flags |= flag;
            }
            let texture_key = raw.texture_key.unwrap_or_else(|| raw.name.clone());
            catalog.register(TileDefinition {
                tile_type: TileType(raw.id),
                name: raw.name,
                flags,
                movement_cost: raw.movement_cost,
                texture_key,
            });
        }
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, TileCatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| TileCatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        TileCatalog::from_json_str(&contents)
    }

    /// Insert or replace the definition for `definition.tile_type`.
    pub fn register(&mut self, definition: TileDefinition) {
        let slot = definition.tile_type.0 as usize;
        self.blocking[slot] = definition.is_blocking();
        self.definitions[slot] = Some(definition);
    }

    pub fn get(&self, tile_type: TileType) -> TileDefinition {
        self.definitions[tile_type.0 as usize]
            .clone()
            .unwrap_or_else(|| TileDefinition::unknown(tile_type))
    }

    pub fn contains(&self, tile_type: TileType) -> bool {
        self.definitions[tile_type.0 as usize].is_some()
    }

    #[inline]
    pub fn is_blocking(&self, tile_type: TileType) -> bool {
        self.blocking[tile_type.0 as usize]
    }

    pub fn by_name(&self, name: &str) -> Option<&TileDefinition> {
        self.definitions
            .iter()
            .flatten()
            .find(|definition| definition.name == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileDefinition> {
        self.definitions.iter().flatten()
    }
}

/// Load the tile catalog from `TILE_CATALOG_PATH` or the crate default path,
/// falling back to the builtin copy.
pub fn load_tile_catalog_from_env() -> (Arc<TileCatalog>, Option<PathBuf>) {
    let path = env::var("TILE_CATALOG_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/tile_catalog.json")
        });

    match TileCatalog::from_file(&path) {
        Ok(catalog) => {
            tracing::info!(
                target: "world::config",
                path = %path.display(),
                tiles = catalog.len(),
                "tile_catalog.loaded=file"
            );
            (Arc::new(catalog), Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "world::config",
                path = %path.display(),
                error = %err,
                "tile_catalog.load_failed"
            );
            tracing::info!(target: "world::config", "tile_catalog.loaded=builtin");
            (TileCatalog::builtin(), None)
        }
    }
}
