//! Fixed-size tile grid.
//!
//! Tiles are stored as one packed word per cell in row-major order
//! (`y * width + x`). Every coordinate access is bounds checked and reports
//! [`GridError::OutOfBounds`]; rectangle operations clamp to the grid.
//!
//! Synchronisation is a type parameter fixed at construction:
//! - [`Locked`]: one reader/writer lock over the whole tile array. Any number
//!   of readers or one writer. `std::sync::RwLock` gives no writer priority,
//!   so a steady stream of readers can delay writers indefinitely.
//! - [`Unsynchronized`]: a `RefCell`, for single-threaded embedding. The
//!   resulting grid is `!Sync`.

use std::{
    cell::RefCell,
    collections::BTreeSet,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use thiserror::Error;
use world_schema::TerritoryId;

use crate::{
    codec::{PackedTile, Tile, TileType},
    tile_catalog::TileCatalog,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must be at least 1x1, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("grid of {width}x{height} tiles does not fit in memory")]
    TooLarge { width: u32, height: u32 },
    #[error("expected {expected} tiles for the grid, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// How a [`Grid`] guards its tile array.
pub trait ConcurrencyPolicy {
    type Storage;

    fn wrap(tiles: Vec<PackedTile>) -> Self::Storage;

    fn read<R>(storage: &Self::Storage, f: impl FnOnce(&[PackedTile]) -> R) -> R;

    fn write<R>(storage: &Self::Storage, f: impl FnOnce(&mut [PackedTile]) -> R) -> R;
}

/// Map-granularity reader/writer lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Locked;

impl ConcurrencyPolicy for Locked {
    type Storage = RwLock<Vec<PackedTile>>;

    fn wrap(tiles: Vec<PackedTile>) -> Self::Storage {
        RwLock::new(tiles)
    }

    fn read<R>(storage: &Self::Storage, f: impl FnOnce(&[PackedTile]) -> R) -> R {
        // Tile words are plain data; a panicking writer cannot leave them invalid.
        let guard = storage.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(storage: &Self::Storage, f: impl FnOnce(&mut [PackedTile]) -> R) -> R {
        let mut guard = storage.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// No synchronisation; single-threaded use only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsynchronized;

impl ConcurrencyPolicy for Unsynchronized {
    type Storage = RefCell<Vec<PackedTile>>;

    fn wrap(tiles: Vec<PackedTile>) -> Self::Storage {
        RefCell::new(tiles)
    }

    fn read<R>(storage: &Self::Storage, f: impl FnOnce(&[PackedTile]) -> R) -> R {
        f(&storage.borrow())
    }

    fn write<R>(storage: &Self::Storage, f: impl FnOnce(&mut [PackedTile]) -> R) -> R {
        f(&mut storage.borrow_mut())
    }
}

pub type SharedGrid = Grid<Locked>;
pub type LocalGrid = Grid<Unsynchronized>;

/// Rectangle already clamped to the grid; never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

pub struct Grid<P: ConcurrencyPolicy = Locked> {
    width: u32,
    height: u32,
    tiles: P::Storage,
    catalog: Arc<TileCatalog>,
}

impl<P: ConcurrencyPolicy> fmt::Debug for Grid<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("policy", &std::any::type_name::<P>())
            .finish()
    }
}

fn cell_count(width: u32, height: u32) -> Result<usize, GridError> {
    if width < 1 || height < 1 {
        return Err(GridError::InvalidDimensions { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or(GridError::TooLarge { width, height })
}

impl<P: ConcurrencyPolicy> Grid<P> {
    /// Grid filled with plain, unowned tiles.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        let count = cell_count(width, height)?;
        Ok(Self::assemble(width, height, vec![PackedTile::default(); count]))
    }

    /// Build from an exact sequence of tiles in row-major order.
    pub fn from_tiles<I>(width: u32, height: u32, tiles: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = Tile>,
    {
        let expected = cell_count(width, height)?;
        let words: Vec<PackedTile> = tiles.into_iter().map(Tile::pack).collect();
        if words.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: words.len(),
            });
        }
        Ok(Self::assemble(width, height, words))
    }

    pub fn from_packed(width: u32, height: u32, words: Vec<PackedTile>) -> Result<Self, GridError> {
        let expected = cell_count(width, height)?;
        if words.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: words.len(),
            });
        }
        Ok(Self::assemble(width, height, words))
    }

    fn assemble(width: u32, height: u32, words: Vec<PackedTile>) -> Self {
        tracing::debug!(
            target: "world::grid",
            width,
            height,
            policy = std::any::type_name::<P>(),
            "grid.created"
        );
        Self {
            width,
            height,
            tiles: P::wrap(words),
            catalog: TileCatalog::builtin(),
        }
    }

    /// Replace the catalog that decides which tile types block placement.
    pub fn with_catalog(mut self, catalog: Arc<TileCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &Arc<TileCatalog> {
        &self.catalog
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Result<usize, GridError> {
        if !self.in_bounds(x, y) {
            return Err(GridError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    pub fn get_packed(&self, x: u32, y: u32) -> Result<PackedTile, GridError> {
        let idx = self.index(x, y)?;
        Ok(P::read(&self.tiles, |tiles| tiles[idx]))
    }

    pub fn get_tile(&self, x: u32, y: u32) -> Result<Tile, GridError> {
        self.get_packed(x, y).map(PackedTile::unpack)
    }

    pub fn set_tile(&self, x: u32, y: u32, tile: Tile) -> Result<(), GridError> {
        let idx = self.index(x, y)?;
        let word = tile.pack();
        P::write(&self.tiles, |tiles| tiles[idx] = word);
        Ok(())
    }

    pub fn tile_type_at(&self, x: u32, y: u32) -> Result<TileType, GridError> {
        self.get_packed(x, y).map(PackedTile::tile_type)
    }

    pub fn territory_at(&self, x: u32, y: u32) -> Result<TerritoryId, GridError> {
        self.get_packed(x, y).map(PackedTile::territory)
    }

    /// Intersection of `[x, x + w) × [y, y + h)` with the grid, or `None` when
    /// nothing of the rectangle lies on the grid.
    pub fn clamp_area(&self, x: u32, y: u32, w: u32, h: u32) -> Option<Area> {
        let x_end = (x as u64 + w as u64).min(self.width as u64);
        let y_end = (y as u64 + h as u64).min(self.height as u64);
        if x as u64 >= x_end || y as u64 >= y_end {
            return None;
        }
        Some(Area {
            x,
            y,
            width: (x_end - x as u64) as u32,
            height: (y_end - y as u64) as u32,
        })
    }

    /// Visit each row slice of `area` under a single read guard.
    fn read_rows<R>(
        &self,
        area: Area,
        mut visit: impl FnMut(&[PackedTile]) -> Option<R>,
    ) -> Option<R> {
        let stride = self.width as usize;
        let (x, w) = (area.x as usize, area.width as usize);
        P::read(&self.tiles, |tiles| {
            for row in area.y as usize..(area.y + area.height) as usize {
                let start = row * stride + x;
                if let Some(result) = visit(&tiles[start..start + w]) {
                    return Some(result);
                }
            }
            None
        })
    }

    /// Set every cell of the rectangle, clamped to the grid. Returns the
    /// number of cells written.
    pub fn fill_area(&self, x: u32, y: u32, w: u32, h: u32, tile: Tile) -> usize {
        let Some(area) = self.clamp_area(x, y, w, h) else {
            return 0;
        };
        let word = tile.pack();
        let stride = self.width as usize;
        let (ax, aw) = (area.x as usize, area.width as usize);
        P::write(&self.tiles, |tiles| {
            for row in area.y as usize..(area.y + area.height) as usize {
                let start = row * stride + ax;
                tiles[start..start + aw].fill(word);
            }
        });
        area.cell_count()
    }

    /// False iff any cell of the clamped rectangle holds a blocking tile type.
    pub fn can_place_in_area(&self, x: u32, y: u32, w: u32, h: u32) -> bool {
        let Some(area) = self.clamp_area(x, y, w, h) else {
            return true;
        };
        let catalog = &self.catalog;
        let blocked = self.read_rows(area, |row| {
            row.iter()
                .any(|word| catalog.is_blocking(word.tile_type()))
                .then_some(())
        });
        blocked.is_none()
    }

    /// Row-major copy of the clamped rectangle.
    pub fn read_area(&self, x: u32, y: u32, w: u32, h: u32) -> Option<(Area, Vec<Tile>)> {
        let area = self.clamp_area(x, y, w, h)?;
        let mut out = Vec::with_capacity(area.cell_count());
        self.read_rows(area, |row| -> Option<()> {
            out.extend(row.iter().map(|word| word.unpack()));
            None
        });
        Some((area, out))
    }

    /// Distinct owning territories within the clamped rectangle, ascending.
    /// Unowned cells are skipped.
    pub fn territories_in_area(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<TerritoryId> {
        let Some(area) = self.clamp_area(x, y, w, h) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        self.read_rows(area, |row| -> Option<()> {
            seen.extend(
                row.iter()
                    .map(|word| word.territory())
                    .filter(|id| !id.is_none()),
            );
            None
        });
        seen.into_iter().collect()
    }

    /// Copy of every packed word in row-major order.
    pub fn snapshot(&self) -> Vec<PackedTile> {
        P::read(&self.tiles, |tiles| tiles.to_vec())
    }
}
