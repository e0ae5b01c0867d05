//! Procedural map generation.
//!
//! Territories are Voronoi regions around randomly placed seed cells; terrain
//! comes from two layers of value noise (elevation and moisture). Rows are
//! filled in parallel.

use std::{collections::HashMap, sync::Arc, time::Instant};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use world_schema::TerritoryId;

use crate::{
    codec::{encode, PackedTile, TileType, MAX_TERRITORY_ID},
    grid::{ConcurrencyPolicy, Grid, GridError},
    territory::{TerritoryError, TerritoryRegistry},
    tile_catalog::TileCatalog,
};

const FEATURE_SIZE: f32 = 48.0;
const ELEVATION_SALT: u64 = 0x3C6E_F372_68E3_1DA4;
const MOISTURE_SALT: u64 = 0xA54F_F53A_B5C1_8E6A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapGenConfig {
    pub width: u32,
    pub height: u32,
    pub territory_count: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl MapGenConfig {
    pub fn new(width: u32, height: u32, territory_count: u32) -> Self {
        Self {
            width,
            height,
            territory_count,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), MapGenError> {
        if self.width < 1 || self.height < 1 {
            return Err(MapGenError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.territory_count < 1 || self.territory_count > MAX_TERRITORY_ID {
            return Err(MapGenError::TerritoryCount {
                count: self.territory_count,
                max: MAX_TERRITORY_ID,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MapGenError {
    #[error("map dimensions must be at least 1x1, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("territory count must be within [1, {max}], got {count}")]
    TerritoryCount { count: u32, max: u32 },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Territory(#[from] TerritoryError),
}

/// Output of [`generate_map`].
#[derive(Debug)]
pub struct GeneratedMap<P: ConcurrencyPolicy> {
    pub grid: Grid<P>,
    pub territories: TerritoryRegistry,
    /// Seed actually used; replaying it reproduces the map.
    pub seed: u64,
}

pub fn generate_map<P: ConcurrencyPolicy>(
    config: &MapGenConfig,
) -> Result<GeneratedMap<P>, MapGenError> {
    generate_map_with_catalog(config, TileCatalog::builtin())
}

pub fn generate_map_with_catalog<P: ConcurrencyPolicy>(
    config: &MapGenConfig,
    catalog: Arc<TileCatalog>,
) -> Result<GeneratedMap<P>, MapGenError> {
    config.validate()?;
    let started = Instant::now();
    let seed = config.seed.unwrap_or_else(rand::random);
    let (width, height) = (config.width, config.height);

    let mut territories = TerritoryRegistry::new();
    territories.generate(config.territory_count, Some(seed))?;

    let buckets = SeedBuckets::scatter(width, height, config.territory_count, seed);
    let elevation = NoiseLayer::new(seed, ELEVATION_SALT, 4, FEATURE_SIZE);
    let moisture = NoiseLayer::new(seed, MOISTURE_SALT, 3, FEATURE_SIZE / 1.7);

    let mut words = vec![PackedTile::default(); width as usize * height as usize];
    words
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, word) in row.iter_mut().enumerate() {
                let x = x as u32;
                let terrain = terrain_for(elevation.sample(x, y), moisture.sample(x, y));
                *word = encode(terrain, buckets.nearest(x, y));
            }
        });

    let mut counts: HashMap<TerritoryId, u64> = HashMap::new();
    for word in &words {
        *counts.entry(word.territory()).or_default() += 1;
    }
    for (id, tiles) in counts {
        territories.record_tiles(id, tiles)?;
    }

    let grid = Grid::<P>::from_packed(width, height, words)?.with_catalog(catalog);
    tracing::info!(
        target: "world::mapgen",
        width,
        height,
        territories = territories.len(),
        seed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mapgen.completed"
    );
    Ok(GeneratedMap {
        grid,
        territories,
        seed,
    })
}

fn terrain_for(elevation: f32, moisture: f32) -> TileType {
    if elevation < 0.30 {
        TileType::WATER
    } else if elevation < 0.34 {
        TileType::SAND
    } else if elevation > 0.74 {
        TileType::MOUNTAIN
    } else if moisture > 0.62 {
        TileType::FOREST
    } else if moisture > 0.42 {
        TileType::GRASS
    } else {
        TileType::PLAIN
    }
}

/// Territory seed cells bucketed on a coarse grid for nearest-seed lookups.
struct SeedBuckets {
    cell: u32,
    cols: u32,
    rows: u32,
    buckets: Vec<Vec<(u32, u32, TerritoryId)>>,
}

impl SeedBuckets {
    fn scatter(width: u32, height: u32, count: u32, seed: u64) -> Self {
        let area = width as f64 * height as f64;
        let cell = (area / count as f64).sqrt().ceil().max(1.0) as u32;
        let cols = width.div_ceil(cell);
        let rows = height.div_ceil(cell);
        let mut buckets = vec![Vec::new(); cols as usize * rows as usize];

        let mut rng = SmallRng::seed_from_u64(seed ^ 0x4b5f_d2c3);
        for raw in 1..=count {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            let slot = (y / cell) as usize * cols as usize + (x / cell) as usize;
            buckets[slot].push((x, y, TerritoryId(raw)));
        }
        Self {
            cell,
            cols,
            rows,
            buckets,
        }
    }

    /// Closest seed by squared distance; ties go to the lower id.
    fn nearest(&self, x: u32, y: u32) -> TerritoryId {
        let (bx, by) = ((x / self.cell) as i64, (y / self.cell) as i64);
        let max_ring = self.cols.max(self.rows) as i64;
        let mut best: Option<(u64, TerritoryId)> = None;

        for ring in 0..=max_ring {
            if let Some((dist2, _)) = best {
                let reach = ((ring - 1).max(0) as u64) * self.cell as u64;
                if dist2 < reach * reach {
                    break;
                }
            }
            for dy in -ring..=ring {
                for dx in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring {
                        continue;
                    }
                    let (cx, cy) = (bx + dx, by + dy);
                    if cx < 0 || cy < 0 || cx >= self.cols as i64 || cy >= self.rows as i64 {
                        continue;
                    }
                    let bucket = &self.buckets[cy as usize * self.cols as usize + cx as usize];
                    for &(sx, sy, id) in bucket {
                        let ddx = sx.abs_diff(x) as u64;
                        let ddy = sy.abs_diff(y) as u64;
                        let candidate = (ddx * ddx + ddy * ddy, id);
                        if best.map_or(true, |current| candidate < current) {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
        best.map(|(_, id)| id).unwrap_or(TerritoryId(1))
    }
}

/// Fractal value noise over grid cells, in `[0, 1]`. Each octave doubles
/// the frequency and halves the weight of the previous one.
#[derive(Debug, Clone, Copy)]
struct NoiseLayer {
    seed: u64,
    octaves: u32,
    /// Cells per lattice step at the first octave.
    scale: f32,
}

impl NoiseLayer {
    fn new(world_seed: u64, salt: u64, octaves: u32, scale: f32) -> Self {
        Self {
            seed: splitmix64(world_seed ^ salt),
            octaves: octaves.max(1),
            scale,
        }
    }

    fn sample(&self, x: u32, y: u32) -> f32 {
        let (fx, fy) = (x as f32 / self.scale, y as f32 / self.scale);
        let mut frequency = 1.0;
        let mut weight = 1.0;
        let mut total = 0.0;
        let mut weights = 0.0;
        for octave in 0..self.octaves {
            total += weight * self.lattice(fx * frequency, fy * frequency, octave);
            weights += weight;
            frequency *= 2.0;
            weight *= 0.5;
        }
        (total / weights).clamp(0.0, 1.0)
    }

    /// Blend of the four surrounding lattice values.
    fn lattice(&self, x: f32, y: f32, octave: u32) -> f32 {
        let (cx, cy) = (x.floor(), y.floor());
        let (tx, ty) = (fade(x - cx), fade(y - cy));
        let (ix, iy) = (cx as i32, cy as i32);
        let corner = |dx: i32, dy: i32| self.corner(ix + dx, iy + dy, octave);

        let (c00, c10, c01, c11) = (corner(0, 0), corner(1, 0), corner(0, 1), corner(1, 1));
        let top = c00 + (c10 - c00) * tx;
        let bottom = c01 + (c11 - c01) * tx;
        top + (bottom - top) * ty
    }

    fn corner(&self, x: i32, y: i32, octave: u32) -> f32 {
        let key = u64::from(x as u32) | (u64::from(y as u32) << 32);
        let bits = splitmix64(key ^ self.seed.rotate_left(octave * 13));
        (bits >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Quintic fade; flat first and second derivatives at lattice points.
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
