use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use world_schema::{TerritoryId, TerritoryInfo};

use crate::codec::MAX_TERRITORY_ID;

const NAME_HEADS: &[&str] = &[
    "Vel", "Ard", "Mor", "Kes", "Tal", "Brin", "Ost", "Cael", "Dun", "Ery", "Hal", "Ith",
    "Lor", "Nar", "Quen", "Sar", "Thal", "Ulm", "Vor", "Wyn",
];
const NAME_MIDS: &[&str] = &["", "a", "e", "o", "an", "en", "ir", "ul"];
const NAME_TAILS: &[&str] = &[
    "mark", "holt", "reach", "fen", "moor", "dale", "gard", "wick", "spire", "ford", "vale",
    "march",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerritoryError {
    #[error("territory {0} not found")]
    NotFound(TerritoryId),
    #[error("territory count {count} exceeds the encodable maximum {max}")]
    CountOutOfRange { count: u32, max: u32 },
}

/// Territory metadata keyed by id.
///
/// Filled during map generation, then shared read-only (usually behind an
/// `Arc`). Tile counts only change through `&mut self`.
#[derive(Debug, Clone, Default)]
pub struct TerritoryRegistry {
    territories: BTreeMap<TerritoryId, TerritoryInfo>,
}

impl TerritoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all territories and create ids `1..=count`.
    ///
    /// With a seed the generated names are reproducible; without one they are
    /// drawn from OS entropy.
    pub fn generate(&mut self, count: u32, seed: Option<u64>) -> Result<(), TerritoryError> {
        if count > MAX_TERRITORY_ID {
            return Err(TerritoryError::CountOutOfRange {
                count,
                max: MAX_TERRITORY_ID,
            });
        }
        self.territories.clear();

        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        for raw in 1..=count {
            let id = TerritoryId(raw);
            self.territories.insert(
                id,
                TerritoryInfo {
                    id,
                    name: territory_name(&mut rng),
                    tile_count: 0,
                },
            );
        }

        tracing::debug!(
            target: "world::territory",
            count,
            seeded = seed.is_some(),
            "territory.generated"
        );
        Ok(())
    }

    pub fn get_info(&self, id: TerritoryId) -> Result<&TerritoryInfo, TerritoryError> {
        self.territories
            .get(&id)
            .ok_or(TerritoryError::NotFound(id))
    }

    pub fn contains(&self, id: TerritoryId) -> bool {
        self.territories.contains_key(&id)
    }

    /// Add `tiles` to the territory's tile count.
    pub fn record_tiles(&mut self, id: TerritoryId, tiles: u64) -> Result<(), TerritoryError> {
        let info = self
            .territories
            .get_mut(&id)
            .ok_or(TerritoryError::NotFound(id))?;
        info.tile_count = info.tile_count.saturating_add(tiles);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TerritoryId> + '_ {
        self.territories.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TerritoryInfo> {
        self.territories.values()
    }

    /// Cloned metadata for `ids`, skipping ids the registry does not hold.
    pub fn infos_for(&self, ids: &[TerritoryId]) -> Vec<TerritoryInfo> {
        ids.iter()
            .filter_map(|id| self.territories.get(id).cloned())
            .collect()
    }
}

fn territory_name(rng: &mut impl Rng) -> String {
    let head = NAME_HEADS.choose(rng).copied().unwrap_or("Terra");
    let mid = NAME_MIDS.choose(rng).copied().unwrap_or("");
    let tail = NAME_TAILS.choose(rng).copied().unwrap_or("land");
    format!("{head}{mid}{tail}")
}
