//! Packed tile encoding.
//!
//! A tile occupies one `u32` word: the low [`TYPE_BITS`] bits hold the tile
//! type, the remaining high bits hold the territory id.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use world_schema::TerritoryId;

pub const TYPE_BITS: u32 = 8;
pub const TYPE_MASK: u32 = (1 << TYPE_BITS) - 1;
pub const MAX_TERRITORY_ID: u32 = u32::MAX >> TYPE_BITS;

/// Terrain type stored in the low bits of a packed tile.
///
/// Metadata for each type (blocking, movement cost, texture) lives in the
/// [`TileCatalog`](crate::tile_catalog::TileCatalog).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TileType(pub u8);

impl TileType {
    pub const PLAIN: TileType = TileType(0);
    pub const GRASS: TileType = TileType(1);
    pub const FOREST: TileType = TileType(2);
    pub const WATER: TileType = TileType(3);
    pub const MOUNTAIN: TileType = TileType(4);
    pub const SAND: TileType = TileType(5);
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("territory id {0} exceeds the {MAX_TERRITORY_ID} limit of the packed encoding")]
    TerritoryOutOfRange(u32),
}

/// Unpacked tile value. Construction guarantees the territory id fits the
/// packed encoding, so [`Tile::pack`] never truncates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile {
    tile_type: TileType,
    territory: TerritoryId,
}

impl Tile {
    pub fn new(tile_type: TileType, territory: TerritoryId) -> Result<Self, CodecError> {
        if territory.0 > MAX_TERRITORY_ID {
            return Err(CodecError::TerritoryOutOfRange(territory.0));
        }
        Ok(Self {
            tile_type,
            territory,
        })
    }

    /// Tile with no owning territory.
    pub const fn unowned(tile_type: TileType) -> Self {
        Self {
            tile_type,
            territory: TerritoryId::NONE,
        }
    }

    pub fn tile_type(self) -> TileType {
        self.tile_type
    }

    pub fn territory(self) -> TerritoryId {
        self.territory
    }

    #[inline]
    pub fn pack(self) -> PackedTile {
        encode(self.tile_type, self.territory)
    }
}

/// One grid cell as stored in memory.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedTile(pub u32);

impl PackedTile {
    #[inline]
    pub fn tile_type(self) -> TileType {
        TileType((self.0 & TYPE_MASK) as u8)
    }

    #[inline]
    pub fn territory(self) -> TerritoryId {
        TerritoryId(self.0 >> TYPE_BITS)
    }

    #[inline]
    pub fn unpack(self) -> Tile {
        let (tile_type, territory) = decode(self);
        Tile {
            tile_type,
            territory,
        }
    }
}

impl From<Tile> for PackedTile {
    fn from(tile: Tile) -> Self {
        tile.pack()
    }
}

impl From<PackedTile> for Tile {
    fn from(word: PackedTile) -> Self {
        word.unpack()
    }
}

/// Pack a type and territory id. Bits of `territory` above
/// [`MAX_TERRITORY_ID`] are discarded; callers holding a [`Tile`] are
/// already range checked.
#[inline]
pub fn encode(tile_type: TileType, territory: TerritoryId) -> PackedTile {
    PackedTile((territory.0 << TYPE_BITS) | tile_type.0 as u32)
}

#[inline]
pub fn decode(word: PackedTile) -> (TileType, TerritoryId) {
    (word.tile_type(), word.territory())
}

/// Range-checked territory id for use with the packed encoding.
pub fn territory_id(raw: u32) -> Result<TerritoryId, CodecError> {
    if raw > MAX_TERRITORY_ID {
        Err(CodecError::TerritoryOutOfRange(raw))
    } else {
        Ok(TerritoryId(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_simple_consistency() {
        let word = encode(TileType::MOUNTAIN, TerritoryId(42));
        assert_eq!(decode(word), (TileType::MOUNTAIN, TerritoryId(42)));
        assert_eq!(word.0, (42 << 8) | 4);
    }

    #[test]
    fn round_trip_holds_across_the_id_range() {
        let ids = [0, 1, 123, 255, 256, 65_535, 65_536, 1 << 20, MAX_TERRITORY_ID];
        for raw_type in [0u8, 1, 4, 127, 255] {
            for &raw_id in &ids {
                let tile = Tile::new(TileType(raw_type), TerritoryId(raw_id)).unwrap();
                let unpacked = tile.pack().unpack();
                assert_eq!(unpacked, tile, "type {raw_type} id {raw_id}");
            }
        }
    }

    #[test]
    fn oversized_territory_is_rejected() {
        let err = Tile::new(TileType::GRASS, TerritoryId(MAX_TERRITORY_ID + 1)).unwrap_err();
        assert_eq!(err, CodecError::TerritoryOutOfRange(MAX_TERRITORY_ID + 1));
        assert!(territory_id(u32::MAX).is_err());
        assert_eq!(territory_id(7).unwrap(), TerritoryId(7));
    }

    #[test]
    fn zero_word_is_plain_without_territory() {
        let tile = PackedTile::default().unpack();
        assert_eq!(tile.tile_type(), TileType::PLAIN);
        assert!(tile.territory().is_none());
    }
}
