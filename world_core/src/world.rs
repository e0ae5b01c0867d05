use std::sync::Arc;

use world_schema::{GridBox, TerritoriesResponse, TerritoryId, TerritoryInfo};

use crate::{
    directory::ObjectDirectory,
    grid::{ConcurrencyPolicy, Grid, Locked},
    mapgen::{generate_map_with_catalog, MapGenConfig, MapGenError},
    projection::{GeoProjector, ProjectionSettings},
    spatial_index::SpatialIndex,
    territory::{TerritoryError, TerritoryRegistry},
    tile_catalog::TileCatalog,
    world_config::WorldConfig,
};

/// A generated grid together with its territories and projection.
#[derive(Debug)]
pub struct World<P: ConcurrencyPolicy = Locked> {
    grid: Grid<P>,
    territories: Arc<TerritoryRegistry>,
    projector: Arc<GeoProjector>,
    seed: Option<u64>,
}

impl<P: ConcurrencyPolicy> World<P> {
    pub fn generate(config: &MapGenConfig) -> Result<Self, MapGenError> {
        Self::generate_with(config, ProjectionSettings::default(), TileCatalog::builtin())
    }

    pub fn from_config(config: &WorldConfig) -> Result<Self, MapGenError> {
        Self::generate_with(
            &config.map_gen_config(),
            config.projection,
            TileCatalog::builtin(),
        )
    }

    pub fn generate_with(
        config: &MapGenConfig,
        projection: ProjectionSettings,
        catalog: Arc<TileCatalog>,
    ) -> Result<Self, MapGenError> {
        let map = generate_map_with_catalog::<P>(config, catalog)?;
        let mut world = Self::from_parts(map.grid, map.territories, projection);
        world.seed = Some(map.seed);
        Ok(world)
    }

    /// Wrap an existing grid and registry, e.g. one built from supplied tiles.
    pub fn from_parts(
        grid: Grid<P>,
        territories: TerritoryRegistry,
        projection: ProjectionSettings,
    ) -> Self {
        let (width, height) = grid.dimensions();
        Self {
            grid,
            territories: Arc::new(territories),
            projector: Arc::new(GeoProjector::with_settings(width, height, projection)),
            seed: None,
        }
    }

    pub fn grid(&self) -> &Grid<P> {
        &self.grid
    }

    pub fn territories(&self) -> &Arc<TerritoryRegistry> {
        &self.territories
    }

    pub fn projector(&self) -> &Arc<GeoProjector> {
        &self.projector
    }

    /// Seed of the generation run, if this world was generated.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn territory_info(&self, id: TerritoryId) -> Result<&TerritoryInfo, TerritoryError> {
        self.territories.get_info(id)
    }

    /// Territories owning at least one cell of the inclusive box, ordered by
    /// id. Parts of the box outside the grid are ignored.
    pub fn territories_in_box(&self, bounds: GridBox) -> TerritoriesResponse {
        let b = bounds.normalized();
        let (w, h) = b.extent();
        let ids = self.grid.territories_in_area(b.x1, b.y1, w, h);
        TerritoriesResponse {
            territories: self.territories.infos_for(&ids),
        }
    }

    /// Directory over this world's projection, configured from `config`.
    pub fn object_directory(
        &self,
        index: Arc<dyn SpatialIndex>,
        config: &WorldConfig,
    ) -> ObjectDirectory {
        ObjectDirectory::new(index, Arc::clone(&self.projector))
            .with_policy(config.index_call_policy())
            .with_event_capacity(config.events.channel_capacity)
    }
}
