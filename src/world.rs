//! Мир: единственный владелец сетки, реестра стран и журнала изменений
//!
//! `World` создаётся явно и передаётся компонентам по ссылке. Сетка лежит под
//! `RwLock`: каждая запись берёт блокировку на одну клетку, чтение для снимков
//! держит её только на время копирования. Загрузка заменяет сетку одной атомарной подменой.

use crate::config::{ConfigError, WorldConfig};
use crate::country::{Country, CountryError, CountryRegistry};
use crate::grid::TileGrid;
use crate::sync::{ChangeLog, Subscribers, SyncUpdate};
use crate::terrain::{self, TerrainError};
use crate::tile::Tile;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error(transparent)]
    Country(#[from] CountryError),
    #[error("failed to start fill workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// Параметры мира, не относящиеся к рельефу
#[derive(Debug, Clone)]
pub struct WorldOptions {
    pub lakes_claimable: bool,
    pub fill_workers: usize,
    pub saves_dir: PathBuf,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            lakes_claimable: true,
            fill_workers: 2,
            saves_dir: PathBuf::from("saves"),
        }
    }
}

impl From<&WorldConfig> for WorldOptions {
    fn from(config: &WorldConfig) -> Self {
        Self {
            lakes_claimable: config.lakes_claimable,
            fill_workers: config.fill_workers,
            saves_dir: config.saves_dir.clone(),
        }
    }
}

/// Состояние, разделяемое с фоновыми заливками
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) grid: RwLock<TileGrid>,
    pub(crate) countries: RwLock<CountryRegistry>,
    pub(crate) changes: ChangeLog,
    pub(crate) subscribers: Subscribers,
    /// Растёт при каждой замене сетки
    epoch: AtomicU64,
    pub(crate) lakes_claimable: bool,
}

impl Shared {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

pub struct World {
    shared: Arc<Shared>,
    pub(crate) workers: rayon::ThreadPool,
    saves_dir: PathBuf,
}

impl World {
    pub fn new(
        grid: TileGrid,
        countries: CountryRegistry,
        options: WorldOptions,
    ) -> Result<Self, WorldError> {
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(options.fill_workers.max(1))
            .thread_name(|i| format!("world-fill-{i}"))
            .build()?;

        let world = Self {
            shared: Arc::new(Shared {
                grid: RwLock::new(grid),
                countries: RwLock::new(countries),
                changes: ChangeLog::default(),
                subscribers: Subscribers::default(),
                epoch: AtomicU64::new(0),
                lakes_claimable: options.lakes_claimable,
            }),
            workers,
            saves_dir: options.saves_dir,
        };
        world.recompute_name_points();
        Ok(world)
    }

    /// Полная инициализация: страны из файла, рельеф из источника конфигурации
    pub fn from_config(config: &WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let countries = CountryRegistry::from_file(&config.countries)?;
        let grid = terrain::generate_from_config(config)?;
        Self::new(grid, countries, WorldOptions::from(config))
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Атомарно подменяет сетку и рассылает подписчикам `SyncUpdate::Rebuild`.
    ///
    /// Незавершённые заливки увидят новую эпоху и остановятся. Несинхронизированные
    /// изменения старой сетки отбрасываются под той же блокировкой.
    pub(crate) fn replace_grid(&self, grid: TileGrid) {
        let palette = Arc::new(self.palette());
        let mut current = self.shared.grid.write();
        *current = grid;
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.changes.clear();

        let update = SyncUpdate::Rebuild {
            resolution: current.resolution(),
            max_height: current.max_height(),
            min_height: current.min_height(),
            tiles: Arc::new(current.tiles().to_vec()),
            palette,
        };
        self.shared.subscribers.dispatch(&update);
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.epoch()
    }

    #[must_use]
    pub fn saves_dir(&self) -> &Path {
        &self.saves_dir
    }

    #[must_use]
    pub fn lakes_claimable(&self) -> bool {
        self.shared.lakes_claimable
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.shared.grid.read().resolution()
    }

    #[must_use]
    pub fn max_height(&self) -> f32 {
        self.shared.grid.read().max_height()
    }

    #[must_use]
    pub fn min_height(&self) -> f32 {
        self.shared.grid.read().min_height()
    }

    #[must_use]
    pub fn validate_position(&self, x: i64, y: i64) -> (usize, usize) {
        self.shared.grid.read().validate_position(x, y)
    }

    #[must_use]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        self.shared.grid.read().index_of(x, y)
    }

    #[must_use]
    pub fn tile(&self, index: usize) -> Option<Tile> {
        self.shared.grid.read().get(index).copied()
    }

    #[must_use]
    pub fn tile_at(&self, x: i64, y: i64) -> Tile {
        self.shared.grid.read().tile(x, y)
    }

    #[must_use]
    pub fn height_at(&self, x: i64, y: i64) -> f32 {
        self.tile_at(x, y).height
    }

    #[must_use]
    pub fn owner_at(&self, x: i64, y: i64) -> u32 {
        self.tile_at(x, y).owner
    }

    /// Страна-владелец клетки (для ничьей: запись `0`)
    #[must_use]
    pub fn owning_country_at(&self, x: i64, y: i64) -> Option<Country> {
        let owner = self.owner_at(x, y);
        self.country(owner)
    }

    /// Согласованная копия всей сетки
    #[must_use]
    pub fn snapshot(&self) -> TileGrid {
        self.shared.grid.read().clone()
    }

    #[must_use]
    pub fn country(&self, id: u32) -> Option<Country> {
        self.shared.countries.read().get(id).cloned()
    }

    #[must_use]
    pub fn countries(&self) -> Vec<Country> {
        self.shared.countries.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn country_id_by_name(&self, name: &str) -> Option<u32> {
        self.shared.countries.read().id_by_name(name)
    }

    /// Палитра цветов для рендерера, индекс: идентификатор страны
    #[must_use]
    pub fn palette(&self) -> Vec<[f32; 3]> {
        self.shared.countries.read().palette()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut grid = TileGrid::new(4, 100.0, -100.0);
        grid.tiles_mut()[0] = Tile::ocean(-10.0);
        let countries = CountryRegistry::parse("1, 1, 0, 0, Red").unwrap();
        World::new(grid, countries, WorldOptions::default()).unwrap()
    }

    #[test]
    fn accessors_resolve_wrapped_positions() {
        let world = world();
        assert_eq!(world.resolution(), 4);
        assert_eq!(world.max_height(), 100.0);
        assert_eq!(world.min_height(), -100.0);
        // (-8, 0) оборачивается в (0, 0)
        assert!(world.tile_at(-8, 0).is_ocean());
        assert_eq!(world.height_at(0, 0), -10.0);
        assert_eq!(world.owning_country_at(3, 3).unwrap().name, "Unclaimed");
        assert_eq!(world.country_id_by_name("Red"), Some(1));
        assert!(world.tile(32).is_none());
    }

    #[test]
    fn replace_grid_advances_epoch() {
        let world = world();
        assert_eq!(world.epoch(), 0);
        let updates = world.subscribe();
        world.replace_grid(TileGrid::new(8, 1.0, -1.0));
        assert_eq!(world.epoch(), 1);
        assert_eq!(world.resolution(), 8);
        assert!(matches!(
            updates.try_recv(),
            Ok(SyncUpdate::Rebuild { resolution: 8, .. })
        ));
    }
}
