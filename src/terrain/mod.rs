//! Генерация рельефа
//!
//! Рельеф строится из подключаемого источника высот (`TerrainSource`):
//! - `noise::SphereNoise`: детерминированный фрактальный шум на сфере
//! - `raster::RasterSet`: растровые карты высот, маски воды и глубин
//!
//! После выборки небольшие изолированные океаны могут быть переклассифицированы в озёра
//! (`water::reclassify_small_oceans`).

pub mod noise;
pub mod raster;
pub mod water;

use crate::config::{ConfigError, TerrainConfig, WorldConfig};
use crate::grid::{TileGrid, tile_count};
use crate::tile::Tile;
use rayon::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

pub use noise::SphereNoise;
pub use raster::RasterSet;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load raster {path:?}: {source}")]
    RasterLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("raster {path:?} has no pixels")]
    EmptyRaster { path: PathBuf },
}

/// Тип поверхности клетки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Land,
    Ocean,
    Lake,
}

/// Результат выборки источника для одной клетки
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSample {
    pub height: f32,
    pub surface: Surface,
}

impl TerrainSample {
    fn into_tile(self) -> Tile {
        match self.surface {
            Surface::Land => Tile::land(self.height),
            Surface::Ocean => Tile::ocean(self.height),
            Surface::Lake => Tile::lake(self.height),
        }
    }
}

/// Подключаемая стратегия получения высот
pub trait TerrainSource: Sync {
    fn sample(&self, x: u32, y: u32, resolution: u32) -> TerrainSample;
}

/// Точка на единичной сфере для клетки `(x, y)`.
///
/// `lat = (y / R - 0.5) * π` (от -π/2 до π/2), `lon = x / R * π` (от 0 до 2π).
#[must_use]
pub fn sphere_point(x: u32, y: u32, resolution: u32) -> [f32; 3] {
    let r = resolution as f32;
    let lat = (y as f32 / r - 0.5) * std::f32::consts::PI;
    let lon = x as f32 / r * std::f32::consts::PI;
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Заполняет новую сетку из источника; все клетки ничьи
pub fn generate_terrain<S: TerrainSource>(
    source: &S,
    resolution: u32,
    max_height: f32,
    min_height: f32,
) -> TileGrid {
    let r = resolution as usize;
    let tiles: Vec<Tile> = (0..tile_count(resolution))
        .into_par_iter()
        .map(|i| {
            // индекс = x * R + y
            let x = (i / r) as u32;
            let y = (i % r) as u32;
            source.sample(x, y, resolution).into_tile()
        })
        .collect();

    let mut grid = TileGrid::new(resolution, max_height, min_height);
    grid.tiles_mut().copy_from_slice(&tiles);
    grid
}

/// Строит рельеф мира по конфигурации
pub fn generate_from_config(config: &WorldConfig) -> Result<TileGrid, TerrainError> {
    config.validate()?;

    let mut grid = match &config.terrain {
        TerrainConfig::Procedural {
            seed,
            octaves,
            schedule,
            ..
        } => {
            let seed = seed.unwrap_or(u64::from(config.resolution));
            let source =
                SphereNoise::new(seed, *octaves, *schedule, config.max_height, config.max_depth);
            generate_terrain(
                &source,
                config.resolution,
                config.max_height,
                config.min_height(),
            )
        }
        TerrainConfig::Raster {
            heightmap,
            water_mask,
            bathymetry,
            mask_threshold,
            lake_threshold,
            ..
        } => {
            let source = RasterSet::open(
                heightmap,
                water_mask,
                bathymetry.as_deref(),
                *mask_threshold,
                *lake_threshold,
                config.max_height,
                config.max_depth,
            )?;
            generate_terrain(
                &source,
                config.resolution,
                config.max_height,
                config.min_height(),
            )
        }
    };

    let min_area = config.terrain.min_ocean_area();
    if min_area > 0 {
        let reflagged = water::reclassify_small_oceans(&mut grid, min_area);
        tracing::debug!(reflagged, min_area, "small oceans reflagged as lakes");
    }

    tracing::info!(
        resolution = grid.resolution(),
        ocean_ratio = grid.ocean_ratio(),
        "terrain generated"
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stripes;

    impl TerrainSource for Stripes {
        fn sample(&self, x: u32, _y: u32, _resolution: u32) -> TerrainSample {
            if x % 2 == 0 {
                TerrainSample {
                    height: x as f32,
                    surface: Surface::Land,
                }
            } else {
                TerrainSample {
                    height: -1.0,
                    surface: Surface::Ocean,
                }
            }
        }
    }

    #[test]
    fn sphere_point_hits_poles_and_equator() {
        let [x, y, z] = sphere_point(0, 50, 100);
        assert!((x - 1.0).abs() < 1e-6 && y.abs() < 1e-6 && z.abs() < 1e-6);

        let [_, _, z] = sphere_point(0, 0, 100);
        assert!((z + 1.0).abs() < 1e-6);

        // x = R соответствует долготе π
        let [x, _, _] = sphere_point(100, 50, 100);
        assert!((x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn generated_tiles_follow_index_layout() {
        let grid = generate_terrain(&Stripes, 8, 10.0, -10.0);
        assert_eq!(grid.len(), 128);
        for (i, tile) in grid.tiles().iter().enumerate() {
            let (x, _) = grid.position_of(i);
            assert_eq!(tile.is_ocean(), x % 2 == 1);
            assert_eq!(tile.owner, 0);
        }
        assert_eq!(grid.height_at(4, 3), 4.0);
    }
}
