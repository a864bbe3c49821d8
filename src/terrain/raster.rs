use super::{Surface, TerrainError, TerrainSample, TerrainSource};
use image::{ImageBuffer, Rgb};
use std::path::Path;

type Raster = ImageBuffer<Rgb<f32>, Vec<f32>>;

/// Рельеф из растровых карт в равнопромежуточной проекции.
///
/// Используется только красный канал каждой карты, значения 0..1.
pub struct RasterSet {
    heightmap: Raster,
    water_mask: Raster,
    bathymetry: Option<Raster>,
    mask_threshold: f32,
    lake_threshold: Option<f32>,
    max_height: f32,
    max_depth: f32,
}

impl RasterSet {
    /// Загружает карты с диска. Отсутствующий или пустой файл: фатальная ошибка.
    pub fn open(
        heightmap: &Path,
        water_mask: &Path,
        bathymetry: Option<&Path>,
        mask_threshold: f32,
        lake_threshold: Option<f32>,
        max_height: f32,
        max_depth: f32,
    ) -> Result<Self, TerrainError> {
        let bathymetry = bathymetry.map(load_raster).transpose()?;
        Ok(Self {
            heightmap: load_raster(heightmap)?,
            water_mask: load_raster(water_mask)?,
            bathymetry,
            mask_threshold,
            lake_threshold,
            max_height,
            max_depth,
        })
    }

    /// Собирает набор из уже загруженных изображений
    #[must_use]
    pub fn from_images(
        heightmap: Raster,
        water_mask: Raster,
        bathymetry: Option<Raster>,
        mask_threshold: f32,
        lake_threshold: Option<f32>,
        max_height: f32,
        max_depth: f32,
    ) -> Self {
        Self {
            heightmap,
            water_mask,
            bathymetry,
            mask_threshold,
            lake_threshold,
            max_height,
            max_depth,
        }
    }
}

fn load_raster(path: &Path) -> Result<Raster, TerrainError> {
    let image = image::open(path).map_err(|source| TerrainError::RasterLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let raster = image.to_rgb32f();
    if raster.width() == 0 || raster.height() == 0 {
        return Err(TerrainError::EmptyRaster {
            path: path.to_path_buf(),
        });
    }
    tracing::debug!(path = %path.display(), width = raster.width(), height = raster.height(), "raster loaded");
    Ok(raster)
}

/// Красный канал пикселя, соответствующего клетке `(x, y)`
fn red_at(raster: &Raster, x: u32, y: u32, resolution: u32) -> f32 {
    let u = x as f32 / (2 * resolution) as f32;
    let v = y as f32 / resolution as f32;
    let px = ((u * raster.width() as f32) as u32).min(raster.width() - 1);
    let py = ((v * raster.height() as f32) as u32).min(raster.height() - 1);
    raster.get_pixel(px, py).0[0].clamp(0.0, 1.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

impl TerrainSource for RasterSet {
    fn sample(&self, x: u32, y: u32, resolution: u32) -> TerrainSample {
        let mask = red_at(&self.water_mask, x, y, resolution);

        if mask > self.mask_threshold {
            let elevation = red_at(&self.heightmap, x, y, resolution);
            return TerrainSample {
                height: lerp(0.0, self.max_height, elevation),
                surface: Surface::Land,
            };
        }

        let height = self.bathymetry.as_ref().map_or(0.0, |bathy| {
            -lerp(self.max_depth, 0.0, red_at(bathy, x, y, resolution))
        });
        let surface = match self.lake_threshold {
            Some(lake) if mask > lake => Surface::Lake,
            _ => Surface::Ocean,
        };
        TerrainSample { height, surface }
    }
}
