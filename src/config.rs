// src/config.rs
//! Конфигурация мира
//!
//! Этот модуль определяет все параметры, с которыми создаётся мир:
//! - Разрешение сетки и границы высот
//! - Источник рельефа (процедурный шум или растровые карты)
//! - Политику владения озёрами
//! - Пути к файлу стран и каталогу сохранений
//!
//! Все структуры поддерживают сериализацию в TOML для удобной настройки через конфигурационные файлы.

use crate::grid::{MAX_RESOLUTION, MIN_RESOLUTION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read world config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse world config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("resolution {0} is outside 128..=8192")]
    Resolution(u32),
    #[error("invalid height bounds: max_height {max_height}, max_depth {max_depth}")]
    HeightBounds { max_height: f32, max_depth: f32 },
    #[error("threshold {name} = {value} must lie in [0, 1]")]
    Threshold { name: &'static str, value: f32 },
    #[error("lake_threshold {lake} must not exceed mask_threshold {mask}")]
    LakeAboveMask { lake: f32, mask: f32 },
    #[error("{name} must be at least 1")]
    Zero { name: &'static str },
}

/// Расписание частот по октавам процедурного шума
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OctaveSchedule {
    /// Классическая фрактальная сумма: частота ×2, амплитуда ×½
    #[default]
    Doubling,
    /// `frequency = octaves * 2 / o` для `o = 1..=octaves`, амплитуда ×½
    Descending,
}

/// Источник рельефа
///
/// ```toml
/// [terrain]
/// kind = "raster"
/// heightmap = "data/elevation.png"
/// water_mask = "data/water.png"
/// mask_threshold = 0.5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainConfig {
    Procedural {
        /// Сид шума; по умолчанию берётся разрешение мира
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default = "default_octaves")]
        octaves: u32,
        #[serde(default)]
        schedule: OctaveSchedule,
        /// Водоёмы меньше этой площади (в клетках) становятся озёрами
        #[serde(default)]
        min_ocean_area: usize,
    },
    Raster {
        /// Карта высот суши (красный канал, 0..1)
        heightmap: PathBuf,
        /// Маска воды: значение выше порога: суша
        water_mask: PathBuf,
        /// Карта глубин; без неё океан получает высоту 0
        #[serde(default)]
        bathymetry: Option<PathBuf>,
        #[serde(default = "default_mask_threshold")]
        mask_threshold: f32,
        /// Вода с маской выше этого порога считается озером
        #[serde(default)]
        lake_threshold: Option<f32>,
        #[serde(default)]
        min_ocean_area: usize,
    },
}

fn default_octaves() -> u32 {
    8
}
fn default_mask_threshold() -> f32 {
    0.5
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self::Procedural {
            seed: None,
            octaves: default_octaves(),
            schedule: OctaveSchedule::Doubling,
            min_ocean_area: 0,
        }
    }
}

impl TerrainConfig {
    #[must_use]
    pub fn min_ocean_area(&self) -> usize {
        match self {
            Self::Procedural { min_ocean_area, .. } | Self::Raster { min_ocean_area, .. } => {
                *min_ocean_area
            }
        }
    }
}

/// Основные параметры мира
///
/// Полная конфигурация одного мира. Поддерживает загрузку из TOML-файлов.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Число клеток по широте; по долготе их вдвое больше
    #[serde(default = "default_resolution")]
    pub resolution: u32,

    /// Максимальная высота суши
    #[serde(default = "default_max_height")]
    pub max_height: f32,

    /// Максимальная глубина океана (положительное число)
    #[serde(default = "default_max_depth")]
    pub max_depth: f32,

    /// Можно ли захватывать озёра (океан не захватывается никогда)
    #[serde(default = "default_lakes_claimable")]
    pub lakes_claimable: bool,

    /// Размер пула потоков для заливки территорий
    #[serde(default = "default_fill_workers")]
    pub fill_workers: usize,

    /// Файл со списком стран
    #[serde(default = "default_countries")]
    pub countries: PathBuf,

    /// Каталог, в котором лежат сохранения
    #[serde(default = "default_saves_dir")]
    pub saves_dir: PathBuf,

    #[serde(default)]
    pub terrain: TerrainConfig,
}

impl WorldConfig {
    /// Загружает параметры из TOML-файла и проверяет их
    ///
    /// # Пример
    /// ```toml
    /// # world.toml
    /// resolution = 512
    /// max_height = 8848.0
    /// countries = "countries.txt"
    ///
    /// [terrain]
    /// kind = "procedural"
    /// seed = 42
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), resolution = config.resolution, "world config loaded");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(ConfigError::Resolution(self.resolution));
        }
        let bounds_ok = self.max_height > 0.0 && self.max_depth >= 0.0;
        if !bounds_ok {
            return Err(ConfigError::HeightBounds {
                max_height: self.max_height,
                max_depth: self.max_depth,
            });
        }
        if self.fill_workers == 0 {
            return Err(ConfigError::Zero {
                name: "fill_workers",
            });
        }
        match &self.terrain {
            TerrainConfig::Procedural { octaves, .. } => {
                if *octaves == 0 {
                    return Err(ConfigError::Zero { name: "octaves" });
                }
            }
            TerrainConfig::Raster {
                mask_threshold,
                lake_threshold,
                ..
            } => {
                check_unit("mask_threshold", *mask_threshold)?;
                if let Some(lake) = *lake_threshold {
                    check_unit("lake_threshold", lake)?;
                    if lake > *mask_threshold {
                        return Err(ConfigError::LakeAboveMask {
                            lake,
                            mask: *mask_threshold,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Нижняя граница высот мира
    #[must_use]
    pub fn min_height(&self) -> f32 {
        -self.max_depth
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Threshold { name, value })
    }
}

fn default_resolution() -> u32 {
    1024
}
fn default_max_height() -> f32 {
    8848.0
}
fn default_max_depth() -> f32 {
    11034.0
}
fn default_lakes_claimable() -> bool {
    true
}
fn default_fill_workers() -> usize {
    2
}
fn default_countries() -> PathBuf {
    PathBuf::from("countries.txt")
}
fn default_saves_dir() -> PathBuf {
    PathBuf::from("saves")
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            max_height: 8848.0,
            max_depth: 11034.0,
            lakes_claimable: true,
            fill_workers: 2,
            countries: default_countries(),
            saves_dir: default_saves_dir(),
            terrain: TerrainConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(config.resolution, 1024);
        assert!(config.lakes_claimable);
        assert_eq!(config.terrain, TerrainConfig::default());
        assert_eq!(config.min_height(), -11034.0);
    }

    #[test]
    fn raster_terrain_parses() {
        let config = WorldConfig::from_toml_str(
            r#"
            resolution = 256
            lakes_claimable = false

            [terrain]
            kind = "raster"
            heightmap = "h.png"
            water_mask = "m.png"
            mask_threshold = 0.4
            lake_threshold = 0.2
            "#,
        )
        .unwrap();

        assert!(!config.lakes_claimable);
        match config.terrain {
            TerrainConfig::Raster {
                mask_threshold,
                lake_threshold,
                bathymetry,
                ..
            } => {
                assert_eq!(mask_threshold, 0.4);
                assert_eq!(lake_threshold, Some(0.2));
                assert!(bathymetry.is_none());
            }
            TerrainConfig::Procedural { .. } => panic!("expected raster terrain"),
        }
    }

    #[test]
    fn resolution_bounds_are_enforced() {
        assert!(matches!(
            WorldConfig::from_toml_str("resolution = 64"),
            Err(ConfigError::Resolution(64))
        ));
        assert!(matches!(
            WorldConfig::from_toml_str("resolution = 8193"),
            Err(ConfigError::Resolution(8193))
        ));
        assert!(WorldConfig::from_toml_str("resolution = 8192").is_ok());
    }

    #[test]
    fn lake_threshold_above_mask_is_rejected() {
        let err = WorldConfig::from_toml_str(
            r#"
            [terrain]
            kind = "raster"
            heightmap = "h.png"
            water_mask = "m.png"
            mask_threshold = 0.3
            lake_threshold = 0.6
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::LakeAboveMask { .. }));
    }

    #[test]
    fn descending_schedule_parses() {
        let config = WorldConfig::from_toml_str(
            r#"
            [terrain]
            kind = "procedural"
            octaves = 4
            schedule = "descending"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.terrain,
            TerrainConfig::Procedural {
                octaves: 4,
                schedule: OctaveSchedule::Descending,
                ..
            }
        ));
    }
}
