//! Двоичное сохранение мира
//!
//! Сохранение: каталог с четырьмя файлами:
//! - `meta.bin`: маркер порядка байт (1 = little-endian), `resolution: i32`,
//!   `max_height: f32`, `min_height: f32`
//! - `heights.bin`, `owners.bin`, `details.bin`: по `2 * R * R * 4` байт,
//!   в том же порядке клеток, что и в памяти
//!
//! Все поля пишутся в порядке байт производителя. При загрузке на машине
//! с другим порядком каждое 4-байтовое поле переворачивается.

use crate::grid::{MAX_RESOLUTION, TileGrid, tile_count};
use crate::tile::{Tile, TileDetails};
use crate::world::World;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const META_FILE: &str = "meta.bin";
pub const HEIGHTS_FILE: &str = "heights.bin";
pub const OWNERS_FILE: &str = "owners.bin";
pub const DETAILS_FILE: &str = "details.bin";

const META_LEN: usize = 1 + 4 + 4 + 4;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
    #[error("invalid save name {0:?}")]
    InvalidName(String),
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path:?} holds {actual} bytes, expected {expected}")]
    BlockSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("unknown endianness marker {0}")]
    InvalidMarker(u8),
    #[error("stored resolution {0} is not usable")]
    InvalidResolution(i32),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Порядок байт производителя сохранения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    fn marker(self) -> u8 {
        u8::from(self == Self::Little)
    }

    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            1 => Some(Self::Little),
            0 => Some(Self::Big),
            _ => None,
        }
    }

    fn encode(self, word: u32) -> [u8; 4] {
        match self {
            Self::Little => word.to_le_bytes(),
            Self::Big => word.to_be_bytes(),
        }
    }
}

/// Сохраняет сетку в каталог в родном порядке байт
pub fn save_grid(dir: &Path, grid: &TileGrid) -> Result<(), PersistenceError> {
    save_grid_with_order(dir, grid, ByteOrder::native())
}

/// Сохраняет сетку в заданном порядке байт.
///
/// Родительский каталог должен существовать. Файлы пишутся во временный
/// соседний каталог (`meta.bin` последним) и только затем подменяют прежнее
/// сохранение, поэтому сбой записи не оставляет смесь старых и новых файлов.
pub fn save_grid_with_order(
    dir: &Path,
    grid: &TileGrid,
    order: ByteOrder,
) -> Result<(), PersistenceError> {
    let parent = dir.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() && !parent.is_dir() {
        return Err(PersistenceError::MissingDirectory(parent.to_path_buf()));
    }

    let staging = sibling(dir, "partial");
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
    }
    fs::create_dir(&staging).map_err(io_error(&staging))?;
    if let Err(err) = write_save_set(&staging, grid, order) {
        // каталог-черновик бесполезен, ошибка записи важнее ошибки очистки
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    if dir.exists() {
        let previous = sibling(dir, "old");
        if previous.exists() {
            fs::remove_dir_all(&previous).map_err(io_error(&previous))?;
        }
        fs::rename(dir, &previous).map_err(io_error(dir))?;
        fs::rename(&staging, dir).map_err(io_error(dir))?;
        fs::remove_dir_all(&previous).map_err(io_error(&previous))?;
    } else {
        fs::rename(&staging, dir).map_err(io_error(dir))?;
    }
    Ok(())
}

/// Соседний служебный каталог: `<parent>/.<name>.<suffix>`
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map_or_else(|| "save".into(), |name| name.to_string_lossy());
    dir.with_file_name(format!(".{name}.{suffix}"))
}

fn write_save_set(dir: &Path, grid: &TileGrid, order: ByteOrder) -> Result<(), PersistenceError> {
    let tiles = grid.tiles();
    write_block(&dir.join(HEIGHTS_FILE), order, tiles.iter().map(|t| t.height.to_bits()))?;
    write_block(&dir.join(OWNERS_FILE), order, tiles.iter().map(|t| t.owner))?;
    write_block(&dir.join(DETAILS_FILE), order, tiles.iter().map(|t| t.details.bits()))?;

    let mut meta = Vec::with_capacity(META_LEN);
    meta.push(order.marker());
    meta.extend_from_slice(&order.encode(grid.resolution()));
    meta.extend_from_slice(&order.encode(grid.max_height().to_bits()));
    meta.extend_from_slice(&order.encode(grid.min_height().to_bits()));
    let meta_path = dir.join(META_FILE);
    fs::write(&meta_path, &meta).map_err(io_error(&meta_path))?;
    Ok(())
}

fn write_block(
    path: &Path,
    order: ByteOrder,
    words: impl Iterator<Item = u32>,
) -> Result<(), PersistenceError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    for word in words {
        writer.write_all(&order.encode(word)).map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Читает файл целиком и проверяет его размер
fn read_exact_file(path: &Path, expected: usize) -> Result<Vec<u8>, PersistenceError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    if bytes.len() != expected {
        return Err(PersistenceError::BlockSize {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Слово в родном порядке: поля чужого порядка переворачиваются
fn word(bytes: &[u8], swap: bool) -> u32 {
    let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if swap { value.swap_bytes() } else { value }
}

fn decode_block(bytes: &[u8], swap: bool) -> Vec<u32> {
    bytes.chunks_exact(4).map(|chunk| word(chunk, swap)).collect()
}

/// Загружает сетку из каталога сохранения.
///
/// Ничего не применяется частично: любой сбой возвращает ошибку.
pub fn load_grid(dir: &Path) -> Result<TileGrid, PersistenceError> {
    if !dir.is_dir() {
        return Err(PersistenceError::MissingDirectory(dir.to_path_buf()));
    }

    let meta = read_exact_file(&dir.join(META_FILE), META_LEN)?;
    let order = ByteOrder::from_marker(meta[0]).ok_or(PersistenceError::InvalidMarker(meta[0]))?;
    let swap = order != ByteOrder::native();

    let resolution = word(&meta[1..5], swap) as i32;
    if resolution <= 0 || resolution as u32 > MAX_RESOLUTION {
        return Err(PersistenceError::InvalidResolution(resolution));
    }
    let resolution = resolution as u32;
    let max_height = f32::from_bits(word(&meta[5..9], swap));
    let min_height = f32::from_bits(word(&meta[9..13], swap));

    let block_len = tile_count(resolution) * 4;
    let heights = decode_block(&read_exact_file(&dir.join(HEIGHTS_FILE), block_len)?, swap);
    let owners = decode_block(&read_exact_file(&dir.join(OWNERS_FILE), block_len)?, swap);
    let details = decode_block(&read_exact_file(&dir.join(DETAILS_FILE), block_len)?, swap);

    let tiles = heights
        .into_iter()
        .zip(owners)
        .zip(details)
        .map(|((height, owner), details)| Tile {
            height: f32::from_bits(height),
            owner,
            details: TileDetails::from_bits_retain(details),
        })
        .collect();

    TileGrid::from_tiles(resolution, max_height, min_height, tiles)
        .ok_or(PersistenceError::InvalidResolution(resolution as i32))
}

fn check_name(name: &str) -> Result<(), PersistenceError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\']);
    if bad {
        Err(PersistenceError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

impl World {
    /// Каталог сохранения с данным именем
    #[must_use]
    pub fn save_path(&self, name: &str) -> PathBuf {
        self.saves_dir().join(name)
    }

    /// Сохраняет мир под именем `name` в каталог сохранений.
    ///
    /// Снимок берётся под блокировкой чтения, запись на диск идёт без неё.
    pub fn save_world(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        check_name(name)?;
        if !self.saves_dir().is_dir() {
            return Err(PersistenceError::MissingDirectory(self.saves_dir().to_path_buf()));
        }
        let snapshot = self.snapshot();
        let dir = self.save_path(name);
        save_grid(&dir, &snapshot)?;
        tracing::info!(path = %dir.display(), resolution = snapshot.resolution(), "world saved");
        Ok(dir)
    }

    /// Загружает сохранение и целиком заменяет им текущую сетку.
    ///
    /// При ошибке текущий мир не меняется. После замены подписчики получают
    /// `SyncUpdate::Rebuild`.
    pub fn load_world(&self, name: &str) -> Result<(), PersistenceError> {
        check_name(name)?;
        let dir = self.save_path(name);
        let grid = load_grid(&dir)?;
        let resolution = grid.resolution();

        self.replace_grid(grid);
        self.recompute_name_points();

        tracing::info!(path = %dir.display(), resolution, "world loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_grid() -> TileGrid {
        let mut grid = TileGrid::new(4, 8848.0, -11034.0);
        for (i, tile) in grid.tiles_mut().iter_mut().enumerate() {
            tile.height = i as f32 * 0.37 - 3.1;
            tile.owner = (i % 3) as u32;
            tile.details = TileDetails::from_bits_retain(i as u32);
        }
        grid.tiles_mut()[5].details.set_ocean(true);
        grid
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempdir().unwrap();
        let grid = sample_grid();
        save_grid(&dir.path().join("w"), &grid).unwrap();
        let loaded = load_grid(&dir.path().join("w")).unwrap();

        assert_eq!(loaded.resolution(), 4);
        for (a, b) in grid.tiles().iter().zip(loaded.tiles()) {
            assert_eq!(a.height.to_bits(), b.height.to_bits());
            assert_eq!(a.owner, b.owner);
            assert_eq!(a.details, b.details);
        }
    }

    #[test]
    fn files_have_fixed_sizes() {
        let dir = tempdir().unwrap();
        let save = dir.path().join("w");
        save_grid(&save, &sample_grid()).unwrap();
        assert_eq!(fs::metadata(save.join(META_FILE)).unwrap().len(), 13);
        for file in [HEIGHTS_FILE, OWNERS_FILE, DETAILS_FILE] {
            assert_eq!(fs::metadata(save.join(file)).unwrap().len(), 2 * 4 * 4 * 4);
        }
    }

    #[test]
    fn foreign_byte_order_loads_the_same_values() {
        let dir = tempdir().unwrap();
        let grid = sample_grid();
        let foreign = match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
        save_grid_with_order(&dir.path().join("native"), &grid, ByteOrder::native()).unwrap();
        save_grid_with_order(&dir.path().join("foreign"), &grid, foreign).unwrap();

        let native_bytes = fs::read(dir.path().join("native").join(OWNERS_FILE)).unwrap();
        let foreign_bytes = fs::read(dir.path().join("foreign").join(OWNERS_FILE)).unwrap();
        assert_ne!(native_bytes, foreign_bytes);

        let a = load_grid(&dir.path().join("native")).unwrap();
        let b = load_grid(&dir.path().join("foreign")).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, grid);
    }

    #[test]
    fn truncated_block_is_fatal() {
        let dir = tempdir().unwrap();
        let save = dir.path().join("w");
        save_grid(&save, &sample_grid()).unwrap();

        let owners = save.join(OWNERS_FILE);
        let bytes = fs::read(&owners).unwrap();
        fs::write(&owners, &bytes[..bytes.len() - 1]).unwrap();

        assert!(matches!(
            load_grid(&save),
            Err(PersistenceError::BlockSize { expected: 128, actual: 127, .. })
        ));
    }

    #[test]
    fn bad_marker_and_resolution_are_rejected() {
        let dir = tempdir().unwrap();
        let save = dir.path().join("w");
        save_grid(&save, &sample_grid()).unwrap();
        let meta_path = save.join(META_FILE);
        let meta = fs::read(&meta_path).unwrap();

        let mut bad_marker = meta.clone();
        bad_marker[0] = 7;
        fs::write(&meta_path, &bad_marker).unwrap();
        assert!(matches!(load_grid(&save), Err(PersistenceError::InvalidMarker(7))));

        let mut bad_resolution = meta;
        let order = ByteOrder::from_marker(bad_resolution[0]).unwrap();
        bad_resolution[1..5].copy_from_slice(&order.encode((-4_i32) as u32));
        fs::write(&meta_path, &bad_resolution).unwrap();
        assert!(matches!(
            load_grid(&save),
            Err(PersistenceError::InvalidResolution(-4))
        ));
    }

    #[test]
    fn missing_directories_are_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_grid(&dir.path().join("absent")),
            Err(PersistenceError::MissingDirectory(_))
        ));
        assert!(matches!(
            save_grid(&dir.path().join("absent").join("w"), &sample_grid()),
            Err(PersistenceError::MissingDirectory(_))
        ));
    }

    #[test]
    fn overwrite_replaces_the_whole_set() {
        let dir = tempdir().unwrap();
        let save = dir.path().join("w");
        save_grid(&save, &sample_grid()).unwrap();

        let mut larger = TileGrid::new(8, 1.0, -1.0);
        larger.tiles_mut()[3].owner = 9;
        save_grid(&save, &larger).unwrap();

        assert_eq!(load_grid(&save).unwrap(), larger);
        let mut entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        entries.sort();
        assert_eq!(entries, ["w"]);
    }

    #[test]
    fn failed_write_keeps_the_previous_set() {
        let dir = tempdir().unwrap();
        let save = dir.path().join("w");
        let grid = sample_grid();
        save_grid(&save, &grid).unwrap();

        // файл на месте служебного каталога срывает подмену уже записанного набора
        fs::write(sibling(&save, "old"), b"busy").unwrap();
        let result = save_grid(&save, &TileGrid::new(8, 1.0, -1.0));

        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert_eq!(load_grid(&save).unwrap(), grid);
    }

    #[test]
    fn save_names_cannot_escape_the_saves_dir() {
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(check_name(name), Err(PersistenceError::InvalidName(_))));
        }
        assert!(check_name("8192").is_ok());
    }
}
