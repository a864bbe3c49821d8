//! PNG-превью сетки для отладки
//!
//! Изображение имеет размер `2R × R`, столбец соответствует долготе `x`, строка широте `y`.
//! - высотная карта: суша в оттенках серого от уровня моря до `max_height`,
//!   вода синяя, темнее с глубиной
//! - политическая карта: цвет страны-владельца поверх высотной карты

use crate::grid::TileGrid;
use crate::tile::Tile;
use image::{ImageBuffer, ImageResult, Rgb};
use rayon::prelude::*;
use std::path::Path;

/// Доля цвета страны при смешивании с рельефом
const COUNTRY_BLEND: f32 = 0.7;

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

fn terrain_color(tile: &Tile, max_height: f32, min_height: f32) -> [f32; 3] {
    if tile.is_ocean() || tile.is_lake() {
        let depth = if min_height < 0.0 {
            (tile.height / min_height).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let shade = 1.0 - 0.7 * depth;
        [0.05 * shade, 0.25 * shade, 0.6 * shade]
    } else {
        let level = if max_height > 0.0 {
            (tile.height / max_height).clamp(0.0, 1.0)
        } else {
            0.0
        };
        [level; 3]
    }
}

fn render(
    grid: &TileGrid,
    color: impl Fn(&Tile) -> [f32; 3] + Sync,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let width = grid.width();
    let height = grid.height();

    // Пиксели построчно, строка соответствует широте
    let pixels: Vec<u8> = (0..width * height)
        .into_par_iter()
        .flat_map_iter(|p| {
            let (x, y) = (p % width, p / width);
            let tile = &grid.tiles()[grid.index_of(x, y)];
            color(tile).map(channel)
        })
        .collect();

    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let p = (y as usize * width + x as usize) * 3;
        Rgb([pixels[p], pixels[p + 1], pixels[p + 2]])
    })
}

/// Высотная карта в оттенках серого, вода синим
#[must_use]
pub fn height_image(grid: &TileGrid) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let (max, min) = (grid.max_height(), grid.min_height());
    render(grid, |tile| terrain_color(tile, max, min))
}

/// Политическая карта: `palette[owner]` поверх рельефа; ничьи клетки и вода без цвета
#[must_use]
pub fn political_image(grid: &TileGrid, palette: &[[f32; 3]]) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let (max, min) = (grid.max_height(), grid.min_height());
    render(grid, |tile| {
        let base = terrain_color(tile, max, min);
        match palette.get(tile.owner as usize) {
            Some(country) if !tile.is_unclaimed() => {
                std::array::from_fn(|c| {
                    country[c] * COUNTRY_BLEND + base[c] * (1.0 - COUNTRY_BLEND)
                })
            }
            _ => base,
        }
    })
}

pub fn save_height_png(grid: &TileGrid, path: impl AsRef<Path>) -> ImageResult<()> {
    height_image(grid).save(path)
}

pub fn save_political_png(
    grid: &TileGrid,
    palette: &[[f32; 3]],
    path: impl AsRef<Path>,
) -> ImageResult<()> {
    political_image(grid, palette).save(path)
}
