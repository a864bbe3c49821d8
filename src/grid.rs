use crate::tile::Tile;

/// Нижняя граница разрешения для конфигурации
pub const MIN_RESOLUTION: u32 = 128;
/// Верхняя граница разрешения: дальше память и время генерации непрактичны
pub const MAX_RESOLUTION: u32 = 8192;

/// Приводит произвольную пару координат к клетке сетки по правилам сферы.
///
/// Долгота зацикливается по модулю `2 * resolution`. При выходе за полюс широта
/// прижимается к краю, а долгота сдвигается на половину ширины карты: переход
/// через полюс ведёт на противоположный меридиан.
///
/// # Пример
/// ```
/// use worldmap::grid::wrap_position;
/// assert_eq!(wrap_position(100, 105, -1), (5, 0));
/// assert_eq!(wrap_position(100, -1, 10), (199, 10));
/// ```
#[must_use]
pub fn wrap_position(resolution: u32, x: i64, y: i64) -> (usize, usize) {
    let r = i64::from(resolution);
    let mut x = x.rem_euclid(2 * r);
    let mut y = y;

    if y < 0 || y > r - 1 {
        y = y.clamp(0, r - 1);
        if x < r {
            x += r;
        } else {
            x -= r;
        }
    }

    (x as usize, y as usize)
}

/// Равнопромежуточная сетка клеток планеты: `2R` по долготе × `R` по широте.
///
/// Хранится плоским массивом, индекс `x * resolution + y`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    resolution: u32,
    max_height: f32,
    min_height: f32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Пустая (сплошь суша нулевой высоты) сетка
    #[must_use]
    pub fn new(resolution: u32, max_height: f32, min_height: f32) -> Self {
        Self {
            resolution,
            max_height,
            min_height,
            tiles: vec![Tile::default(); tile_count(resolution)],
        }
    }

    /// Собирает сетку из готового массива клеток.
    ///
    /// Возвращает `None`, если длина массива не равна `2 * resolution²`.
    #[must_use]
    pub fn from_tiles(
        resolution: u32,
        max_height: f32,
        min_height: f32,
        tiles: Vec<Tile>,
    ) -> Option<Self> {
        if resolution == 0 || tiles.len() != tile_count(resolution) {
            return None;
        }
        Some(Self {
            resolution,
            max_height,
            min_height,
            tiles,
        })
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Ширина карты (клеток по долготе)
    #[must_use]
    pub fn width(&self) -> usize {
        2 * self.resolution as usize
    }

    /// Высота карты (клеток по широте)
    #[must_use]
    pub fn height(&self) -> usize {
        self.resolution as usize
    }

    #[must_use]
    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    #[must_use]
    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        x * self.resolution as usize + y
    }

    #[must_use]
    pub fn position_of(&self, index: usize) -> (usize, usize) {
        let r = self.resolution as usize;
        (index / r, index % r)
    }

    #[must_use]
    pub fn validate_position(&self, x: i64, y: i64) -> (usize, usize) {
        wrap_position(self.resolution, x, y)
    }

    /// Индекс клетки для произвольных координат (с учётом сферы)
    #[must_use]
    pub fn wrapped_index(&self, x: i64, y: i64) -> usize {
        let (x, y) = self.validate_position(x, y);
        self.index_of(x, y)
    }

    /// Четыре ортогональных соседа, каждый приведён через `validate_position`
    #[must_use]
    pub fn neighbors4(&self, x: usize, y: usize) -> [(usize, usize); 4] {
        let (x, y) = (x as i64, y as i64);
        [
            self.validate_position(x + 1, y),
            self.validate_position(x - 1, y),
            self.validate_position(x, y + 1),
            self.validate_position(x, y - 1),
        ]
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index)
    }

    #[must_use]
    pub fn tile(&self, x: i64, y: i64) -> Tile {
        self.tiles[self.wrapped_index(x, y)]
    }

    #[must_use]
    pub fn height_at(&self, x: i64, y: i64) -> f32 {
        self.tile(x, y).height
    }

    #[must_use]
    pub fn owner_at(&self, x: i64, y: i64) -> u32 {
        self.tile(x, y).owner
    }

    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Доля клеток с флагом океана
    #[must_use]
    pub fn ocean_ratio(&self) -> f32 {
        let oceans = self.tiles.iter().filter(|t| t.is_ocean()).count();
        oceans as f32 / self.tiles.len().max(1) as f32
    }
}

/// Число клеток сетки заданного разрешения
#[must_use]
pub fn tile_count(resolution: u32) -> usize {
    2 * resolution as usize * resolution as usize
}
