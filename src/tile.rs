//! Клетка мира и её упакованные флаги рельефа
//!
//! Позиции битов в `TileDetails` входят в формат сохранения и не должны меняться:
//! - бит 31: океан
//! - бит 30: озеро
//! - остальные биты зарезервированы и сохраняются как есть

use bitflags::bitflags;

/// Владелец «ничейной» клетки
pub const UNCLAIMED: u32 = 0;

bitflags! {
    /// Флаги рельефа клетки, упакованные в `u32`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TileDetails: u32 {
        const OCEAN = 1 << 31;
        const LAKE = 1 << 30;
        // Зарезервированные биты не теряются при чтении/записи
        const _ = !0;
    }
}

impl TileDetails {
    #[must_use]
    pub fn is_ocean(self) -> bool {
        self.contains(Self::OCEAN)
    }

    #[must_use]
    pub fn is_lake(self) -> bool {
        self.contains(Self::LAKE)
    }

    pub fn set_ocean(&mut self, ocean: bool) {
        self.set(Self::OCEAN, ocean);
    }

    pub fn set_lake(&mut self, lake: bool) {
        self.set(Self::LAKE, lake);
    }
}

/// Одна клетка сетки мира
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tile {
    /// Высота относительно уровня моря (отрицательная: под водой)
    pub height: f32,
    /// Идентификатор страны-владельца (`0`: ничья)
    pub owner: u32,
    pub details: TileDetails,
}

impl Tile {
    #[must_use]
    pub fn land(height: f32) -> Self {
        Self {
            height,
            owner: UNCLAIMED,
            details: TileDetails::empty(),
        }
    }

    #[must_use]
    pub fn ocean(height: f32) -> Self {
        Self {
            height,
            owner: UNCLAIMED,
            details: TileDetails::OCEAN,
        }
    }

    #[must_use]
    pub fn lake(height: f32) -> Self {
        Self {
            height,
            owner: UNCLAIMED,
            details: TileDetails::LAKE,
        }
    }

    #[must_use]
    pub fn is_ocean(&self) -> bool {
        self.details.is_ocean()
    }

    #[must_use]
    pub fn is_lake(&self) -> bool {
        self.details.is_lake()
    }

    /// Может ли клетка иметь владельца при заданной политике для озёр.
    ///
    /// Решает только флаг океана; знак высоты не учитывается.
    #[must_use]
    pub fn is_claimable(&self, lakes_claimable: bool) -> bool {
        !self.is_ocean() && (lakes_claimable || !self.is_lake())
    }

    #[must_use]
    pub fn is_unclaimed(&self) -> bool {
        self.owner == UNCLAIMED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_match_save_format() {
        assert_eq!(TileDetails::OCEAN.bits(), 0x8000_0000);
        assert_eq!(TileDetails::LAKE.bits(), 0x4000_0000);
    }

    #[test]
    fn reserved_bits_survive_flag_edits() {
        let mut details = TileDetails::from_bits_retain(0x0000_00ff);
        details.set_ocean(true);
        details.set_lake(true);
        assert_eq!(details.bits(), 0xc000_00ff);

        details.set_ocean(false);
        assert!(!details.is_ocean());
        assert!(details.is_lake());
        assert_eq!(details.bits(), 0x4000_00ff);
    }

    #[test]
    fn lake_claimability_follows_policy() {
        let lake = Tile::lake(-3.0);
        assert!(lake.is_claimable(true));
        assert!(!lake.is_claimable(false));

        let ocean = Tile::ocean(-100.0);
        assert!(!ocean.is_claimable(true));

        // Суша ниже уровня моря остаётся сушей: решает флаг, а не высота
        assert!(Tile::land(-5.0).is_claimable(false));
    }
}
