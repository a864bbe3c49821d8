use super::{Surface, TerrainSample, TerrainSource, sphere_point};
use crate::config::OctaveSchedule;
use fastnoise_lite::{FastNoiseLite, NoiseType};
use rand::{Rng, SeedableRng};

/// Процедурный рельеф: фрактальный шум, выбранный в точках единичной сферы.
///
/// Трёхмерный шум приближается средним из трёх двумерных, посчитанных
/// на проекциях точки на плоскости xy, yz и zx.
pub struct SphereNoise {
    noise: FastNoiseLite,
    offset: [f32; 3],
    octaves: u32,
    schedule: OctaveSchedule,
    max_height: f32,
    max_depth: f32,
}

impl SphereNoise {
    #[must_use]
    pub fn new(
        seed: u64,
        octaves: u32,
        schedule: OctaveSchedule,
        max_height: f32,
        max_depth: f32,
    ) -> Self {
        let mut noise = FastNoiseLite::new();
        noise.set_seed(Some(seed as i32));
        noise.set_noise_type(Some(NoiseType::Perlin));
        // Частоту задают октавы, базовая: единичная
        noise.set_frequency(Some(1.0));

        // Сдвиг уводит сферу от начала координат, где перлин-шум вырождается
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let offset = [
            rng.gen_range(100.0..1000.0),
            rng.gen_range(100.0..1000.0),
            rng.gen_range(100.0..1000.0),
        ];

        Self {
            noise,
            offset,
            octaves: octaves.max(1),
            schedule,
            max_height,
            max_depth,
        }
    }

    /// Частота и амплитуда октавы `o` (с нуля)
    fn octave(&self, o: u32) -> (f32, f32) {
        let amplitude = 0.5_f32.powi(o as i32);
        let frequency = match self.schedule {
            OctaveSchedule::Doubling => 2.0_f32.powi(o as i32),
            OctaveSchedule::Descending => (self.octaves * 2) as f32 / (o + 1) as f32,
        };
        (frequency, amplitude)
    }

    fn planar(&self, [x, y, z]: [f32; 3]) -> f32 {
        let [ox, oy, oz] = self.offset;
        let (x, y, z) = (x + ox, y + oy, z + oz);
        let xy = self.noise.get_noise_2d(x, y);
        let yz = self.noise.get_noise_2d(y, z);
        let zx = self.noise.get_noise_2d(z, x);
        (xy + yz + zx) / 3.0
    }

    /// Фрактальная сумма октав в точке сферы
    #[must_use]
    pub fn value(&self, point: [f32; 3]) -> f32 {
        (0..self.octaves)
            .map(|o| {
                let (frequency, amplitude) = self.octave(o);
                let scaled = point.map(|c| c * frequency);
                amplitude * self.planar(scaled)
            })
            .sum()
    }
}

impl TerrainSource for SphereNoise {
    fn sample(&self, x: u32, y: u32, resolution: u32) -> TerrainSample {
        let total = self.value(sphere_point(x, y, resolution));
        if total < 0.0 {
            TerrainSample {
                height: (total * 2.0 * self.max_depth).max(-self.max_depth),
                surface: Surface::Ocean,
            }
        } else {
            TerrainSample {
                height: (total * 2.0 * self.max_height).min(self.max_height),
                surface: Surface::Land,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::generate_terrain;

    #[test]
    fn same_seed_gives_same_world() {
        let a = SphereNoise::new(7, 6, OctaveSchedule::Doubling, 100.0, 50.0);
        let b = SphereNoise::new(7, 6, OctaveSchedule::Doubling, 100.0, 50.0);
        let ga = generate_terrain(&a, 16, 100.0, -50.0);
        let gb = generate_terrain(&b, 16, 100.0, -50.0);
        assert_eq!(ga, gb);
    }

    #[test]
    fn heights_respect_bounds_and_surface() {
        let source = SphereNoise::new(3, 8, OctaveSchedule::Descending, 100.0, 50.0);
        let grid = generate_terrain(&source, 32, 100.0, -50.0);
        for tile in grid.tiles() {
            assert!(tile.height <= 100.0 && tile.height >= -50.0);
            if tile.is_ocean() {
                assert!(tile.height <= 0.0);
            } else {
                assert!(tile.height >= 0.0);
            }
            assert_eq!(tile.owner, 0);
        }
    }

    #[test]
    fn octave_schedules() {
        let doubling = SphereNoise::new(1, 4, OctaveSchedule::Doubling, 1.0, 1.0);
        assert_eq!(doubling.octave(0), (1.0, 1.0));
        assert_eq!(doubling.octave(3), (8.0, 0.125));

        let descending = SphereNoise::new(1, 4, OctaveSchedule::Descending, 1.0, 1.0);
        assert_eq!(descending.octave(0), (8.0, 1.0));
        assert_eq!(descending.octave(3), (2.0, 0.125));
    }
}
