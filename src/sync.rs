//! Пакетная синхронизация изменений с потребителями
//!
//! Потребители (рендереры) обновляются дорого, поэтому изменения за цикл
//! собираются и отправляются одним сообщением:
//! - `Full`: снимок всей сетки (после заливки или по требованию)
//! - `Batch`: явный список изменённых клеток
//! - `Single`: одна клетка (быстрый путь для одиночного клика)
//! - `Rebuild`: сетка заменена целиком (загрузка); старые буферы нужно освободить
//!   до построения новых
//!
//! Подписчики получают обновления через каналы `crossbeam-channel`.

use crate::tile::Tile;
use crate::world::World;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Новое значение одной клетки
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileChange {
    pub index: usize,
    pub tile: Tile,
}

#[derive(Debug, Clone)]
pub enum SyncUpdate {
    Full {
        resolution: u32,
        tiles: Arc<Vec<Tile>>,
    },
    Batch(Arc<Vec<TileChange>>),
    Single(TileChange),
    Rebuild {
        resolution: u32,
        max_height: f32,
        min_height: f32,
        tiles: Arc<Vec<Tile>>,
        palette: Arc<Vec<[f32; 3]>>,
    },
}

/// Что сделал цикл синхронизации
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Idle,
    Full,
    Batch(usize),
    Single,
}

/// Журнал изменений между циклами синхронизации
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    /// Массовые изменения (заливка): в следующем цикле уйдёт полный снимок
    changed: AtomicBool,
    pending: Mutex<Vec<TileChange>>,
}

impl ChangeLog {
    pub(crate) fn mark_changed(&self) {
        self.changed.store(true, Ordering::Release);
    }

    pub(crate) fn record(&self, change: TileChange) {
        self.pending.lock().push(change);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.changed.load(Ordering::Acquire) || !self.pending.lock().is_empty()
    }

    /// Забирает накопленное: (нужен ли полный снимок, одиночные изменения)
    fn take(&self) -> (bool, Vec<TileChange>) {
        let pending = std::mem::take(&mut *self.pending.lock());
        let full = self.changed.swap(false, Ordering::AcqRel);
        (full, pending)
    }

    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
        self.changed.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<Sender<SyncUpdate>>>,
}

impl Subscribers {
    fn add(&self) -> Receiver<SyncUpdate> {
        let (sender, receiver) = unbounded();
        self.senders.lock().push(sender);
        receiver
    }

    fn len(&self) -> usize {
        self.senders.lock().len()
    }

    /// Рассылает обновление; отключившиеся подписчики удаляются
    pub(crate) fn dispatch(&self, update: &SyncUpdate) -> usize {
        let mut senders = self.senders.lock();
        let before = senders.len();
        senders.retain(|sender| sender.send(update.clone()).is_ok());
        let dropped = before - senders.len();
        if dropped > 0 {
            tracing::warn!(dropped, "sync subscribers disconnected");
        }
        senders.len()
    }
}

impl World {
    /// Подписка на пакетные обновления сетки
    pub fn subscribe(&self) -> Receiver<SyncUpdate> {
        self.shared().subscribers.add()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared().subscribers.len()
    }

    /// Есть ли неотправленные изменения
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared().changes.is_dirty()
    }

    /// Один цикл синхронизации: отправляет накопленные изменения одним обновлением.
    ///
    /// Безопасно вызывать во время работы заливки: флаг изменений поднимается
    /// после каждой записи, поэтому захват попадёт в этот или следующий цикл.
    /// Журнал забирается и рассылается под блокировкой чтения сетки, так что
    /// обновление не может обогнать `Rebuild` от загрузки или отстать от него.
    pub fn sync(&self) -> SyncOutcome {
        let shared = self.shared();
        let grid = shared.grid.read();
        let (full, pending) = shared.changes.take();

        let (update, outcome) = if full {
            let update = SyncUpdate::Full {
                resolution: grid.resolution(),
                tiles: Arc::new(grid.tiles().to_vec()),
            };
            (update, SyncOutcome::Full)
        } else {
            match pending.len() {
                0 => return SyncOutcome::Idle,
                1 => (SyncUpdate::Single(pending[0]), SyncOutcome::Single),
                n => (SyncUpdate::Batch(Arc::new(pending)), SyncOutcome::Batch(n)),
            }
        };

        let receivers = shared.subscribers.dispatch(&update);
        drop(grid);
        tracing::debug!(?outcome, receivers, "sync dispatched");
        outcome
    }

    /// Принудительная полная пересинхронизация в следующем цикле
    pub fn request_full_sync(&self) {
        self.shared().changes.mark_changed();
    }
}

/// Копия данных сетки на стороне потребителя (буферы рендерера).
///
/// Поддерживается в актуальном состоянии применением `SyncUpdate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorBuffer {
    resolution: u32,
    heights: Vec<f32>,
    owners: Vec<u32>,
    details: Vec<u32>,
    palette: Vec<[f32; 3]>,
    rebuilds: usize,
}

impl MirrorBuffer {
    /// Строит буферы из текущего состояния мира
    #[must_use]
    pub fn from_world(world: &World) -> Self {
        let grid = world.snapshot();
        let mut buffer = Self {
            resolution: grid.resolution(),
            palette: world.palette(),
            ..Self::default()
        };
        buffer.fill_from(grid.tiles());
        buffer
    }

    fn fill_from(&mut self, tiles: &[Tile]) {
        self.heights = tiles.iter().map(|t| t.height).collect();
        self.owners = tiles.iter().map(|t| t.owner).collect();
        self.details = tiles.iter().map(|t| t.details.bits()).collect();
    }

    fn write(&mut self, change: &TileChange) {
        let i = change.index;
        if i < self.heights.len() {
            self.heights[i] = change.tile.height;
            self.owners[i] = change.tile.owner;
            self.details[i] = change.tile.details.bits();
        }
    }

    pub fn apply(&mut self, update: &SyncUpdate) {
        match update {
            SyncUpdate::Full { resolution, tiles } => {
                self.resolution = *resolution;
                self.fill_from(tiles);
            }
            SyncUpdate::Batch(changes) => {
                for change in changes.iter() {
                    self.write(change);
                }
            }
            SyncUpdate::Single(change) => self.write(change),
            SyncUpdate::Rebuild {
                resolution,
                tiles,
                palette,
                ..
            } => {
                self.release();
                self.resolution = *resolution;
                self.palette = palette.as_ref().clone();
                self.fill_from(tiles);
                self.rebuilds += 1;
            }
        }
    }

    /// Применяет всё, что уже лежит в канале; возвращает число обновлений
    pub fn drain(&mut self, updates: &Receiver<SyncUpdate>) -> usize {
        let mut applied = 0;
        while let Ok(update) = updates.try_recv() {
            self.apply(&update);
            applied += 1;
        }
        applied
    }

    /// Освобождает буферы
    pub fn release(&mut self) {
        self.heights = Vec::new();
        self.owners = Vec::new();
        self.details = Vec::new();
        self.palette = Vec::new();
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.heights.is_empty()
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    #[must_use]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    #[must_use]
    pub fn owners(&self) -> &[u32] {
        &self.owners
    }

    #[must_use]
    pub fn details(&self) -> &[u32] {
        &self.details
    }

    #[must_use]
    pub fn palette(&self) -> &[[f32; 3]] {
        &self.palette
    }

    /// Сколько раз буферы пересоздавались после загрузки
    #[must_use]
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_log_take_resets_state() {
        let log = ChangeLog::default();
        assert!(!log.is_dirty());

        log.record(TileChange {
            index: 3,
            tile: Tile::land(1.0),
        });
        log.mark_changed();
        assert!(log.is_dirty());

        let (full, pending) = log.take();
        assert!(full);
        assert_eq!(pending.len(), 1);
        assert!(!log.is_dirty());
    }

    #[test]
    fn mirror_applies_single_and_batch() {
        let tiles = vec![Tile::land(1.0); 4];
        let mut mirror = MirrorBuffer::default();
        mirror.apply(&SyncUpdate::Full {
            resolution: 1,
            tiles: Arc::new(tiles.clone()),
        });
        assert_eq!(mirror.heights(), &[1.0, 1.0, 1.0, 1.0]);

        let mut owned = Tile::land(1.0);
        owned.owner = 7;
        mirror.apply(&SyncUpdate::Single(TileChange {
            index: 2,
            tile: owned,
        }));
        mirror.apply(&SyncUpdate::Batch(Arc::new(vec![
            TileChange {
                index: 0,
                tile: Tile::ocean(-2.0),
            },
            // за пределами буфера: игнорируется
            TileChange {
                index: 99,
                tile: owned,
            },
        ])));

        assert_eq!(mirror.owners(), &[0, 0, 7, 0]);
        assert_eq!(mirror.heights()[0], -2.0);
        assert_eq!(mirror.details()[0], 1 << 31);
    }

    #[test]
    fn rebuild_releases_then_replaces() {
        let mut mirror = MirrorBuffer::default();
        mirror.apply(&SyncUpdate::Full {
            resolution: 1,
            tiles: Arc::new(vec![Tile::land(1.0); 2]),
        });
        mirror.apply(&SyncUpdate::Rebuild {
            resolution: 2,
            max_height: 5.0,
            min_height: -5.0,
            tiles: Arc::new(vec![Tile::land(3.0); 8]),
            palette: Arc::new(vec![[0.0; 3], [1.0, 0.0, 0.0]]),
        });
        assert_eq!(mirror.resolution(), 2);
        assert_eq!(mirror.heights().len(), 8);
        assert_eq!(mirror.palette().len(), 2);
        assert_eq!(mirror.rebuilds(), 1);

        mirror.release();
        assert!(mirror.is_released());
    }
}
