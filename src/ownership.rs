//! Изменение владельцев клеток
//!
//! Только этот модуль пишет поле `owner`. Правила:
//! - океан не получает владельца никогда, озеро: если разрешено настройкой мира
//! - повторное присвоение того же владельца и попытка захватить океан: не ошибки,
//!   а пустые операции (`Ok(false)`)
//! - заливка захватывает только ничью сушу и не переходит на чужие земли
//!
//! Заливка выполняется в пуле потоков мира и возвращает наблюдаемый `FillTask`.

use crate::country::NO_NAME_POINT;
use crate::sync::{SyncUpdate, TileChange};
use crate::tile::{Tile, UNCLAIMED};
use crate::world::{Shared, World};
use crossbeam_channel::{Receiver, bounded};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("tile index {index} out of range for grid of {len} tiles")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("unknown country id {0}")]
    UnknownCountry(u32),
}

/// Чем закончилась заливка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Completed,
    /// Остановлена через `FillTask::cancel`
    Cancelled,
    /// Сетку заменили (загрузка) во время заливки
    Superseded,
    /// Стартовая клетка не может иметь владельца, либо владелец `0`
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    /// Сколько клеток сменили владельца
    pub claimed: usize,
    pub outcome: FillOutcome,
}

#[derive(Debug, Default)]
struct FillControl {
    cancelled: AtomicBool,
    finished: AtomicBool,
    claimed: AtomicUsize,
}

/// Дескриптор заливки, запущенной в пуле мира
#[derive(Debug)]
pub struct FillTask {
    control: Arc<FillControl>,
    result: Receiver<FillReport>,
}

impl FillTask {
    fn done(report: FillReport) -> Self {
        let (sender, result) = bounded(1);
        // канал пуст, отправка не блокируется
        let _ = sender.send(report);
        let control = FillControl::default();
        control.finished.store(true, Ordering::Release);
        Self {
            control: Arc::new(control),
            result,
        }
    }

    /// Просит заливку остановиться; уже захваченные клетки остаются захваченными
    pub fn cancel(&self) {
        self.control.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.control.finished.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn claimed_so_far(&self) -> usize {
        self.control.claimed.load(Ordering::Acquire)
    }

    /// Ждёт завершения
    #[must_use]
    pub fn wait(self) -> FillReport {
        self.result.recv().unwrap_or(FillReport {
            claimed: self.control.claimed.load(Ordering::Acquire),
            outcome: FillOutcome::Cancelled,
        })
    }
}

impl World {
    fn check_country(&self, owner: u32) -> Result<(), OwnershipError> {
        if owner == UNCLAIMED || self.shared().countries.read().contains(owner) {
            Ok(())
        } else {
            Err(OwnershipError::UnknownCountry(owner))
        }
    }

    /// Запись владельца под блокировкой одной клетки.
    ///
    /// `publish` вызывается до снятия блокировки: изменение попадает в журнал
    /// или к подписчикам в том же порядке, что и записи, и не может пережить
    /// замену сетки при загрузке.
    fn assign(
        &self,
        index: usize,
        owner: u32,
        publish: impl FnOnce(&Shared, TileChange),
    ) -> Result<bool, OwnershipError> {
        self.check_country(owner)?;
        let shared = self.shared();
        let mut grid = shared.grid.write();
        let len = grid.len();
        let tile = grid
            .get_mut(index)
            .ok_or(OwnershipError::IndexOutOfRange { index, len })?;

        if tile.owner == owner || !tile.is_claimable(shared.lakes_claimable) {
            return Ok(false);
        }
        tile.owner = owner;
        publish(shared, TileChange { index, tile: *tile });
        Ok(true)
    }

    /// Назначает владельца клетке по индексу.
    ///
    /// `Ok(false)`: ничего не изменилось (тот же владелец или клетку нельзя захватить).
    /// Изменение попадёт в следующий цикл `sync`.
    pub fn set_owner(&self, index: usize, owner: u32) -> Result<bool, OwnershipError> {
        self.assign(index, owner, |shared, change| shared.changes.record(change))
    }

    /// То же, что `set_owner`, но по координатам (с учётом сферы)
    pub fn set_owner_at(&self, position: (i64, i64), owner: u32) -> Result<bool, OwnershipError> {
        let index = self.shared().grid.read().wrapped_index(position.0, position.1);
        self.set_owner(index, owner)
    }

    /// Назначает владельца и сразу отправляет подписчикам одну клетку, минуя пакет
    pub fn set_owner_instant(
        &self,
        position: (i64, i64),
        owner: u32,
    ) -> Result<bool, OwnershipError> {
        let index = self.shared().grid.read().wrapped_index(position.0, position.1);
        self.assign(index, owner, |shared, change| {
            shared.subscribers.dispatch(&SyncUpdate::Single(change));
        })
    }

    /// Заменяет клетку целиком (редактор карты).
    ///
    /// Клетка, которая не может иметь владельца, сохраняется ничьей.
    pub fn change_tile(&self, position: (i64, i64), mut tile: Tile) -> Result<(), OwnershipError> {
        self.check_country(tile.owner)?;
        if !tile.is_claimable(self.lakes_claimable()) {
            tile.owner = UNCLAIMED;
        }

        let shared = self.shared();
        let mut grid = shared.grid.write();
        let index = grid.wrapped_index(position.0, position.1);
        grid.tiles_mut()[index] = tile;
        shared.changes.record(TileChange { index, tile });
        Ok(())
    }

    /// Запускает заливку в пуле потоков мира
    pub fn set_owner_fill(
        &self,
        start: (i64, i64),
        owner: u32,
    ) -> Result<FillTask, OwnershipError> {
        self.check_country(owner)?;
        if owner == UNCLAIMED {
            return Ok(FillTask::done(FillReport {
                claimed: 0,
                outcome: FillOutcome::Rejected,
            }));
        }

        let shared = Arc::clone(self.shared());
        let control = Arc::new(FillControl::default());
        let (sender, result) = bounded(1);
        let task_control = Arc::clone(&control);
        let epoch = shared.epoch();

        self.workers.spawn(move || {
            let report = flood_fill(&shared, start, owner, epoch, &task_control);
            task_control.finished.store(true, Ordering::Release);
            let _ = sender.send(report);
        });

        Ok(FillTask { control, result })
    }

    /// Заливка в текущем потоке
    pub fn fill_blocking(&self, start: (i64, i64), owner: u32) -> Result<FillReport, OwnershipError> {
        self.check_country(owner)?;
        if owner == UNCLAIMED {
            return Ok(FillReport {
                claimed: 0,
                outcome: FillOutcome::Rejected,
            });
        }
        let shared = self.shared();
        Ok(flood_fill(
            shared,
            start,
            owner,
            shared.epoch(),
            &FillControl::default(),
        ))
    }

    /// Пересчитывает `name_point`: центр владений каждой страны
    pub fn recompute_name_points(&self) {
        let shared = self.shared();
        let mut sums: HashMap<u32, (f64, f64, usize)> = HashMap::new();
        {
            let grid = shared.grid.read();
            for (i, tile) in grid.tiles().iter().enumerate() {
                if tile.owner == UNCLAIMED {
                    continue;
                }
                let (x, y) = grid.position_of(i);
                let entry = sums.entry(tile.owner).or_insert((0.0, 0.0, 0));
                entry.0 += x as f64;
                entry.1 += y as f64;
                entry.2 += 1;
            }
        }

        let mut countries = shared.countries.write();
        let ids: Vec<u32> = countries
            .iter()
            .map(|c| c.id)
            .filter(|&id| id != UNCLAIMED)
            .collect();
        for id in ids {
            let point = sums.get(&id).map_or(NO_NAME_POINT, |&(sx, sy, n)| {
                ((sx / n as f64) as f32, (sy / n as f64) as f32)
            });
            countries.set_name_point(id, point);
        }
    }
}

/// Обход в ширину по ничьей суше от `start`.
///
/// Каждая запись берёт блокировку сетки на одну клетку. Эпоха сверяется под
/// блокировкой: если сетку заменили, заливка прекращается.
fn flood_fill(
    shared: &Shared,
    start: (i64, i64),
    owner: u32,
    epoch: u64,
    control: &FillControl,
) -> FillReport {
    let lakes = shared.lakes_claimable;
    let report = |claimed, outcome| FillReport { claimed, outcome };

    let start_index = {
        let grid = shared.grid.read();
        if shared.epoch() != epoch {
            return report(0, FillOutcome::Superseded);
        }
        let (x, y) = grid.validate_position(start.0, start.1);
        let index = grid.index_of(x, y);
        if !grid.tiles()[index].is_claimable(lakes) {
            return report(0, FillOutcome::Rejected);
        }
        index
    };
    tracing::debug!(owner, start = ?start, "fill started");

    let mut visited = HashSet::from([start_index]);
    let mut queue = VecDeque::from([start_index]);
    let mut claimed = 0;

    while let Some(index) = queue.pop_front() {
        if control.cancelled.load(Ordering::Acquire) {
            tracing::debug!(owner, claimed, "fill cancelled");
            return report(claimed, FillOutcome::Cancelled);
        }

        let neighbors = {
            let mut grid = shared.grid.write();
            if shared.epoch() != epoch {
                return report(claimed, FillOutcome::Superseded);
            }
            let tile = &mut grid.tiles_mut()[index];
            // Стартовая клетка захватывается всегда; остальные: только если
            // за время ожидания в очереди их никто не занял
            let still_free = index == start_index || tile.owner == UNCLAIMED;
            if !tile.is_claimable(lakes) || !still_free {
                continue;
            }
            if tile.owner != owner {
                tile.owner = owner;
                claimed += 1;
                control.claimed.fetch_add(1, Ordering::AcqRel);
                shared.changes.mark_changed();
            }
            let (x, y) = grid.position_of(index);
            grid.neighbors4(x, y)
        };

        let grid = shared.grid.read();
        if shared.epoch() != epoch {
            return report(claimed, FillOutcome::Superseded);
        }
        for (nx, ny) in neighbors {
            let next = grid.index_of(nx, ny);
            let tile = &grid.tiles()[next];
            if tile.is_claimable(lakes) && tile.owner == UNCLAIMED && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    tracing::debug!(owner, claimed, "fill finished");
    report(claimed, FillOutcome::Completed)
}
