use crate::grid::TileGrid;
use std::collections::VecDeque;

/// Переводит в озёра все океанские водоёмы площадью меньше `min_area` клеток.
///
/// Водоём: связная по четырём соседям область клеток с флагом океана,
/// связность считается по правилам сферы (через полюс и линию перемены дат).
/// Возвращает число перефлагованных клеток.
#[allow(clippy::needless_range_loop)]
pub fn reclassify_small_oceans(grid: &mut TileGrid, min_area: usize) -> usize {
    let total = grid.len();
    let mut visited = vec![false; total];
    let mut reflagged = 0;

    // Очередь для BFS
    let mut queue = VecDeque::new();
    let mut body = Vec::new();

    for start in 0..total {
        if visited[start] || !grid.tiles()[start].is_ocean() {
            continue;
        }

        body.clear();
        visited[start] = true;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            body.push(idx);
            let (x, y) = grid.position_of(idx);
            for (nx, ny) in grid.neighbors4(x, y) {
                let nidx = grid.index_of(nx, ny);
                if !visited[nidx] && grid.tiles()[nidx].is_ocean() {
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }
        }

        // Маленький водоём: внутреннее море, а не мировой океан
        if body.len() < min_area {
            let tiles = grid.tiles_mut();
            for &idx in &body {
                tiles[idx].details.set_ocean(false);
                tiles[idx].details.set_lake(true);
            }
            reflagged += body.len();
        }
    }

    reflagged
}
