use worldmap::{CountryRegistry, FillOutcome, Tile, TileGrid, World, WorldOptions};

/// Сетка 16×8 с кольцом океана на широте y = 4: северная шапка 16×4 и южная 16×3
fn ringed_world() -> World {
    let mut grid = TileGrid::new(8, 100.0, -100.0);
    for x in 0..16 {
        let index = grid.index_of(x, 4);
        grid.tiles_mut()[index] = Tile::ocean(-20.0);
    }
    let countries = CountryRegistry::parse("1, 1, 0, 0, Red\n2, 0, 0, 1, Blue").unwrap();
    World::new(grid, countries, WorldOptions::default()).unwrap()
}

#[test]
fn fill_never_crosses_ocean() {
    let world = ringed_world();
    let report = world.set_owner_fill((0, 0), 1).unwrap().wait();

    assert_eq!(report.outcome, FillOutcome::Completed);
    assert_eq!(report.claimed, 16 * 4);
    for x in 0..16 {
        for y in 0..4 {
            assert_eq!(world.owner_at(x, y), 1);
        }
        assert_eq!(world.owner_at(x, 4), 0);
        for y in 5..8 {
            assert_eq!(world.owner_at(x, y), 0, "southern cap at ({x}, {y})");
        }
    }
}

#[test]
fn fill_treats_foreign_land_as_a_wall() {
    let world = ringed_world();
    for x in 0..16 {
        assert_eq!(world.set_owner_at((x, 2), 2), Ok(true));
    }

    let report = world.fill_blocking((5, 0), 1).unwrap();
    assert_eq!(report.claimed, 16 * 2);
    for x in 0..16 {
        assert_eq!(world.owner_at(x, 2), 2);
        assert_eq!(world.owner_at(x, 3), 0);
    }
}

#[test]
fn fill_is_idempotent() {
    let world = ringed_world();
    let first = world.fill_blocking((3, 6), 2).unwrap();
    assert_eq!(first.claimed, 16 * 3);
    let before = world.snapshot();

    let second = world.fill_blocking((3, 6), 2).unwrap();
    assert_eq!(second.outcome, FillOutcome::Completed);
    assert_eq!(second.claimed, 0);
    assert_eq!(world.snapshot(), before);
}

#[test]
fn fill_start_resolves_through_pole_wrap() {
    let world = ringed_world();
    // (3, -1) лежит за южным полюсом и приводится к (11, 0)
    let report = world.fill_blocking((3, -1), 1).unwrap();
    assert_eq!(report.claimed, 16 * 4);
    assert_eq!(world.owner_at(11, 0), 1);
}

#[test]
fn cancelled_fill_keeps_claimed_tiles() {
    let world = ringed_world();
    let task = world.set_owner_fill((0, 0), 1).unwrap();
    task.cancel();
    let report = task.wait();

    assert!(matches!(
        report.outcome,
        FillOutcome::Cancelled | FillOutcome::Completed
    ));
    let owned = world
        .snapshot()
        .tiles()
        .iter()
        .filter(|tile| tile.owner == 1)
        .count();
    assert_eq!(owned, report.claimed);
}
