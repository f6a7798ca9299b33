//! Random placement and food replenishment.

use std::collections::HashSet;

use rand::Rng;

use crate::entity::{Cell, Food, Snake};

const MAX_PLACEMENT_ATTEMPTS: u32 = 2000;

/// Draws a uniformly random cell not occupied by any alive snake body cell
/// or food. Attempts are bounded; on exhaustion returns `(0,0)` and lets
/// the next tick re-shuffle.
pub fn rand_free_cell(
    snakes: &[Snake],
    foods: &[Food],
    width: i32,
    height: i32,
    rng: &mut impl Rng,
) -> Cell {
    let mut occupied: HashSet<Cell> = HashSet::new();
    for s in snakes {
        if !s.alive {
            continue;
        }
        occupied.extend(s.body.iter().copied());
    }
    for f in foods {
        occupied.insert(f.cell());
    }

    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let candidate = Cell::new(rng.random_range(0..width), rng.random_range(0..height));
        if !occupied.contains(&candidate) {
            return candidate;
        }
    }
    Cell::new(0, 0)
}

/// Tops the food list up to `food_count` fresh pellets.
pub fn ensure_food_count(
    snakes: &[Snake],
    foods: &mut Vec<Food>,
    food_count: usize,
    width: i32,
    height: i32,
    rng: &mut impl Rng,
) {
    while foods.len() < food_count {
        let pos = rand_free_cell(snakes, foods, width, height, rng);
        foods.push(Food::from(pos));
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::entity::Dir;

    fn snake_at(id: i32, cells: &[(i32, i32)]) -> Snake {
        Snake {
            id,
            user_id: id,
            color: "#00ff00".to_string(),
            dir: Dir::Stop,
            paused: false,
            alive: true,
            grow: 0,
            body: cells.iter().map(|&(x, y)| Cell::new(x, y)).collect(),
        }
    }

    #[test]
    fn free_cell_avoids_snakes_and_food() {
        let mut rng = StdRng::seed_from_u64(7);
        // 2x2 grid with three cells taken: only (1,1) remains.
        let snakes = vec![snake_at(1, &[(0, 0), (1, 0)])];
        let foods = vec![Food { x: 0, y: 1 }];

        for _ in 0..32 {
            assert_eq!(rand_free_cell(&snakes, &foods, 2, 2, &mut rng), Cell::new(1, 1));
        }
    }

    #[test]
    fn exhausted_grid_falls_back_to_origin() {
        let mut rng = StdRng::seed_from_u64(7);
        let snakes = vec![snake_at(1, &[(0, 0), (1, 0), (0, 1), (1, 1)])];

        assert_eq!(rand_free_cell(&snakes, &[], 2, 2, &mut rng), Cell::new(0, 0));
    }

    #[test]
    fn food_is_topped_up_to_target() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut foods = vec![Food { x: 3, y: 3 }];

        ensure_food_count(&[], &mut foods, 4, 10, 10, &mut rng);

        assert_eq!(foods.len(), 4);
        for i in 0..foods.len() {
            for j in (i + 1)..foods.len() {
                assert_ne!(foods[i], foods[j]);
            }
        }
    }

    #[test]
    fn dead_snake_cells_are_free() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut dead = snake_at(1, &[(0, 0), (1, 0), (0, 1)]);
        dead.alive = false;
        let foods = vec![Food { x: 1, y: 1 }];

        // All snake cells are ignored, so any of the three freed cells can
        // come back.
        let cell = rand_free_cell(&[dead], &foods, 2, 2, &mut rng);
        assert_ne!(cell, Cell::new(1, 1));
    }
}
