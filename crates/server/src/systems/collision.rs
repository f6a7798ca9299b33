//! Authoritative collision resolution.
//!
//! Resolution order is fixed: self-hits, then inter-snake arbitration in
//! ascending id order, then food, then death events, then compaction of the
//! live set. Event order inside one tick follows the same sequence.

use std::collections::HashMap;

use rand::Rng;

use crate::entity::{Cell, Food, Snake};
use crate::systems::spawn;

/// Gameplay event kinds, in storage string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Spawn,
    Food,
    SelfCollision,
    Bite,
    Bitten,
    Death,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Spawn => "SPAWN",
            EventType::Food => "FOOD",
            EventType::SelfCollision => "SELF_COLLISION",
            EventType::Bite => "BITE",
            EventType::Bitten => "BITTEN",
            EventType::Death => "DEATH",
        }
    }
}

/// One gameplay event produced during resolution.
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub event_type: EventType,
    pub snake_id: i32,
    pub other_snake_id: i32,
    pub x: i32,
    pub y: i32,
    pub delta_length: i32,
}

fn find_snake(snakes: &mut [Snake], snake_id: i32) -> Option<&mut Snake> {
    snakes.iter_mut().find(|s| s.id == snake_id)
}

/// Resolves all collisions for the state produced by movement.
///
/// `food_changed` reports whether any pellet was eaten and replaced.
pub fn run(
    snakes: &mut Vec<Snake>,
    foods: &mut [Food],
    width: i32,
    height: i32,
    rng: &mut impl Rng,
    events: &mut Vec<CollisionEvent>,
    food_changed: &mut bool,
) {
    *food_changed = false;

    // Self-hits first: a snake that collapsed to nothing here is already
    // dead and skipped by the arbitration below.
    for s in snakes.iter_mut() {
        if !s.alive || s.body.len() < 2 {
            continue;
        }
        let head = s.body[0];
        let hit_self = s.body[1..].iter().any(|&c| c == head);
        if hit_self {
            s.body.pop();
            s.paused = true;
            events.push(CollisionEvent {
                event_type: EventType::SelfCollision,
                snake_id: s.id,
                other_snake_id: 0,
                x: head.x,
                y: head.y,
                delta_length: -1,
            });
            if s.body.is_empty() {
                s.alive = false;
            }
        }
    }

    let mut cell_owners: HashMap<Cell, Vec<i32>> = HashMap::new();
    for s in snakes.iter() {
        if !s.alive {
            continue;
        }
        for &c in &s.body {
            cell_owners.entry(c).or_default().push(s.id);
        }
    }

    let mut snake_ids: Vec<i32> = snakes.iter().filter(|s| s.alive).map(|s| s.id).collect();
    snake_ids.sort_unstable();

    for sid in snake_ids {
        let Some(attacker) = snakes.iter().find(|s| s.id == sid) else {
            continue;
        };
        if !attacker.alive || attacker.body.is_empty() {
            continue;
        }
        let impact = attacker.body[0];

        let Some(owners) = cell_owners.get(&impact) else {
            continue;
        };
        let Some(&defender_id) = owners.iter().find(|&&owner| owner != sid) else {
            continue;
        };
        if !find_snake(snakes, defender_id).is_some_and(|d| d.alive) {
            continue;
        }

        {
            let attacker = find_snake(snakes, sid).expect("attacker present");
            attacker.grow += 1;
            attacker.dir = attacker.dir.opposite();
            attacker.paused = false;
        }
        events.push(CollisionEvent {
            event_type: EventType::Bite,
            snake_id: sid,
            other_snake_id: defender_id,
            x: impact.x,
            y: impact.y,
            delta_length: 1,
        });

        let defender = find_snake(snakes, defender_id).expect("defender present");
        if !defender.body.is_empty() {
            defender.body.pop();
            events.push(CollisionEvent {
                event_type: EventType::Bitten,
                snake_id: defender_id,
                other_snake_id: sid,
                x: impact.x,
                y: impact.y,
                delta_length: -1,
            });
        }
        if defender.body.is_empty() {
            defender.alive = false;
        }
    }

    for i in 0..snakes.len() {
        if !snakes[i].alive || snakes[i].body.is_empty() {
            continue;
        }
        let head = snakes[i].body[0];
        for j in 0..foods.len() {
            if foods[j].cell() == head {
                snakes[i].grow += 1;
                events.push(CollisionEvent {
                    event_type: EventType::Food,
                    snake_id: snakes[i].id,
                    other_snake_id: 0,
                    x: head.x,
                    y: head.y,
                    delta_length: 1,
                });
                let replacement = spawn::rand_free_cell(snakes, foods, width, height, rng);
                foods[j] = Food::from(replacement);
                *food_changed = true;
            }
        }
    }

    for s in snakes.iter() {
        if !s.alive {
            let (x, y) = s.head().map_or((0, 0), |h| (h.x, h.y));
            events.push(CollisionEvent {
                event_type: EventType::Death,
                snake_id: s.id,
                other_snake_id: 0,
                x,
                y,
                delta_length: -1,
            });
        }
    }

    snakes.retain(|s| s.alive);
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::entity::Dir;

    fn snake(id: i32, cells: &[(i32, i32)], dir: Dir) -> Snake {
        Snake {
            id,
            user_id: id,
            color: "#00ff00".to_string(),
            dir,
            paused: false,
            alive: true,
            grow: 0,
            body: cells.iter().map(|&(x, y)| Cell::new(x, y)).collect(),
        }
    }

    fn resolve(
        snakes: &mut Vec<Snake>,
        foods: &mut [Food],
    ) -> (Vec<CollisionEvent>, bool) {
        let mut rng = StdRng::seed_from_u64(11);
        let mut events = Vec::new();
        let mut food_changed = false;
        run(snakes, foods, 20, 20, &mut rng, &mut events, &mut food_changed);
        (events, food_changed)
    }

    #[test]
    fn self_hit_pops_tail_and_pauses() {
        // Head overlapping its own second segment.
        let mut snakes = vec![snake(1, &[(5, 5), (6, 5), (5, 5)], Dir::Left)];

        let (events, _) = resolve(&mut snakes, &mut []);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::SelfCollision);
        assert_eq!(snakes[0].body.len(), 2);
        assert!(snakes[0].paused);
    }

    #[test]
    fn degenerate_self_overlap_pops_to_single_cell() {
        // Duplicate cells can only come out of a corrupt checkpoint; the
        // resolver still pops one segment and pauses.
        let mut snakes = vec![snake(1, &[(5, 5), (5, 5)], Dir::Stop)];

        let (events, _) = resolve(&mut snakes, &mut []);

        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::SelfCollision]);
        assert_eq!(snakes[0].body.len(), 1);
        assert!(snakes[0].paused);
        assert!(snakes[0].alive);
    }

    #[test]
    fn bite_reverses_attacker_and_pops_defender() {
        let mut snakes = vec![
            snake(1, &[(5, 5), (4, 5)], Dir::Right),
            snake(2, &[(5, 5), (6, 5)], Dir::Stop),
        ];

        let (events, _) = resolve(&mut snakes, &mut []);

        // Both heads co-occupy (5,5): both fire as attackers in id order.
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Bite,
                EventType::Bitten,
                EventType::Bite,
                EventType::Bitten
            ]
        );
        let a = snakes.iter().find(|s| s.id == 1).unwrap();
        let b = snakes.iter().find(|s| s.id == 2).unwrap();
        assert_eq!(a.dir, Dir::Left);
        assert_eq!(a.grow, 1);
        assert_eq!(b.dir, Dir::Stop);
        assert_eq!(b.grow, 1);
        assert_eq!(a.body.len(), 1);
        assert_eq!(b.body.len(), 1);
    }

    #[test]
    fn attacker_reverses_even_from_stop() {
        let mut snakes = vec![
            snake(1, &[(5, 5)], Dir::Stop),
            snake(2, &[(4, 5), (5, 5)], Dir::Stop),
        ];

        let (events, _) = resolve(&mut snakes, &mut []);

        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::Bite && e.snake_id == 1));
        assert_eq!(snakes.iter().find(|s| s.id == 1).unwrap().dir, Dir::Stop);
    }

    #[test]
    fn bite_collapsing_defender_emits_death_and_compacts() {
        let mut snakes = vec![
            snake(1, &[(5, 5), (4, 5)], Dir::Right),
            snake(2, &[(5, 5)], Dir::Stop),
        ];

        let (events, _) = resolve(&mut snakes, &mut []);

        // id 1 bites id 2 down to nothing, then id 2 has no body left to
        // bite with, and a DEATH closes the tick.
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::Bite, EventType::Bitten, EventType::Death]
        );
        assert_eq!(events[2].snake_id, 2);
        assert_eq!(snakes.len(), 1);
        assert_eq!(snakes[0].id, 1);
    }

    #[test]
    fn food_eat_grows_and_replaces_pellet() {
        let mut snakes = vec![snake(1, &[(5, 5)], Dir::Right)];
        let mut foods = [Food { x: 5, y: 5 }];

        let (events, food_changed) = resolve(&mut snakes, &mut foods);

        assert!(food_changed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Food);
        assert_eq!(snakes[0].grow, 1);
        assert_ne!(foods[0], Food { x: 5, y: 5 });
    }

    #[test]
    fn event_order_is_self_then_bite_then_food() {
        // Snake 1 self-hits; snake 2 bites snake 3; snake 4 eats.
        let mut snakes = vec![
            snake(1, &[(0, 0), (1, 0), (0, 0)], Dir::Left),
            snake(2, &[(10, 10), (9, 10)], Dir::Right),
            snake(3, &[(10, 10), (11, 10), (12, 10)], Dir::Stop),
            snake(4, &[(15, 15)], Dir::Right),
        ];
        let mut foods = [Food { x: 15, y: 15 }];

        let (events, _) = resolve(&mut snakes, &mut foods);

        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::SelfCollision,
                EventType::Bite,
                EventType::Bitten,
                EventType::Bite,
                EventType::Bitten,
                EventType::Food
            ]
        );
    }
}
