//! Input application and body advancement.

use std::collections::HashMap;

use crate::entity::{step_wrapped, Cell, Dir, InputIntent, Snake};

/// Applies queued player intents and advances snake bodies one step.
///
/// The buffer is consumed whole: intents queued during tick T apply at T,
/// intents arriving mid-tick wait for T+1. A desired direction also clears
/// `paused`; the pause toggle is parity and may cancel itself out before
/// this runs.
pub fn run(
    snakes: &mut [Snake],
    input_buffer: &mut HashMap<i32, InputIntent>,
    width: i32,
    height: i32,
) {
    if !input_buffer.is_empty() {
        for s in snakes.iter_mut() {
            let Some(intent) = input_buffer.get(&s.id) else {
                continue;
            };
            if intent.has_desired_dir {
                s.dir = intent.desired_dir;
                s.paused = false;
            }
            if intent.toggle_pause {
                s.paused = !s.paused;
            }
        }
        input_buffer.clear();
    }

    let mut next_head: HashMap<i32, Cell> = HashMap::with_capacity(snakes.len());
    for s in snakes.iter() {
        if !s.alive || s.paused || s.dir == Dir::Stop || s.body.is_empty() {
            continue;
        }
        next_head.insert(s.id, step_wrapped(s.body[0], s.dir, width, height));
    }

    for s in snakes.iter_mut() {
        if !s.alive {
            continue;
        }
        let Some(&head) = next_head.get(&s.id) else {
            continue;
        };

        s.body.insert(0, head);
        if s.grow > 0 {
            s.grow -= 1;
        } else {
            s.body.pop();
        }
    }
}
