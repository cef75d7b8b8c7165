//! Sentinel AI: BFS path planning over terrain.
//!
//! A sentinel replans every time it is due to move, then takes one step.
//! Successors follow the same rules the step function applies:
//!   - unsupported cell → only successor is the cell below (falling)
//!   - otherwise legal moves, visited in `Dir::ALL` order (Up, Down,
//!     Left, Right), which fixes tie-breaking
//!
//! The first search treats open holes as walls so sentinels do not walk
//! into traps on purpose; only when that finds nothing are holes allowed.

use std::collections::VecDeque;

use super::entity::ActorState;
use super::physics::Terrain;
use super::rules;
use super::tile::{Cell, Dir};

/// Path from `from` to `goal`, excluding `from`. `None` when unreachable.
pub fn plan_path(t: &Terrain, from: Cell, goal: Cell) -> Option<Vec<Cell>> {
    if from == goal { return Some(Vec::new()); }
    let path = search(t, from, goal, true).or_else(|| search(t, from, goal, false));
    log::trace!("plan {from:?} -> {goal:?}: {path:?}");
    path
}

fn search(t: &Terrain, from: Cell, goal: Cell, avoid_holes: bool) -> Option<Vec<Cell>> {
    let width = t.grid.width();
    let idx = |c: Cell| c.row * width + c.col;
    let mut parent: Vec<Option<Cell>> = vec![None; width * t.grid.height()];
    let mut visited = vec![false; parent.len()];
    visited[idx(from)] = true;

    let mut queue: VecDeque<Cell> = VecDeque::with_capacity(64);
    queue.push_back(from);

    while let Some(cur) = queue.pop_front() {
        for next in successors(t, cur) {
            if visited[idx(next)] { continue; }
            if avoid_holes && next != goal && t.at(next).hole.is_some() { continue; }
            visited[idx(next)] = true;
            parent[idx(next)] = Some(cur);
            if next == goal {
                return Some(unwind(&parent, goal, width));
            }
            queue.push_back(next);
        }
    }
    None
}

fn successors(t: &Terrain, cur: Cell) -> Vec<Cell> {
    if !t.support(cur) {
        return rules::fall_target(t, cur, false).into_iter().collect();
    }
    Dir::ALL
        .iter()
        .filter_map(|&d| rules::move_target(t, cur, ActorState::OnGround, d, true))
        .collect()
}

fn unwind(parent: &[Option<Cell>], goal: Cell, width: usize) -> Vec<Cell> {
    let mut path = vec![goal];
    let mut cur = goal;
    while let Some(p) = parent[cur.row * width + cur.col] {
        path.push(p);
        cur = p;
    }
    path.pop(); // the start cell
    path.reverse();
    path
}
