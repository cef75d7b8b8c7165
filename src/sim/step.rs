//! The step function: advances the world by one tick.
//!
//! Processing order (each phase covers every entity before the next):
//!   1. Intake        remember where everyone stood at tick start
//!   2. Dig           start a dig, advance cracked cells, open holes
//!   3. Movement      player, then sentinels in id order
//!   4. Gravity       trap collapse, then one cell of falling
//!   5. Collision     captures → contact → tokens
//!   6. Hole effects  seal holes that reached regen age
//!   7. Timers        cooldowns, trap escape, respawn, hole age
//!   8. Win check
//!
//! A hole finished in the dig phase is already open for movement and
//! gravity in the same tick. Captures run before contact, so a sentinel
//! that just dropped into a hole cannot kill the player that tick.
//!
//! Countdowns are check-then-decrement: something scheduled N ticks out
//! on tick T fires on tick T + N.

use crate::domain::ai;
use crate::domain::entity::{ActorState, EntityId, Facing, Hole, Intent, Sentinel, Token};
use crate::domain::physics::{has_free_sentinel_except, Overlay, Terrain};
use crate::domain::rules;
use crate::domain::tile::{Cell, Dir};
use super::event::{DeathCause, Event};
use super::world::{Outcome, World};

/// Snapshot taken before any phase runs.
struct TickStart {
    sentinel_cells: Vec<Cell>,
    player_falling: bool,
}

// ══════════════════════════════════════════════════════════════
// Main entry point
// ══════════════════════════════════════════════════════════════

pub fn step(world: &mut World, intent: Intent) -> Vec<Event> {
    if world.outcome != Outcome::Running { return vec![]; }

    let mut events: Vec<Event> = Vec::new();
    world.tick += 1;

    let start = TickStart {
        sentinel_cells: world.sentinels.iter().map(|s| s.cell).collect(),
        player_falling: world.player.state == ActorState::Falling,
    };

    if let Some(side) = intent.dig() {
        resolve_dig(world, side, &mut events);
    }
    resolve_dig_progress(world, &mut events);
    if let Some(dir) = intent.movement() {
        resolve_player_movement(world, dir);
    }
    resolve_sentinel_movement(world);
    resolve_trap_collapse(world, &mut events);
    resolve_gravity(world, &start, &mut events);
    resolve_captures(world, &start, &mut events);
    resolve_contact(world, &mut events);
    resolve_tokens(world, &start, &mut events);
    resolve_hole_regen(world, &mut events);
    resolve_timers(world, &mut events);
    resolve_win(world, &mut events);

    for e in &events {
        log::debug!("tick {}: {:?}", world.tick, e);
    }
    events
}

// ══════════════════════════════════════════════════════════════
// Dig
// ══════════════════════════════════════════════════════════════

fn resolve_dig(w: &mut World, side: Facing, events: &mut Vec<Event>) {
    let p = &w.player;
    if !p.alive() || p.digging.is_some() { return; }
    let t = w.terrain();
    let supported = t.support_for_player(p.cell, &w.sentinels);
    let Some(target) = rules::dig_target(&t, p.cell, p.state, supported, side) else { return };
    // a token resting beside the player would drop into the hole
    let beside = Cell::new(target.row - 1, target.col);
    if w.tokens.iter().any(|tk| tk.is_loose() && tk.cell == beside) { return; }

    let digger = p.id;
    w.overlay.insert(target, Overlay::Cracked { progress: 0, digger });
    w.player.digging = Some(target);
    w.player.facing = side;
    events.push(Event::DigStarted { cell: target });
}

fn resolve_dig_progress(w: &mut World, events: &mut Vec<Event>) {
    let cracked: Vec<Cell> = w.overlay.iter()
        .filter(|(_, o)| matches!(o, Overlay::Cracked { .. }))
        .map(|(&c, _)| c)
        .collect();

    for cell in cracked {
        let Some(Overlay::Cracked { progress, digger }) = w.overlay.get(&cell).copied() else { continue };
        let progress = progress + 1;
        if progress < w.config.dig_duration {
            w.overlay.insert(cell, Overlay::Cracked { progress, digger });
            continue;
        }
        let hole = w.alloc_id();
        w.overlay.insert(cell, Overlay::Open { hole });
        w.holes.push(Hole::new(hole, cell));
        if w.player.id == digger { w.player.digging = None; }
        events.push(Event::HoleOpened { hole, cell });
    }
}

// ══════════════════════════════════════════════════════════════
// Movement
// ══════════════════════════════════════════════════════════════

fn facing_towards(from: Cell, to: Cell, current: Facing) -> Facing {
    if to.col < from.col { Facing::Left }
    else if to.col > from.col { Facing::Right }
    else { current }
}

fn resolve_player_movement(w: &mut World, dir: Dir) {
    let p = &w.player;
    if !p.alive() || p.move_cooldown > 0 { return; }
    let from = p.cell;
    let t = w.terrain();
    let supported = t.support_for_player(from, &w.sentinels);
    let Some(dest) = rules::move_target(&t, from, p.state, dir, supported) else { return };

    let (pid, left) = (p.id, t.hole_at(from).map(|h| h.id));

    // leaving a hole frees it before the new state is resolved
    if let Some(hole) = left {
        release(w, hole, pid);
    }
    let t = w.terrain();
    let supported = t.support_for_player(dest, &w.sentinels);
    let state = rules::resolve_state(&t, dest, w.player.state, supported);

    let rate = w.config.player_move_rate;
    let p = &mut w.player;
    p.facing = facing_towards(from, dest, p.facing);
    p.cell = dest;
    p.state = state;
    p.move_cooldown = rate;
}

/// Each due sentinel replans toward the player and takes one step.
/// A step into a cell held by another free sentinel, or already taken by
/// an earlier sentinel this tick, is skipped and retried next tick.
fn resolve_sentinel_movement(w: &mut World) {
    let goal = w.player.cell;
    let rate = w.config.guard_move_rate;
    let mut taken: Vec<Cell> = Vec::new();

    for i in 0..w.sentinels.len() {
        let s = &w.sentinels[i];
        if !s.is_free() || s.state == ActorState::Falling || s.move_cooldown > 0 { continue; }
        let t = w.terrain();
        if !t.support(s.cell) { continue; } // gravity moves it this tick

        let mut path = ai::plan_path(&t, s.cell, goal).unwrap_or_default();
        let next = path.first().copied()
            .filter(|&c| !taken.contains(&c) && !has_free_sentinel_except(&w.sentinels, c, s.id));
        let Some(next) = next else {
            w.sentinels[i].path = path;
            continue;
        };
        let state = rules::resolve_state(&t, next, s.state, t.support(next));
        let from = s.cell;
        path.remove(0);
        taken.push(next);

        let s = &mut w.sentinels[i];
        s.facing = facing_towards(from, next, s.facing);
        s.cell = next;
        s.state = state;
        s.move_cooldown = rate;
        s.path = path;
    }
}

// ══════════════════════════════════════════════════════════════
// Gravity
// ══════════════════════════════════════════════════════════════

/// Anyone standing on an intact trap brings it down.
fn resolve_trap_collapse(w: &mut World, events: &mut Vec<Event>) {
    let mut feet: Vec<Cell> = Vec::new();
    if w.player.alive() && w.player.state != ActorState::InHole {
        feet.push(w.player.cell);
    }
    feet.extend(w.sentinels.iter().filter(|s| s.is_free()).map(|s| s.cell));

    for cell in feet {
        let Some(below) = w.grid.below(cell) else { continue };
        if w.terrain().is_intact_trap(below) {
            w.overlay.insert(below, Overlay::Fallen);
            events.push(Event::TrapCollapsed { cell: below });
        }
    }
}

/// Where gravity leaves an actor this tick, and its state there.
fn settle(t: &Terrain, cell: Cell, state: ActorState, supported: bool, lands: impl Fn(Cell) -> bool) -> (Cell, ActorState) {
    match rules::fall_target(t, cell, supported) {
        Some(below) if lands(below) => (below, rules::resolve_state(t, below, ActorState::Falling, true)),
        Some(below) => (below, ActorState::Falling),
        None => (cell, rules::resolve_state(t, cell, state, supported)),
    }
}

fn resolve_gravity(w: &mut World, start: &TickStart, events: &mut Vec<Event>) {
    if w.player.alive() {
        let p = &w.player;
        let t = w.terrain();
        let supported = t.support_for_player(p.cell, &w.sentinels);
        let (cell, state) = settle(&t, p.cell, p.state, supported, |c| t.support_for_player(c, &w.sentinels));
        let (from, was_falling) = (p.cell, p.state == ActorState::Falling);

        if cell != from && !start.player_falling {
            events.push(Event::PlayerFell { from });
        }
        let p = &mut w.player;
        if (was_falling || cell != from) && state != ActorState::Falling {
            p.move_cooldown = 0;
        }
        p.cell = cell;
        p.state = state;
    }

    for i in 0..w.sentinels.len() {
        let s = &w.sentinels[i];
        if !s.is_free() { continue; }
        let t = w.terrain();
        let supported = t.support(s.cell);
        let (cell, state) = settle(&t, s.cell, s.state, supported, |c| t.support(c));

        let s = &mut w.sentinels[i];
        if cell != s.cell { s.path.clear(); }
        s.cell = cell;
        s.state = state;
    }
}

// ══════════════════════════════════════════════════════════════
// Collision
// ══════════════════════════════════════════════════════════════

fn release(w: &mut World, hole: EntityId, id: EntityId) {
    if let Some(h) = w.holes.iter_mut().find(|h| h.id == hole) {
        h.release(id);
    }
}

fn drop_token(tokens: &mut [Token], id: EntityId, cell: Cell, events: &mut Vec<Event>) {
    if let Some(tk) = tokens.iter_mut().find(|t| t.id == id) {
        tk.carrier = None;
        tk.cell = cell;
        events.push(Event::TokenDropped { token: id, cell });
    }
}

/// Sentinels that entered an open hole this tick are trapped; the player
/// in a hole cell joins its membership.
fn resolve_captures(w: &mut World, start: &TickStart, events: &mut Vec<Event>) {
    let escape = w.config.trap_escape_ticks;
    for i in 0..w.sentinels.len() {
        let s = &w.sentinels[i];
        if !s.is_free() || s.cell == start.sentinel_cells[i] { continue; }
        let Some(hole) = w.terrain().hole_at(s.cell).map(|h| h.id) else { continue };
        let (sid, cell) = (s.id, s.cell);

        if let Some(token) = w.sentinels[i].carrying.take() {
            drop_token(&mut w.tokens, token, cell, events);
        }
        let s = &mut w.sentinels[i];
        s.state = ActorState::InHole;
        s.trapped_in = Some(hole);
        s.escape_timer = escape;
        s.path.clear();
        if let Some(h) = w.holes.iter_mut().find(|h| h.id == hole) {
            h.contains.push(sid);
        }
        events.push(Event::SentinelTrapped { sentinel: sid, hole });
    }

    if !w.player.alive() { return; }
    let (pid, at) = (w.player.id, w.player.cell);
    let Some(hole) = w.terrain().hole_at(at).map(|h| h.id) else { return };
    if let Some(h) = w.holes.iter_mut().find(|h| h.id == hole) {
        if !h.contains.contains(&pid) { h.contains.push(pid); }
    }
    w.player.state = ActorState::InHole;
}

fn kill_player(w: &mut World, cause: DeathCause, events: &mut Vec<Event>) {
    w.player.state = ActorState::Dead;
    w.player.digging = None;
    w.outcome = Outcome::Lost;
    events.push(Event::PlayerDied { cell: w.player.cell, cause });
}

/// Same cell, or a free sentinel right on top of the player.
fn resolve_contact(w: &mut World, events: &mut Vec<Event>) {
    let p = &w.player;
    if !p.alive() || p.state == ActorState::InHole { return; }
    let at = p.cell;
    let caught = w.sentinels.iter()
        .filter(|s| s.is_free())
        .any(|s| s.cell == at || (s.cell.col == at.col && s.cell.row + 1 == at.row));
    if caught {
        kill_player(w, DeathCause::Caught, events);
    }
}

fn resolve_tokens(w: &mut World, start: &TickStart, events: &mut Vec<Event>) {
    if w.player.alive() {
        let at = w.player.cell;
        for tk in w.tokens.iter_mut().filter(|t| t.is_loose() && t.cell == at) {
            tk.claimed = true;
            w.tokens_collected += 1;
            events.push(Event::TokenCollected { token: tk.id, cell: at });
        }
        if !w.escape_revealed && w.tokens.iter().all(|t| t.claimed) {
            w.escape_revealed = true;
            events.push(Event::EscapeRevealed);
        }
    }

    // only a sentinel that walked or fell onto the token this tick takes it
    for (i, s) in w.sentinels.iter_mut().enumerate() {
        if !s.is_free() || s.carrying.is_some() || s.cell == start.sentinel_cells[i] { continue; }
        if let Some(tk) = w.tokens.iter_mut().find(|t| t.is_loose() && t.cell == s.cell) {
            tk.carrier = Some(s.id);
            s.carrying = Some(tk.id);
            events.push(Event::TokenPickedUp { token: tk.id, sentinel: s.id });
        }
    }

    for tk in w.tokens.iter_mut() {
        let Some(carrier) = tk.carrier else { continue };
        if let Some(s) = w.sentinels.iter().find(|s| s.id == carrier) {
            tk.cell = s.cell;
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Hole effects
// ══════════════════════════════════════════════════════════════

fn resolve_hole_regen(w: &mut World, events: &mut Vec<Event>) {
    let regen = w.config.hole_regen_ticks;
    let due: Vec<EntityId> = w.holes.iter().filter(|h| h.is_due(regen)).map(|h| h.id).collect();
    for id in due {
        seal_hole(w, id, events);
    }
}

fn destroy_sentinel(s: &mut Sentinel, tokens: &mut [Token], respawn: u32, events: &mut Vec<Event>) {
    if let Some(token) = s.carrying.take() {
        drop_token(tokens, token, s.cell, events);
    }
    s.state = ActorState::Dead;
    s.trapped_in = None;
    s.escape_timer = 0;
    s.respawn_timer = respawn;
    s.path.clear();
    events.push(Event::SentinelDestroyed { sentinel: s.id, cell: s.cell });
}

/// Nearest enterable cell straight above `cell`.
fn open_cell_above(t: &Terrain, cell: Cell) -> Option<Cell> {
    let mut cur = cell;
    while let Some(up) = t.grid.above(cur) {
        if t.can_enter(up) { return Some(up); }
        cur = up;
    }
    None
}

/// Firewall comes back. Whoever is still inside is crushed.
fn seal_hole(w: &mut World, id: EntityId, events: &mut Vec<Event>) {
    let Some(idx) = w.holes.iter().position(|h| h.id == id) else { return };
    let hole = w.holes.remove(idx);
    let cell = hole.origin;
    w.overlay.remove(&cell);
    let respawn = w.config.guard_respawn_ticks;

    for &member in &hole.contains {
        if member == w.player.id {
            kill_player(w, DeathCause::Buried, events);
        } else if let Some(s) = w.sentinels.iter_mut().find(|s| s.id == member) {
            destroy_sentinel(s, &mut w.tokens, respawn, events);
        }
    }

    // escaped but still standing in the cell: pushed up, or crushed
    let above = w.grid.above(cell).filter(|&a| w.terrain().can_enter(a));
    for s in w.sentinels.iter_mut().filter(|s| s.is_free() && s.cell == cell) {
        match above {
            Some(up) => {
                s.cell = up;
                s.path.clear();
            }
            None => destroy_sentinel(s, &mut w.tokens, respawn, events),
        }
    }

    let rise_to = open_cell_above(&w.terrain(), cell);
    if let Some(up) = rise_to {
        for tk in w.tokens.iter_mut().filter(|t| t.is_loose() && t.cell == cell) {
            tk.cell = up;
        }
    }
    events.push(Event::HoleClosed { hole: id, cell });
}

// ══════════════════════════════════════════════════════════════
// Timers
// ══════════════════════════════════════════════════════════════

fn resolve_timers(w: &mut World, events: &mut Vec<Event>) {
    w.player.move_cooldown = w.player.move_cooldown.saturating_sub(1);

    for i in 0..w.sentinels.len() {
        let s = &mut w.sentinels[i];
        s.move_cooldown = s.move_cooldown.saturating_sub(1);
        match (s.state, s.escape_timer, s.respawn_timer) {
            (ActorState::InHole, 0, _) => escape_hole(w, i, events),
            (ActorState::InHole, _, _) => s.escape_timer -= 1,
            (ActorState::Dead, _, 0)   => try_respawn(w, i, events),
            (ActorState::Dead, _, _)   => s.respawn_timer -= 1,
            _ => {}
        }
    }

    for h in &mut w.holes {
        h.age += 1;
    }
}

/// Climbs free, standing in the hole's cell.
fn escape_hole(w: &mut World, i: usize, events: &mut Vec<Event>) {
    let s = &mut w.sentinels[i];
    let hole = s.trapped_in.take();
    s.state = ActorState::OnGround;
    let (sid, cell) = (s.id, s.cell);
    if let Some(hole) = hole {
        release(w, hole, sid);
    }
    events.push(Event::SentinelEscaped { sentinel: sid, cell });
}

/// Back at spawn unless a free sentinel stands there; retried every tick.
fn try_respawn(w: &mut World, i: usize, events: &mut Vec<Event>) {
    let spawn = w.sentinels[i].spawn;
    if w.sentinels.iter().any(|o| o.is_free() && o.cell == spawn) { return; }
    let t = w.terrain();
    let state = rules::resolve_state(&t, spawn, ActorState::OnGround, t.support(spawn));
    let rate = w.config.guard_move_rate;

    let s = &mut w.sentinels[i];
    s.cell = spawn;
    s.state = state;
    s.move_cooldown = rate;
    s.path.clear();
    events.push(Event::SentinelRespawned { sentinel: s.id, cell: spawn });
}

// ══════════════════════════════════════════════════════════════
// Win
// ══════════════════════════════════════════════════════════════

/// Tokens first, then the top row.
fn resolve_win(w: &mut World, events: &mut Vec<Event>) {
    if !w.player.alive() || !w.escape_revealed || w.player.cell.row != 0 { return; }
    if w.tokens.iter().any(|t| !t.claimed) { return; }
    w.outcome = Outcome::Cleared;
    events.push(Event::LevelCleared);
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::domain::entity::EntityRef;
    use crate::testutil::world_from;
    use proptest::prelude::*;

    fn c(row: usize, col: usize) -> Cell { Cell::new(row, col) }

    /// Everyone moves every tick.
    fn brisk() -> SimConfig {
        SimConfig { player_move_rate: 1, guard_move_rate: 1, ..SimConfig::default() }
    }

    fn open_hole(w: &mut World, cell: Cell) -> EntityId {
        let id = w.alloc_id();
        w.overlay.insert(cell, Overlay::Open { hole: id });
        w.holes.push(Hole::new(id, cell));
        id
    }

    /// Step until an event matches, returning that tick's events.
    fn step_until(w: &mut World, limit: usize, hit: impl Fn(&Event) -> bool) -> Vec<Event> {
        for _ in 0..limit {
            let events = step(w, Intent::None);
            if events.iter().any(&hit) { return events; }
        }
        panic!("no matching event within {limit} ticks");
    }

    fn has(events: &[Event], hit: impl Fn(&Event) -> bool) -> bool {
        events.iter().any(hit)
    }

    // ── Dig ──

    #[test]
    fn dig_opens_hole_then_firewall_returns() {
        let mut w = world_from(&[
            "        ",
            "        ",
            "        ",
            "        ",
            "        ",
            "     P  ",
            "########",
            "========",
        ], SimConfig::default());
        let target = c(6, 4);
        let duration = w.config().dig_duration as u64;

        for tick in 1..=duration {
            let ev = step(&mut w, Intent::DigLeft);
            assert_eq!(has(&ev, |e| *e == Event::DigStarted { cell: target }), tick == 1);
            assert_eq!(has(&ev, |e| matches!(e, Event::HoleOpened { cell, .. } if *cell == target)), tick == duration);
        }
        assert!(w.terrain().can_enter(target));

        let closes_at = w.tick() + w.config().hole_regen_ticks as u64;
        while w.tick() + 1 < closes_at {
            let ev = step(&mut w, Intent::None);
            assert!(!has(&ev, |e| matches!(e, Event::HoleClosed { .. })), "closed early at {}", w.tick());
            assert!(w.terrain().can_enter(target));
        }
        let ev = step(&mut w, Intent::None);
        assert!(has(&ev, |e| matches!(e, Event::HoleClosed { cell, .. } if *cell == target)));
        assert!(!w.terrain().can_enter(target));
        assert!(w.holes().is_empty() && w.overlay().is_empty());
    }

    #[test]
    fn dig_into_concrete_is_rejected() {
        let mut w = world_from(&["   ", "P  ", "#=#"], SimConfig::default());
        for _ in 0..10 {
            let ev = step(&mut w, Intent::DigRight);
            assert!(ev.is_empty());
        }
        assert!(w.overlay().is_empty());
        assert_eq!(w.player().digging, None);
    }

    #[test]
    fn second_dig_waits_for_the_first() {
        let mut w = world_from(&["   ", " P ", "###"], SimConfig::default());
        assert_eq!(step(&mut w, Intent::DigLeft), vec![Event::DigStarted { cell: c(2, 0) }]);
        assert!(step(&mut w, Intent::DigRight).is_empty());
        assert_eq!(w.overlay().len(), 1);
        assert_eq!(w.player().facing, Facing::Left);

        for _ in 0..3 { step(&mut w, Intent::None); }
        assert!(w.hole_at(c(2, 0)).is_some());
        assert_eq!(step(&mut w, Intent::DigRight), vec![Event::DigStarted { cell: c(2, 2) }]);
        assert_eq!(w.player().facing, Facing::Right);
    }

    #[test]
    fn finished_dig_takes_the_sentinel_beside_it_at_once() {
        let config = SimConfig { dig_duration: 1, guard_move_rate: 50, ..SimConfig::default() };
        let mut w = world_from(&[
            "     ",
            " PE  ",
            "#####",
            "=====",
        ], config);
        let target = c(2, 2);
        let ev = step(&mut w, Intent::DigRight);
        let (sid, hole) = (EntityId(1), EntityId(2));
        assert_eq!(ev, vec![
            Event::DigStarted { cell: target },
            Event::HoleOpened { hole, cell: target },
            Event::SentinelTrapped { sentinel: sid, hole },
        ]);
        let s = &w.sentinels()[0];
        assert_eq!((s.cell, s.state, s.trapped_in), (target, ActorState::InHole, Some(hole)));
        assert!(w.player().alive());
    }

    #[test]
    fn no_dig_under_a_token() {
        let mut w = world_from(&["P$ ", "###"], SimConfig::default());
        assert!(step(&mut w, Intent::DigRight).is_empty());
        assert!(w.overlay().is_empty());
    }

    // ── Gravity ──

    #[test]
    fn walking_off_a_ledge_falls_one_cell_per_tick() {
        let mut w = world_from(&[
            "P  ",
            "#  ",
            "   ",
            "   ",
            "===",
        ], brisk());
        let ev = step(&mut w, Intent::Right);
        assert_eq!(ev, vec![Event::PlayerFell { from: c(0, 1) }]);
        assert_eq!((w.player().cell, w.player().state), (c(1, 1), ActorState::Falling));

        // moving mid-air does nothing
        assert!(step(&mut w, Intent::Left).is_empty());
        assert_eq!(w.player().cell, c(2, 1));

        step(&mut w, Intent::None);
        assert_eq!((w.player().cell, w.player().state), (c(3, 1), ActorState::OnGround));
        assert_eq!(w.player().move_cooldown, 0);
    }

    #[test]
    fn trap_gives_way_under_the_player() {
        let mut w = world_from(&[
            "P  ",
            "#T#",
            "   ",
            "===",
        ], brisk());
        let ev = step(&mut w, Intent::Right);
        assert_eq!(ev, vec![
            Event::TrapCollapsed { cell: c(1, 1) },
            Event::PlayerFell { from: c(0, 1) },
        ]);
        step(&mut w, Intent::None);
        assert_eq!((w.player().cell, w.player().state), (c(2, 1), ActorState::OnGround));
        assert_eq!(w.overlay().get(&c(1, 1)), Some(&Overlay::Fallen));
    }

    // ── Player and holes ──

    #[test]
    fn player_drops_into_own_hole_and_climbs_out() {
        let config = SimConfig { dig_duration: 2, hole_regen_ticks: 50, ..brisk() };
        let mut w = world_from(&["    ", " P  ", "####", "===="], config);
        step(&mut w, Intent::DigRight);
        let ev = step(&mut w, Intent::None);
        let hole = match ev.as_slice() {
            [Event::HoleOpened { hole, cell }] if *cell == c(2, 2) => *hole,
            other => panic!("unexpected {other:?}"),
        };

        step(&mut w, Intent::Right);
        assert_eq!((w.player().cell, w.player().state), (c(2, 2), ActorState::InHole));
        assert_eq!(w.hole_at(c(2, 2)).map(|h| h.contains.clone()), Some(vec![w.player().id]));

        step(&mut w, Intent::Right);
        assert_eq!((w.player().cell, w.player().state), (c(1, 3), ActorState::OnGround));
        assert!(w.holes().iter().all(|h| h.id == hole && h.contains.is_empty()));
    }

    #[test]
    fn player_inside_a_sealing_hole_is_buried() {
        let config = SimConfig { dig_duration: 1, hole_regen_ticks: 3, ..brisk() };
        let mut w = world_from(&["    ", " P  ", "####", "===="], config);
        let ev = step(&mut w, Intent::DigRight);
        assert!(has(&ev, |e| matches!(e, Event::HoleOpened { .. })));
        step(&mut w, Intent::Right);
        step(&mut w, Intent::None);

        let ev = step(&mut w, Intent::None);
        assert_eq!(w.tick(), 4);
        assert_eq!(ev[0], Event::PlayerDied { cell: c(2, 2), cause: DeathCause::Buried });
        assert!(matches!(ev[1], Event::HoleClosed { .. }));
        assert_eq!(w.outcome(), Outcome::Lost);

        let frozen = w.clone();
        assert!(step(&mut w, Intent::Left).is_empty());
        assert_eq!(w, frozen);
    }

    // ── Sentinels and holes ──

    /// Sentinel at (1,5) carrying the only token, player at (1,0),
    /// open hole at (2,3) in between.
    fn carrier_run(config: SimConfig) -> World {
        let mut w = world_from(&[
            "     $",
            "P    E",
            "######",
            "======",
        ], config);
        let (sid, tid) = (w.sentinels[0].id, w.tokens[0].id);
        w.sentinels[0].carrying = Some(tid);
        w.tokens[0].carrier = Some(sid);
        w.tokens[0].cell = c(1, 5);
        open_hole(&mut w, c(2, 3));
        w
    }

    #[test]
    fn carrier_drops_token_when_trapped_then_climbs_free() {
        let config = SimConfig { trap_escape_ticks: 4, ..brisk() };
        let mut w = carrier_run(config);
        let ev = step_until(&mut w, 20, |e| matches!(e, Event::SentinelTrapped { .. }));
        let dropped = ev.iter().position(|e| matches!(e, Event::TokenDropped { cell, .. } if *cell == c(2, 3)));
        let trapped = ev.iter().position(|e| matches!(e, Event::SentinelTrapped { .. }));
        assert!(dropped.is_some() && dropped < trapped);
        assert!(w.tokens()[0].is_loose());
        assert_eq!(w.sentinels()[0].carrying, None);

        for _ in 1..4 {
            step(&mut w, Intent::None);
            assert_eq!(w.sentinels()[0].state, ActorState::InHole);
        }
        let ev = step(&mut w, Intent::None);
        assert!(has(&ev, |e| matches!(e, Event::SentinelEscaped { cell, .. } if *cell == c(2, 3))));
        let s = &w.sentinels()[0];
        assert_eq!((s.cell, s.state, s.trapped_in), (c(2, 3), ActorState::OnGround, None));
        let hole = w.hole_at(c(2, 3)).expect("hole outlives the escape");
        assert!(hole.contains.is_empty());
        assert!(w.tokens()[0].is_loose());
    }

    #[test]
    fn trapped_sentinel_is_destroyed_and_respawns() {
        let config = SimConfig { trap_escape_ticks: 50, hole_regen_ticks: 6, guard_respawn_ticks: 3, ..brisk() };
        let mut w = carrier_run(config);
        step_until(&mut w, 20, |e| matches!(e, Event::SentinelTrapped { .. }));

        let ev = step_until(&mut w, 20, |e| matches!(e, Event::SentinelDestroyed { .. }));
        let destroyed_at = w.tick();
        assert_eq!(destroyed_at, 7);
        assert!(has(&ev, |e| matches!(e, Event::HoleClosed { .. })));
        assert_eq!(w.sentinels()[0].state, ActorState::Dead);
        // the dropped token rises out of the sealed cell
        assert_eq!(w.tokens()[0].cell, c(1, 3));

        let ev = step_until(&mut w, 20, |e| matches!(e, Event::SentinelRespawned { .. }));
        assert_eq!(w.tick(), destroyed_at + 3);
        assert_eq!(ev, vec![Event::SentinelRespawned { sentinel: w.sentinels()[0].id, cell: c(1, 5) }]);
        assert_eq!(w.sentinels()[0].state, ActorState::OnGround);
    }

    #[test]
    fn respawn_waits_while_the_spawn_is_occupied() {
        let config = SimConfig { guard_move_rate: 50, ..SimConfig::default() };
        let mut w = world_from(&[
            "      ",
            "P  E E",
            "######",
        ], config);
        let spawn = w.sentinels[0].spawn;
        w.sentinels[0].state = ActorState::Dead;
        w.sentinels[0].respawn_timer = 0;
        w.sentinels[1].cell = spawn;

        for _ in 0..3 {
            let ev = step(&mut w, Intent::None);
            assert!(!has(&ev, |e| matches!(e, Event::SentinelRespawned { .. })));
            assert_eq!(w.sentinels()[0].state, ActorState::Dead);
        }

        w.sentinels[1].cell = c(1, 4);
        let ev = step(&mut w, Intent::None);
        assert_eq!(ev, vec![Event::SentinelRespawned { sentinel: w.sentinels()[0].id, cell: spawn }]);
        assert_eq!(w.sentinels()[0].state, ActorState::OnGround);
    }

    #[test]
    fn escaped_sentinel_still_in_the_cell_is_pushed_up() {
        let config = SimConfig { hole_regen_ticks: 2, ..SimConfig::default() };
        let mut w = world_from(&[
            "P==E=$",
            "===#==",
            "======",
        ], config);
        open_hole(&mut w, c(1, 3));
        w.sentinels[0].cell = c(1, 3);

        let ev = step_until(&mut w, 5, |e| matches!(e, Event::HoleClosed { .. }));
        assert!(!has(&ev, |e| matches!(e, Event::SentinelDestroyed { .. })));
        assert_eq!(w.sentinels()[0].cell, c(0, 3));
        assert!(w.sentinels()[0].is_free());
    }

    #[test]
    fn escaped_sentinel_with_no_room_above_is_crushed() {
        let config = SimConfig { hole_regen_ticks: 2, ..SimConfig::default() };
        let mut w = world_from(&[
            "P===E$",
            "===#==",
            "======",
        ], config);
        open_hole(&mut w, c(1, 3));
        w.sentinels[0].cell = c(1, 3);

        let ev = step_until(&mut w, 5, |e| matches!(e, Event::HoleClosed { .. }));
        assert!(has(&ev, |e| matches!(e, Event::SentinelDestroyed { cell, .. } if *cell == c(1, 3))));
        assert_eq!(w.sentinels()[0].state, ActorState::Dead);
    }

    // ── Contact ──

    #[test]
    fn sentinel_catches_player_and_the_run_ends() {
        let mut w = world_from(&[
            "      ",
            "P   E ",
            "######",
        ], brisk());
        let ev = step_until(&mut w, 20, |e| matches!(e, Event::PlayerDied { .. }));
        assert!(has(&ev, |e| *e == Event::PlayerDied { cell: c(1, 0), cause: DeathCause::Caught }));
        assert_eq!(w.outcome(), Outcome::Lost);

        let frozen = w.clone();
        assert!(step(&mut w, Intent::Right).is_empty());
        assert_eq!(w, frozen);
    }

    #[test]
    fn sentinel_overhead_is_lethal() {
        let mut w = world_from(&[
            " - E",
            " P  ",
            "####",
        ], SimConfig::default());
        w.sentinels[0].cell = c(0, 1);
        w.sentinels[0].state = ActorState::OnRope;
        let ev = step(&mut w, Intent::None);
        assert_eq!(ev, vec![Event::PlayerDied { cell: c(1, 1), cause: DeathCause::Caught }]);
    }

    #[test]
    fn sentinel_trapped_overhead_this_tick_is_harmless() {
        let mut w = world_from(&[
            " E  ",
            "=#==",
            " P  ",
            "====",
        ], SimConfig::default());
        let hole = open_hole(&mut w, c(1, 1));
        let ev = step(&mut w, Intent::None);
        assert_eq!(ev, vec![Event::SentinelTrapped { sentinel: EntityId(1), hole }]);
        assert_eq!(w.sentinels()[0].cell, c(1, 1));
        assert_eq!((w.player().cell, w.player().state), (c(2, 1), ActorState::OnGround));
        assert_eq!(w.outcome(), Outcome::Running);
    }

    #[test]
    fn standing_on_a_sentinel_head_is_safe() {
        let mut w = world_from(&[
            " P  ",
            " E $",
            "####",
        ], SimConfig::default());
        for _ in 0..3 {
            step(&mut w, Intent::None);
        }
        assert!(w.player().alive());
        assert_eq!((w.player().cell, w.player().state), (c(0, 1), ActorState::OnGround));
    }

    // ── Tokens ──

    #[test]
    fn sentinel_picks_up_token_it_walks_onto() {
        let mut w = world_from(&[
            "      ",
            "P  $ E",
            "######",
        ], brisk());
        let (sid, tid) = (w.sentinels()[0].id, w.tokens()[0].id);
        let ev = step_until(&mut w, 10, |e| matches!(e, Event::TokenPickedUp { .. }));
        assert!(has(&ev, |e| *e == Event::TokenPickedUp { token: tid, sentinel: sid }));
        assert_eq!(w.sentinels()[0].carrying, Some(tid));

        step(&mut w, Intent::None);
        assert_eq!(w.tokens()[0].cell, w.sentinels()[0].cell);
        assert_eq!(w.tokens()[0].cell, c(1, 2));
    }

    #[test]
    fn sentinel_standing_on_a_token_leaves_it() {
        let mut w = world_from(&["P  $E", "#####"], SimConfig::default());
        w.tokens[0].cell = w.sentinels[0].cell;
        step(&mut w, Intent::None);
        assert!(w.tokens()[0].is_loose());
    }

    // ── Win ──

    #[test]
    fn clear_waits_for_the_top_row() {
        let mut w = world_from(&[
            "    ",
            "  H ",
            "P$H ",
            "####",
        ], brisk());
        let ev = step(&mut w, Intent::Right);
        assert!(has(&ev, |e| matches!(e, Event::TokenCollected { .. })));
        assert!(has(&ev, |e| *e == Event::EscapeRevealed));
        assert_eq!(w.grid().tile(c(0, 2)), crate::domain::tile::Tile::EscapeLadder);

        for intent in [Intent::Right, Intent::Up] {
            let ev = step(&mut w, intent);
            assert!(!has(&ev, |e| *e == Event::LevelCleared));
            assert_eq!(w.outcome(), Outcome::Running);
        }
        let ev = step(&mut w, Intent::Up);
        assert_eq!(w.player().cell, c(0, 2));
        assert_eq!(ev, vec![Event::LevelCleared]);
        assert_eq!(w.outcome(), Outcome::Cleared);
    }

    #[test]
    fn top_row_alone_does_not_clear() {
        let mut w = world_from(&[
            "P $ ",
            "####",
            "  $ ",
            "====",
        ], brisk());
        step(&mut w, Intent::Right);
        let ev = step(&mut w, Intent::Right);
        assert!(has(&ev, |e| matches!(e, Event::TokenCollected { .. })));
        assert!(!w.escape_revealed());
        assert_eq!(w.outcome(), Outcome::Running);
        assert_eq!(w.tokens_collected(), 1);
        assert_eq!(w.tokens_remaining(), 1);
    }

    // ── Sentinel movement ──

    #[test]
    fn sentinels_never_share_a_step() {
        let mut w = world_from(&[
            "  P $",
            "E H E",
            "#####",
        ], brisk());
        step(&mut w, Intent::None);
        step(&mut w, Intent::None);
        assert_eq!(w.sentinels()[0].cell, c(1, 1));
        assert_eq!(w.sentinels()[1].cell, c(1, 3));

        step(&mut w, Intent::None);
        assert_eq!(w.sentinels()[0].cell, c(1, 2));
        assert_eq!(w.sentinels()[1].cell, c(1, 3));
    }

    // ── Determinism and invariants ──

    const PLAYGROUND: &[&str] = &[
        "   $      H ",
        "###H####  H ",
        " E H   $ -H-",
        "#####T######",
        "P    E   H  ",
        "============",
    ];

    fn check_invariants(w: &World) {
        let players = w.entities().filter(|e| matches!(e, EntityRef::Player(_))).count();
        assert_eq!(players, 1);
        for h in w.holes() {
            assert_eq!(w.overlay().get(&h.origin), Some(&Overlay::Open { hole: h.id }));
            for &id in &h.contains {
                match w.entity(id) {
                    Some(EntityRef::Player(p)) => {
                        assert!(p.cell == h.origin && p.state == ActorState::InHole);
                    }
                    Some(EntityRef::Sentinel(s)) => {
                        assert!(s.cell == h.origin && s.state == ActorState::InHole);
                        assert_eq!(s.trapped_in, Some(h.id));
                    }
                    other => panic!("hole {} holds {other:?}", h.id),
                }
            }
        }
        for (&cell, o) in w.overlay() {
            if let Overlay::Open { hole } = *o {
                assert_eq!(w.hole_at(cell).map(|h| h.id), Some(hole));
            }
        }
        for s in w.sentinels().iter().filter(|s| s.state == ActorState::InHole) {
            let hole = s.trapped_in.and_then(|id| w.holes().iter().find(|h| h.id == id));
            assert!(hole.is_some_and(|h| h.contains.contains(&s.id)));
        }
    }

    #[test]
    fn same_intents_same_run() {
        let script = [
            Intent::Right, Intent::Right, Intent::DigRight, Intent::None, Intent::Left,
            Intent::Up, Intent::Right, Intent::DigLeft, Intent::Down, Intent::Right,
        ];
        let mut a = world_from(PLAYGROUND, brisk());
        let mut b = a.clone();
        for _ in 0..20 {
            for &intent in &script {
                assert_eq!(step(&mut a, intent), step(&mut b, intent));
                check_invariants(&a);
            }
        }
        assert_eq!(a, b);
    }

    fn any_intent() -> impl Strategy<Value = Intent> {
        prop::sample::select(vec![
            Intent::None, Intent::Up, Intent::Down, Intent::Left,
            Intent::Right, Intent::DigLeft, Intent::DigRight,
        ])
    }

    proptest! {
        #[test]
        fn prop_runs_are_deterministic_and_consistent(
            intents in prop::collection::vec(any_intent(), 0..300)
        ) {
            let config = SimConfig { dig_duration: 2, hole_regen_ticks: 30, trap_escape_ticks: 12, ..brisk() };
            let mut a = world_from(PLAYGROUND, config);
            let mut b = a.clone();
            for &intent in &intents {
                let ea = step(&mut a, intent);
                let eb = step(&mut b, intent);
                prop_assert_eq!(ea, eb);
                check_invariants(&a);
            }
            prop_assert_eq!(a, b);
        }
    }
}
