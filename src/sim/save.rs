//! Save and load world snapshots: four slots plus the old `save.dat`.
//!
//! ## Slots
//!
//!   `save_1.toml` .. `save_4.toml` under the store directory. Each holds
//!   the complete `World`: grid rows, overlay, every entity with its
//!   timers, counters, config and the level record used by restart.
//!   Loading resumes play exactly where the save was taken.
//!
//! ## Legacy
//!
//!   `save.dat`, key=value lines written by earlier releases. Read only.
//!   Gold tiles become tokens, hidden ladders become escape tiles and
//!   hole countdowns become ages against the caller's config.
//!
//! A load either yields a structurally valid world or an error; nothing
//! is half-applied.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SimConfig;
use crate::domain::entity::{
    ActorState, EntityId, EntityRef, Facing, Hole, Player, Sentinel, Token,
};
use crate::domain::physics::{Overlay, OverlayMap};
use crate::domain::tile::{Cell, Grid, Tile};
use super::level::Level;
use super::world::{Outcome, World};

// ══════════════════════════════════════════════════════════════
// Public types
// ══════════════════════════════════════════════════════════════

const FORMAT_VERSION: u32 = 1;
const SLOT_COUNT: u8 = 4;
const LEGACY_SAVE: &str = "save.dat";

/// One of the four numbered slots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Slot(u8);

impl Slot {
    pub fn new(index: u8) -> Result<Slot, PersistError> {
        if (1..=SLOT_COUNT).contains(&index) {
            Ok(Slot(index))
        } else {
            Err(PersistError::InvalidSlot(index))
        }
    }

    pub fn index(self) -> u8 { self.0 }

    pub fn all() -> impl Iterator<Item = Slot> {
        (1..=SLOT_COUNT).map(Slot)
    }

    fn filename(self) -> String {
        format!("save_{}.toml", self.0)
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("slot {0} does not exist (slots are 1-4)")]
    InvalidSlot(u8),
    #[error("nothing saved at {}", .0.display())]
    Missing(PathBuf),
    #[error("cannot access {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("corrupt save: {0}")]
    CorruptSave(String),
    #[error("cannot encode save: {0}")]
    Encode(#[from] toml::ser::Error),
}

fn corrupt(msg: impl Into<String>) -> PersistError {
    PersistError::CorruptSave(msg.into())
}

/// Contents of an old `save.dat`.
#[derive(Clone, Debug)]
pub struct LegacySave {
    pub level: usize,
    pub score: u32,
    pub lives: u32,
    /// Only saves taken mid-level carry a snapshot.
    pub world: Option<World>,
}

// ══════════════════════════════════════════════════════════════
// Store
// ══════════════════════════════════════════════════════════════

/// Save slots rooted at one directory.
#[derive(Clone, Debug)]
pub struct SaveStore {
    dir: PathBuf,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SaveStore { dir: dir.into() }
    }

    /// `$XDG_DATA_HOME/noderunner`, else `~/.local/share/noderunner`,
    /// else the working directory.
    pub fn default_location() -> Self {
        let data_home = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")));
        match data_home {
            Some(base) => SaveStore::new(base.join("noderunner")),
            None => SaveStore::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
        }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn slot_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.filename())
    }

    /// Write a full snapshot, replacing whatever the slot held.
    pub fn save(&self, world: &World, slot: Slot) -> Result<(), PersistError> {
        let text = toml::to_string(&encode(world))?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|source| PersistError::Io { path: self.dir.clone(), source })?;
        let path = self.slot_path(slot);
        std::fs::write(&path, text)
            .map_err(|source| PersistError::Io { path: path.clone(), source })?;
        log::debug!("saved {:?} tick {} to {}", world.level().name, world.tick(), path.display());
        Ok(())
    }

    pub fn load(&self, slot: Slot) -> Result<World, PersistError> {
        let path = self.slot_path(slot);
        let text = read(&path)?;
        let world = toml::from_str::<SaveFile>(&text)
            .map_err(|e| corrupt(e.to_string()))
            .and_then(decode);
        match &world {
            Ok(w) => log::debug!("loaded {:?} tick {} from {}", w.level().name, w.tick(), path.display()),
            Err(e) => log::warn!("{}: {e}", path.display()),
        }
        world
    }

    /// Replace `world` with the slot's snapshot. On error `world` is untouched.
    pub fn load_into(&self, slot: Slot, world: &mut World) -> Result<(), PersistError> {
        *world = self.load(slot)?;
        Ok(())
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.slot_path(slot).exists()
    }

    /// Deleting an empty slot is not an error.
    pub fn delete_slot(&self, slot: Slot) -> Result<(), PersistError> {
        let path = self.slot_path(slot);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Io { path, source }),
        }
    }

    pub fn has_legacy(&self) -> bool {
        self.dir.join(LEGACY_SAVE).exists()
    }

    pub fn load_legacy(&self, config: &SimConfig) -> Result<LegacySave, PersistError> {
        let path = self.dir.join(LEGACY_SAVE);
        let save = parse_legacy(&read(&path)?, config)?;
        log::debug!("read legacy save for level {} from {}", save.level, path.display());
        Ok(save)
    }
}

fn read(path: &Path) -> Result<String, PersistError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => PersistError::Missing(path.to_path_buf()),
        _ => PersistError::Io { path: path.to_path_buf(), source },
    })
}

// ══════════════════════════════════════════════════════════════
// Slot file format
// ══════════════════════════════════════════════════════════════

/// Plain values first, tables after.
#[derive(Serialize, Deserialize, Debug)]
struct SaveFile {
    version: u32,
    width: usize,
    height: usize,
    tick: u64,
    tokens_collected: u32,
    escape_revealed: bool,
    next_id: u32,
    outcome: Outcome,
    /// One char per tile, `Tile::to_char`.
    rows: Vec<String>,
    config: SimConfig,
    player: Player,
    level: LevelRecord,
    #[serde(default)]
    overlay: Vec<OverlayRecord>,
    #[serde(default)]
    sentinels: Vec<Sentinel>,
    #[serde(default)]
    holes: Vec<Hole>,
    #[serde(default)]
    tokens: Vec<Token>,
}

#[derive(Serialize, Deserialize, Debug)]
struct OverlayRecord {
    cell: Cell,
    overlay: Overlay,
}

#[derive(Serialize, Deserialize, Debug)]
struct LevelRecord {
    name: String,
    rows: Vec<String>,
    player_start: Cell,
    #[serde(default)]
    guard_starts: Vec<Cell>,
    #[serde(default)]
    tokens: Vec<Cell>,
    #[serde(default)]
    escape_columns: Vec<usize>,
}

fn row_string(row: &[Tile]) -> String {
    row.iter().map(|t| t.to_char()).collect()
}

impl From<&Level> for LevelRecord {
    fn from(l: &Level) -> Self {
        LevelRecord {
            name: l.name.clone(),
            rows: l.grid.iter().map(|r| row_string(r)).collect(),
            player_start: l.player_start,
            guard_starts: l.guard_starts.clone(),
            tokens: l.tokens.clone(),
            escape_columns: l.escape_columns.clone(),
        }
    }
}

impl LevelRecord {
    fn into_level(self, width: usize, height: usize) -> Result<Level, PersistError> {
        let level = Level {
            name: self.name,
            grid: parse_rows(&self.rows, width, height)?,
            player_start: self.player_start,
            guard_starts: self.guard_starts,
            tokens: self.tokens,
            escape_columns: self.escape_columns,
        };
        level.validate().map_err(|e| corrupt(format!("level record: {e}")))?;
        Ok(level)
    }
}

fn encode(w: &World) -> SaveFile {
    SaveFile {
        version: FORMAT_VERSION,
        width: w.grid.width(),
        height: w.grid.height(),
        tick: w.tick,
        tokens_collected: w.tokens_collected,
        escape_revealed: w.escape_revealed,
        next_id: w.next_id,
        outcome: w.outcome,
        rows: w.grid.rows().map(row_string).collect(),
        config: w.config,
        player: w.player.clone(),
        level: LevelRecord::from(&w.level),
        overlay: w.overlay.iter()
            .map(|(&cell, &overlay)| OverlayRecord { cell, overlay })
            .collect(),
        sentinels: w.sentinels.clone(),
        holes: w.holes.clone(),
        tokens: w.tokens.clone(),
    }
}

fn parse_rows(rows: &[String], width: usize, height: usize) -> Result<Vec<Vec<Tile>>, PersistError> {
    if width == 0 || height == 0 {
        return Err(corrupt("grid has no cells"));
    }
    if rows.len() != height {
        return Err(corrupt(format!("{} rows, header says {height}", rows.len())));
    }
    rows.iter().enumerate().map(|(r, line)| {
        let tiles = line.chars()
            .map(|c| Tile::from_char(c).ok_or_else(|| corrupt(format!("unknown tile {c:?} in row {r}"))))
            .collect::<Result<Vec<Tile>, _>>()?;
        if tiles.len() != width {
            return Err(corrupt(format!("row {r} has {} cells, header says {width}", tiles.len())));
        }
        Ok(tiles)
    }).collect()
}

fn decode(file: SaveFile) -> Result<World, PersistError> {
    if file.version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", file.version)));
    }
    let tiles = parse_rows(&file.rows, file.width, file.height)?;
    let level = file.level.into_level(file.width, file.height)?;

    let records = file.overlay.len();
    let overlay: OverlayMap = file.overlay.into_iter().map(|r| (r.cell, r.overlay)).collect();
    if overlay.len() != records {
        return Err(corrupt("two overlay records for one cell"));
    }

    let world = World {
        level,
        config: file.config,
        grid: Grid::from_rows(&tiles),
        overlay,
        player: file.player,
        sentinels: file.sentinels,
        holes: file.holes,
        tokens: file.tokens,
        next_id: file.next_id,
        tick: file.tick,
        tokens_collected: file.tokens_collected,
        escape_revealed: file.escape_revealed,
        outcome: file.outcome,
    };
    check_world(&world)?;
    Ok(world)
}

// ══════════════════════════════════════════════════════════════
// Structural checks (shared by both formats)
// ══════════════════════════════════════════════════════════════

fn check_world(w: &World) -> Result<(), PersistError> {
    let in_grid = |what: &str, cell: Cell| {
        if w.grid.contains(cell) { Ok(()) }
        else { Err(corrupt(format!("{what} at {cell} is outside the grid"))) }
    };
    in_grid("player", w.player.cell)?;
    if let Some(cell) = w.player.digging { in_grid("dig", cell)?; }
    for s in &w.sentinels {
        in_grid("sentinel", s.cell)?;
        in_grid("sentinel spawn", s.spawn)?;
        for &c in &s.path { in_grid("sentinel path", c)?; }
    }
    for h in &w.holes { in_grid("hole", h.origin)?; }
    for t in &w.tokens { in_grid("token", t.cell)?; }
    for &c in w.overlay.keys() { in_grid("overlay", c)?; }

    // ── Ids ──
    let mut seen = BTreeSet::new();
    for e in w.entities() {
        let id = e.id();
        if !seen.insert(id) { return Err(corrupt(format!("entity id {id} used twice"))); }
        if id.0 >= w.next_id { return Err(corrupt(format!("entity id {id} not below id counter {}", w.next_id))); }
    }

    // ── Overlay ↔ holes ──
    for (&cell, overlay) in &w.overlay {
        let tile = w.grid.tile(cell);
        match *overlay {
            Overlay::Cracked { .. } | Overlay::Open { .. } if tile != Tile::Firewall => {
                return Err(corrupt(format!("dig overlay on {tile:?} at {cell}")));
            }
            Overlay::Fallen if tile != Tile::Trap => {
                return Err(corrupt(format!("collapsed trap on {tile:?} at {cell}")));
            }
            Overlay::Open { hole } => {
                if w.holes.iter().find(|h| h.id == hole).map(|h| h.origin) != Some(cell) {
                    return Err(corrupt(format!("open cell {cell} names missing hole {hole}")));
                }
            }
            _ => {}
        }
    }
    for h in &w.holes {
        if w.overlay.get(&h.origin) != Some(&Overlay::Open { hole: h.id }) {
            return Err(corrupt(format!("hole {} has no open cell", h.id)));
        }
        for &id in &h.contains {
            let inside = match w.entity(id) {
                Some(EntityRef::Player(p)) => p.cell == h.origin && p.state == ActorState::InHole,
                Some(EntityRef::Sentinel(s)) => {
                    s.cell == h.origin && s.state == ActorState::InHole && s.trapped_in == Some(h.id)
                }
                _ => false,
            };
            if !inside { return Err(corrupt(format!("hole {} lists {id}, which is not inside it", h.id))); }
        }
    }

    // ── Trapped actors are listed by their hole ──
    let listed = |id: EntityId, cell: Cell| w.holes.iter().any(|h| h.origin == cell && h.contains.contains(&id));
    if w.player.state == ActorState::InHole && !listed(w.player.id, w.player.cell) {
        return Err(corrupt("player is in a hole that does not hold it"));
    }
    for s in w.sentinels.iter().filter(|s| s.state == ActorState::InHole) {
        if !listed(s.id, s.cell) {
            return Err(corrupt(format!("sentinel {} is in a hole that does not hold it", s.id)));
        }
    }

    // ── Carried tokens ──
    for t in &w.tokens {
        let Some(carrier) = t.carrier else { continue };
        if !w.sentinels.iter().any(|s| s.id == carrier && s.carrying == Some(t.id)) {
            return Err(corrupt(format!("token {} carried by {carrier}, which does not hold it", t.id)));
        }
    }
    for s in &w.sentinels {
        let Some(token) = s.carrying else { continue };
        if !w.tokens.iter().any(|t| t.id == token && t.carrier == Some(s.id)) {
            return Err(corrupt(format!("sentinel {} carries unknown token {token}", s.id)));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// Legacy save.dat
// ══════════════════════════════════════════════════════════════
//
// Coordinates are `x,y` (column first). Lines:
//   level= score= lives= has_snapshot=1 tick= width= height=
//   gold_remaining= gold_total= exit_enabled=0|1 player_spawn=x,y
//   player=x,y,facing,state,cooldown
//   guard=id,x,y,facing,state,carry,carry_timer,stuck,cooldown,
//         spawn_x,spawn_y,respawn_timer,separation_timer
//   hole=x,y,open_remaining,close_remaining
//   dig=x,y,ticks_remaining,total_ticks
//   exit_cols=a,b,..  hidden_ladder=x,y  tile_row=<chars>

#[derive(Default)]
struct LegacyFields<'a> {
    level: Option<usize>,
    score: Option<u32>,
    lives: Option<u32>,
    has_snapshot: bool,
    tick: u64,
    width: usize,
    height: usize,
    gold_remaining: u32,
    gold_total: u32,
    exit_enabled: bool,
    player_spawn: Option<Cell>,
    player: Option<&'a str>,
    guards: Vec<&'a str>,
    holes: Vec<&'a str>,
    digs: Vec<&'a str>,
    exit_columns: Vec<usize>,
    hidden_ladders: Vec<Cell>,
    tile_rows: Vec<&'a str>,
}

fn num<T: FromStr>(key: &str, val: &str) -> Result<T, PersistError> {
    val.trim().parse().map_err(|_| corrupt(format!("{key}: bad number {val:?}")))
}

fn xy(key: &str, x: &str, y: &str) -> Result<Cell, PersistError> {
    Ok(Cell::new(num(key, y)?, num(key, x)?))
}

fn fields<'a>(key: &str, val: &'a str, count: usize) -> Result<Vec<&'a str>, PersistError> {
    let parts: Vec<&str> = val.split(',').map(str::trim).collect();
    if parts.len() < count {
        return Err(corrupt(format!("{key}: expected {count} fields, found {}", parts.len())));
    }
    Ok(parts)
}

fn legacy_facing(tag: &str) -> Result<Facing, PersistError> {
    match tag {
        "L" => Ok(Facing::Left),
        "R" => Ok(Facing::Right),
        _ => Err(corrupt(format!("unknown facing {tag:?}"))),
    }
}

fn legacy_state(tag: &str) -> Result<ActorState, PersistError> {
    Ok(match tag {
        "G" => ActorState::OnGround,
        "F" => ActorState::Falling,
        "L" => ActorState::OnLadder,
        "R" => ActorState::OnRope,
        "H" => ActorState::InHole,
        "D" => ActorState::Dead,
        _ => return Err(corrupt(format!("unknown state {tag:?}"))),
    })
}

fn parse_legacy(text: &str, config: &SimConfig) -> Result<LegacySave, PersistError> {
    let mut f = LegacyFields::default();

    for line in text.lines() {
        let line = line.trim_end(); // tile rows keep their leading blanks
        let Some((key, val)) = line.split_once('=') else { continue };
        match key.trim() {
            "level" => f.level = Some(num(key, val)?),
            "score" => f.score = Some(num(key, val)?),
            "lives" => f.lives = Some(num(key, val)?),
            "has_snapshot" => f.has_snapshot = val.trim() == "1",
            "tick" => f.tick = num(key, val)?,
            "width" => f.width = num(key, val)?,
            "height" => f.height = num(key, val)?,
            "gold_remaining" => f.gold_remaining = num(key, val)?,
            "gold_total" => f.gold_total = num(key, val)?,
            "exit_enabled" => f.exit_enabled = val.trim() == "1",
            "player_spawn" => {
                let p = fields(key, val, 2)?;
                f.player_spawn = Some(xy(key, p[0], p[1])?);
            }
            "player" => f.player = Some(val),
            "guard" => f.guards.push(val),
            "hole" => f.holes.push(val),
            "dig" => f.digs.push(val),
            "exit_cols" => {
                f.exit_columns = val.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| num(key, s))
                    .collect::<Result<_, _>>()?;
            }
            "hidden_ladder" => {
                let p = fields(key, val, 2)?;
                f.hidden_ladders.push(xy(key, p[0], p[1])?);
            }
            "tile_row" => f.tile_rows.push(val),
            _ => {}
        }
    }

    let (Some(level), Some(score), Some(lives)) = (f.level, f.score, f.lives) else {
        return Err(corrupt("legacy save lacks level, score or lives"));
    };
    let world = if f.has_snapshot {
        Some(legacy_world(&f, format!("level {level}"), config)?)
    } else {
        None
    };
    Ok(LegacySave { level, score, lives, world })
}

fn legacy_world(f: &LegacyFields, name: String, config: &SimConfig) -> Result<World, PersistError> {
    let (width, height) = (f.width, f.height);
    if width == 0 || height == 0 {
        return Err(corrupt("legacy snapshot has no grid size"));
    }
    if f.tile_rows.len() != height {
        return Err(corrupt(format!("{} tile rows, header says {height}", f.tile_rows.len())));
    }

    // ── Tiles (gold lifted out as tokens) ──
    let mut tiles: Vec<Vec<Tile>> = Vec::with_capacity(height);
    let mut loose: Vec<Cell> = Vec::new();
    for (row, line) in f.tile_rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(width);
        for (col, ch) in line.chars().enumerate() {
            let tile = match ch {
                '$' => {
                    loose.push(Cell::new(row, col));
                    Tile::Empty
                }
                _ => Tile::from_char(ch).ok_or_else(|| corrupt(format!("unknown tile {ch:?} in row {row}")))?,
            };
            cells.push(tile);
        }
        if cells.len() > width {
            return Err(corrupt(format!("tile row {row} is wider than {width}")));
        }
        // rows lose trailing blanks to line trimming
        cells.resize(width, Tile::Empty);
        tiles.push(cells);
    }
    for &cell in &f.hidden_ladders {
        let Some(tile) = tiles.get_mut(cell.row).and_then(|r| r.get_mut(cell.col)) else {
            return Err(corrupt(format!("hidden ladder at {cell} is outside the grid")));
        };
        *tile = Tile::EscapeLadder;
    }

    // ── Player ──
    let line = f.player.ok_or_else(|| corrupt("legacy snapshot has no player"))?;
    let p = fields("player", line, 5)?;
    let mut player = Player::new(EntityId(0), xy("player", p[0], p[1])?);
    player.facing = legacy_facing(p[2])?;
    player.state = legacy_state(p[3])?;
    player.move_cooldown = num("player", p[4])?;
    let mut next_id = 1u32;

    // ── Guards ──
    let mut sentinels: Vec<Sentinel> = Vec::with_capacity(f.guards.len());
    let mut carriers: Vec<usize> = Vec::new();
    for line in &f.guards {
        let g = fields("guard", line, 13)?;
        let mut s = Sentinel::new(EntityId(next_id), xy("guard", g[1], g[2])?, num("guard", g[8])?);
        next_id += 1;
        s.facing = legacy_facing(g[3])?;
        s.state = legacy_state(g[4])?;
        if s.state == ActorState::InHole { s.escape_timer = num("guard", g[7])?; }
        s.spawn = xy("guard", g[9], g[10])?;
        s.respawn_timer = num("guard", g[11])?;
        if g[5] == "1" { carriers.push(sentinels.len()); }
        sentinels.push(s);
    }

    // ── Tokens: loose first, then carried ──
    let mut tokens: Vec<Token> = Vec::with_capacity(loose.len() + carriers.len());
    for &cell in &loose {
        tokens.push(Token::new(EntityId(next_id), cell));
        next_id += 1;
    }
    for &i in &carriers {
        let s = &mut sentinels[i];
        let mut t = Token::new(EntityId(next_id), s.cell);
        next_id += 1;
        t.carrier = Some(s.id);
        s.carrying = Some(t.id);
        tokens.push(t);
    }

    // ── Holes and digs ──
    let mut overlay = OverlayMap::new();
    let mut holes: Vec<Hole> = Vec::with_capacity(f.holes.len());
    for line in &f.holes {
        let h = fields("hole", line, 4)?;
        let origin = xy("hole", h[0], h[1])?;
        // the old format stores an open hole as a blank tile
        match tiles.get_mut(origin.row).and_then(|r| r.get_mut(origin.col)) {
            Some(tile) if matches!(*tile, Tile::Empty | Tile::Firewall) => *tile = Tile::Firewall,
            Some(tile) => return Err(corrupt(format!("hole at {origin} sits on {tile:?}"))),
            None => return Err(corrupt(format!("hole at {origin} is outside the grid"))),
        }
        let mut hole = Hole::new(EntityId(next_id), origin);
        next_id += 1;
        let remaining = num::<u32>("hole", h[2])?.saturating_add(num("hole", h[3])?);
        hole.age = config.hole_regen_ticks.saturating_sub(remaining);
        overlay.insert(hole.origin, Overlay::Open { hole: hole.id });
        holes.push(hole);
    }
    for s in sentinels.iter_mut().filter(|s| s.state == ActorState::InHole) {
        if let Some(h) = holes.iter_mut().find(|h| h.origin == s.cell) {
            h.contains.push(s.id);
            s.trapped_in = Some(h.id);
        }
    }
    if player.state == ActorState::InHole {
        if let Some(h) = holes.iter_mut().find(|h| h.origin == player.cell) {
            h.contains.push(player.id);
        }
    }
    for line in &f.digs {
        let d = fields("dig", line, 4)?;
        let cell = xy("dig", d[0], d[1])?;
        let remaining: u32 = num("dig", d[2])?;
        let total: u32 = num("dig", d[3])?;
        let progress = total.saturating_sub(remaining).min(config.dig_duration.saturating_sub(1));
        overlay.insert(cell, Overlay::Cracked { progress, digger: player.id });
        player.digging = Some(cell);
    }

    let level = Level {
        name,
        grid: tiles.clone(),
        player_start: f.player_spawn.unwrap_or(player.cell),
        guard_starts: sentinels.iter().map(|s| s.spawn).collect(),
        tokens: loose,
        escape_columns: f.exit_columns.clone(),
    };
    level.validate_layout().map_err(|e| corrupt(format!("legacy level: {e}")))?;

    let outcome = if player.alive() { Outcome::Running } else { Outcome::Lost };
    let world = World {
        level,
        config: *config,
        grid: Grid::from_rows(&tiles),
        overlay,
        player,
        sentinels,
        holes,
        tokens,
        next_id,
        tick: f.tick,
        tokens_collected: f.gold_total.saturating_sub(f.gold_remaining),
        escape_revealed: f.exit_enabled,
        outcome,
    };
    check_world(&world)?;
    Ok(world)
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
