//! Tile types, cells and the static grid.
//!
//! Tile properties are queried via methods, not stored as flags,
//! so tile semantics are centralized here. The grid never changes after
//! a world is built; digging and trap collapse live in the overlay
//! (see `physics`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Empty,
    Firewall,     // Solid + Diggable
    Concrete,     // Solid only
    Ladder,       // Climbable
    Rope,         // Hangable (horizontal bar)
    EscapeLadder, // Inert until the escape is revealed
    Trap,         // Looks like Firewall, gives way when stood on
}

impl Tile {
    /// Blocks movement and acts as a floor.
    pub fn is_solid(self) -> bool {
        matches!(self, Tile::Firewall | Tile::Concrete | Tile::Trap)
    }

    pub fn is_diggable(self) -> bool {
        matches!(self, Tile::Firewall)
    }

    /// Up/down movement. EscapeLadder only climbs once revealed, which is
    /// world state, so the bare tile says no.
    pub fn is_climbable(self) -> bool {
        matches!(self, Tile::Ladder)
    }

    /// Hanging and moving sideways without a floor.
    pub fn is_traversable_horizontally(self) -> bool {
        matches!(self, Tile::Rope)
    }

    /// Can an actor stand on top of this tile?
    pub fn supports_standing(self) -> bool {
        self.is_solid() || self.is_climbable()
    }

    pub fn is_passable(self) -> bool {
        !self.is_solid()
    }

    /// One-character form used by save files and test diagrams.
    pub fn to_char(self) -> char {
        match self {
            Tile::Empty        => ' ',
            Tile::Firewall     => '#',
            Tile::Concrete     => '=',
            Tile::Ladder       => 'H',
            Tile::Rope         => '-',
            Tile::EscapeLadder => '~',
            Tile::Trap         => 'T',
        }
    }

    pub fn from_char(c: char) -> Option<Tile> {
        Some(match c {
            ' ' => Tile::Empty,
            '#' => Tile::Firewall,
            '=' => Tile::Concrete,
            'H' => Tile::Ladder,
            '-' => Tile::Rope,
            '~' => Tile::EscapeLadder,
            'T' => Tile::Trap,
            _ => return None,
        })
    }
}

// ══════════════════════════════════════════════════════════════
// Cells and directions
// ══════════════════════════════════════════════════════════════

/// Grid coordinate. Row 0 is the top of the map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Cell { row, col }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl From<[usize; 2]> for Cell {
    fn from([row, col]: [usize; 2]) -> Self {
        Cell { row, col }
    }
}

impl From<Cell> for [usize; 2] {
    fn from(c: Cell) -> Self {
        [c.row, c.col]
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dir {
    Up,
    Down,
    Left,
    Right,
}

impl Dir {
    /// Fixed visit order for path planning. Changing it changes guard AI.
    pub const ALL: [Dir; 4] = [Dir::Up, Dir::Down, Dir::Left, Dir::Right];
}

// ══════════════════════════════════════════════════════════════
// Grid
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell ({row}, {col}) is outside the {width}x{height} grid")]
    OutOfBounds { row: usize, col: usize, width: usize, height: usize },
}

/// Row-major tile storage.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

impl Grid {
    /// Caller guarantees `rows` is non-empty and rectangular
    /// (`Level::validate` checks this before a world is built).
    pub fn from_rows(rows: &[Vec<Tile>]) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let tiles = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Grid { width, height, tiles }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    pub fn get(&self, cell: Cell) -> Result<Tile, GridError> {
        if !self.contains(cell) {
            return Err(GridError::OutOfBounds {
                row: cell.row, col: cell.col,
                width: self.width, height: self.height,
            });
        }
        Ok(self.tiles[cell.row * self.width + cell.col])
    }

    /// Tile at an in-bounds cell; out of bounds reads as Concrete (wall).
    #[inline]
    pub fn tile(&self, cell: Cell) -> Tile {
        self.get(cell).unwrap_or(Tile::Concrete)
    }

    /// Only used while building a world (escape ladder extension).
    pub(crate) fn set(&mut self, cell: Cell, tile: Tile) {
        if self.contains(cell) {
            self.tiles[cell.row * self.width + cell.col] = tile;
        }
    }

    /// Adjacent cell in `dir`, or `None` at the map edge.
    pub fn neighbor(&self, cell: Cell, dir: Dir) -> Option<Cell> {
        let next = match dir {
            Dir::Up    => Cell::new(cell.row.checked_sub(1)?, cell.col),
            Dir::Down  => Cell::new(cell.row + 1, cell.col),
            Dir::Left  => Cell::new(cell.row, cell.col.checked_sub(1)?),
            Dir::Right => Cell::new(cell.row, cell.col + 1),
        };
        self.contains(next).then_some(next)
    }

    pub fn below(&self, cell: Cell) -> Option<Cell> {
        self.neighbor(cell, Dir::Down)
    }

    pub fn above(&self, cell: Cell) -> Option<Cell> {
        self.neighbor(cell, Dir::Up)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Tile]> {
        self.tiles.chunks(self.width.max(1))
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |row| (0..self.width).map(move |col| Cell::new(row, col)))
    }
}
