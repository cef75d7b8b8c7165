//! Diagram helpers shared by the unit tests.
//!
//! Rows use the tile chars of `Tile::from_char` plus four markers that
//! leave the cell Empty:
//!   'P' = Player start   'E' = Sentinel start
//!   '$' = Token          '^' = escape column

use crate::config::SimConfig;
use crate::domain::tile::{Cell, Grid, Tile};
use crate::sim::level::Level;
use crate::sim::world::World;

fn tile_row(row: &str) -> Vec<Tile> {
    row.chars()
        .map(|c| match c {
            'P' | 'E' | '$' | '^' => Tile::Empty,
            _ => Tile::from_char(c).unwrap_or_else(|| panic!("bad diagram char {c:?}")),
        })
        .collect()
}

pub fn grid_from(rows: &[&str]) -> Grid {
    let tiles: Vec<Vec<Tile>> = rows.iter().map(|r| tile_row(r)).collect();
    Grid::from_rows(&tiles)
}

pub fn level_from(rows: &[&str]) -> Level {
    let mut level = Level {
        name: "diagram".into(),
        grid: rows.iter().map(|r| tile_row(r)).collect(),
        player_start: Cell::new(0, 0),
        guard_starts: Vec::new(),
        tokens: Vec::new(),
        escape_columns: Vec::new(),
    };
    for (row, line) in rows.iter().enumerate() {
        for (col, ch) in line.chars().enumerate() {
            let cell = Cell::new(row, col);
            match ch {
                'P' => level.player_start = cell,
                'E' => level.guard_starts.push(cell),
                '$' => level.tokens.push(cell),
                '^' => level.escape_columns.push(col),
                _ => {}
            }
        }
    }
    level
}

pub fn world_from(rows: &[&str], config: SimConfig) -> World {
    World::new(&level_from(rows), config).expect("diagram level is valid")
}
