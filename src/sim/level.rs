//! Level record handed to the engine by whatever loads levels.
//!
//! Parsing level files is the host's business; the engine only checks
//! that the record is structurally sound before building a world from it.

use thiserror::Error;

use crate::domain::tile::{Cell, Tile};

/// Initial grid and placements for one level.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Level {
    pub name: String,
    /// Rows top to bottom. Must be non-empty and rectangular.
    pub grid: Vec<Vec<Tile>>,
    pub player_start: Cell,
    pub guard_starts: Vec<Cell>,
    pub tokens: Vec<Cell>,
    /// Columns whose ladders extend to row 0 once the escape is revealed.
    /// Empty = every ladder column (unless the grid already holds
    /// EscapeLadder tiles).
    pub escape_columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelError {
    #[error("level grid has no cells")]
    Empty,
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged { row: usize, expected: usize, found: usize },
    #[error("{what} at {cell} is outside the grid")]
    OutOfBounds { what: &'static str, cell: Cell },
    #[error("{what} at {cell} is inside a solid tile")]
    Blocked { what: &'static str, cell: Cell },
    #[error("{what} at {cell} overlaps another placement")]
    Duplicate { what: &'static str, cell: Cell },
    #[error("escape column {col} is outside a grid {width} wide")]
    EscapeColumn { col: usize, width: usize },
}

impl Level {
    pub fn height(&self) -> usize {
        self.grid.len()
    }

    pub fn width(&self) -> usize {
        self.grid.first().map_or(0, Vec::len)
    }

    /// Structural checks run by `World::new`. Fails fast on the first problem.
    pub fn validate(&self) -> Result<(), LevelError> {
        self.validate_layout()?;

        let mut taken: Vec<Cell> = Vec::new();
        for (what, cell) in self.placements() {
            if self.grid[cell.row][cell.col].is_solid() {
                return Err(LevelError::Blocked { what, cell });
            }
            if taken.contains(&cell) {
                return Err(LevelError::Duplicate { what, cell });
            }
            taken.push(cell);
        }
        Ok(())
    }

    /// Shape and bounds only. Records rebuilt from a mid-level snapshot
    /// can legitimately stack a dropped token on a start cell.
    pub(crate) fn validate_layout(&self) -> Result<(), LevelError> {
        let width = self.width();
        if self.grid.is_empty() || width == 0 {
            return Err(LevelError::Empty);
        }
        for (row, tiles) in self.grid.iter().enumerate() {
            if tiles.len() != width {
                return Err(LevelError::Ragged { row, expected: width, found: tiles.len() });
            }
        }
        if let Some((what, cell)) = self.placements()
            .find(|(_, c)| c.row >= self.height() || c.col >= width)
        {
            return Err(LevelError::OutOfBounds { what, cell });
        }
        if let Some(&col) = self.escape_columns.iter().find(|&&c| c >= width) {
            return Err(LevelError::EscapeColumn { col, width });
        }
        Ok(())
    }

    fn placements(&self) -> impl Iterator<Item = (&'static str, Cell)> + '_ {
        std::iter::once(("player start", self.player_start))
            .chain(self.guard_starts.iter().map(|&c| ("sentinel start", c)))
            .chain(self.tokens.iter().map(|&c| ("token", c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::level_from;

    #[test]
    fn diagram_level_is_valid() {
        let l = level_from(&[
            "^ $ ",
            "PH E",
            "####",
        ]);
        assert_eq!((l.width(), l.height()), (4, 3));
        assert_eq!(l.validate(), Ok(()));
    }

    #[test]
    fn empty_and_ragged_grids_rejected() {
        let mut l = level_from(&["P "]);
        l.grid.clear();
        assert_eq!(l.validate(), Err(LevelError::Empty));

        let mut l = level_from(&["P  ", "###"]);
        l.grid[1].pop();
        assert_eq!(l.validate(), Err(LevelError::Ragged { row: 1, expected: 3, found: 2 }));
    }

    #[test]
    fn start_outside_or_inside_wall_rejected() {
        let mut l = level_from(&["P ", "##"]);
        l.player_start = Cell::new(4, 0);
        assert!(matches!(l.validate(), Err(LevelError::OutOfBounds { what: "player start", .. })));

        let mut l = level_from(&["P ", "##"]);
        l.guard_starts.push(Cell::new(1, 1));
        assert_eq!(
            l.validate(),
            Err(LevelError::Blocked { what: "sentinel start", cell: Cell::new(1, 1) })
        );
    }

    #[test]
    fn duplicate_starts_rejected() {
        let mut l = level_from(&["PE", "##"]);
        l.guard_starts.push(Cell::new(0, 1));
        assert_eq!(
            l.validate(),
            Err(LevelError::Duplicate { what: "sentinel start", cell: Cell::new(0, 1) })
        );
    }

    #[test]
    fn escape_column_must_fit() {
        let mut l = level_from(&["P ", "##"]);
        l.escape_columns.push(2);
        assert_eq!(l.validate(), Err(LevelError::EscapeColumn { col: 2, width: 2 }));
    }

    #[test]
    fn layout_check_allows_stacked_placements() {
        let mut l = level_from(&["P ", "##"]);
        l.tokens.push(l.player_start);
        assert!(matches!(l.validate(), Err(LevelError::Duplicate { what: "token", .. })));
        assert_eq!(l.validate_layout(), Ok(()));

        l.tokens.push(Cell::new(0, 5));
        assert!(matches!(l.validate_layout(), Err(LevelError::OutOfBounds { what: "token", .. })));
    }
}
