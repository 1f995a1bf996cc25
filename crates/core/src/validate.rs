//! Layout checks for finished plans.
//!
//! Validation flags problems; it never rejects a plan. Callers log the
//! violations and attach them to the plan's diagnostics.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::plan::DashboardPlan;

/// One layout problem in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `rows` or `cols` is zero.
    EmptyGrid { rows: u32, cols: u32 },
    /// A tile cell lies outside `[0, rows) × [0, cols)`.
    OutOfBounds { tile_id: String, cell: [i64; 2] },
    /// Two tiles claim the same cell.
    Overlap {
        first: String,
        second: String,
        cell: [i64; 2],
    },
    DuplicateTileId(String),
    /// The tile's coordinates are still the raw wire string.
    UnparsedCoordinates(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrid { rows, cols } => write!(f, "grid size {rows}x{cols} is empty"),
            Self::OutOfBounds { tile_id, cell } => write!(
                f,
                "tile '{tile_id}' cell [{}, {}] is outside the grid",
                cell[0], cell[1]
            ),
            Self::Overlap {
                first,
                second,
                cell,
            } => write!(
                f,
                "tiles '{first}' and '{second}' overlap at [{}, {}]",
                cell[0], cell[1]
            ),
            Self::DuplicateTileId(id) => write!(f, "duplicate tile id '{id}'"),
            Self::UnparsedCoordinates(id) => write!(f, "tile '{id}' has unparsed coordinates"),
        }
    }
}

/// Check a finished plan's grid, bounds, overlaps and tile ids.
pub fn validate(plan: &DashboardPlan) -> Vec<Violation> {
    let mut violations = Vec::new();
    let grid = plan.grid_size;

    let grid_ok = grid.rows > 0 && grid.cols > 0;
    if !grid_ok {
        violations.push(Violation::EmptyGrid {
            rows: grid.rows,
            cols: grid.cols,
        });
    }

    let mut seen_ids = HashSet::new();
    let mut owners: HashMap<[i64; 2], &str> = HashMap::new();

    for tile in &plan.tiles {
        if !seen_ids.insert(tile.id.as_str()) {
            violations.push(Violation::DuplicateTileId(tile.id.clone()));
        }

        let Some(cells) = tile.coordinates.cells() else {
            violations.push(Violation::UnparsedCoordinates(tile.id.clone()));
            continue;
        };

        // A tile may list the same cell more than once (corner lists do).
        let mut own_cells = HashSet::new();
        for &cell in cells {
            if !own_cells.insert(cell) {
                continue;
            }
            if grid_ok && !grid.contains(cell) {
                violations.push(Violation::OutOfBounds {
                    tile_id: tile.id.clone(),
                    cell,
                });
            }
            match owners.get(&cell) {
                Some(owner) => violations.push(Violation::Overlap {
                    first: owner.to_string(),
                    second: tile.id.clone(),
                    cell,
                }),
                None => {
                    owners.insert(cell, tile.id.as_str());
                }
            }
        }
    }

    violations
}
