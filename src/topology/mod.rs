// Node placement comes from a csv file (one `index,x,y` row per node) or,
// when that is missing or short, from a jittered grid. Either way the run
// proceeds: a broken topology source is a warning, not a stop.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    #[allow(dead_code)]
    index: u32,
    x: f64,
    y: f64,
}

// Malformed rows are skipped, not fatal. Err only when the file itself
// cannot be opened.
pub fn load_positions(path: impl AsRef<Path>) -> Result<Vec<Position>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut positions = Vec::new();
    for (line, row) in reader.deserialize::<PositionRow>().enumerate() {
        match row {
            Ok(row) => positions.push(Position { x: row.x, y: row.y }),
            Err(e) => warn!("skipping malformed topology row {}: {}", line + 1, e),
        }
    }

    Ok(positions)
}

// Square-ish grid with seeded jitter. Same seed, same layout, so the whole
// schedule + placement pipeline stays reproducible.
pub fn grid_positions(count: usize, spacing: f64, seed: u64) -> Vec<Position> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = (count as f64).sqrt().ceil().max(1.0) as usize;

    (0..count)
        .map(|i| {
            let jx: f64 = rng.gen_range(-0.25..0.25) * spacing;
            let jy: f64 = rng.gen_range(-0.25..0.25) * spacing;
            Position {
                x: (i % cols) as f64 * spacing + jx,
                y: (i / cols) as f64 * spacing + jy,
            }
        })
        .collect()
}

// Resolve exactly `count` positions. File rows win; anything missing is
// filled from the grid so a short or unreadable file still yields a valid
// placement.
pub fn positions_or_grid(
    path: Option<&Path>,
    count: usize,
    spacing: f64,
    seed: u64,
) -> Vec<Position> {
    let mut positions = match path {
        Some(path) => match load_positions(path) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "cannot read topology file {}: {}, falling back to grid layout",
                    path.display(),
                    e
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    if positions.len() > count {
        positions.truncate(count);
    } else if positions.len() < count {
        if path.is_some() && !positions.is_empty() {
            warn!(
                "topology file provides {} of {} positions, padding with grid layout",
                positions.len(),
                count
            );
        }
        let grid = grid_positions(count, spacing, seed);
        positions.extend_from_slice(&grid[positions.len()..]);
    }

    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_csv(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("manetlab_{}_{}.csv", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_simple_rows() {
        let path = temp_csv("ok", "0,1.5,2.5\n1,3.0,4.0\n");
        let positions = load_positions(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], Position { x: 1.5, y: 2.5 });
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let path = temp_csv("bad", "0,1.0,2.0\nnot,a,row\n2,5.0\n3,7.0,8.0\n");
        let positions = load_positions(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1], Position { x: 7.0, y: 8.0 });
    }

    #[test]
    fn missing_file_degrades_to_grid() {
        let missing = std::path::Path::new("/definitely/not/here.csv");
        let positions = positions_or_grid(Some(missing), 9, 5.0, 7);
        assert_eq!(positions.len(), 9);
        assert_eq!(positions, grid_positions(9, 5.0, 7));
    }

    #[test]
    fn grid_is_seed_deterministic() {
        assert_eq!(grid_positions(16, 5.0, 42), grid_positions(16, 5.0, 42));
        assert_ne!(grid_positions(16, 5.0, 42), grid_positions(16, 5.0, 43));
    }

    #[test]
    fn short_file_is_padded_to_count() {
        let path = temp_csv("short", "0,1.0,1.0\n");
        let positions = positions_or_grid(Some(&path), 4, 5.0, 1);
        fs::remove_file(&path).ok();

        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0], Position { x: 1.0, y: 1.0 });
        assert_eq!(positions[1..], grid_positions(4, 5.0, 1)[1..]);
    }

    #[test]
    fn zero_count_is_fine() {
        assert!(grid_positions(0, 5.0, 1).is_empty());
        assert!(positions_or_grid(None, 0, 5.0, 1).is_empty());
    }
}
