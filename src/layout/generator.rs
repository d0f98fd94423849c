// Layout generation - abstract keyboard description to pitch -> position table
// Grid enumeration, dummy slots, semitone spacing, affine and sector warps, normalization

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::geometry::{normalize_points, Bounds, Matrix3, Point, IDENTITY};
use super::pitch::{is_semitone, name_to_midi_pitch};
use crate::notes::NO_KEY;

/// Errors raised for invalid layout descriptions
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Invalid pitch name: {0:?}")]
    InvalidPitchName(String),

    #[error("Layout needs at least one row and one column")]
    EmptyGrid,

    #[error("Row {row} has a zero length override")]
    InvalidRowLength { row: usize },

    #[error("Dummy key at row {row}, column {column} lies outside the layout")]
    DummyOutOfRange { row: usize, column: usize },

    #[error("Pitch list has {available} names but the grid has {needed} cells")]
    PitchListTooShort { needed: usize, available: usize },

    #[error("Grid runs to pitch {last}, past the end of its range ({to})")]
    RangeTooShort { last: i32, to: i32 },

    #[error("Sector radius must be positive, got {0}")]
    InvalidRadius(f64),
}

/// Pitches a layout enumerates, row-major from the bottom-left key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PitchSpan {
    /// Inclusive range; the grid takes successive pitches from `from`
    Range { from: String, to: String },

    /// Explicit pitch per cell
    List(Vec<String>),
}

/// Abstract keyboard description
///
/// Rows count from the bottom, columns from the left. Positions are generated
/// with y = 1 on the bottom row, then normalized to [0, 1] on both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDescription {
    pub pitches: PitchSpan,

    pub rows: usize,

    /// Keys per row, black keys included
    pub columns: usize,

    /// Row index -> key count for rows that differ from `columns`
    #[serde(default)]
    pub row_length_override: BTreeMap<usize, usize>,

    /// (row, column) positions of placeholder slots that hold no key
    #[serde(default)]
    pub insert_dummy_keys: Vec<(usize, usize)>,

    /// Whether black keys have their own cells
    #[serde(default)]
    pub have_semitone: bool,

    /// Horizontal space a black key takes between its neighbours
    /// 0.0 = squeezed between two white keys, 1.0 = a full key slot
    #[serde(default)]
    pub semitone_width: f64,

    /// How far black keys are raised toward the row above
    /// 0.0 = level with white keys, 1.0 = a full row
    #[serde(default = "default_semitone_height_offset")]
    pub semitone_height_offset: f64,

    #[serde(default = "default_transform")]
    pub transform: Matrix3,

    /// Sector angle in radians; 0 disables the arc warp
    #[serde(default)]
    pub center_angle: f64,

    /// Sector radius, in units of the layout's total height
    #[serde(default = "default_center_radius")]
    pub center_radius: f64,
}

fn default_semitone_height_offset() -> f64 {
    0.5
}

fn default_transform() -> Matrix3 {
    IDENTITY
}

fn default_center_radius() -> f64 {
    1.0
}

impl LayoutDescription {
    /// Plain grid over an inclusive pitch range, every other field at its default
    pub fn grid(from: &str, to: &str, rows: usize, columns: usize, have_semitone: bool) -> Self {
        LayoutDescription {
            pitches: PitchSpan::Range {
                from: from.to_string(),
                to: to.to_string(),
            },
            rows,
            columns,
            row_length_override: BTreeMap::new(),
            insert_dummy_keys: Vec::new(),
            have_semitone,
            semitone_width: 0.0,
            semitone_height_offset: default_semitone_height_offset(),
            transform: IDENTITY,
            center_angle: 0.0,
            center_radius: default_center_radius(),
        }
    }

    /// Number of keys in a row before dummy insertion
    pub fn row_length(&self, row: usize) -> usize {
        self.row_length_override.get(&row).copied().unwrap_or(self.columns)
    }

    fn check_shape(&self) -> Result<(), LayoutError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(LayoutError::EmptyGrid);
        }
        if let Some((&row, _)) = self.row_length_override.iter().find(|(_, &len)| len == 0) {
            return Err(LayoutError::InvalidRowLength { row });
        }
        if self.center_angle != 0.0 && self.center_radius <= 0.0 {
            return Err(LayoutError::InvalidRadius(self.center_radius));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    pitch: i32,
    pos: Point,
}

/// Generate the pitch -> normalized position table for a layout
///
/// Dummy slots take part in spacing but are left out of the result.
pub fn generate_layout(desc: &LayoutDescription) -> Result<BTreeMap<i32, Point>, LayoutError> {
    desc.check_shape()?;

    let mut rows = enumerate_rows(desc)?;
    insert_dummies(&mut rows, &desc.insert_dummy_keys)?;

    place_baseline(&mut rows, desc);
    center_rows(&mut rows);

    let row_distance = axis_step(desc.rows);
    for cell in rows.iter_mut().flatten() {
        if is_semitone(cell.pitch) {
            cell.pos.y -= row_distance * desc.semitone_height_offset;
        }
        cell.pos = cell.pos.transform(&desc.transform);
    }

    if desc.center_angle != 0.0 {
        for cell in rows.iter_mut().flatten() {
            cell.pos = cell.pos.arc_warp(desc.center_angle, desc.center_radius);
        }
        normalize_points(rows.iter_mut().flatten().map(|c| &mut c.pos));

        // The sector sweeps right to left; flip back so column order reads left to right
        for cell in rows.iter_mut().flatten() {
            cell.pos.x = 1.0 - cell.pos.x;
        }
    }

    normalize_points(rows.iter_mut().flatten().map(|c| &mut c.pos));

    Ok(rows
        .into_iter()
        .flatten()
        .filter(|c| c.pitch != NO_KEY)
        .map(|c| (c.pitch, c.pos))
        .collect())
}

fn axis_step(count: usize) -> f64 {
    if count <= 1 {
        1.0
    } else {
        1.0 / (count - 1) as f64
    }
}

/// Step 1: assign pitches to grid cells
fn enumerate_rows(desc: &LayoutDescription) -> Result<Vec<Vec<Cell>>, LayoutError> {
    let lengths: Vec<usize> = (0..desc.rows).map(|r| desc.row_length(r)).collect();
    let total: usize = lengths.iter().sum();

    let pitches: Vec<i32> = match &desc.pitches {
        PitchSpan::Range { from, to } => {
            let to = name_to_midi_pitch(to)?;
            let mut cursor = name_to_midi_pitch(from)?;
            let mut pitches = Vec::with_capacity(total);

            for _ in 0..total {
                pitches.push(cursor);
                // Without black keys the cursor jumps straight to the next white key
                if !desc.have_semitone && is_semitone(cursor + 1) {
                    cursor += 1;
                }
                cursor += 1;
            }

            if let Some(&last) = pitches.last() {
                if last > to {
                    return Err(LayoutError::RangeTooShort { last, to });
                }
            }
            pitches
        }
        PitchSpan::List(names) => {
            if names.len() < total {
                return Err(LayoutError::PitchListTooShort {
                    needed: total,
                    available: names.len(),
                });
            }
            names
                .iter()
                .take(total)
                .map(|n| name_to_midi_pitch(n))
                .collect::<Result<_, _>>()?
        }
    };

    let mut iter = pitches.into_iter();
    Ok(lengths
        .iter()
        .map(|&len| {
            iter.by_ref()
                .take(len)
                .map(|pitch| Cell {
                    pitch,
                    pos: Point::default(),
                })
                .collect()
        })
        .collect())
}

/// Step 2: splice in placeholder cells, right to left so earlier columns stay valid
fn insert_dummies(rows: &mut [Vec<Cell>], dummies: &[(usize, usize)]) -> Result<(), LayoutError> {
    for &(row, column) in dummies {
        if row >= rows.len() {
            return Err(LayoutError::DummyOutOfRange { row, column });
        }
    }

    for (index, row) in rows.iter_mut().enumerate() {
        let mut columns: Vec<usize> = dummies
            .iter()
            .filter(|(r, _)| *r == index)
            .map(|&(_, c)| c)
            .collect();
        columns.sort_unstable_by(|a, b| b.cmp(a));

        for column in columns {
            if column > row.len() {
                return Err(LayoutError::DummyOutOfRange { row: index, column });
            }
            row.insert(
                column,
                Cell {
                    pitch: NO_KEY,
                    pos: Point::default(),
                },
            );
        }
    }
    Ok(())
}

/// Step 3: cumulative x spacing per row, y by row; then normalize x across the grid
fn place_baseline(rows: &mut [Vec<Cell>], desc: &LayoutDescription) {
    let row_distance = axis_step(desc.rows);
    let column_distance = axis_step(desc.columns);

    for (i, row) in rows.iter_mut().enumerate() {
        let mut x = 0.0;
        for j in 0..row.len() {
            row[j].pos = Point::new(x, 1.0 - row_distance * i as f64);

            let near_semitone =
                is_semitone(row[j].pitch) || row.get(j + 1).is_some_and(|next| is_semitone(next.pitch));
            x += if near_semitone {
                column_distance * (1.0 + desc.semitone_width)
            } else {
                column_distance * 2.0
            };
        }
    }

    if let Some(bounds) = Bounds::of(rows.iter().flatten().map(|c| &c.pos)) {
        for cell in rows.iter_mut().flatten() {
            cell.pos.x = bounds.normalize(&cell.pos).x;
        }
    }
}

/// Step 4: shift every row so its span is centred on x = 0.5
fn center_rows(rows: &mut [Vec<Cell>]) {
    for row in rows.iter_mut() {
        let (Some(first), Some(last)) = (row.first(), row.last()) else {
            continue;
        };
        let shift = (last.pos.x - first.pos.x) / 2.0 - 0.5;
        for cell in row.iter_mut() {
            cell.pos.x -= shift;
        }
    }
}
