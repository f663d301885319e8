//! Cursor movement over a roster laid out as rows of `columns` entries.
//!
//! Horizontal moves wrap within the current row, vertical moves wrap within
//! the current column. A short final row is handled by clamping to the last
//! entry, so every result is a valid index.

use crate::state::Direction;

pub const SELECT_COLUMNS: usize = 10;
pub const PRESENTATION_COLUMNS: usize = 5;

/// Index reached from `index` by one move on a grid of `len` entries.
///
/// Returns 0 for an empty grid. A `columns` of 0 is treated as 1 and an
/// out-of-range `index` is clamped before moving.
pub fn navigate(index: usize, len: usize, columns: usize, direction: Direction) -> usize {
	if len == 0 {
		return 0;
	}
	let columns = columns.max(1);
	let last = len - 1;
	let index = index.min(last);
	let column = index % columns;

	let next = match direction {
		Direction::Right => {
			if column == columns - 1 || index == last {
				index - column
			} else {
				index + 1
			}
		}
		Direction::Left => {
			if column == 0 {
				(index + columns - 1).min(last)
			} else {
				index - 1
			}
		}
		Direction::Down => {
			let below = index + columns;
			if below >= len { column } else { below }
		}
		Direction::Up => {
			if index >= columns {
				index - columns
			} else {
				let last_row_start = (last / columns) * columns;
				(last_row_start + column).min(last)
			}
		}
	};

	next.min(last)
}

/// Clamps an externally supplied index into the grid.
pub fn clamp_index(index: usize, len: usize) -> usize {
	if len == 0 { 0 } else { index.min(len - 1) }
}
