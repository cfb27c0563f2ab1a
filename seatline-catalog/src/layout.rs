use seatline_shared::SeatId;
use serde::Serialize;

/// Largest capacity a single trip may declare.
pub const MAX_SEAT_CAPACITY: u32 = 200;

/// Seats in a regular row: two on each side of the aisle.
pub const SEATS_PER_ROW: u32 = 4;

const SIDE_LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// One position in the rendered seat map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutCell {
    Seat(SeatId),
    /// Walking gap between the B and C seats of a regular row.
    Aisle,
}

/// Ordered seat map for a trip.
///
/// Regular rows are `{row}A {row}B <aisle> {row}C {row}D`. Seats that do not fill a
/// whole row form a trailing contiguous block labelled by running seat number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatLayout {
    capacity: u32,
    full_rows: u32,
    cells: Vec<LayoutCell>,
}

impl SeatLayout {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cells(&self) -> &[LayoutCell] {
        &self.cells
    }

    /// Seat ids only, in render order.
    pub fn seats(&self) -> impl Iterator<Item = &SeatId> {
        self.cells.iter().filter_map(|cell| match cell {
            LayoutCell::Seat(id) => Some(id),
            LayoutCell::Aisle => None,
        })
    }

    /// Cells grouped by visual row. The trailing block, if any, is the last row.
    pub fn rows(&self) -> Vec<&[LayoutCell]> {
        let row_width = SEATS_PER_ROW as usize + 1;
        let regular = self.full_rows as usize * row_width;

        let mut rows: Vec<&[LayoutCell]> = self.cells[..regular].chunks(row_width).collect();
        if regular < self.cells.len() {
            rows.push(&self.cells[regular..]);
        }
        rows
    }

    pub fn contains(&self, seat_id: &SeatId) -> bool {
        self.seats().any(|s| s == seat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Seat capacity must be positive")]
    EmptyCapacity,
    #[error("Seat capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: u32, max: u32 },
}

/// Builds the seat map for `capacity` seats. Same capacity, same sequence.
pub fn generate_seat_layout(capacity: u32) -> Result<SeatLayout, LayoutError> {
    if capacity == 0 {
        return Err(LayoutError::EmptyCapacity);
    }
    if capacity > MAX_SEAT_CAPACITY {
        return Err(LayoutError::CapacityTooLarge {
            requested: capacity,
            max: MAX_SEAT_CAPACITY,
        });
    }

    let full_rows = capacity / SEATS_PER_ROW;
    let remainder = capacity % SEATS_PER_ROW;
    let mut cells = Vec::with_capacity((capacity + full_rows) as usize);

    for row in 1..=full_rows {
        let [left_window, left_aisle, right_aisle, right_window] =
            SIDE_LABELS.map(|side| LayoutCell::Seat(SeatId::new(format!("{}{}", row, side))));
        cells.push(left_window);
        cells.push(left_aisle);
        cells.push(LayoutCell::Aisle);
        cells.push(right_aisle);
        cells.push(right_window);
    }

    let first_trailing = full_rows * SEATS_PER_ROW + 1;
    for number in first_trailing..first_trailing + remainder {
        cells.push(LayoutCell::Seat(SeatId::new(number.to_string())));
    }

    Ok(SeatLayout { capacity, full_rows, cells })
}
