//! Marks-table geometry and atomic table stacking.

use serde::Serialize;

/// Column widths for a marks table: a label column, `columns` equal subject columns and a
/// summary column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableGeometry {
    pub x: f64,
    pub table_width: f64,
    pub first_width: f64,
    pub subject_width: f64,
    pub last_width: f64,
    pub columns: usize,
}

impl TableGeometry {
    pub fn new(x: f64, table_width: f64, first_width: f64, last_width: f64, columns: usize) -> Self {
        let available = (table_width - first_width - last_width).max(0.0);
        let subject_width = if columns == 0 {
            0.0
        } else {
            available / columns as f64
        };
        Self {
            x,
            table_width,
            first_width,
            subject_width,
            last_width,
            columns,
        }
    }

    /// `(x, width)` of every column from left to right, first and last included.
    pub fn column_spans(&self) -> Vec<(f64, f64)> {
        let mut spans = Vec::with_capacity(self.columns + 2);
        spans.push((self.x, self.first_width));
        let mut cursor = self.x + self.first_width;
        for _ in 0..self.columns {
            spans.push((cursor, self.subject_width));
            cursor += self.subject_width;
        }
        spans.push((cursor, self.last_width));
        spans
    }

    pub fn rendered_width(&self) -> f64 {
        self.first_width + self.subject_width * self.columns as f64 + self.last_width
    }
}

/// Where an atomic unit landed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub page: usize,
    pub y: f64,
}

/// Vertical budget for stacking atomic units across pages.
#[derive(Debug, Clone, Copy)]
pub struct StackFrame {
    pub first_page: usize,
    pub start_y: f64,
    pub continuation_top: f64,
    pub bottom: f64,
    pub spacing: f64,
}

const EPSILON: f64 = 1e-9;

/// Places units of the given heights top to bottom. A unit that would cross `bottom` moves
/// whole to the top of the next page; a unit is never split. A unit taller than an entire
/// page is still placed at the top of a fresh page.
pub fn stack_units(heights: &[f64], frame: StackFrame) -> Vec<Placement> {
    let mut page = frame.first_page;
    let mut y = frame.start_y;
    let mut placed_on_page = false;
    let mut placements = Vec::with_capacity(heights.len());

    for &height in heights {
        let fresh = !placed_on_page && y <= frame.continuation_top + EPSILON;
        if y + height > frame.bottom + EPSILON && !fresh {
            page += 1;
            y = frame.continuation_top;
        }
        placements.push(Placement { page, y });
        y += height + frame.spacing;
        placed_on_page = true;
    }

    placements
}

/// Page index following the last placement, or `fallback` when nothing was placed.
pub fn next_page_after(placements: &[Placement], fallback: usize) -> usize {
    placements
        .iter()
        .map(|placement| placement.page + 1)
        .max()
        .unwrap_or(fallback)
        .max(fallback)
}

pub fn roman(number: i32) -> String {
    if number <= 0 {
        return number.to_string();
    }
    const NUMERALS: &[(i32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut remaining = number;
    let mut out = String::new();
    for &(value, numeral) in NUMERALS {
        while remaining >= value {
            out.push_str(numeral);
            remaining -= value;
        }
    }
    out
}
