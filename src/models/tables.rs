/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Table rendering helpers shared by fit and simulation reports.
//
// Created on: 25 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};

pub(crate) fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

pub(crate) fn number_cell(value: f64, precision: usize) -> Cell {
    if value.is_finite() {
        Cell::new(format!("{value:.precision$}"))
    } else {
        Cell::new("-")
    }
}

/// Bold green when `highlight` holds.
pub(crate) fn highlight_cell(value: f64, precision: usize, highlight: bool) -> Cell {
    let cell = number_cell(value, precision);
    if highlight {
        cell.fg(Color::Green).add_attribute(Attribute::Bold)
    } else {
        cell
    }
}
