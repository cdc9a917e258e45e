use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::migrate::report::Status;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_cell(status: Status, count: usize) -> Cell {
    let text = count.to_string();
    match status {
        _ if count == 0 => Cell::new(text),
        Status::Processed => Cell::new(text).fg(TableColor::Green),
        Status::Skipped => Cell::new(text).fg(TableColor::Yellow),
        Status::Failed => Cell::new(text).fg(TableColor::Red),
    }
}
