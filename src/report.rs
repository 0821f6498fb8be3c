//! Grid-table rendering of verification records for human display.

use crate::verify::{CheckStatus, FileRecord};

const PATH_WIDTH_LIMIT: usize = 40;

/// Which status the third table column shows: existence for staged runs,
/// modification date for in-place (DPF) runs.
#[derive(Debug, Clone, Copy)]
pub enum ThirdColumn {
    Existence,
    ModifiedDate,
}

impl ThirdColumn {
    fn label(self) -> &'static str {
        match self {
            ThirdColumn::Existence => "Included",
            ThirdColumn::ModifiedDate => "Mod. Date",
        }
    }

    fn status(self, record: &FileRecord) -> CheckStatus {
        match self {
            ThirdColumn::Existence => record.exists,
            ThirdColumn::ModifiedDate => record.modified,
        }
    }
}

pub fn render_status_table(records: &[FileRecord], third: ThirdColumn) -> String {
    let mut rows: Vec<Vec<Vec<String>>> = Vec::with_capacity(records.len() + 1);
    rows.push(
        ["", "Metadata File Name", "Host File Path", third.label(), "Size"]
            .iter()
            .map(|cell| vec![cell.to_string()])
            .collect(),
    );
    for (number, record) in records.iter().enumerate() {
        rows.push(vec![
            vec![(number + 1).to_string()],
            wrap_text(&record.name, PATH_WIDTH_LIMIT),
            wrap_text(&record.host_path.display().to_string(), PATH_WIDTH_LIMIT),
            vec![status_symbol(third.status(record)).to_string()],
            vec![status_symbol(record.size).to_string()],
        ]);
    }

    let columns = rows[0].len();
    let mut widths = vec![0usize; columns];
    for row in &rows {
        for (column, cell) in row.iter().enumerate() {
            for line in cell {
                widths[column] = widths[column].max(line.chars().count());
            }
        }
    }

    let mut out = String::new();
    push_border(&mut out, &widths, '-');
    let mut rows = rows.into_iter();
    if let Some(header) = rows.next() {
        push_row(&mut out, &header, &widths);
        push_border(&mut out, &widths, '=');
    }
    for row in rows {
        push_row(&mut out, &row, &widths);
        push_border(&mut out, &widths, '-');
    }
    out
}

/// One line explaining the table symbols.
pub fn symbol_legend() -> String {
    "✔: SUCCESS | ✘: FAILURE | –: NOT IN METADATA".to_string()
}

fn status_symbol(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Passed => "✔",
        CheckStatus::Failed => "✘",
        CheckStatus::NotRecorded => "–",
    }
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn push_border(out: &mut String, widths: &[usize], fill: char) {
    for width in widths {
        out.push('+');
        for _ in 0..width + 2 {
            out.push(fill);
        }
    }
    out.push_str("+\n");
}

fn push_row(out: &mut String, cells: &[Vec<String>], widths: &[usize]) {
    let height = cells.iter().map(Vec::len).max().unwrap_or(1);
    for line in 0..height {
        for (column, cell) in cells.iter().enumerate() {
            let text = cell.get(line).map(String::as_str).unwrap_or("");
            out.push_str("| ");
            out.push_str(text);
            for _ in text.chars().count()..widths[column] {
                out.push(' ');
            }
            out.push(' ');
        }
        out.push_str("|\n");
    }
}
