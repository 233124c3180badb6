use serde::Serialize;

/// Cells wider than this are clipped with an ellipsis.
const MAX_CELL: usize = 72;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    for line in render_table(headers, rows) {
        println!("{}", line.trim_end());
    }
}

fn clip(cell: &str) -> String {
    let first = cell.lines().next().unwrap_or("");
    if first.chars().count() <= MAX_CELL && !cell.contains('\n') {
        return first.to_string();
    }
    let mut out: String = first.chars().take(MAX_CELL - 3).collect();
    out.push_str("...");
    out
}

fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> Vec<String> {
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|r| r.iter().map(|c| clip(c)).collect())
        .collect();

    // Widths in chars, not bytes; titles are free text.
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let pad = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let w = widths.get(i).copied().unwrap_or(0);
                let fill = w.saturating_sub(c.chars().count());
                format!("{c}{}", " ".repeat(fill))
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(pad(headers.iter().map(|h| h.to_string()).collect()));
    out.push(pad(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        out.push(pad(row));
    }
    out
}
