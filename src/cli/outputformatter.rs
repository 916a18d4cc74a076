use serde_json::Value;

use terminal_size::{terminal_size, Width};

use crate::gateway::response::truncate;
use crate::normalize::{Normalized, Page, Shape};

/// Print a page of records as an ASCII table followed by a paging footer.
/// Falls back to pretty JSON when the records are not table-shaped or
/// FIELDOPS_OUTPUT=json is set.
pub fn print_page(page: &Normalized<Page<Value>>) {
    let force_json = std::env::var("FIELDOPS_OUTPUT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let termw = get_terminal_width();
    match (force_json, render_table(&page.value.items, termw)) {
        (false, Some(lines)) => {
            for l in lines { println!("{}", l); }
        }
        _ => println!("{}", serde_json::to_string_pretty(&page.value.items).unwrap_or_default()),
    }
    println!("{}", page_footer(page));
}

pub fn page_footer(page: &Normalized<Page<Value>>) -> String {
    let p = &page.value;
    let mut s = format!(
        "rows: {}, page: {}/{}, page_size: {}, total: {}",
        p.items.len(),
        if p.total_pages == 0 { 0 } else { p.page_index + 1 },
        p.total_pages,
        p.page_size,
        p.total_items
    );
    if page.shape == Shape::Unrecognized {
        s.push_str(" (response shape not recognized)");
    }
    s
}

/// Render records as table lines. Objects become one column per key (union of keys,
/// sorted); scalars go into a single `value` column. `None` when there is nothing to show.
pub fn render_table(records: &[Value], maxw: usize) -> Option<Vec<String>> {
    if records.is_empty() { return None; }
    let (cols, rows) = columns_and_rows(records);

    let mut widths: Vec<usize> = cols.iter().map(|s| visible_len(s).min(maxw)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            let w = visible_len(cell);
            if w > widths[i] { widths[i] = w.min(maxw); }
        }
    }

    let sep = build_separator(&widths);
    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(fit_line_to_width(&sep, maxw));
    out.push(fit_line_to_width(&build_row(&cols, &widths, RowStyle::Header), maxw));
    out.push(fit_line_to_width(&sep, maxw));
    for r in &rows {
        out.push(fit_line_to_width(&build_row(r, &widths, RowStyle::Body), maxw));
    }
    out.push(fit_line_to_width(&sep, maxw));
    Some(out)
}

fn columns_and_rows(records: &[Value]) -> (Vec<String>, Vec<Vec<String>>) {
    let all_objects = records.iter().all(|r| r.is_object());
    if all_objects {
        let mut keys: Vec<String> = Vec::new();
        for r in records {
            if let Value::Object(map) = r {
                for k in map.keys() { if !keys.contains(k) { keys.push(k.clone()); } }
            }
        }
        // id first, the rest alphabetical
        keys.sort_by(|a, b| (a != "id").cmp(&(b != "id")).then_with(|| a.cmp(b)));
        if !keys.is_empty() {
            let rows = records
                .iter()
                .map(|r| keys.iter().map(|k| to_cell_string(r.get(k).unwrap_or(&Value::Null))).collect())
                .collect();
            return (keys, rows);
        }
    }
    let rows = records.iter().map(|r| vec![to_cell_string(r)]).collect();
    (vec!["value".to_string()], rows)
}

fn to_cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::from("NULL"),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // keep objects/arrays compact
        other => other.to_string(),
    }
}

fn build_separator(widths: &[usize]) -> String {
    widths.iter().fold(String::from("+"), |acc, w| acc + &"-".repeat(w + 2) + "+")
}

#[derive(Clone, Copy, PartialEq)]
enum RowStyle {
    Header,
    Body,
}

// Header cells are green and left-aligned; body cells that look numeric align right.
// Padding is always computed on the visible width.
fn build_row(cells: &[String], widths: &[usize], style: RowStyle) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let raw = cells.get(i).map(String::as_str).unwrap_or("");
        let text = truncate(raw, *w);
        let pad = " ".repeat(w.saturating_sub(visible_len(&text)));
        let cell = match style {
            RowStyle::Header => format!("\x1b[32m{}\x1b[0m{}", text, pad),
            RowStyle::Body if is_numeric_like(raw) => format!("{}{}", pad, text),
            RowStyle::Body => format!("{}{}", text, pad),
        };
        s.push_str(&format!(" {} |", cell));
    }
    s
}

// digits plus sign, exponent and grouping marks: ids, amounts, counts
fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    st.chars().any(|c| c.is_ascii_digit()) && st.chars().all(|c| c.is_ascii_digit() || ".-+eE,_".contains(c))
}

fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 8 => (w - 4) as usize,
        _ => 80,
    }
}

fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if visible_len(s) <= maxw { return s.to_string(); }
    // Drop escape sequences when cutting so a color never bleeds past the line
    let plain = strip_ansi(s);
    truncate(&plain, maxw)
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for b in chars.by_ref() {
                    if b.is_ascii_alphabetic() { break; }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn visible_len(s: &str) -> usize { strip_ansi(s).chars().count() }
