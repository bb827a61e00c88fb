//! Plain-text rendering of a dashboard snapshot

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::str::FromStr;

use super::controller::DashboardView;
use super::visibility::VisibleRow;

const HEADERS: [&str; 9] = [
    "ID", "Username", "Email", "Mobile", "Gender", "DOB", "Address", "Role", "Actions",
];

/// Row order of the rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// As fetched from the store.
    #[default]
    Roster,
    UsernameAsc,
    UsernameDesc,
}

impl FromStr for RowOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "roster" => Ok(RowOrder::Roster),
            "username" | "username:asc" => Ok(RowOrder::UsernameAsc),
            "username:desc" => Ok(RowOrder::UsernameDesc),
            _ => Err(format!("Unknown sort order: {} (expected roster, username or username:desc)", s)),
        }
    }
}

fn compare_usernames(a: &VisibleRow, b: &VisibleRow) -> Ordering {
    let (a, b) = (&a.profile.username, &b.profile.username);
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn ordered(rows: &[VisibleRow], order: RowOrder) -> Vec<&VisibleRow> {
    let mut rows: Vec<&VisibleRow> = rows.iter().collect();
    match order {
        RowOrder::Roster => {}
        RowOrder::UsernameAsc => rows.sort_by(|a, b| compare_usernames(a, b)),
        RowOrder::UsernameDesc => rows.sort_by(|a, b| compare_usernames(b, a)),
    }
    rows
}

fn cells(row: &VisibleRow) -> [String; 9] {
    let p = &row.profile;
    let actions = match (row.affordances.can_edit, row.affordances.can_delete) {
        (true, true) => "edit, delete",
        (true, false) => "edit",
        (false, true) => "delete",
        (false, false) => "-",
    };
    [
        p.id.clone(),
        p.username.clone(),
        p.email.clone(),
        p.mobile.clone(),
        p.gender.to_string(),
        p.dob.format("%Y-%m-%d").to_string(),
        p.address.clone(),
        p.role.to_string(),
        actions.to_string(),
    ]
}

/// Render one page (1-based) of the visible rows. Sorting happens before paging.
pub fn render(view: &DashboardView, order: RowOrder, page: usize, page_size: usize) -> String {
    let mut out = String::new();

    match &view.viewer {
        Some(viewer) => {
            let _ = writeln!(out, "Welcome, {}", viewer.username);
        }
        None => {
            let _ = writeln!(out, "Fetching user details...");
        }
    }
    out.push('\n');

    if view.loading {
        out.push_str("Loading users...\n");
        return out;
    }
    if view.rows.is_empty() {
        out.push_str("No users available.\n");
        return out;
    }

    let page_size = page_size.max(1);
    let pages = view.rows.len().div_ceil(page_size);
    let page = page.clamp(1, pages);
    let table: Vec<[String; 9]> = ordered(&view.rows, order)
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(cells)
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &table {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let _ = writeln!(out, "{}", view.title());
    write_line(&mut out, &HEADERS.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for row in &table {
        write_line(&mut out, row, &widths);
    }
    let _ = writeln!(out, "Page {}/{} ({} rows)", page, pages, view.rows.len());

    out
}

fn write_line(out: &mut String, row: &[String; 9], widths: &[usize; 9]) {
    let padded: Vec<String> = row
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect();
    let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
}
