//! Plain-text output for the terminal. Everything here returns a `String` so the
//! commands stay easy to test; `cli` does the printing.

use std::fmt::Write;
use std::path::Path;

use shopprint_core::aggregate::AggregatedItem;
use shopprint_core::assets::UnmappedItem;
use shopprint_core::download::StopReason;
use shopprint_core::pipeline::FetchSummary;

/// Left-aligned columns separated by two spaces, with a dashed rule under the header.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{:<width$}", c.as_ref(), width = *w))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

pub fn items_table(items: &[AggregatedItem]) -> String {
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|i| {
            vec![
                i.identifier.clone(),
                i.variant_label.clone(),
                i.quantity.to_string(),
            ]
        })
        .collect();
    table(&["SKU", "Variant", "Quantity"], &rows)
}

pub fn config_table(rows: &[(&str, Option<String>)]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(key, value)| {
            vec![
                key.to_string(),
                value.clone().unwrap_or_else(|| "Not Set".to_string()),
            ]
        })
        .collect();
    table(&["Key", "Value"], &rows)
}

/// Identifiers without an asset, one per line under a heading naming the asset root.
pub fn missing_list(asset_root: &Path, missing: &[String]) -> String {
    if missing.is_empty() {
        return String::new();
    }
    let mut out = format!("Missing items in folder: {}\n", asset_root.display());
    for id in missing {
        let _ = writeln!(out, "  {id}");
    }
    out
}

pub fn unmapped_list(unmapped: &[UnmappedItem]) -> String {
    if unmapped.is_empty() {
        return String::new();
    }
    let mut out = String::from("Items with an unrecognised variant:\n");
    for item in unmapped {
        let _ = writeln!(out, "  {} ({})", item.identifier, item.variant_label);
    }
    out
}

/// One line when the order listing came back incomplete, empty otherwise.
pub fn fetch_notice(fetch: &FetchSummary) -> String {
    if let Some(warning) = &fetch.warning {
        return format!(
            "Warning: only {} of {} open orders were fetched: {warning}\n",
            fetch.orders_fetched, fetch.total_open
        );
    }
    match fetch.stop {
        StopReason::NoNextPage | StopReason::PageBudgetExhausted | StopReason::RepeatedCursor
            if (fetch.orders_fetched as u64) < fetch.total_open =>
        {
            format!(
                "Warning: only {} of {} open orders were returned\n",
                fetch.orders_fetched, fetch.total_open
            )
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_table_aligns_columns() {
        let items = vec![
            AggregatedItem {
                identifier: "SKU-LONG-1".into(),
                variant_label: "8x10".into(),
                quantity: 12,
            },
            AggregatedItem {
                identifier: "A".into(),
                variant_label: "Small".into(),
                quantity: 1,
            },
        ];
        let rendered = items_table(&items);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "SKU         Variant  Quantity");
        assert_eq!(lines[1], "----------  -------  --------");
        assert_eq!(lines[2], "SKU-LONG-1  8x10     12");
        assert_eq!(lines[3], "A           Small    1");
    }

    #[test]
    fn config_table_marks_unset_values() {
        let rendered = config_table(&[
            ("PDF_DIR", None),
            ("STORE_NAME", Some("my-s****shop".into())),
        ]);
        assert!(rendered.contains("PDF_DIR     Not Set"));
        assert!(rendered.contains("STORE_NAME  my-s****shop"));
    }

    #[test]
    fn missing_list_is_empty_without_missing_items() {
        assert!(missing_list(Path::new("/assets"), &[]).is_empty());
        assert_eq!(
            missing_list(Path::new("/assets"), &["SKU2".into()]),
            "Missing items in folder: /assets\n  SKU2\n"
        );
    }
}
