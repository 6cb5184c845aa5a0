use chrono::{Local, NaiveDate};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pfc_core::models::{Entry, format_date};

/// Expand today/yesterday/tomorrow into ISO dates. Anything else is passed
/// through untouched for the normalizer to validate.
pub(crate) fn resolve_date_keyword(date: Option<String>, today: NaiveDate) -> Option<String> {
    let date = date?;
    let resolved = match date.trim().to_lowercase().as_str() {
        "today" => today,
        "yesterday" => today - chrono::Duration::days(1),
        "tomorrow" => today + chrono::Duration::days(1),
        _ => return Some(date),
    };
    Some(format_date(resolved))
}

pub(crate) fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn print_entry_table(entry: &Entry) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Proteins (g)")]
        proteins: String,
        #[tabled(rename = "Fats (g)")]
        fats: String,
        #[tabled(rename = "Carbs (g)")]
        carbs: String,
    }

    let row = EntryRow {
        date: format_date(entry.date),
        proteins: format!("{:.1}", no_neg_zero(entry.proteins)),
        fats: format!("{:.1}", no_neg_zero(entry.fats)),
        carbs: format!("{:.1}", no_neg_zero(entry.carbs)),
    };

    let table = Table::new([row])
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
