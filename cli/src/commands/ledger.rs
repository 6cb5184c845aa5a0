use anyhow::Result;

use pfc_core::models::{Entry, PfcInput};
use pfc_core::service::LedgerService;

use super::helpers::{local_today, print_entry_table, resolve_date_keyword};

fn input(
    date: Option<String>,
    proteins: Option<f64>,
    fats: Option<f64>,
    carbs: Option<f64>,
) -> PfcInput {
    PfcInput {
        date: resolve_date_keyword(date, local_today()),
        proteins: proteins.map(Into::into),
        fats: fats.map(Into::into),
        carbs: carbs.map(Into::into),
    }
}

fn print_entry(entry: &Entry, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        if !verb.is_empty() {
            println!("{verb}");
        }
        print_entry_table(entry);
    }
    Ok(())
}

pub(crate) fn cmd_add(
    ledger: &LedgerService,
    date: Option<String>,
    proteins: Option<f64>,
    fats: Option<f64>,
    carbs: Option<f64>,
    json: bool,
) -> Result<()> {
    let entry = ledger.add(&input(date, proteins, fats, carbs))?;
    print_entry(&entry, "Added. New totals:", json)
}

pub(crate) fn cmd_sub(
    ledger: &LedgerService,
    date: Option<String>,
    proteins: Option<f64>,
    fats: Option<f64>,
    carbs: Option<f64>,
    json: bool,
) -> Result<()> {
    let entry = ledger.subtract(&input(date, proteins, fats, carbs))?;
    print_entry(&entry, "Subtracted. New totals:", json)
}

pub(crate) fn cmd_show(ledger: &LedgerService, date: Option<String>, json: bool) -> Result<()> {
    let date = resolve_date_keyword(date, local_today());
    let entry = ledger.get(date.as_deref())?;
    print_entry(&entry, "", json)
}
