use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accumulated totals for one calendar day, in grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub date: NaiveDate,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nutrient {
    Proteins,
    Fats,
    Carbs,
}

impl Nutrient {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proteins => "proteins",
            Self::Fats => "fats",
            Self::Carbs => "carbs",
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nutrient amount as it arrives on the wire: JSON number or string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NutrientValue {
    Number(f64),
    Text(String),
}

impl From<f64> for NutrientValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for NutrientValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Unvalidated request input. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PfcInput {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub proteins: Option<NutrientValue>,
    #[serde(default)]
    pub fats: Option<NutrientValue>,
    #[serde(default)]
    pub carbs: Option<NutrientValue>,
}

/// A validated delta, ready for the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PfcDelta {
    pub date: NaiveDate,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
}

impl PfcInput {
    /// Validate the input, resolving a missing date to `today`.
    pub fn normalize(&self, today: NaiveDate) -> Result<PfcDelta> {
        Ok(PfcDelta {
            date: normalize_date(self.date.as_deref(), today)?,
            proteins: parse_nutrient(Nutrient::Proteins, self.proteins.as_ref())?,
            fats: parse_nutrient(Nutrient::Fats, self.fats.as_ref())?,
            carbs: parse_nutrient(Nutrient::Carbs, self.carbs.as_ref())?,
        })
    }
}

/// Resolve an optional date string. Blank counts as absent.
///
/// Single-digit months and days (`2024-1-5`) are accepted; the returned date
/// always formats back as zero-padded ISO. Years are limited to four digits.
pub fn normalize_date(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match raw.map(str::trim) {
        None | Some("") => Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .ok()
            .filter(|date| (0..=9999).contains(&date.year()))
            .ok_or_else(|| LedgerError::InvalidDate(s.to_string())),
    }
}

pub fn parse_nutrient(field: Nutrient, raw: Option<&NutrientValue>) -> Result<f64> {
    let invalid = |value: String| LedgerError::InvalidNutrient { field, value };
    let value = match raw {
        None => return Ok(0.0),
        Some(NutrientValue::Number(v)) => *v,
        Some(NutrientValue::Text(s)) => s.trim().parse::<f64>().map_err(|_| invalid(s.clone()))?,
    };
    if !value.is_finite() {
        return Err(invalid(value.to_string()));
    }
    Ok(value)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
