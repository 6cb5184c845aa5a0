use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::models::{Entry, PfcInput, normalize_date};

/// Request normalization in front of the store. Holds no state of its own
/// besides the shared pool handle.
#[derive(Clone)]
pub struct LedgerService {
    db: Database,
}

impl LedgerService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    pub fn add(&self, input: &PfcInput) -> Result<Entry> {
        let delta = input.normalize(Self::today())?;
        let entry = self.db.increment(&delta)?;
        info!(
            date = %entry.date,
            proteins = delta.proteins,
            fats = delta.fats,
            carbs = delta.carbs,
            "added"
        );
        Ok(entry)
    }

    pub fn subtract(&self, input: &PfcInput) -> Result<Entry> {
        let delta = input.normalize(Self::today())?;
        let entry = self.db.decrement(&delta)?;
        info!(
            date = %entry.date,
            proteins = delta.proteins,
            fats = delta.fats,
            carbs = delta.carbs,
            "subtracted"
        );
        Ok(entry)
    }

    pub fn get(&self, date: Option<&str>) -> Result<Entry> {
        let date = normalize_date(date, Self::today())?;
        debug!(%date, "lookup");
        self.db.get(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::models::{NutrientValue, format_date};

    fn service() -> LedgerService {
        LedgerService::new(Database::open_in_memory().unwrap())
    }

    fn input(date: Option<&str>, p: f64, f: f64, c: f64) -> PfcInput {
        PfcInput {
            date: date.map(str::to_string),
            proteins: Some(NutrientValue::Number(p)),
            fats: Some(NutrientValue::Number(f)),
            carbs: Some(NutrientValue::Number(c)),
        }
    }

    #[test]
    fn test_add_without_date_uses_today() {
        let svc = service();
        let entry = svc.add(&input(None, 1.0, 2.0, 3.0)).unwrap();
        let today = Local::now().date_naive();
        assert_eq!(entry.date, today);
        assert_eq!(svc.get(None).unwrap().date, today);
        assert_eq!(format_date(entry.date), today.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_invalid_input_never_reaches_store() {
        let svc = service();
        let err = svc.add(&input(Some("2024-13-40"), 1.0, 1.0, 1.0)).unwrap_err();
        assert!(err.is_invalid_input());

        let bad_nutrient = PfcInput {
            date: Some("2024-01-01".to_string()),
            proteins: Some("abc".into()),
            ..PfcInput::default()
        };
        assert!(svc.add(&bad_nutrient).unwrap_err().is_invalid_input());

        assert!(matches!(
            svc.get(Some("2024-01-01")),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_subtract_then_get() {
        let svc = service();
        svc.add(&input(Some("2024-1-1"), 10.0, 5.0, 20.0)).unwrap();
        svc.add(&input(Some("2024-01-01"), 5.0, 0.0, 0.0)).unwrap();
        let entry = svc.subtract(&input(Some("2024-01-01"), 100.0, 1.0, 1.0)).unwrap();
        assert!(entry.proteins.abs() < f64::EPSILON);
        assert!((entry.fats - 4.0).abs() < f64::EPSILON);
        assert!((entry.carbs - 19.0).abs() < f64::EPSILON);
        assert_eq!(svc.get(Some("2024-01-01")).unwrap(), entry);
    }

    #[test]
    fn test_subtract_unknown_day_is_not_found() {
        let svc = service();
        let err = svc.subtract(&input(Some("2024-05-05"), 1.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(matches!(svc.get(Some("2024-05-05")), Err(LedgerError::NotFound(_))));
    }
}
