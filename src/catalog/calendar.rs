//! Month and weekday names for the time dimension

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Language of the calendar attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Spanish (default; matches the dashboards' filter values)
    #[default]
    Es,
    /// English
    En,
}

const MONTHS_ES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

impl Locale {
    /// Month name of a date
    pub fn month_name(&self, date: NaiveDate) -> &'static str {
        let idx = date.month0() as usize;
        match self {
            Locale::Es => MONTHS_ES[idx],
            Locale::En => MONTHS_EN[idx],
        }
    }

    /// Weekday name of a date
    pub fn weekday_name(&self, date: NaiveDate) -> &'static str {
        match (self, date.weekday()) {
            (Locale::Es, Weekday::Mon) => "Lunes",
            (Locale::Es, Weekday::Tue) => "Martes",
            (Locale::Es, Weekday::Wed) => "Miércoles",
            (Locale::Es, Weekday::Thu) => "Jueves",
            (Locale::Es, Weekday::Fri) => "Viernes",
            (Locale::Es, Weekday::Sat) => "Sábado",
            (Locale::Es, Weekday::Sun) => "Domingo",
            (Locale::En, Weekday::Mon) => "Monday",
            (Locale::En, Weekday::Tue) => "Tuesday",
            (Locale::En, Weekday::Wed) => "Wednesday",
            (Locale::En, Weekday::Thu) => "Thursday",
            (Locale::En, Weekday::Fri) => "Friday",
            (Locale::En, Weekday::Sat) => "Saturday",
            (Locale::En, Weekday::Sun) => "Sunday",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        // 2024-01-01 was a Monday
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(Locale::Es.month_name(date), "Enero");
        assert_eq!(Locale::Es.weekday_name(date), "Lunes");
        assert_eq!(Locale::En.month_name(date), "January");
        assert_eq!(Locale::En.weekday_name(date), "Monday");

        let date = NaiveDate::from_ymd_opt(2024, 9, 7).unwrap();
        assert_eq!(Locale::Es.month_name(date), "Septiembre");
        assert_eq!(Locale::Es.weekday_name(date), "Sábado");
    }
}
