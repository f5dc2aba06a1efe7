//! Western zodiac lookup over a fixed table of calendar ranges

use chrono::{Datelike, NaiveDate};

pub const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";

/// `(sign, (start month, start day), (end month, end day))`, both ends inclusive.
const SIGNS: [(&str, (u32, u32), (u32, u32)); 12] = [
    ("Capricornio", (12, 22), (1, 19)),
    ("Acuario", (1, 20), (2, 18)),
    ("Piscis", (2, 19), (3, 20)),
    ("Aries", (3, 21), (4, 19)),
    ("Tauro", (4, 20), (5, 20)),
    ("Géminis", (5, 21), (6, 20)),
    ("Cáncer", (6, 21), (7, 22)),
    ("Leo", (7, 23), (8, 22)),
    ("Virgo", (8, 23), (9, 22)),
    ("Libra", (9, 23), (10, 22)),
    ("Escorpio", (10, 23), (11, 21)),
    ("Sagitario", (11, 22), (12, 21)),
];

pub fn sign_for_month_day(month: u32, day: u32) -> Option<&'static str> {
    let date = (month, day);
    SIGNS
        .iter()
        .find(|(_, start, end)| {
            if start <= end {
                *start <= date && date <= *end
            } else {
                // Range wraps over the new year.
                date >= *start || date <= *end
            }
        })
        .map(|(sign, _, _)| *sign)
}

pub fn sign_for_date(date: NaiveDate) -> Option<&'static str> {
    sign_for_month_day(date.month(), date.day())
}

pub fn parse_birthdate(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), BIRTHDATE_FORMAT)
}
