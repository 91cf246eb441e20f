//! Local naming heuristic: `{DocType}_{Entity}_{Date}{ext}` from extracted text.

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Below this many characters the text carries too little signal
pub const MIN_TEXT_LENGTH: usize = 50;

/// Keyword -> document type, checked in order
const DOC_TYPES: &[(&str, &str)] = &[
    ("invoice", "Invoice"),
    ("receipt", "Receipt"),
    ("bank statement", "Statement"),
    ("statement", "Statement"),
    ("curriculum vitae", "Resume"),
    ("resume", "Resume"),
    ("contract", "Contract"),
    ("report", "Report"),
];

/// Organizations recognized in document text
const ENTITIES: &[&str] = &[
    "Amazon",
    "Apple",
    "Google",
    "Microsoft",
    "PayPal",
    "Stripe",
    "Uber",
    "Netflix",
    "Spotify",
    "Walmart",
    "Adobe",
    "Airbnb",
];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid ISO date regex"));

static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid slash date regex"));

// "12 March 2024", "12 Mar 2024"
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\.?,?\s+(\d{4})\b")
        .expect("valid textual date regex")
});

// "March 12, 2024", "Mar 12 2024"
static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b")
        .expect("valid textual date regex")
});

/// Document type named in the text, if any
pub fn detect_doc_type(text_lower: &str) -> Option<&'static str> {
    DOC_TYPES
        .iter()
        .find(|(keyword, _)| text_lower.contains(keyword))
        .map(|(_, doc_type)| *doc_type)
}

/// First known organization mentioned as a whole word
pub fn detect_entity(text_lower: &str) -> Option<&'static str> {
    ENTITIES.iter().copied().find(|entity| {
        let needle = entity.to_lowercase();
        text_lower.match_indices(&needle).any(|(start, _)| {
            let end = start + needle.len();
            let before = text_lower[..start].chars().next_back();
            let after = text_lower[end..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
    })
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// First valid date in the text. Formats are tried in order: ISO, DD/MM/YYYY, textual month.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let num = |s: &str| s.parse::<u32>().ok();

    let iso = ISO_DATE.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[1].parse().ok()?, num(&c[2])?, num(&c[3])?)
    });
    if iso.is_some() {
        return iso;
    }

    let slash = SLASH_DATE.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, num(&c[2])?, num(&c[1])?)
    });
    if slash.is_some() {
        return slash;
    }

    let dmy = DAY_MONTH_YEAR.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month_number(&c[2])?, num(&c[1])?)
    });
    if dmy.is_some() {
        return dmy;
    }

    MONTH_DAY_YEAR.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month_number(&c[1])?, num(&c[2])?)
    })
}

/// Build a name from the text, or None when the text is too short or names no
/// document type. `ext` includes the leading dot (or is empty).
pub fn heuristic_name(text: &str, ext: &str) -> Option<String> {
    if text.trim().chars().count() < MIN_TEXT_LENGTH {
        return None;
    }

    let lower = text.to_lowercase();
    let doc_type = detect_doc_type(&lower)?;
    let date = extract_date(text)
        .unwrap_or_else(|| Local::now().date_naive())
        .format("%Y-%m-%d");

    let name = match detect_entity(&lower) {
        Some(entity) => format!("{}_{}_{}{}", doc_type, entity, date, ext),
        None => format!("{}_{}{}", doc_type, date, ext),
    };
    Some(name)
}
