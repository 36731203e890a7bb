//! Header labels for the visible period.
//!
//! The locale is always an explicit argument; nothing here keeps formatting
//! state between calls, so labels for different locales can be produced
//! concurrently.

use chrono::Locale;

use crate::datetime::Instant;
use crate::error::{CalendarError, CalendarResult};
use crate::period::{ViewMode, end_of_week, start_of_week, week_within_one_month};

const WEEK_PREFIX: &str = "Week of";

// Languages whose primary region code differs from the language code.
const DEFAULT_REGIONS: &[(&str, &str)] = &[
    ("en", "en_US"),
    ("ja", "ja_JP"),
    ("zh", "zh_CN"),
    ("ko", "ko_KR"),
    ("sv", "sv_SE"),
    ("da", "da_DK"),
    ("cs", "cs_CZ"),
    ("el", "el_GR"),
    ("uk", "uk_UA"),
    ("nb", "nb_NO"),
    ("he", "he_IL"),
    ("hi", "hi_IN"),
    ("ar", "ar_SA"),
    ("ca", "ca_ES"),
    ("et", "et_EE"),
    ("sl", "sl_SI"),
];

/// Parse `fr`, `fr-FR` or `fr_FR` into a formatting locale.
pub fn parse_locale(raw: &str) -> CalendarResult<Locale> {
    let trimmed = raw.trim();
    let unknown = || CalendarError::UnknownLocale(trimmed.to_string());

    let normalized = trimmed.replace('-', "_");
    let (lang, region) = match normalized.split_once('_') {
        Some((lang, region)) => (lang.to_ascii_lowercase(), Some(region.to_ascii_uppercase())),
        None => (normalized.to_ascii_lowercase(), None),
    };
    if lang.is_empty() {
        return Err(unknown());
    }

    let mut candidates = Vec::with_capacity(3);
    match region {
        Some(region) => candidates.push(format!("{lang}_{region}")),
        None => {
            if let Some((_, full)) = DEFAULT_REGIONS.iter().find(|(code, _)| *code == lang) {
                candidates.push((*full).to_string());
            }
            candidates.push(format!("{lang}_{}", lang.to_ascii_uppercase()));
            candidates.push(lang.clone());
        }
    }

    candidates
        .iter()
        .find_map(|candidate| Locale::try_from(candidate.as_str()).ok())
        .ok_or_else(unknown)
}

fn render(date: &Instant, fmt: &str, locale: Option<Locale>) -> String {
    match locale {
        Some(locale) => date.format_localized(fmt, locale).to_string(),
        None => date.format(fmt).to_string(),
    }
}

/// Human-readable header for the period of `view` around `date`.
#[must_use]
pub fn period_label(date: &Instant, view: ViewMode, locale: Option<Locale>) -> String {
    match view {
        ViewMode::Day => render(date, "%B %-d, %Y", locale),
        ViewMode::Week => {
            let start = start_of_week(date);
            let end = end_of_week(date);
            let end_fmt = if week_within_one_month(date) {
                "%-d, %Y"
            } else {
                "%b %-d, %Y"
            };
            format!(
                "{WEEK_PREFIX} {} - {}",
                render(&start, "%b %-d", locale),
                render(&end, end_fmt, locale)
            )
        }
        ViewMode::Month => render(date, "%B %Y", locale),
        ViewMode::Year => render(date, "%Y", locale),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::UTC;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> Instant {
        UTC.with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn labels_each_view() {
        let date = at(2024, 3, 14);
        assert_eq!(period_label(&date, ViewMode::Day, None), "March 14, 2024");
        assert_eq!(period_label(&date, ViewMode::Month, None), "March 2024");
        assert_eq!(period_label(&date, ViewMode::Year, None), "2024");
    }

    #[test]
    fn week_label_within_one_month() {
        assert_eq!(
            period_label(&at(2024, 3, 14), ViewMode::Week, None),
            "Week of Mar 11 - 17, 2024"
        );
    }

    #[test]
    fn week_label_across_months_and_years() {
        assert_eq!(
            period_label(&at(2024, 2, 28), ViewMode::Week, None),
            "Week of Feb 26 - Mar 3, 2024"
        );
        assert_eq!(
            period_label(&at(2025, 1, 1), ViewMode::Week, None),
            "Week of Dec 30 - Jan 5, 2025"
        );
    }

    #[test]
    fn locale_changes_month_names_only_for_that_call() {
        let date = at(2024, 3, 14);
        let french = parse_locale("fr").expect("french locale");
        assert_eq!(period_label(&date, ViewMode::Month, Some(french)), "mars 2024");
        assert_eq!(period_label(&date, ViewMode::Month, None), "March 2024");
    }

    #[test]
    fn parses_locale_spellings() {
        assert!(parse_locale("de-DE").is_ok());
        assert!(parse_locale("pt_br").is_ok());
        assert!(parse_locale("en").is_ok());
        assert!(matches!(
            parse_locale("xx-YY"),
            Err(CalendarError::UnknownLocale(ref raw)) if raw == "xx-YY"
        ));
        assert!(parse_locale("").is_err());
    }
}
