//! Content timestamps and the screenshot filenames derived from them.
//!
//! A timestamp is stored normalized as `HH:MM:SS`. Its screenshot is named
//! `HH-MM-SS.png`, and `timestamp_from_filename` inverts that rule so the
//! capture stage can tell which timestamps are already covered on disk.

use std::collections::HashSet;

const SCREENSHOT_EXT: &str = ".png";

/// Parse `SS`, `MM:SS` or `HH:MM:SS` (fractional seconds truncated) into
/// whole seconds.
pub fn parse_seconds(ts: &str) -> Result<u64, String> {
    let trimmed = ts.trim();
    if trimmed.is_empty() {
        return Err("Empty timestamp".to_string());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return Err(format!("Invalid timestamp '{}': too many fields", ts));
    }

    let mut total: u64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        let whole = match part.split_once('.') {
            Some((whole, fraction)) if is_last => {
                if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("Invalid timestamp '{}': bad fraction", ts));
                }
                whole
            }
            _ => *part,
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid timestamp '{}'", ts));
        }
        let value: u64 = whole
            .parse()
            .map_err(|e| format!("Invalid timestamp '{}': {}", ts, e))?;
        // Minutes and seconds fields after the leading one must stay below 60
        if i > 0 && value >= 60 {
            return Err(format!("Invalid timestamp '{}': field out of range", ts));
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| format!("Invalid timestamp '{}': out of range", ts))?;
    }

    Ok(total)
}

pub fn format_seconds(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub fn normalize(ts: &str) -> Result<String, String> {
    parse_seconds(ts).map(format_seconds)
}

/// Normalize a list of timestamps, dropping duplicates and unparseable
/// entries while keeping first-seen order. Returns the kept list and the
/// rejected raw values.
pub fn normalize_all<'a, I>(raw: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut rejected = Vec::new();
    for ts in raw {
        match normalize(ts) {
            Ok(n) => {
                if seen.insert(n.clone()) {
                    kept.push(n);
                }
            }
            Err(_) => rejected.push(ts.to_string()),
        }
    }
    (kept, rejected)
}

/// `"00:01:00"` -> `"00-01-00.png"`. Expects a normalized timestamp.
pub fn filename_for(ts: &str) -> String {
    format!("{}{}", ts.replace(':', "-"), SCREENSHOT_EXT)
}

/// Inverse of `filename_for`. Returns `None` for names that were not produced
/// by the rule, so stray files never count as covering a timestamp.
pub fn timestamp_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_suffix(SCREENSHOT_EXT)?;
    let fields: Vec<&str> = stem.split('-').collect();
    if fields.len() != 3
        || fields
            .iter()
            .any(|f| f.len() < 2 || !f.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let ts = fields.join(":");
    // Round-trip guard: only canonical names map back
    match normalize(&ts) {
        Ok(n) if n == ts => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_supported_shapes() {
        assert_eq!(parse_seconds("45").unwrap(), 45);
        assert_eq!(parse_seconds("1:05").unwrap(), 65);
        assert_eq!(parse_seconds("01:00:00").unwrap(), 3600);
        assert_eq!(parse_seconds("00:00:30.500").unwrap(), 30);
        assert_eq!(parse_seconds("90:00").unwrap(), 5400);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        assert!(parse_seconds("").is_err());
        assert!(parse_seconds("abc").is_err());
        assert!(parse_seconds("1:2:3:4").is_err());
        assert!(parse_seconds("00:61").is_err());
        assert!(parse_seconds("1::2").is_err());
        assert!(parse_seconds("1.5.5").is_err());
        assert!(parse_seconds("12.abc").is_err());
        assert!(parse_seconds("12.").is_err());
        assert!(parse_seconds("1.5:00").is_err());
    }

    #[test]
    fn oversized_leading_field_is_out_of_range() {
        let err = parse_seconds("999999999999999999:00").unwrap_err();
        assert!(err.contains("out of range"), "got: {}", err);
        assert!(parse_seconds("99999999999999999999").is_err());

        let (kept, rejected) = normalize_all(["999999999999999999:00", "00:02:00"]);
        assert_eq!(kept, vec!["00:02:00"]);
        assert_eq!(rejected, vec!["999999999999999999:00"]);
    }

    #[test]
    fn normalize_pads_to_hours() {
        assert_eq!(normalize("5:07").unwrap(), "00:05:07");
        assert_eq!(normalize("1:02:03").unwrap(), "01:02:03");
    }

    #[test]
    fn normalize_all_dedups_and_reports_rejects() {
        let (kept, rejected) = normalize_all(["1:00", "00:01:00", "bogus", "10:00"]);
        assert_eq!(kept, vec!["00:01:00", "00:10:00"]);
        assert_eq!(rejected, vec!["bogus"]);
    }

    #[test]
    fn filename_rule_inverts() {
        assert_eq!(filename_for("00:05:00"), "00-05-00.png");
        assert_eq!(
            timestamp_from_filename("00-05-00.png"),
            Some("00:05:00".to_string())
        );
    }

    #[test]
    fn foreign_filenames_recover_nothing() {
        assert_eq!(timestamp_from_filename("cover.png"), None);
        assert_eq!(timestamp_from_filename("00-05-00.jpg"), None);
        assert_eq!(timestamp_from_filename("0-5-0.png"), None);
        assert_eq!(timestamp_from_filename("00-75-00.png"), None);
    }
}
