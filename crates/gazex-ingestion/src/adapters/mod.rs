//! Format adapters, one per gazetteer source.
//!
//! Contract: a lazy, finite, non-restartable iterator of
//! `Result<AdapterItem>`. A bad record becomes
//! `AdapterItem::Rejected` and the stream continues; only structural
//! failure of the input itself (unreadable file, corrupt container)
//! surfaces as `Err` and aborts the run. No adapter materialises its
//! source in memory.

pub mod btaa;
pub mod fast;
pub mod geonames;
pub mod wof;

use gazex_common::{PlaceRecord, RejectedRow, Result};

/// One adapter output: a canonical record or a per-row rejection.
#[derive(Debug)]
pub enum AdapterItem {
    Record(PlaceRecord),
    Rejected(RejectedRow),
}

/// Boxed adapter stream consumed by the loader.
pub type RecordStream = Box<dyn Iterator<Item = Result<AdapterItem>> + Send>;

/// Empty-or-whitespace columns become `None`.
pub(crate) fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lenient integer parse: unparsable values are absent, not fatal.
pub(crate) fn parse_opt_i64(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// Lenient float parse for coordinates.
pub(crate) fn parse_opt_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_to_none() {
        assert_eq!(blank_to_none("  "), None);
        assert_eq!(blank_to_none(" x "), Some("x".to_string()));
    }

    #[test]
    fn test_lenient_numeric_parses() {
        assert_eq!(parse_opt_i64("410939"), Some(410939));
        assert_eq!(parse_opt_i64("n/a"), None);
        assert_eq!(parse_opt_f64("-93.26384"), Some(-93.26384));
        assert_eq!(parse_opt_f64(""), None);
    }
}
