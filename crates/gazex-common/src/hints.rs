//! Translation from domain-neutral type hints to each source's native
//! type vocabulary.
//!
//! The table is fixed, human-curated configuration: GeoNames speaks
//! feature classes/codes (stored canonically as `CLASS.CODE`, e.g.
//! `P.PPL`), WOF speaks placetypes, BTAA geometry rows carry a coarse
//! `county`/`state` class, and FAST geographic headings are uniformly
//! `place`. Scoring stays source-agnostic by funnelling every hint
//! through here.

use crate::records::GazetteerSource;

/// One hint row: a neutral hint and the native codes it maps to per
/// source. A GeoNames entry that names only a class (no dot) matches
/// any code in that class.
struct HintRow {
    hint: &'static str,
    geonames: &'static [&'static str],
    wof: &'static [&'static str],
    btaa: &'static [&'static str],
    fast: &'static [&'static str],
}

/// GeoNames class letters follow https://www.geonames.org/export/codes.html
const TABLE: &[HintRow] = &[
    HintRow { hint: "country",  geonames: &["A.PCLI", "A.PCL"], wof: &["country"],      btaa: &[],         fast: &["place"] },
    HintRow { hint: "state",    geonames: &["A.ADM1"],          wof: &["region"],       btaa: &["state"],  fast: &["place"] },
    HintRow { hint: "province", geonames: &["A.ADM1"],          wof: &["region"],       btaa: &["state"],  fast: &["place"] },
    HintRow { hint: "county",   geonames: &["A.ADM2"],          wof: &["county"],       btaa: &["county"], fast: &["place"] },
    HintRow { hint: "city",     geonames: &["P"],               wof: &["locality"],     btaa: &[],         fast: &[] },
    HintRow { hint: "town",     geonames: &["P"],               wof: &["locality"],     btaa: &[],         fast: &[] },
    HintRow { hint: "village",  geonames: &["P"],               wof: &["locality"],     btaa: &[],         fast: &[] },
    HintRow { hint: "capital",  geonames: &["P.PPLA", "P.PPLC"], wof: &["locality"],    btaa: &[],         fast: &[] },
    HintRow { hint: "neighbourhood", geonames: &["P.PPLX"],     wof: &["neighbourhood"], btaa: &[],        fast: &[] },
    HintRow { hint: "river",    geonames: &["H.STM", "H.RV"],   wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "stream",   geonames: &["H.STM"],           wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "lake",     geonames: &["H.LK"],            wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "sea",      geonames: &["H.SEA"],           wof: &["ocean"],        btaa: &[],         fast: &[] },
    HintRow { hint: "ocean",    geonames: &["H.OCN"],           wof: &["ocean"],        btaa: &[],         fast: &[] },
    HintRow { hint: "mountain", geonames: &["T.MT", "T.PK"],    wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "hill",     geonames: &["T.HLL"],           wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "valley",   geonames: &["T.VAL"],           wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "island",   geonames: &["T.ISL"],           wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "forest",   geonames: &["V.FRST"],          wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "park",     geonames: &["L.PRK"],           wof: &[],               btaa: &[],         fast: &[] },
    HintRow { hint: "place",    geonames: &[],                  wof: &[],               btaa: &[],         fast: &["place"] },
];

/// Whether a known hint maps to a record's native type code.
///
/// Returns `None` when the hint itself is unknown: the caller treats
/// that the same as a mismatch for scoring but can surface it.
pub fn hint_matches(hint: &str, source: GazetteerSource, type_code: &str) -> Option<bool> {
    let hint = hint.to_lowercase();
    let row = TABLE.iter().find(|r| r.hint == hint)?;
    let codes = match source {
        GazetteerSource::Geonames => row.geonames,
        GazetteerSource::Wof      => row.wof,
        GazetteerSource::Btaa     => row.btaa,
        GazetteerSource::Fast     => row.fast,
    };
    Some(codes.iter().any(|c| code_matches(c, type_code)))
}

/// Known hints, for CLI help and validation.
pub fn known_hints() -> Vec<&'static str> {
    TABLE.iter().map(|r| r.hint).collect()
}

/// A bare class entry (`P`) matches any `P.*` code; otherwise compare
/// case-insensitively on the full code.
fn code_matches(entry: &str, type_code: &str) -> bool {
    let tc = type_code.to_uppercase();
    let entry_uc = entry.to_uppercase();
    if entry_uc.contains('.') || !tc.contains('.') {
        tc == entry_uc || tc.eq_ignore_ascii_case(entry)
    } else {
        tc.split('.').next() == Some(entry_uc.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_matches_any_populated_place() {
        assert_eq!(hint_matches("city", GazetteerSource::Geonames, "P.PPL"), Some(true));
        assert_eq!(hint_matches("city", GazetteerSource::Geonames, "P.PPLA2"), Some(true));
        assert_eq!(hint_matches("city", GazetteerSource::Geonames, "H.LK"), Some(false));
    }

    #[test]
    fn test_city_does_not_match_fast_place() {
        // FAST headings carry no settlement granularity, so a "city"
        // hint is a type mismatch there.
        assert_eq!(hint_matches("city", GazetteerSource::Fast, "place"), Some(false));
        assert_eq!(hint_matches("place", GazetteerSource::Fast, "place"), Some(true));
    }

    #[test]
    fn test_unknown_hint_is_none() {
        assert_eq!(hint_matches("starport", GazetteerSource::Geonames, "P.PPL"), None);
    }

    #[test]
    fn test_county_matches_btaa() {
        assert_eq!(hint_matches("county", GazetteerSource::Btaa, "county"), Some(true));
        assert_eq!(hint_matches("state", GazetteerSource::Btaa, "county"), Some(false));
    }

    #[test]
    fn test_hint_is_case_insensitive() {
        assert_eq!(hint_matches("City", GazetteerSource::Wof, "locality"), Some(true));
    }
}
