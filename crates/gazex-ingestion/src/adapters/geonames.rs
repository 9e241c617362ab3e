//! GeoNames delimited-text adapter.
//!
//! The dump is tab-separated with a fixed 19-column layout
//! (https://download.geonames.org/export/dump/readme.txt) and no
//! header or quoting. `geonameid` and a name are required; numeric
//! columns that fail to parse become absent rather than fatal.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, TimeZone, Utc};
use tracing::debug;

use gazex_common::{GazetteerSource, GazexError, PlaceRecord, RejectReason, RejectedRow, Result};

use super::{blank_to_none, parse_opt_f64, parse_opt_i64, AdapterItem};

// Column positions in the dump layout.
const COL_GEONAMEID: usize = 0;
const COL_NAME: usize = 1;
const COL_ASCIINAME: usize = 2;
const COL_ALTERNATENAMES: usize = 3;
const COL_LATITUDE: usize = 4;
const COL_LONGITUDE: usize = 5;
const COL_FEATURE_CLASS: usize = 6;
const COL_FEATURE_CODE: usize = 7;
const COL_COUNTRY_CODE: usize = 8;
const COL_ADMIN1: usize = 10;
const COL_ADMIN2: usize = 11;
const COL_ADMIN3: usize = 12;
const COL_ADMIN4: usize = 13;
const COL_POPULATION: usize = 14;
const COL_MODIFICATION_DATE: usize = 18;

pub struct GeonamesAdapter {
    rows: csv::StringRecordsIntoIter<Box<dyn Read + Send>>,
}

impl GeonamesAdapter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            GazexError::StructuralParse(format!("cannot open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "opening GeoNames dump");
        Ok(Self::from_reader(Box::new(BufReader::new(file))))
    }

    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        let rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        Self { rows }
    }

    fn convert(row: &csv::StringRecord) -> std::result::Result<PlaceRecord, RejectedRow> {
        let col = |i: usize| row.get(i).unwrap_or("");

        let external_id = blank_to_none(col(COL_GEONAMEID))
            .ok_or_else(|| RejectedRow::missing_field(None, "geonameid"))?;

        // Name and ascii name back-fill each other before we give up.
        let name = blank_to_none(col(COL_NAME));
        let ascii_name = blank_to_none(col(COL_ASCIINAME));
        let (name, ascii_name) = match (name, ascii_name) {
            (Some(n), Some(a)) => (n, a),
            (Some(n), None) => (n.clone(), n),
            (None, Some(a)) => (a.clone(), a),
            (None, None) => {
                return Err(RejectedRow::missing_field(Some(external_id), "name"));
            }
        };

        let mut record = PlaceRecord::new(GazetteerSource::Geonames, external_id, name);
        record.ascii_name = ascii_name;

        record.alternate_names = col(COL_ALTERNATENAMES)
            .split(',')
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.trim().to_string())
            .collect();

        record.type_code = match (
            blank_to_none(col(COL_FEATURE_CLASS)),
            blank_to_none(col(COL_FEATURE_CODE)),
        ) {
            (Some(class), Some(code)) => Some(format!("{class}.{code}")),
            (Some(class), None) => Some(class),
            _ => None,
        };

        record.country_code = blank_to_none(col(COL_COUNTRY_CODE));
        record.admin1 = blank_to_none(col(COL_ADMIN1));
        record.admin2 = blank_to_none(col(COL_ADMIN2));
        record.admin3 = blank_to_none(col(COL_ADMIN3));
        record.admin4 = blank_to_none(col(COL_ADMIN4));
        record.population = parse_opt_i64(col(COL_POPULATION)).filter(|p| *p >= 0);
        record.latitude = parse_opt_f64(col(COL_LATITUDE));
        record.longitude = parse_opt_f64(col(COL_LONGITUDE));
        record.last_modified = NaiveDate::parse_from_str(col(COL_MODIFICATION_DATE), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt));

        Ok(record)
    }
}

impl Iterator for GeonamesAdapter {
    type Item = Result<AdapterItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let item = match row {
            Ok(row) => match Self::convert(&row) {
                Ok(record) => AdapterItem::Record(record),
                Err(rejected) => AdapterItem::Rejected(rejected),
            },
            // A single undecodable line is a row problem, not a broken
            // container: reject and keep streaming.
            Err(e) => AdapterItem::Rejected(RejectedRow::new(
                None,
                RejectReason::MalformedStructure,
                e.to_string(),
            )),
        };
        Some(Ok(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINNEAPOLIS: &str = "5037649\tMinneapolis\tMinneapolis\tMineapolis,Minneapolis\t44.97997\t-93.26384\tP\tPPLA2\tUS\t\tMN\t053\t\t\t429954\t262\t254\tAmerica/Chicago\t2022-03-09";

    fn collect(input: &str) -> Vec<AdapterItem> {
        GeonamesAdapter::from_reader(Box::new(std::io::Cursor::new(input.to_string())))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_valid_row_maps_all_fields() {
        let items = collect(MINNEAPOLIS);
        assert_eq!(items.len(), 1);
        let AdapterItem::Record(r) = &items[0] else {
            panic!("expected record")
        };
        assert_eq!(r.external_id, "5037649");
        assert_eq!(r.name, "Minneapolis");
        assert_eq!(r.type_code.as_deref(), Some("P.PPLA2"));
        assert_eq!(r.country_code.as_deref(), Some("US"));
        assert_eq!(r.admin1.as_deref(), Some("MN"));
        assert_eq!(r.population, Some(429954));
        assert_eq!(r.alternate_names, vec!["Mineapolis", "Minneapolis"]);
        assert!((r.latitude.unwrap() - 44.97997).abs() < 1e-9);
        assert!(r.last_modified.is_some());
    }

    #[test]
    fn test_missing_name_rejected_stream_continues() {
        let input = format!(
            "123\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\n{MINNEAPOLIS}"
        );
        let items = collect(&input);
        assert_eq!(items.len(), 2);
        let AdapterItem::Rejected(rej) = &items[0] else {
            panic!("expected rejection")
        };
        assert_eq!(rej.reason, RejectReason::MissingRequiredField);
        assert_eq!(rej.external_id.as_deref(), Some("123"));
        assert!(matches!(items[1], AdapterItem::Record(_)));
    }

    #[test]
    fn test_unparsable_population_becomes_absent() {
        let row = MINNEAPOLIS.replace("429954", "lots");
        let items = collect(&row);
        let AdapterItem::Record(r) = &items[0] else {
            panic!("expected record")
        };
        assert_eq!(r.population, None);
        assert_eq!(r.name, "Minneapolis"); // rest of the row intact
    }

    #[test]
    fn test_ascii_name_backfills_name() {
        let row = "99\t\tSaint Paul\t\t44.9\t-93.1\tP\tPPL\tUS\t\tMN\t\t\t\t\t\t\t\t";
        let items = collect(row);
        let AdapterItem::Record(r) = &items[0] else {
            panic!("expected record")
        };
        assert_eq!(r.name, "Saint Paul");
        assert_eq!(r.ascii_name, "Saint Paul");
    }

    #[test]
    fn test_missing_id_rejected() {
        let row = "\tGhost Town\tGhost Town\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t";
        let items = collect(row);
        let AdapterItem::Rejected(rej) = &items[0] else {
            panic!("expected rejection")
        };
        assert_eq!(rej.external_id, None);
        assert_eq!(rej.reason, RejectReason::MissingRequiredField);
    }
}
