//! BTAA geoportal boundary adapter.
//!
//! A single header CSV covering US states and counties. County rows
//! carry `County_FIPS` and `NAMELSAD`; state rows carry only the state
//! columns. The bounding box is reduced to a centroid for the canonical
//! latitude/longitude, and the raw geometry passes through opaquely.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use gazex_common::{GazetteerSource, GazexError, PlaceRecord, RejectReason, RejectedRow, Result};

use super::{blank_to_none, AdapterItem};

const H_FAST: &str = "Fast";
const H_BBOX: &str = "Bounding Box";
const H_GEOMETRY: &str = "Geometry";
const H_GEONAMES_ID: &str = "GeoNames ID";
const H_STATE_ABBV: &str = "State Abbv";
const H_STATE_NAME: &str = "State Name";
const H_COUNTY_FIPS: &str = "County_FIPS";
const H_STATEFP: &str = "STATEFP";
const H_NAMELSAD: &str = "NAMELSAD";

pub struct BtaaAdapter {
    headers: csv::StringRecord,
    rows: csv::StringRecordsIntoIter<Box<dyn Read + Send>>,
}

impl std::fmt::Debug for BtaaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtaaAdapter")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl BtaaAdapter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            GazexError::StructuralParse(format!("cannot open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "opening BTAA boundary file");
        Self::from_reader(Box::new(BufReader::new(file)))
    }

    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| GazexError::StructuralParse(format!("unreadable BTAA header row: {e}")))?
            .clone();
        for required in [H_STATE_NAME, H_BBOX] {
            if !headers.iter().any(|h| h == required) {
                return Err(GazexError::StructuralParse(format!(
                    "BTAA file missing required column {required:?}"
                )));
            }
        }
        Ok(Self {
            headers,
            rows: reader.into_records(),
        })
    }

    fn field<'a>(&self, row: &'a csv::StringRecord, header: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|h| h == header)?;
        row.get(idx)
    }

    fn convert(&self, row: &csv::StringRecord) -> std::result::Result<PlaceRecord, RejectedRow> {
        let get = |h: &str| blank_to_none(self.field(row, h).unwrap_or(""));

        let county_fips = get(H_COUNTY_FIPS);
        let statefp = get(H_STATEFP);
        let geonames_id = get(H_GEONAMES_ID);

        let external_id = county_fips
            .clone()
            .or_else(|| statefp.clone())
            .or_else(|| geonames_id.clone())
            .ok_or_else(|| RejectedRow::missing_field(None, "County_FIPS/STATEFP/GeoNames ID"))?;

        let is_county = county_fips.is_some();
        let name = if is_county {
            get(H_NAMELSAD).ok_or_else(|| {
                RejectedRow::missing_field(Some(external_id.clone()), H_NAMELSAD)
            })?
        } else {
            get(H_STATE_NAME).ok_or_else(|| {
                RejectedRow::missing_field(Some(external_id.clone()), H_STATE_NAME)
            })?
        };

        let mut record = PlaceRecord::new(GazetteerSource::Btaa, external_id.clone(), name);
        record.type_code = Some(if is_county { "county" } else { "state" }.to_string());
        record.country_code = Some("US".to_string());
        record.admin1 = get(H_STATE_ABBV).or_else(|| get(H_STATE_NAME));
        record.geometry = get(H_GEOMETRY);

        if let Some(bbox) = get(H_BBOX) {
            let (lat, lon) = parse_bbox_centroid(&bbox).map_err(|detail| {
                RejectedRow::new(
                    Some(external_id.clone()),
                    RejectReason::MalformedStructure,
                    detail,
                )
            })?;
            record.latitude = Some(lat);
            record.longitude = Some(lon);
        }

        if let Some(gn) = geonames_id {
            record.concordances.insert("geonames".to_string(), gn);
        }
        if let Some(fast) = get(H_FAST) {
            record.concordances.insert("fast".to_string(), fast);
        }
        Ok(record)
    }
}

impl Iterator for BtaaAdapter {
    type Item = Result<AdapterItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => {
                return Some(Ok(AdapterItem::Rejected(RejectedRow::new(
                    None,
                    RejectReason::MalformedStructure,
                    e.to_string(),
                ))))
            }
        };
        let item = match self.convert(&row) {
            Ok(record) => AdapterItem::Record(record),
            Err(rejected) => AdapterItem::Rejected(rejected),
        };
        Some(Ok(item))
    }
}

/// Parse a bounding box into its centroid. Accepts either the plain
/// `W,S,E,N` comma form or the `ENVELOPE(W,E,N,S)` wrapper, validating
/// coordinate ranges and edge ordering.
fn parse_bbox_centroid(raw: &str) -> std::result::Result<(f64, f64), String> {
    let trimmed = raw.trim();
    let (inner, envelope) = match trimmed
        .strip_prefix("ENVELOPE(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    let parts: Vec<f64> = inner
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("unparsable bounding box {raw:?}: {e}"))?;
    if parts.len() != 4 {
        return Err(format!(
            "bounding box {raw:?} has {} values, expected 4",
            parts.len()
        ));
    }

    let (west, south, east, north) = if envelope {
        (parts[0], parts[3], parts[1], parts[2])
    } else {
        (parts[0], parts[1], parts[2], parts[3])
    };

    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        return Err(format!("bounding box {raw:?} longitude out of range"));
    }
    if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
        return Err(format!("bounding box {raw:?} latitude out of range"));
    }
    if south > north || west > east {
        return Err(format!("bounding box {raw:?} edges out of order"));
    }

    Ok(((south + north) / 2.0, (west + east) / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(s: &str) -> Box<dyn Read + Send> {
        Box::new(std::io::Cursor::new(s.to_string()))
    }

    const HEADER: &str =
        "Fast,Bounding Box,Geometry,GeoNames ID,State Abbv,State Name,County_FIPS,STATEFP,NAMELSAD";

    #[test]
    fn test_county_row() {
        let data = format!(
            "{HEADER}\n\
             1204263,\"-93.77,44.79,-93.18,45.25\",MULTIPOLYGON(...),5037784,MN,Minnesota,27053,27,Hennepin County\n"
        );
        let mut adapter = BtaaAdapter::from_reader(cursor(&data)).unwrap();
        let AdapterItem::Record(r) = adapter.next().unwrap().unwrap() else {
            panic!("expected record")
        };
        assert_eq!(r.external_id, "27053");
        assert_eq!(r.name, "Hennepin County");
        assert_eq!(r.type_code.as_deref(), Some("county"));
        assert_eq!(r.admin1.as_deref(), Some("MN"));
        assert_eq!(r.country_code.as_deref(), Some("US"));
        assert!((r.latitude.unwrap() - 45.02).abs() < 0.001);
        assert!((r.longitude.unwrap() - -93.475).abs() < 0.001);
        assert_eq!(r.concordances.get("geonames").map(String::as_str), Some("5037784"));
        assert_eq!(r.concordances.get("fast").map(String::as_str), Some("1204263"));
    }

    #[test]
    fn test_state_row_without_county_columns() {
        let data = format!(
            "{HEADER}\n\
             1204560,\"-97.24,43.50,-89.49,49.38\",,5037779,MN,Minnesota,,27,\n"
        );
        let mut adapter = BtaaAdapter::from_reader(cursor(&data)).unwrap();
        let AdapterItem::Record(r) = adapter.next().unwrap().unwrap() else {
            panic!("expected record")
        };
        assert_eq!(r.external_id, "27");
        assert_eq!(r.name, "Minnesota");
        assert_eq!(r.type_code.as_deref(), Some("state"));
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let data = format!(
            "{HEADER}\n\
             ,\"-93.77,45.25,-93.18,44.79\",,,MN,Minnesota,27053,27,Hennepin County\n"
        );
        let mut adapter = BtaaAdapter::from_reader(cursor(&data)).unwrap();
        let AdapterItem::Rejected(rej) = adapter.next().unwrap().unwrap() else {
            panic!("expected rejection")
        };
        assert_eq!(rej.reason, RejectReason::MalformedStructure);
        assert_eq!(rej.external_id.as_deref(), Some("27053"));
    }

    #[test]
    fn test_row_without_any_id_rejected() {
        let data = format!("{HEADER}\n,,,,MN,Minnesota,,,\n");
        let mut adapter = BtaaAdapter::from_reader(cursor(&data)).unwrap();
        let AdapterItem::Rejected(rej) = adapter.next().unwrap().unwrap() else {
            panic!("expected rejection")
        };
        assert_eq!(rej.reason, RejectReason::MissingRequiredField);
    }

    #[test]
    fn test_envelope_form_accepted() {
        let (lat, lon) = parse_bbox_centroid("ENVELOPE(-93.77,-93.18,45.25,44.79)").unwrap();
        assert!((lat - 45.02).abs() < 0.001);
        assert!((lon - -93.475).abs() < 0.001);
    }

    #[test]
    fn test_missing_required_header_is_structural() {
        let err = BtaaAdapter::from_reader(cursor("Fast,Geometry\n1,2\n")).unwrap_err();
        assert!(matches!(err, GazexError::StructuralParse(_)));
    }
}
