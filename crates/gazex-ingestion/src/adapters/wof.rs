//! Who's On First relational-export adapter.
//!
//! The export is five CSV tables keyed by the same WOF id, all written
//! in ascending id order: `spr.csv` (core properties, required) plus
//! optional `ancestors.csv`, `names.csv`, `concordances.csv`, and
//! `geojson.csv`. Rather than a full join, each side table is consumed
//! through a one-row lookahead merge: while the spr cursor sits on id
//! N, side readers drain every row with id ≤ N. Side rows behind the
//! cursor (unsorted input, or ids absent from spr) are skipped with a
//! debug log — the id-order precondition is external and unverified.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{TimeZone, Utc};
use tracing::{debug, warn};

use gazex_common::{GazetteerSource, GazexError, PlaceRecord, RejectReason, RejectedRow, Result};

use super::{blank_to_none, parse_opt_f64, parse_opt_i64, AdapterItem};

// spr.csv layout
const SPR_ID: usize = 0;
const SPR_PARENT_ID: usize = 1;
const SPR_NAME: usize = 2;
const SPR_PLACETYPE: usize = 3;
const SPR_COUNTRY: usize = 4;
const SPR_LATITUDE: usize = 6;
const SPR_LONGITUDE: usize = 7;
const SPR_SUPERSEDED_BY: usize = 17;
const SPR_LASTMODIFIED: usize = 19;

// side-table layouts
const ANCESTOR_ID: usize = 1;
const CONC_OTHER_ID: usize = 1;
const CONC_OTHER_SOURCE: usize = 2;
const GEOJSON_BODY: usize = 1;
const GEOJSON_IS_ALT: usize = 4;
const NAMES_NAME: usize = 10;

pub struct WofAdapter {
    spr: RowReader,
    ancestors: SideTable,
    names: SideTable,
    concordances: SideTable,
    geojson: SideTable,
}

impl WofAdapter {
    /// Open from the export directory. `spr.csv` must exist; the side
    /// tables are each optional.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let spr_path = dir.join("spr.csv");
        let spr_file = File::open(&spr_path).map_err(|e| {
            GazexError::StructuralParse(format!("cannot open {}: {e}", spr_path.display()))
        })?;
        debug!(dir = %dir.display(), "opening WOF export");
        Ok(Self {
            spr: RowReader::new(Box::new(BufReader::new(spr_file))),
            ancestors: SideTable::open(dir.join("ancestors.csv"), "ancestors"),
            names: SideTable::open(dir.join("names.csv"), "names"),
            concordances: SideTable::open(dir.join("concordances.csv"), "concordances"),
            geojson: SideTable::open(dir.join("geojson.csv"), "geojson"),
        })
    }

    #[cfg(test)]
    fn from_readers(
        spr: Box<dyn Read + Send>,
        ancestors: Option<Box<dyn Read + Send>>,
        names: Option<Box<dyn Read + Send>>,
        concordances: Option<Box<dyn Read + Send>>,
        geojson: Option<Box<dyn Read + Send>>,
    ) -> Self {
        Self {
            spr: RowReader::new(spr),
            ancestors: SideTable::from_reader(ancestors, "ancestors"),
            names: SideTable::from_reader(names, "names"),
            concordances: SideTable::from_reader(concordances, "concordances"),
            geojson: SideTable::from_reader(geojson, "geojson"),
        }
    }

    fn convert(&mut self, id: i64, row: &csv::StringRecord) -> std::result::Result<PlaceRecord, RejectedRow> {
        let col = |i: usize| row.get(i).unwrap_or("");
        let external_id = id.to_string();

        let name = blank_to_none(col(SPR_NAME))
            .ok_or_else(|| RejectedRow::missing_field(Some(external_id.clone()), "name"))?;

        let mut record = PlaceRecord::new(GazetteerSource::Wof, external_id.clone(), name);
        record.type_code = blank_to_none(col(SPR_PLACETYPE));
        record.country_code = blank_to_none(col(SPR_COUNTRY));
        record.parent_id = parse_opt_i64(col(SPR_PARENT_ID)).filter(|p| *p > 0).map(|p| p.to_string());
        record.latitude = parse_opt_f64(col(SPR_LATITUDE));
        record.longitude = parse_opt_f64(col(SPR_LONGITUDE));
        record.last_modified = parse_opt_i64(col(SPR_LASTMODIFIED))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        // superseded_by may carry a comma-separated list; the canonical
        // model keeps one scalar link, so take the first deterministic
        // value and log the truncation.
        let superseded = col(SPR_SUPERSEDED_BY);
        if !superseded.trim().is_empty() {
            let first = superseded.split(',').next().unwrap_or("").trim();
            if superseded.contains(',') {
                warn!(
                    wof_id = id,
                    raw = superseded,
                    kept = first,
                    "superseded_by is multi-valued, keeping first value"
                );
            }
            if let Some(first_id) = parse_opt_i64(first) {
                record
                    .concordances
                    .insert("wof:superseded_by".to_string(), first_id.to_string());
            }
        }

        for row in self.ancestors.take_matching(id) {
            if let Some(ancestor) = blank_to_none(row.get(ANCESTOR_ID).unwrap_or("")) {
                record.ancestor_ids.push(ancestor);
            }
        }

        for row in self.names.take_matching(id) {
            if let Some(alt) = blank_to_none(row.get(NAMES_NAME).unwrap_or("")) {
                if alt != record.name && !record.alternate_names.contains(&alt) {
                    record.alternate_names.push(alt);
                }
            }
        }

        for row in self.concordances.take_matching(id) {
            let other_source = blank_to_none(row.get(CONC_OTHER_SOURCE).unwrap_or(""));
            let other_id = blank_to_none(row.get(CONC_OTHER_ID).unwrap_or(""));
            if let (Some(src), Some(oid)) = (other_source, other_id) {
                record.concordances.insert(src, oid);
            }
        }

        // Prefer the primary (non-alt) geometry body; geometry is
        // opaque passthrough.
        let mut fallback = None;
        for row in self.geojson.take_matching(id) {
            let body = blank_to_none(row.get(GEOJSON_BODY).unwrap_or(""));
            let is_alt = matches!(
                row.get(GEOJSON_IS_ALT).unwrap_or("").trim().to_lowercase().as_str(),
                "1" | "true" | "t" | "yes" | "y"
            );
            if let Some(body) = body {
                if !is_alt {
                    record.geometry = Some(body);
                    break;
                }
                fallback.get_or_insert(body);
            }
        }
        if record.geometry.is_none() {
            record.geometry = fallback;
        }

        Ok(record)
    }
}

impl Iterator for WofAdapter {
    type Item = Result<AdapterItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.spr.next()? {
                Ok(row) => row,
                Err(e) => {
                    return Some(Ok(AdapterItem::Rejected(RejectedRow::new(
                        None,
                        RejectReason::MalformedStructure,
                        e.to_string(),
                    ))))
                }
            };

            let id_col = row.get(SPR_ID).unwrap_or("").trim();
            if id_col == "id" || id_col == "wok_id" {
                continue; // embedded header row
            }
            let Some(id) = parse_opt_i64(id_col) else {
                return Some(Ok(AdapterItem::Rejected(RejectedRow::new(
                    None,
                    RejectReason::UnparsableNumeric,
                    format!("unparsable wof id: {id_col:?}"),
                ))));
            };

            let item = match self.convert(id, &row) {
                Ok(record) => AdapterItem::Record(record),
                Err(rejected) => AdapterItem::Rejected(rejected),
            };
            return Some(Ok(item));
        }
    }
}

/// Thin wrapper over a headerless CSV record iterator.
struct RowReader {
    iter: csv::StringRecordsIntoIter<Box<dyn Read + Send>>,
}

impl RowReader {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        let iter = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        Self { iter }
    }
}

impl Iterator for RowReader {
    type Item = std::result::Result<csv::StringRecord, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// One side table consumed by merge position. Keeps at most one row of
/// lookahead, so memory stays constant regardless of table size.
struct SideTable {
    rows: Option<RowReader>,
    peeked: Option<(i64, csv::StringRecord)>,
    label: &'static str,
}

impl SideTable {
    fn open(path: std::path::PathBuf, label: &'static str) -> Self {
        match File::open(&path) {
            Ok(f) => Self {
                rows: Some(RowReader::new(Box::new(BufReader::new(f)))),
                peeked: None,
                label,
            },
            Err(_) => {
                debug!(path = %path.display(), table = label, "side table absent, skipping");
                Self { rows: None, peeked: None, label }
            }
        }
    }

    fn from_reader(reader: Option<Box<dyn Read + Send>>, label: &'static str) -> Self {
        Self {
            rows: reader.map(RowReader::new),
            peeked: None,
            label,
        }
    }

    /// All rows whose id equals `id`, advancing past stale rows.
    fn take_matching(&mut self, id: i64) -> Vec<csv::StringRecord> {
        let mut matched = Vec::new();
        loop {
            let (row_id, row) = match self.peeked.take() {
                Some(p) => p,
                None => match self.pull() {
                    Some(p) => p,
                    None => break,
                },
            };
            if row_id < id {
                debug!(table = self.label, row_id, cursor = id, "skipping side row behind merge cursor");
                continue;
            }
            if row_id == id {
                matched.push(row);
                continue;
            }
            self.peeked = Some((row_id, row));
            break;
        }
        matched
    }

    /// Next row with a numeric id; header rows and undecodable rows are
    /// skipped.
    fn pull(&mut self) -> Option<(i64, csv::StringRecord)> {
        let rows = self.rows.as_mut()?;
        loop {
            let row = match rows.next()? {
                Ok(row) => row,
                Err(e) => {
                    warn!(table = self.label, error = %e, "skipping undecodable side row");
                    continue;
                }
            };
            if let Some(id) = parse_opt_i64(row.get(0).unwrap_or("")) {
                return Some((id, row));
            }
        }
    }
}
