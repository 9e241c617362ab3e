//! OCLC FAST geographic authority adapter (MARCXML).
//!
//! Streams `<record>` elements out of a MARC21 slim collection with a
//! pull parser, so arbitrarily large dumps never load into memory.
//! Per-record field map:
//!   016 $a  FAST identifier (`fst`-prefixed, zero padded)
//!   024 $a  authority URI
//!   151     geographic heading; subfields joined with `--`
//!   451     see-from headings, kept as alternate names
//!   751     cross-references; geonames/viaf/wikipedia URIs become
//!           concordances
//!
//! A record missing its id, URI, or heading is rejected and the stream
//! continues; a malformed XML event is structural and ends the import.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use gazex_common::{GazetteerSource, GazexError, PlaceRecord, RejectedRow, Result};

use super::{blank_to_none, AdapterItem};

const TAG_FAST_ID: &str = "016";
const TAG_URI: &str = "024";
const TAG_HEADING: &str = "151";
const TAG_SEE_FROM: &str = "451";
const TAG_CROSS_REF: &str = "751";

pub struct FastAdapter {
    reader: Reader<Box<dyn BufRead + Send>>,
    buf: Vec<u8>,
    done: bool,
}

impl FastAdapter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            GazexError::StructuralParse(format!("cannot open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "opening FAST MARCXML dump");
        Ok(Self::from_reader(Box::new(BufReader::new(file))))
    }

    pub fn from_reader(reader: Box<dyn BufRead + Send>) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = true;
        Self {
            reader,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Consume events until the next complete `<record>` element.
    fn next_record(&mut self) -> Result<Option<MarcRecord>> {
        let mut current: Option<MarcRecord> = None;
        let mut field_tag: Option<String> = None;
        let mut field_parts: Vec<String> = Vec::new();
        let mut in_subfield = false;
        let mut subfield_text = String::new();

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"record" => current = Some(MarcRecord::default()),
                    b"datafield" if current.is_some() => {
                        field_tag = attr(e, b"tag");
                        field_parts.clear();
                    }
                    b"subfield" if field_tag.is_some() => {
                        in_subfield = true;
                        subfield_text.clear();
                    }
                    _ => {}
                },
                Ok(Event::Text(ref e)) => {
                    if in_subfield {
                        let text = e.unescape().map_err(|err| {
                            GazexError::StructuralParse(format!("bad MARCXML text: {err}"))
                        })?;
                        subfield_text.push_str(&text);
                    }
                }
                Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                    b"subfield" => {
                        if in_subfield {
                            if let Some(part) = blank_to_none(&subfield_text) {
                                field_parts.push(part);
                            }
                            in_subfield = false;
                        }
                    }
                    b"datafield" => {
                        if let (Some(tag), Some(rec)) = (field_tag.take(), current.as_mut()) {
                            rec.absorb(&tag, &field_parts);
                        }
                        field_parts.clear();
                    }
                    b"record" => {
                        if let Some(rec) = current.take() {
                            return Ok(Some(rec));
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    return Err(GazexError::StructuralParse(format!(
                        "MARCXML parse error at byte {}: {e}",
                        self.reader.buffer_position()
                    )))
                }
            }
        }
    }
}

impl Iterator for FastAdapter {
    type Item = Result<AdapterItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec.into_item())),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn attr(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

#[derive(Default)]
struct MarcRecord {
    fast_id: Option<String>,
    uri: Option<String>,
    headings: Vec<String>,
    see_from: Vec<String>,
    cross_refs: Vec<String>,
}

impl MarcRecord {
    fn absorb(&mut self, tag: &str, parts: &[String]) {
        if parts.is_empty() {
            return;
        }
        match tag {
            TAG_FAST_ID => {
                if self.fast_id.is_none() {
                    self.fast_id = Some(parts[0].clone());
                }
            }
            TAG_URI => {
                if self.uri.is_none() {
                    self.uri = Some(parts[0].clone());
                }
            }
            TAG_HEADING => self.headings.push(parts.join("--")),
            TAG_SEE_FROM => self.see_from.push(parts.join("--")),
            TAG_CROSS_REF => self.cross_refs.extend(parts.iter().cloned()),
            _ => {}
        }
    }

    fn into_item(self) -> AdapterItem {
        let raw_id = self.fast_id.clone();
        let external_id = raw_id.as_deref().map(normalize_fast_id);

        let Some(external_id) = external_id else {
            return AdapterItem::Rejected(RejectedRow::missing_field(None, "016$a"));
        };
        let Some(uri) = self.uri else {
            return AdapterItem::Rejected(RejectedRow::missing_field(Some(external_id), "024$a"));
        };
        if self.headings.is_empty() {
            return AdapterItem::Rejected(RejectedRow::missing_field(Some(external_id), "151"));
        }

        let mut headings = self.headings.into_iter();
        let name = headings.next().unwrap_or_default();
        let mut record = PlaceRecord::new(GazetteerSource::Fast, external_id, name);
        record.type_code = Some("place".to_string());
        record.alternate_names = headings.chain(self.see_from).collect();
        record.concordances.insert("uri".to_string(), uri);
        for raw in &self.cross_refs {
            if let Some((source, id)) = cross_reference(raw) {
                record.concordances.entry(source.to_string()).or_insert(id);
            }
        }
        AdapterItem::Record(record)
    }
}

/// `fst01204263` -> `1204263`. Unprefixed numeric ids pass through.
fn normalize_fast_id(raw: &str) -> String {
    let digits = raw.trim().strip_prefix("fst").unwrap_or(raw.trim());
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        digits.to_string()
    } else {
        stripped.to_string()
    }
}

/// Map a 751 cross-reference URI onto a known concordance source. The
/// value is the last path segment; unrecognized hosts are ignored.
fn cross_reference(raw: &str) -> Option<(&'static str, String)> {
    let rest = raw
        .trim()
        .trim_start_matches("(uri)")
        .trim()
        .strip_prefix("https://")
        .or_else(|| raw.trim().trim_start_matches("(uri)").trim().strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    let id = path.rsplit('/').find(|seg| !seg.is_empty())?.to_string();
    if host.ends_with("geonames.org") {
        Some(("geonames", id))
    } else if host.ends_with("viaf.org") {
        Some(("viaf", id))
    } else if host.ends_with("wikipedia.org") {
        Some(("wikipedia", id))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_common::RejectReason;

    fn adapter(xml: &str) -> FastAdapter {
        FastAdapter::from_reader(Box::new(std::io::Cursor::new(xml.to_string())))
    }

    const MINNEAPOLIS: &str = r#"<?xml version="1.0"?>
<collection xmlns="http://www.loc.gov/MARC21/slim">
  <record>
    <datafield tag="016"><subfield code="a">fst01204263</subfield></datafield>
    <datafield tag="024"><subfield code="a">http://id.worldcat.org/fast/1204263</subfield></datafield>
    <datafield tag="151">
      <subfield code="a">Minnesota</subfield>
      <subfield code="z">Minneapolis</subfield>
    </datafield>
    <datafield tag="451"><subfield code="a">City of Lakes</subfield></datafield>
    <datafield tag="751">
      <subfield code="0">(uri) http://www.geonames.org/5037649</subfield>
    </datafield>
    <datafield tag="751">
      <subfield code="0">(uri) https://en.wikipedia.org/wiki/Minneapolis</subfield>
    </datafield>
  </record>
</collection>"#;

    #[test]
    fn test_parse_full_record() {
        let items: Vec<_> = adapter(MINNEAPOLIS).map(|r| r.unwrap()).collect();
        assert_eq!(items.len(), 1);
        let AdapterItem::Record(r) = &items[0] else {
            panic!("expected record")
        };
        assert_eq!(r.external_id, "1204263");
        assert_eq!(r.name, "Minnesota--Minneapolis");
        assert_eq!(r.type_code.as_deref(), Some("place"));
        assert_eq!(r.alternate_names, vec!["City of Lakes"]);
        assert_eq!(
            r.concordances.get("uri").map(String::as_str),
            Some("http://id.worldcat.org/fast/1204263")
        );
        assert_eq!(r.concordances.get("geonames").map(String::as_str), Some("5037649"));
        assert_eq!(
            r.concordances.get("wikipedia").map(String::as_str),
            Some("Minneapolis")
        );
    }

    #[test]
    fn test_record_without_heading_rejected_siblings_survive() {
        let xml = r#"<collection>
  <record>
    <datafield tag="016"><subfield code="a">fst0000042</subfield></datafield>
    <datafield tag="024"><subfield code="a">http://id.worldcat.org/fast/42</subfield></datafield>
  </record>
  <record>
    <datafield tag="016"><subfield code="a">fst0000043</subfield></datafield>
    <datafield tag="024"><subfield code="a">http://id.worldcat.org/fast/43</subfield></datafield>
    <datafield tag="151"><subfield code="a">Duluth</subfield></datafield>
  </record>
</collection>"#;
        let items: Vec<_> = adapter(xml).map(|r| r.unwrap()).collect();
        assert_eq!(items.len(), 2);
        let AdapterItem::Rejected(rej) = &items[0] else {
            panic!("expected rejection")
        };
        assert_eq!(rej.reason, RejectReason::MissingRequiredField);
        assert_eq!(rej.external_id.as_deref(), Some("42"));
        let AdapterItem::Record(r) = &items[1] else {
            panic!("expected record")
        };
        assert_eq!(r.name, "Duluth");
    }

    #[test]
    fn test_missing_id_rejected() {
        let xml = r#"<collection><record>
    <datafield tag="024"><subfield code="a">http://id.worldcat.org/fast/9</subfield></datafield>
    <datafield tag="151"><subfield code="a">Nowhere</subfield></datafield>
</record></collection>"#;
        let items: Vec<_> = adapter(xml).map(|r| r.unwrap()).collect();
        let AdapterItem::Rejected(rej) = &items[0] else {
            panic!("expected rejection")
        };
        assert_eq!(rej.external_id, None);
    }

    #[test]
    fn test_malformed_xml_is_structural() {
        let xml = "<collection><record><datafield tag=\"016\"></record>";
        let mut a = adapter(xml);
        let err = a.find_map(|r| r.err()).expect("expected structural error");
        assert!(matches!(err, GazexError::StructuralParse(_)));
        assert!(a.next().is_none());
    }

    #[test]
    fn test_normalize_fast_id() {
        assert_eq!(normalize_fast_id("fst01204263"), "1204263");
        assert_eq!(normalize_fast_id("1204263"), "1204263");
        assert_eq!(normalize_fast_id("fst0000000"), "0000000");
    }

    #[test]
    fn test_cross_reference_hosts() {
        assert_eq!(
            cross_reference("(uri) http://www.geonames.org/5037649"),
            Some(("geonames", "5037649".to_string()))
        );
        assert_eq!(
            cross_reference("https://viaf.org/viaf/123"),
            Some(("viaf", "123".to_string()))
        );
        assert_eq!(cross_reference("http://example.com/x"), None);
    }
}
