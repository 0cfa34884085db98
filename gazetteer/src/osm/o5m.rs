//! Binary O5M parser.
//!
//! O5M interleaves delta-coded numeric fields with a sliding table of
//! recently seen strings, so even skipped elements must be scanned to keep
//! the decoder state consistent. The parser therefore always advances its
//! delta counters and string table and only materializes tag and member
//! strings for elements the caller owns.

use std::io::Read;

use crate::errors::{GazetteerError, Result};
use crate::osm::{EntityType, Member, OsmElement};

const DATASET_NODE: u8 = 0x10;
const DATASET_WAY: u8 = 0x11;
const DATASET_RELATION: u8 = 0x12;
const DATASET_BBOX: u8 = 0xdb;
const DATASET_TIMESTAMP: u8 = 0xdc;
const DATASET_HEADER: u8 = 0xe0;
const RESET: u8 = 0xff;
const EOF: u8 = 0xfe;

const STRING_TABLE_SIZE: usize = 15_000;
const MAX_TABLE_STRING_LEN: usize = 250;
const COORD_UNIT: f64 = 1e-7;

#[derive(Default)]
struct DeltaState {
    node_id: i64,
    lat: i64,
    lon: i64,
    way_id: i64,
    way_ref: i64,
    relation_id: i64,
    member_ref: [i64; 3],
    timestamp: i64,
    changeset: i64,
}

/// Streaming O5M decoder.
pub struct O5mParser<R: Read> {
    rdr: R,
    payload: Vec<u8>,
    strings: Vec<Vec<u8>>,
    deltas: DeltaState,
    eof: bool,
}

/// Outcome of decoding one dataset.
pub enum DatasetKind {
    /// An OSM element was decoded (or scanned, when not owned).
    Element(EntityType),
    /// A non-element dataset was skipped.
    Other,
    /// End of stream.
    Eof,
}

impl<R: Read> O5mParser<R> {
    /// Creates a parser over a raw byte stream.
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            payload: Vec::with_capacity(1024),
            strings: Vec::new(),
            deltas: DeltaState::default(),
            eof: false,
        }
    }

    /// Decodes the next dataset. When `emit` is false the element payload is
    /// scanned for decoder state only and `element` is left cleared.
    pub fn next_dataset(&mut self, element: &mut OsmElement, emit: bool) -> Result<DatasetKind> {
        element.clear();
        loop {
            if self.eof {
                return Ok(DatasetKind::Eof);
            }
            let ty = match self.read_byte_or_eof()? {
                None => {
                    self.eof = true;
                    return Ok(DatasetKind::Eof);
                }
                Some(b) => b,
            };
            match ty {
                RESET => {
                    self.deltas = DeltaState::default();
                    self.strings.clear();
                }
                EOF => {
                    self.eof = true;
                    return Ok(DatasetKind::Eof);
                }
                DATASET_NODE | DATASET_WAY | DATASET_RELATION => {
                    self.read_payload()?;
                    let entity = match ty {
                        DATASET_NODE => {
                            self.parse_node(element, emit)?;
                            EntityType::Node
                        }
                        DATASET_WAY => {
                            self.parse_way(element, emit)?;
                            EntityType::Way
                        }
                        _ => {
                            self.parse_relation(element, emit)?;
                            EntityType::Relation
                        }
                    };
                    return Ok(DatasetKind::Element(entity));
                }
                DATASET_HEADER | DATASET_BBOX | DATASET_TIMESTAMP => {
                    self.read_payload()?;
                }
                _ => {
                    // Unknown dataset kinds carry a length and can be skipped.
                    self.read_payload()?;
                }
            }
        }
    }

    fn read_byte_or_eof(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.rdr.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn read_payload(&mut self) -> Result<()> {
        let len = read_uvarint_from(&mut self.rdr)? as usize;
        self.payload.resize(len, 0);
        self.rdr.read_exact(&mut self.payload)?;
        Ok(())
    }

    fn parse_node(&mut self, element: &mut OsmElement, emit: bool) -> Result<()> {
        let mut pos = 0usize;
        self.deltas.node_id += read_svarint(&self.payload, &mut pos)?;
        element.entity_type = EntityType::Node;
        element.id = self.deltas.node_id as u64;
        self.scan_version_info(&mut pos)?;
        if pos < self.payload.len() {
            self.deltas.lon += read_svarint(&self.payload, &mut pos)?;
            self.deltas.lat += read_svarint(&self.payload, &mut pos)?;
            element.lon = self.deltas.lon as f64 * COORD_UNIT;
            element.lat = self.deltas.lat as f64 * COORD_UNIT;
        }
        self.scan_tags(&mut pos, emit, element)?;
        if !emit {
            let id = element.id;
            element.clear();
            element.entity_type = EntityType::Node;
            element.id = id;
        }
        Ok(())
    }

    fn parse_way(&mut self, element: &mut OsmElement, emit: bool) -> Result<()> {
        let mut pos = 0usize;
        self.deltas.way_id += read_svarint(&self.payload, &mut pos)?;
        element.entity_type = EntityType::Way;
        element.id = self.deltas.way_id as u64;
        self.scan_version_info(&mut pos)?;
        let refs_len = read_uvarint(&self.payload, &mut pos)? as usize;
        let refs_end = pos + refs_len;
        if refs_end > self.payload.len() {
            return Err(GazetteerError::invalid_input(
                "o5m",
                "way reference section exceeds payload",
            ));
        }
        while pos < refs_end {
            self.deltas.way_ref += read_svarint(&self.payload, &mut pos)?;
            if emit {
                element.nodes.push(self.deltas.way_ref as u64);
            }
        }
        self.scan_tags(&mut pos, emit, element)?;
        if !emit {
            let id = element.id;
            element.clear();
            element.entity_type = EntityType::Way;
            element.id = id;
        }
        Ok(())
    }

    fn parse_relation(&mut self, element: &mut OsmElement, emit: bool) -> Result<()> {
        let mut pos = 0usize;
        self.deltas.relation_id += read_svarint(&self.payload, &mut pos)?;
        element.entity_type = EntityType::Relation;
        element.id = self.deltas.relation_id as u64;
        self.scan_version_info(&mut pos)?;
        let refs_len = read_uvarint(&self.payload, &mut pos)? as usize;
        let refs_end = pos + refs_len;
        if refs_end > self.payload.len() {
            return Err(GazetteerError::invalid_input(
                "o5m",
                "relation member section exceeds payload",
            ));
        }
        while pos < refs_end {
            let delta = read_svarint(&self.payload, &mut pos)?;
            let type_role = self.read_string(&mut pos)?;
            let (type_index, entity_type) = match type_role.first() {
                Some(b'0') => (0usize, EntityType::Node),
                Some(b'1') => (1, EntityType::Way),
                Some(b'2') => (2, EntityType::Relation),
                _ => {
                    return Err(GazetteerError::invalid_input(
                        "o5m",
                        "relation member without a type prefix",
                    ))
                }
            };
            self.deltas.member_ref[type_index] += delta;
            if emit {
                element.members.push(Member {
                    reference: self.deltas.member_ref[type_index] as u64,
                    entity_type,
                    role: String::from_utf8_lossy(&type_role[1..]).into_owned(),
                });
            }
        }
        self.scan_tags(&mut pos, emit, element)?;
        if !emit {
            let id = element.id;
            element.clear();
            element.entity_type = EntityType::Relation;
            element.id = id;
        }
        Ok(())
    }

    fn scan_version_info(&mut self, pos: &mut usize) -> Result<()> {
        let version = read_uvarint(&self.payload, pos)?;
        if version == 0 {
            return Ok(());
        }
        self.deltas.timestamp += read_svarint(&self.payload, pos)?;
        // A zero timestamp means no author information follows.
        if self.deltas.timestamp != 0 {
            self.deltas.changeset += read_svarint(&self.payload, pos)?;
            let _uid_user = self.read_string_pair(pos)?;
        }
        Ok(())
    }

    fn scan_tags(&mut self, pos: &mut usize, emit: bool, element: &mut OsmElement) -> Result<()> {
        while *pos < self.payload.len() {
            let (key, value) = self.read_string_pair(pos)?;
            if emit {
                element.add_tag(
                    &String::from_utf8_lossy(&key),
                    &String::from_utf8_lossy(&value),
                );
            }
        }
        Ok(())
    }

    /// Reads one table-eligible string: either an inline zero-prefixed
    /// string or a back-reference into the sliding table.
    fn read_string(&mut self, pos: &mut usize) -> Result<Vec<u8>> {
        let first = *self.payload.get(*pos).ok_or_else(truncated)?;
        if first == 0 {
            *pos += 1;
            let s = read_cstring(&self.payload, pos)?;
            self.remember(s.clone());
            Ok(s)
        } else {
            let back = read_uvarint(&self.payload, pos)? as usize;
            self.lookup(back)
        }
    }

    fn read_string_pair(&mut self, pos: &mut usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let first = *self.payload.get(*pos).ok_or_else(truncated)?;
        if first == 0 {
            *pos += 1;
            let key = read_cstring(&self.payload, pos)?;
            let value = read_cstring(&self.payload, pos)?;
            let mut combined = key.clone();
            combined.push(0);
            combined.extend_from_slice(&value);
            self.remember(combined);
            Ok((key, value))
        } else {
            let back = read_uvarint(&self.payload, pos)? as usize;
            let combined = self.lookup(back)?;
            let split = combined.iter().position(|&b| b == 0);
            match split {
                Some(i) => Ok((combined[..i].to_vec(), combined[i + 1..].to_vec())),
                None => Ok((combined, Vec::new())),
            }
        }
    }

    fn remember(&mut self, s: Vec<u8>) {
        if s.len() <= MAX_TABLE_STRING_LEN {
            if self.strings.len() == STRING_TABLE_SIZE {
                self.strings.remove(0);
            }
            self.strings.push(s);
        }
    }

    fn lookup(&self, back: usize) -> Result<Vec<u8>> {
        if back == 0 || back > self.strings.len() {
            return Err(GazetteerError::invalid_input(
                "o5m",
                format!("bad string reference {back}"),
            ));
        }
        Ok(self.strings[self.strings.len() - back].clone())
    }
}

fn truncated() -> GazetteerError {
    GazetteerError::invalid_input("o5m", "truncated payload")
}

fn read_cstring(data: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let start = *pos;
    while *pos < data.len() && data[*pos] != 0 {
        *pos += 1;
    }
    if *pos >= data.len() {
        return Err(truncated());
    }
    let s = data[start..*pos].to_vec();
    *pos += 1;
    Ok(s)
}

fn read_uvarint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data.get(*pos).ok_or_else(truncated)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(GazetteerError::invalid_input("o5m", "varint overflow"));
        }
    }
}

fn read_uvarint_from<R: Read>(rdr: &mut R) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let mut buf = [0u8; 1];
        rdr.read_exact(&mut buf)?;
        value |= u64::from(buf[0] & 0x7f) << shift;
        if buf[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(GazetteerError::invalid_input("o5m", "varint overflow"));
        }
    }
}

/// Signed varints store the sign in the lowest bit.
fn read_svarint(data: &[u8], pos: &mut usize) -> Result<i64> {
    let raw = read_uvarint(data, pos)?;
    if raw & 1 == 0 {
        Ok((raw >> 1) as i64)
    } else {
        Ok(-(((raw >> 1) + 1) as i64))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> Vec<u8> {
        let mut out = vec![];
        encode::header(&mut out);
        encode::node(&mut out, 1, 376_100_000, 557_500_000,
                     &[("place", "city"), ("name", "Москва")]);
        encode::node(&mut out, 1, 100_000, 100_000, &[]);
        encode::way(&mut out, 10, &[1, 1], &[("highway", "residential")]);
        encode::relation(&mut out, 20, &[(10, '1', "outer"), (1, '0', "label")],
                         &[("type", "boundary")]);
        out.push(EOF);
        out
    }

    #[test]
    fn test_decode_stream() {
        let data = sample_stream();
        let mut parser = O5mParser::new(data.as_slice());
        let mut e = OsmElement::default();

        assert!(matches!(
            parser.next_dataset(&mut e, true).unwrap(),
            DatasetKind::Element(EntityType::Node)
        ));
        assert_eq!(e.id, 1);
        assert!((e.lat - 55.75).abs() < 1e-6);
        assert!((e.lon - 37.61).abs() < 1e-6);
        assert_eq!(e.tag_value("name"), Some("Москва"));

        assert!(matches!(
            parser.next_dataset(&mut e, true).unwrap(),
            DatasetKind::Element(EntityType::Node)
        ));
        assert_eq!(e.id, 2);
        assert!((e.lat - 55.76).abs() < 1e-6);

        assert!(matches!(
            parser.next_dataset(&mut e, true).unwrap(),
            DatasetKind::Element(EntityType::Way)
        ));
        assert_eq!(e.id, 10);
        assert_eq!(e.nodes, vec![1, 2]);

        assert!(matches!(
            parser.next_dataset(&mut e, true).unwrap(),
            DatasetKind::Element(EntityType::Relation)
        ));
        assert_eq!(e.id, 20);
        assert_eq!(e.members.len(), 2);
        assert_eq!(e.members[0].reference, 10);
        assert_eq!(e.members[0].role, "outer");
        assert_eq!(e.members[1].reference, 1);
        assert_eq!(e.members[1].entity_type, EntityType::Node);

        assert!(matches!(
            parser.next_dataset(&mut e, true).unwrap(),
            DatasetKind::Eof
        ));
    }

    #[test]
    fn test_string_table_reference() {
        let mut out = vec![];
        encode::header(&mut out);
        // Two nodes sharing the same tag pair: the second references the table.
        let mut p = vec![];
        encode::svarint(&mut p, 1);
        encode::uvarint(&mut p, 0);
        encode::svarint(&mut p, 0);
        encode::svarint(&mut p, 0);
        encode::string_pair(&mut p, "place", "town");
        encode::dataset(&mut out, DATASET_NODE, &p);

        let mut p = vec![];
        encode::svarint(&mut p, 1);
        encode::uvarint(&mut p, 0);
        encode::svarint(&mut p, 0);
        encode::svarint(&mut p, 0);
        encode::uvarint(&mut p, 1); // back-reference to the stored pair
        encode::dataset(&mut out, DATASET_NODE, &p);
        out.push(EOF);

        let mut parser = O5mParser::new(out.as_slice());
        let mut e = OsmElement::default();
        parser.next_dataset(&mut e, true).unwrap();
        assert_eq!(e.tag_value("place"), Some("town"));
        parser.next_dataset(&mut e, true).unwrap();
        assert_eq!(e.id, 2);
        assert_eq!(e.tag_value("place"), Some("town"));
    }

    #[test]
    fn test_scan_only_keeps_state() {
        let data = sample_stream();
        let mut parser = O5mParser::new(data.as_slice());
        let mut e = OsmElement::default();
        // Scan the first node without materializing, then decode the second.
        parser.next_dataset(&mut e, false).unwrap();
        assert!(e.tags.is_empty());
        parser.next_dataset(&mut e, true).unwrap();
        assert_eq!(e.id, 2);
        assert!((e.lon - 37.62).abs() < 1e-6);
    }
}
