//! SAX-style OSM XML parser.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{GazetteerError, Result};
use crate::osm::{EntityType, OsmElement};

/// Pull parser over an OSM XML stream.
///
/// Elements arrive in source order: nodes, then ways, then relations.
pub struct XmlParser<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    current: Option<OsmElement>,
    done: bool,
}

impl<R: BufRead> XmlParser<R> {
    /// Creates a parser over a buffered reader.
    pub fn new(rdr: R) -> Self {
        let mut reader = Reader::from_reader(rdr);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            current: None,
            done: false,
        }
    }

    /// Reads the next element into `element`. Returns `false` at the end of
    /// the stream. Malformed fragments are skipped and logged.
    pub fn try_read(&mut self, element: &mut OsmElement) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Err(e) => return Err(GazetteerError::from(e)),
                Ok(Event::Eof) => {
                    self.done = true;
                    return Ok(false);
                }
                Ok(Event::Start(start)) => {
                    if let Some(finished) = Self::handle_start(&mut self.current, &start, false)? {
                        *element = finished;
                        return Ok(true);
                    }
                }
                Ok(Event::Empty(start)) => {
                    if let Some(finished) = Self::handle_start(&mut self.current, &start, true)? {
                        *element = finished;
                        return Ok(true);
                    }
                }
                Ok(Event::End(end)) => {
                    let closes_element = matches!(
                        end.name().as_ref(),
                        b"node" | b"way" | b"relation"
                    );
                    if closes_element {
                        if let Some(finished) = self.current.take() {
                            *element = finished;
                            return Ok(true);
                        }
                    }
                }
                Ok(_) => {}
            }
        }
    }

    fn handle_start(
        current: &mut Option<OsmElement>,
        start: &BytesStart,
        empty: bool,
    ) -> Result<Option<OsmElement>> {
        match start.name().as_ref() {
            b"node" | b"way" | b"relation" => {
                let entity_type = match start.name().as_ref() {
                    b"node" => EntityType::Node,
                    b"way" => EntityType::Way,
                    _ => EntityType::Relation,
                };
                let mut element = OsmElement {
                    entity_type,
                    ..Default::default()
                };
                let mut valid = true;
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| {
                        GazetteerError::invalid_input("osm_xml", e.to_string())
                    })?;
                    let value = String::from_utf8_lossy(&attr.value);
                    match attr.key.as_ref() {
                        b"id" => element.id = value.parse().unwrap_or_else(|_| {
                            valid = false;
                            0
                        }),
                        b"lat" => element.lat = value.parse().unwrap_or_else(|_| {
                            valid = false;
                            0.0
                        }),
                        b"lon" => element.lon = value.parse().unwrap_or_else(|_| {
                            valid = false;
                            0.0
                        }),
                        _ => {}
                    }
                }
                if !valid {
                    log::warn!("skipping malformed OSM XML element");
                    return Ok(None);
                }
                if empty {
                    return Ok(Some(element));
                }
                *current = Some(element);
                Ok(None)
            }
            b"nd" => {
                if let Some(element) = current.as_mut() {
                    for attr in start.attributes().flatten() {
                        if attr.key.as_ref() == b"ref" {
                            if let Ok(id) = String::from_utf8_lossy(&attr.value).parse() {
                                element.nodes.push(id);
                            }
                        }
                    }
                }
                Ok(None)
            }
            b"tag" => {
                if let Some(element) = current.as_mut() {
                    let mut key = String::new();
                    let mut value = String::new();
                    for attr in start.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"k" => key = String::from_utf8_lossy(&attr.value).into_owned(),
                            b"v" => value = String::from_utf8_lossy(&attr.value).into_owned(),
                            _ => {}
                        }
                    }
                    if !key.is_empty() {
                        element.add_tag(&key, &value);
                    }
                }
                Ok(None)
            }
            b"member" => {
                if let Some(element) = current.as_mut() {
                    let mut reference = 0u64;
                    let mut entity_type = EntityType::Unknown;
                    let mut role = String::new();
                    for attr in start.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value);
                        match attr.key.as_ref() {
                            b"ref" => reference = value.parse().unwrap_or(0),
                            b"type" => {
                                entity_type = match value.as_ref() {
                                    "node" => EntityType::Node,
                                    "way" => EntityType::Way,
                                    "relation" => EntityType::Relation,
                                    _ => EntityType::Unknown,
                                }
                            }
                            b"role" => role = value.into_owned(),
                            _ => {}
                        }
                    }
                    element.members.push(crate::osm::Member {
                        reference,
                        entity_type,
                        role,
                    });
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="55.75" lon="37.61">
    <tag k="place" v="city"/>
    <tag k="name" v="Москва"/>
  </node>
  <node id="2" lat="55.76" lon="37.62"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="residential"/>
    <tag k="name" v="Зорге"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
    <member type="node" ref="1" role="label"/>
    <tag k="type" v="boundary"/>
  </relation>
</osm>
"#;

    #[test]
    fn test_parse_all() {
        let mut parser = XmlParser::new(SAMPLE.as_bytes());
        let mut element = OsmElement::default();
        let mut seen = vec![];
        while parser.try_read(&mut element).unwrap() {
            seen.push((element.entity_type, element.id));
        }
        assert_eq!(
            seen,
            vec![
                (EntityType::Node, 1),
                (EntityType::Node, 2),
                (EntityType::Way, 10),
                (EntityType::Relation, 20),
            ]
        );
    }

    #[test]
    fn test_parse_contents() {
        let mut parser = XmlParser::new(SAMPLE.as_bytes());
        let mut element = OsmElement::default();

        assert!(parser.try_read(&mut element).unwrap());
        assert_eq!(element.tag_value("name"), Some("Москва"));
        assert!((element.lat - 55.75).abs() < 1e-9);

        assert!(parser.try_read(&mut element).unwrap());
        assert!(element.tags.is_empty());

        assert!(parser.try_read(&mut element).unwrap());
        assert_eq!(element.nodes, vec![1, 2]);

        assert!(parser.try_read(&mut element).unwrap());
        assert_eq!(element.members.len(), 2);
        assert_eq!(element.members[0].role, "outer");
        assert_eq!(element.members[0].entity_type, EntityType::Way);
    }
}
