//! OSM source reading: the element model and the XML/O5M parsers.
//!
//! Both parsers expose the same pull interface through
//! [`ElementProcessor::try_read`], and both honor the chunked sharding
//! contract: for a run with `N` workers, worker `i` decodes chunk `k` iff
//! `k % N == i` (chunks are counted in elements, not bytes).

pub mod o5m;
pub mod source;
pub mod xml;

pub use source::{ElementProcessor, OsmSource, SourceFormat};

/// Kind of an OSM element or relation member.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum EntityType {
    /// Not yet filled in.
    #[default]
    Unknown,
    /// A node with coordinates.
    Node,
    /// An ordered list of node references.
    Way,
    /// A list of typed members with roles.
    Relation,
}

/// A relation member reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    /// Referenced element id.
    pub reference: u64,
    /// Kind of the referenced element.
    pub entity_type: EntityType,
    /// Role of the member inside the relation, e.g. `outer`.
    pub role: String,
}

/// A `key=value` tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// One parsed OSM element. Reused across reads to avoid reallocation.
#[derive(Clone, Debug, Default)]
pub struct OsmElement {
    /// Element kind.
    pub entity_type: EntityType,
    /// Unsigned 64-bit OSM id.
    pub id: u64,
    /// Latitude in degrees; meaningful for nodes only.
    pub lat: f64,
    /// Longitude in degrees; meaningful for nodes only.
    pub lon: f64,
    /// Node references; meaningful for ways only.
    pub nodes: Vec<u64>,
    /// Members; meaningful for relations only.
    pub members: Vec<Member>,
    /// Tags in source order.
    pub tags: Vec<Tag>,
}

impl OsmElement {
    /// Resets the element for the next read.
    pub fn clear(&mut self) {
        self.entity_type = EntityType::Unknown;
        self.id = 0;
        self.lat = 0.0;
        self.lon = 0.0;
        self.nodes.clear();
        self.members.clear();
        self.tags.clear();
    }

    /// Adds a tag.
    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.push(Tag {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Gets a tag value by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Checks whether a tag with the given key exists.
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|t| t.key == key)
    }

    /// Checks whether a tag with the given key and value exists.
    pub fn has_tag_value(&self, key: &str, value: &str) -> bool {
        self.tags.iter().any(|t| t.key == key && t.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        let mut e = OsmElement::default();
        e.add_tag("highway", "residential");
        e.add_tag("name", "Main Street");
        assert_eq!(e.tag_value("name"), Some("Main Street"));
        assert!(e.has_tag_value("highway", "residential"));
        assert!(!e.has_tag("place"));
        e.clear();
        assert!(e.tags.is_empty());
    }
}
