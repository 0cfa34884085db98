//! Intermediate element cache.
//!
//! The generator materializes the first pass of the OSM dump here: node
//! coordinates in one of three storage modes, ways and relations as
//! varint-framed record files with offset indices, and member-to-relation
//! secondary indices for the second pass.

mod elements;
mod points;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bincode::{Decode, Encode};

pub use elements::{ElementCacheReader, ElementCacheWriter, IndexFileReader, IndexFileWriter};
pub use points::{
    create_point_storage_reader, create_point_storage_writer, PointStorageReader,
    PointStorageWriter,
};

/// File names inside the intermediate data directory.
pub const NODES_FILE: &str = "nodes.dat";
/// Ways payload file name.
pub const WAYS_FILE: &str = "ways.dat";
/// Relations payload file name.
pub const RELATIONS_FILE: &str = "relations.dat";
/// Extension of offsets index files.
pub const OFFSETS_EXT: &str = ".offs";
/// Extension of member-to-relation index files.
pub const ID2REL_EXT: &str = ".id2rel";

/// Node storage mode, selected at generator start and fixed for the run.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum NodeStorageType {
    /// Dense in-memory array, persisted on finish.
    Memory,
    /// Packed id-keyed append stream, scanned into a hash map on read.
    Index,
    /// Dense memory-mapped file array.
    File,
}

impl NodeStorageType {
    /// Parses the `--node_storage` flag value.
    pub fn from_flag(s: &str) -> crate::errors::Result<Self> {
        match s {
            "raw" => Ok(Self::File),
            "map" => Ok(Self::Index),
            "mem" => Ok(Self::Memory),
            _ => Err(crate::errors::GazetteerError::invalid_input(
                "node_storage",
                format!("expected \"raw\", \"map\" or \"mem\", got {s:?}"),
            )),
        }
    }
}

/// Fixed-point coordinates, degrees times 1e7. `(0, 0)` means absent.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug, Decode, Encode)]
pub struct LatLon {
    /// Latitude, degrees times 1e7.
    pub lat: i32,
    /// Longitude, degrees times 1e7.
    pub lon: i32,
}

/// An intermediate way: the ordered node references of one OSM way.
#[derive(Clone, Default, Debug, PartialEq, Decode, Encode)]
pub struct WayElement {
    /// OSM way id.
    pub id: u64,
    /// Ordered node ids.
    pub nodes: Vec<u64>,
}

impl WayElement {
    /// A way is valid with two or more points.
    pub fn is_valid(&self) -> bool {
        self.nodes.len() >= 2
    }
}

/// An intermediate relation: typed member lists plus tags.
#[derive(Clone, Default, Debug, PartialEq, Decode, Encode)]
pub struct RelationElement {
    /// Node members as `(node id, role)`.
    pub nodes: Vec<(u64, String)>,
    /// Way members as `(way id, role)`.
    pub ways: Vec<(u64, String)>,
    /// Relation tags.
    pub tags: Vec<(String, String)>,
}

impl RelationElement {
    /// A relation is valid when it has a type and at least one member.
    pub fn is_valid(&self) -> bool {
        self.relation_type().is_some() && !(self.nodes.is_empty() && self.ways.is_empty())
    }

    /// Gets the `type` tag.
    pub fn relation_type(&self) -> Option<&str> {
        self.tag_value("type")
    }

    /// Gets a tag value by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Relation types retained in the cache. The set is a configuration value,
/// not a source constant; the default matches the types downstream stages
/// consume.
#[derive(Clone, Debug)]
pub struct RelationWhitelist(Vec<String>);

impl Default for RelationWhitelist {
    fn default() -> Self {
        Self(
            ["multipolygon", "route", "boundary", "associatedStreet", "building", "restriction"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl RelationWhitelist {
    /// Builds a whitelist from explicit type names.
    pub fn new<I: IntoIterator<Item = String>>(types: I) -> Self {
        Self(types.into_iter().collect())
    }

    /// Checks whether a relation passes the whitelist.
    pub fn accepts(&self, relation: &RelationElement) -> bool {
        relation
            .relation_type()
            .is_some_and(|t| self.0.iter().any(|w| w == t))
    }
}

fn with_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(ext);
    PathBuf::from(s)
}

/// Writer over the whole intermediate cache (pass 1).
pub struct IntermediateDataWriter {
    nodes: Box<dyn PointStorageWriter>,
    ways: ElementCacheWriter,
    relations: ElementCacheWriter,
    node_to_relations: Mutex<IndexFileWriter>,
    way_to_relations: Mutex<IndexFileWriter>,
    whitelist: RelationWhitelist,
}

impl IntermediateDataWriter {
    /// Creates the cache files in `dir`.
    pub fn new(
        nodes: Box<dyn PointStorageWriter>,
        dir: &Path,
        whitelist: RelationWhitelist,
    ) -> crate::errors::Result<Self> {
        let ways_path = dir.join(WAYS_FILE);
        let relations_path = dir.join(RELATIONS_FILE);
        Ok(Self {
            nodes,
            ways: ElementCacheWriter::new(&ways_path)?,
            relations: ElementCacheWriter::new(&relations_path)?,
            node_to_relations: Mutex::new(IndexFileWriter::new(&with_ext(
                &dir.join(NODES_FILE),
                ID2REL_EXT,
            ))?),
            way_to_relations: Mutex::new(IndexFileWriter::new(&with_ext(&ways_path, ID2REL_EXT))?),
            whitelist,
        })
    }

    /// Stores one node.
    pub fn add_node(&self, id: u64, lat: f64, lon: f64) -> crate::errors::Result<()> {
        self.nodes.add_point(id, lat, lon)
    }

    /// Stores a batch of nodes.
    pub fn add_nodes(&self, nodes: &[(u64, LatLon)]) -> crate::errors::Result<()> {
        self.nodes.add_points(nodes)
    }

    /// Stores one way; invalid ways are dropped by the caller.
    pub fn add_way(&self, id: u64, way: &WayElement) -> crate::errors::Result<()> {
        self.ways.write(id, way)
    }

    /// Stores one relation if its type is whitelisted, updating the
    /// member-to-relation indices.
    pub fn add_relation(&self, id: u64, relation: &RelationElement) -> crate::errors::Result<()> {
        if !self.whitelist.accepts(relation) {
            return Ok(());
        }
        self.relations.write(id, relation)?;
        {
            let mut index = self
                .node_to_relations
                .lock()
                .expect("node-to-relations writer poisoned");
            for (node_id, _) in &relation.nodes {
                index.add(*node_id, id)?;
            }
        }
        {
            let mut index = self
                .way_to_relations
                .lock()
                .expect("way-to-relations writer poisoned");
            for (way_id, _) in &relation.ways {
                index.add(*way_id, id)?;
            }
        }
        Ok(())
    }

    /// Total number of processed nodes.
    pub fn num_processed_points(&self) -> u64 {
        self.nodes.num_processed()
    }

    /// Flushes offsets and secondary indices; called once on success.
    pub fn save_index(self) -> crate::errors::Result<()> {
        self.nodes.finish()?;
        self.ways.save_offsets()?;
        self.relations.save_offsets()?;
        self.node_to_relations
            .into_inner()
            .expect("node-to-relations writer poisoned")
            .write_all()?;
        self.way_to_relations
            .into_inner()
            .expect("way-to-relations writer poisoned")
            .write_all()?;
        Ok(())
    }
}

/// Reader over the whole intermediate cache (pass 2).
pub struct IntermediateDataReader {
    nodes: Box<dyn PointStorageReader>,
    ways: ElementCacheReader,
    relations: ElementCacheReader,
    node_to_relations: IndexFileReader,
    way_to_relations: IndexFileReader,
}

impl IntermediateDataReader {
    /// Opens the cache files in `dir`.
    pub fn open(storage: NodeStorageType, dir: &Path) -> crate::errors::Result<Self> {
        let ways_path = dir.join(WAYS_FILE);
        let relations_path = dir.join(RELATIONS_FILE);
        Ok(Self {
            nodes: create_point_storage_reader(storage, &dir.join(NODES_FILE))?,
            ways: ElementCacheReader::open(&ways_path)?,
            relations: ElementCacheReader::open(&relations_path)?,
            node_to_relations: IndexFileReader::open(&with_ext(
                &dir.join(NODES_FILE),
                ID2REL_EXT,
            ))?,
            way_to_relations: IndexFileReader::open(&with_ext(&ways_path, ID2REL_EXT))?,
        })
    }

    /// Looks up a node. `None` for the `(0, 0)` sentinel or an absent id.
    pub fn node(&self, id: u64) -> Option<(f64, f64)> {
        self.nodes.point(id)
    }

    /// Looks up a way.
    pub fn way(&self, id: u64) -> Option<WayElement> {
        self.ways.get(id)
    }

    /// Looks up a relation.
    pub fn relation(&self, id: u64) -> Option<RelationElement> {
        self.relations.get(id)
    }

    /// Calls `f` for every cached relation the way is a member of.
    pub fn for_each_relation_of_way<F: FnMut(u64, &RelationElement)>(&self, way_id: u64, mut f: F) {
        self.way_to_relations.for_each_value(way_id, |relation_id| {
            if let Some(relation) = self.relations.get(relation_id) {
                f(relation_id, &relation);
            }
        });
    }

    /// Calls `f` for every cached relation the node is a member of.
    pub fn for_each_relation_of_node<F: FnMut(u64, &RelationElement)>(
        &self,
        node_id: u64,
        mut f: F,
    ) {
        self.node_to_relations.for_each_value(node_id, |relation_id| {
            if let Some(relation) = self.relations.get(relation_id) {
                f(relation_id, &relation);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist() {
        let whitelist = RelationWhitelist::default();
        let mut relation = RelationElement {
            ways: vec![(1, "outer".into())],
            ..Default::default()
        };
        relation.tags.push(("type".into(), "multipolygon".into()));
        assert!(whitelist.accepts(&relation));
        relation.tags[0].1 = "site".into();
        assert!(!whitelist.accepts(&relation));
    }

    #[test]
    fn test_way_validity() {
        let mut way = WayElement { id: 1, nodes: vec![7] };
        assert!(!way.is_valid());
        way.nodes.push(8);
        assert!(way.is_valid());
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let nodes =
            create_point_storage_writer(NodeStorageType::Index, &dir.path().join(NODES_FILE))
                .unwrap();
        let writer =
            IntermediateDataWriter::new(nodes, dir.path(), RelationWhitelist::default()).unwrap();

        writer.add_node(1, 55.75, 37.61).unwrap();
        writer.add_node(2, 55.76, 37.62).unwrap();
        let way = WayElement { id: 10, nodes: vec![1, 2] };
        writer.add_way(10, &way).unwrap();
        let relation = RelationElement {
            nodes: vec![(1, "label".into())],
            ways: vec![(10, "outer".into())],
            tags: vec![("type".into(), "boundary".into())],
        };
        writer.add_relation(20, &relation).unwrap();
        assert_eq!(writer.num_processed_points(), 2);
        writer.save_index().unwrap();

        let reader = IntermediateDataReader::open(NodeStorageType::Index, dir.path()).unwrap();
        let (lat, lon) = reader.node(1).unwrap();
        assert!((lat - 55.75).abs() < 1e-6 && (lon - 37.61).abs() < 1e-6);
        assert!(reader.node(3).is_none());
        assert_eq!(reader.way(10).unwrap(), way);
        assert_eq!(reader.relation(20).unwrap(), relation);
        assert!(reader.way(11).is_none());

        let mut seen = vec![];
        reader.for_each_relation_of_way(10, |id, _| seen.push(id));
        assert_eq!(seen, vec![20]);
        seen.clear();
        reader.for_each_relation_of_node(1, |id, _| seen.push(id));
        assert_eq!(seen, vec![20]);
        reader.for_each_relation_of_node(2, |id, _| seen.push(id));
        assert_eq!(seen, vec![20]);
    }
}
