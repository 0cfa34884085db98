//! The generator driver: pass 1 (intermediate cache) and pass 2 (features).
//!
//! Workers shard the OSM stream by element chunks; translator state is
//! reduced pairwise after the join, and a single writer thread owns the
//! feature sinks. Partial outputs stay under temporary names until the
//! owning stage completes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashSet;

use crate::cache::{
    create_point_storage_writer, IntermediateDataReader, IntermediateDataWriter, LatLon,
    NodeStorageType, RelationElement, RelationWhitelist, WayElement, NODES_FILE,
};
use crate::errors::{GazetteerError, Result};
use crate::feature::{Classificator, FeatureBuilder, FeatureWriter};
use crate::ids::GeoObjectId;
use crate::osm::{EntityType, OsmElement, OsmSource};
use crate::translator::{ProcessedChunk, Sink, Translator, TranslatorSpec};

/// Explicit run-wide state threaded through every phase.
pub struct GeneratorContext {
    /// Directory of intermediate caches and temporary feature files.
    pub intermediate_dir: PathBuf,
    /// Directory of final artifacts.
    pub data_dir: PathBuf,
    /// Node storage mode, fixed for the run.
    pub node_storage: NodeStorageType,
    /// Worker count.
    pub threads_count: usize,
    /// The tag-to-kind mapping, loaded once and shared read-only.
    pub classificator: Arc<Classificator>,
    /// Relation-type whitelist for the intermediate cache.
    pub relation_whitelist: RelationWhitelist,
}

impl GeneratorContext {
    /// Creates a context with default classification and whitelist.
    pub fn new(
        intermediate_dir: PathBuf,
        data_dir: PathBuf,
        node_storage: NodeStorageType,
        threads_count: usize,
    ) -> Self {
        Self {
            intermediate_dir,
            data_dir,
            node_storage,
            threads_count: threads_count.max(1),
            classificator: Arc::new(Classificator::default()),
            relation_whitelist: RelationWhitelist::default(),
        }
    }

    /// Path of a file inside the intermediate directory.
    pub fn intermediate_file(&self, name: &str) -> PathBuf {
        self.intermediate_dir.join(name)
    }

    /// Path of a temporary features file for one sink.
    pub fn features_file(&self, sink: Sink) -> PathBuf {
        self.intermediate_dir
            .join(format!("{}.features.tmp", sink.name()))
    }
}

/// Pass 1: fills the intermediate cache from the OSM source.
pub fn generate_intermediate_data(ctx: &GeneratorContext, source: &OsmSource) -> Result<u64> {
    let nodes = create_point_storage_writer(
        ctx.node_storage,
        &ctx.intermediate_file(NODES_FILE),
    )?;
    let cache = IntermediateDataWriter::new(
        nodes,
        &ctx.intermediate_dir,
        ctx.relation_whitelist.clone(),
    )?;

    let workers = if source.supports_sharding() {
        ctx.threads_count
    } else {
        1
    };

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(workers);
        for task_id in 0..workers {
            let cache = &cache;
            handles.push(scope.spawn(move || -> Result<()> {
                let mut processor = source.processor(workers as u64, task_id as u64)?;
                let mut element = OsmElement::default();
                let mut node_batch: Vec<(u64, LatLon)> = Vec::with_capacity(4096);
                while processor.try_read(&mut element)? {
                    match element.entity_type {
                        EntityType::Node => {
                            let lat64 = (element.lat * crate::common::COORD_SCALE) as i64;
                            let lon64 = (element.lon * crate::common::COORD_SCALE) as i64;
                            let (Ok(lat), Ok(lon)) =
                                (i32::try_from(lat64), i32::try_from(lon64))
                            else {
                                return Err(GazetteerError::invalid_input(
                                    "coords",
                                    format!("coordinate out of range for node {}", element.id),
                                ));
                            };
                            node_batch.push((element.id, LatLon { lat, lon }));
                            if node_batch.len() == node_batch.capacity() {
                                cache.add_nodes(&node_batch)?;
                                node_batch.clear();
                            }
                        }
                        EntityType::Way => {
                            let way = WayElement {
                                id: element.id,
                                nodes: std::mem::take(&mut element.nodes),
                            };
                            if way.is_valid() {
                                cache.add_way(element.id, &way)?;
                            }
                        }
                        EntityType::Relation => {
                            let relation = relation_from_element(&mut element);
                            if relation.is_valid() {
                                cache.add_relation(element.id, &relation)?;
                            }
                        }
                        EntityType::Unknown => {}
                    }
                }
                if !node_batch.is_empty() {
                    cache.add_nodes(&node_batch)?;
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().expect("pass-1 worker panicked")?;
        }
        Ok(())
    })?;

    let processed = cache.num_processed_points();
    cache.save_index()?;
    log::info!("added points count = {processed}");
    Ok(processed)
}

fn relation_from_element(element: &mut OsmElement) -> RelationElement {
    let mut relation = RelationElement::default();
    for member in element.members.drain(..) {
        match member.entity_type {
            EntityType::Node => relation.nodes.push((member.reference, member.role)),
            EntityType::Way => relation.ways.push((member.reference, member.role)),
            // Nested relations are ignored.
            _ => {}
        }
    }
    for tag in element.tags.drain(..) {
        relation.tags.push((tag.key, tag.value));
    }
    relation
}

/// Pass 2: translates the OSM stream into per-sink feature files.
///
/// Returns the produced sink files, in `specs` order.
pub fn generate_features(
    ctx: &GeneratorContext,
    source: &OsmSource,
    specs: &[TranslatorSpec],
) -> Result<Vec<PathBuf>> {
    if specs.is_empty() {
        return Ok(vec![]);
    }

    let cache = IntermediateDataReader::open(ctx.node_storage, &ctx.intermediate_dir)?;

    // One thread is reserved for the writer.
    let workers = if source.supports_sharding() {
        ctx.threads_count.max(2) - 1
    } else {
        1
    };

    let mut sink_paths = Vec::with_capacity(specs.len());
    let mut writers = Vec::with_capacity(specs.len());
    for spec in specs {
        let path = ctx.features_file(spec.sink());
        writers.push((spec.sink(), FeatureWriter::create(&path)?));
        sink_paths.push(path);
    }

    let (tx, queue) = crossbeam_channel::bounded::<ProcessedChunk>(workers * 2);

    let merged = std::thread::scope(|scope| -> Result<Vec<Translator>> {
        // The writer owns the sinks and deduplicates features by id.
        let writer = scope.spawn(move || -> Result<()> {
            let mut seen: Vec<(Sink, HashSet<GeoObjectId>)> =
                writers.iter().map(|(s, _)| (*s, HashSet::new())).collect();
            for chunk in queue.iter() {
                let Some(slot) = writers.iter().position(|(s, _)| *s == chunk.sink) else {
                    continue;
                };
                let dedup = &mut seen[slot].1;
                for (id, frame) in &chunk.features {
                    if dedup.insert(*id) {
                        writers[slot].1.write_serialized(frame)?;
                    }
                }
            }
            for (_, writer) in writers {
                writer.finish()?;
            }
            Ok(())
        });

        let mut handles = Vec::with_capacity(workers);
        for task_id in 0..workers {
            let cache = &cache;
            let classificator = Arc::clone(&ctx.classificator);
            let tx = tx.clone();
            handles.push(scope.spawn(move || -> Result<Vec<Translator>> {
                let builder = FeatureBuilder::new(cache, &classificator);
                let mut local: Vec<Translator> =
                    specs.iter().map(|s| s.build(tx.clone())).collect();
                drop(tx);
                let mut processor = source.processor(workers as u64, task_id as u64)?;
                let mut element = OsmElement::default();
                while processor.try_read(&mut element)? {
                    for translator in &mut local {
                        translator.emit_element(&element, &builder)?;
                    }
                }
                for translator in &mut local {
                    translator.finish();
                }
                Ok(local)
            }));
        }
        drop(tx);

        // Early-finishing workers fold together first.
        let mut pending: VecDeque<Vec<Translator>> = VecDeque::new();
        for handle in handles {
            pending.push_back(handle.join().expect("pass-2 worker panicked")?);
        }
        while pending.len() > 1 {
            let left = pending.pop_front().expect("non-empty queue");
            let right = pending.pop_front().expect("non-empty queue");
            pending.push_back(merge_translator_sets(left, right));
        }
        let merged = pending.pop_front().unwrap_or_default();

        // All worker-side senders are dropped with the worker closures, so
        // the writer drains and exits here.
        writer.join().expect("writer thread panicked")?;
        Ok(merged)
    })?;

    for translator in &merged {
        let stats = translator.stats();
        log::info!(
            "translator {}: accepted {} emitted {} dropped {}",
            translator.name(),
            stats.accepted,
            stats.emitted,
            stats.dropped
        );
    }
    log::info!("input was processed");
    Ok(sink_paths)
}

fn merge_translator_sets(mut left: Vec<Translator>, right: Vec<Translator>) -> Vec<Translator> {
    debug_assert_eq!(left.len(), right.len());
    for (l, r) in left.iter_mut().zip(right) {
        l.merge(r);
    }
    left
}

/// Renames a finished temporary output to its final name.
///
/// The merge into the final location is an explicit step on the success
/// path; abandoned temporaries are left on disk for inspection.
pub fn publish(tmp: &Path, target: &Path) -> Result<()> {
    std::fs::rename(tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::o5m::encode;
    use crate::osm::SourceFormat;
    use std::io::Write;

    fn write_fixture(path: &Path) {
        // Nodes 1..4 form a building square; node 5 is a place point;
        // way 10 is the building, way 11 a named highway.
        let mut out = vec![];
        encode::header(&mut out);
        encode::node(&mut out, 1, 0, 0, &[]);
        encode::node(&mut out, 1, 10_000, 0, &[]);
        encode::node(&mut out, 1, 0, 10_000, &[]);
        encode::node(&mut out, 1, -10_000, 0, &[]);
        encode::node(&mut out, 1, 10_000, 10_000,
                     &[("place", "city"), ("name", "Testville")]);
        encode::way(&mut out, 10, &[1, 1, 1, 1, -3],
                    &[("building", "yes"), ("addr:housenumber", "5"),
                      ("addr:street", "Good")]);
        encode::way(&mut out, 1, &[1, 1],
                    &[("highway", "residential"), ("name", "Good")]);
        out.push(0xfe);
        std::fs::File::create(path)
            .unwrap()
            .write_all(&out)
            .unwrap();
    }

    #[test]
    fn test_two_pass_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let osm_path = dir.path().join("fixture.o5m");
        write_fixture(&osm_path);

        let ctx = GeneratorContext::new(
            dir.path().to_owned(),
            dir.path().to_owned(),
            NodeStorageType::Index,
            2,
        );
        let source = OsmSource::open(&osm_path, SourceFormat::O5m).unwrap();
        let processed = generate_intermediate_data(&ctx, &source).unwrap();
        assert_eq!(processed, 5);

        let sinks = generate_features(
            &ctx,
            &source,
            &[TranslatorSpec::Streets, TranslatorSpec::GeoObjects],
        )
        .unwrap();
        assert_eq!(sinks.len(), 2);

        let mut streets = vec![];
        crate::feature::for_each_feature(&sinks[0], |f| streets.push(f)).unwrap();
        assert_eq!(streets.len(), 1);
        assert_eq!(streets[0].name(), "Good");
        assert!(streets[0].is_line());

        let mut objects = vec![];
        crate::feature::for_each_feature(&sinks[1], |f| objects.push(f)).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].house.as_deref(), Some("5"));
        assert!(objects[0].is_area());
    }
}
