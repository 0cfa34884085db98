//! Translator for administrative boundaries and place points.

use crossbeam_channel::Sender;

use crate::errors::Result;
use crate::feature::{FeatureBuilder, FeatureKind};
use crate::osm::{EntityType, OsmElement};
use crate::translator::{Emitter, ProcessedChunk, Sink, Translate, TranslatorStats};

/// Accepts admin boundaries (ways/relations) and place nodes; emits area and
/// point features into the regions sink.
pub struct RegionsTranslator {
    emitter: Emitter,
    stats: TranslatorStats,
}

impl RegionsTranslator {
    /// Creates a translator pushing into `queue`.
    pub fn new(queue: Sender<ProcessedChunk>) -> Self {
        Self {
            emitter: Emitter::new(Sink::Regions, queue),
            stats: TranslatorStats::default(),
        }
    }
}

impl Translate for RegionsTranslator {
    fn accept(&self, element: &OsmElement) -> bool {
        match element.entity_type {
            EntityType::Node => element.has_tag("place") && element.has_tag("name"),
            EntityType::Way | EntityType::Relation => {
                element.has_tag_value("boundary", "administrative") && element.has_tag("name")
            }
            EntityType::Unknown => false,
        }
    }

    fn translate(&mut self, element: &OsmElement, builder: &FeatureBuilder) -> Result<()> {
        match builder.make(element) {
            Some(feature)
                if feature.has_kind(FeatureKind::AdminBoundary)
                    || feature.has_kind(FeatureKind::Place) =>
            {
                self.stats.emitted += 1;
                self.emitter.emit(&feature)
            }
            _ => {
                self.stats.dropped += 1;
                Ok(())
            }
        }
    }

    fn finish(&mut self) {
        self.emitter.close();
    }

    fn stats_mut(&mut self) -> &mut TranslatorStats {
        &mut self.stats
    }

    fn stats(&self) -> TranslatorStats {
        self.stats
    }
}
