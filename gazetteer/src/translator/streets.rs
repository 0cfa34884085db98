//! Translator for named highways and squares.

use crossbeam_channel::Sender;

use crate::errors::Result;
use crate::feature::FeatureBuilder;
use crate::osm::{EntityType, OsmElement};
use crate::translator::{Emitter, ProcessedChunk, Sink, Translate, TranslatorStats};

/// Accepts named highway ways/relations and squares; emits line and area
/// features into the streets sink.
pub struct StreetsTranslator {
    emitter: Emitter,
    stats: TranslatorStats,
}

impl StreetsTranslator {
    /// Creates a translator pushing into `queue`.
    pub fn new(queue: Sender<ProcessedChunk>) -> Self {
        Self {
            emitter: Emitter::new(Sink::Streets, queue),
            stats: TranslatorStats::default(),
        }
    }

    /// The street filter, also used by the covering-index stage.
    pub fn is_street(element: &OsmElement) -> bool {
        if element.tag_value("name").unwrap_or("").is_empty() {
            return false;
        }
        if element.has_tag("highway")
            && matches!(
                element.entity_type,
                EntityType::Way | EntityType::Relation
            )
        {
            return true;
        }
        element.has_tag_value("place", "square")
    }
}

impl Translate for StreetsTranslator {
    fn accept(&self, element: &OsmElement) -> bool {
        Self::is_street(element)
    }

    fn translate(&mut self, element: &OsmElement, builder: &FeatureBuilder) -> Result<()> {
        match builder.make(element) {
            Some(feature) => {
                self.stats.emitted += 1;
                self.emitter.emit(&feature)
            }
            None => {
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
