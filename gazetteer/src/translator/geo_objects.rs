//! Translator for buildings, addressed features and POIs.

use crossbeam_channel::Sender;

use crate::errors::Result;
use crate::feature::{FeatureBuilder, FeatureKind, FeatureRecord};
use crate::osm::OsmElement;
use crate::translator::{Emitter, ProcessedChunk, Sink, Translate, TranslatorStats};

/// Accepts buildings, features with a house number, and selected POIs;
/// emits into the geo-objects sink.
pub struct GeoObjectsTranslator {
    emitter: Emitter,
    stats: TranslatorStats,
}

impl GeoObjectsTranslator {
    /// Creates a translator pushing into `queue`.
    pub fn new(queue: Sender<ProcessedChunk>) -> Self {
        Self {
            emitter: Emitter::new(Sink::GeoObjects, queue),
            stats: TranslatorStats::default(),
        }
    }

    /// Whether a built feature is a building.
    pub fn is_building(feature: &FeatureRecord) -> bool {
        feature.has_kind(FeatureKind::Building)
    }

    /// Whether a built feature carries a house number.
    pub fn has_house(feature: &FeatureRecord) -> bool {
        feature.house.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Whether a built feature is a POI.
    pub fn is_poi(feature: &FeatureRecord) -> bool {
        feature.has_kind(FeatureKind::Poi)
    }
}

impl Translate for GeoObjectsTranslator {
    fn accept(&self, element: &OsmElement) -> bool {
        element.has_tag("building")
            || element.has_tag("addr:housenumber")
            || element.has_tag("amenity")
            || element.has_tag("shop")
            || element.has_tag("tourism")
            || element.has_tag("office")
    }

    fn translate(&mut self, element: &OsmElement, builder: &FeatureBuilder) -> Result<()> {
        match builder.make(element) {
            Some(feature)
                if Self::is_building(&feature)
                    || Self::has_house(&feature)
                    || Self::is_poi(&feature) =>
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
