//! Per-thread translator chains: filter, transform, emit.
//!
//! Each worker owns a clone of every translator; local state is merged
//! pairwise after the workers finish. Emitted features travel through a
//! bounded channel to the single writer thread, which deduplicates and
//! appends them to per-sink temporary files.

mod geo_objects;
mod regions;
mod streets;

use crossbeam_channel::Sender;

pub use geo_objects::GeoObjectsTranslator;
pub use regions::RegionsTranslator;
pub use streets::StreetsTranslator;

use crate::errors::Result;
use crate::feature::{FeatureBuilder, FeatureRecord};
use crate::ids::GeoObjectId;
use crate::osm::OsmElement;

/// Number of serialized features buffered before a chunk is pushed.
pub const CHUNK_FEATURES: usize = 100;

/// Output sink of a translator.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Sink {
    /// Region features file.
    Regions,
    /// Street features file.
    Streets,
    /// Geo-object features file.
    GeoObjects,
}

impl Sink {
    /// Human-readable sink name, also used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Regions => "regions",
            Self::Streets => "streets",
            Self::GeoObjects => "geo_objects",
        }
    }
}

/// A batch of serialized features bound for one sink.
pub struct ProcessedChunk {
    /// Destination sink.
    pub sink: Sink,
    /// `(id, framed record)` pairs; the writer deduplicates by id.
    pub features: Vec<(GeoObjectId, Vec<u8>)>,
}

/// Per-translator counters, merged across workers.
#[derive(Clone, Copy, Default, Debug)]
pub struct TranslatorStats {
    /// Elements that passed the filter.
    pub accepted: u64,
    /// Features successfully built and emitted.
    pub emitted: u64,
    /// Accepted elements whose feature could not be built.
    pub dropped: u64,
}

impl TranslatorStats {
    fn merge(&mut self, other: &TranslatorStats) {
        self.accepted += other.accepted;
        self.emitted += other.emitted;
        self.dropped += other.dropped;
    }
}

/// Buffers features per sink and pushes full chunks downstream.
pub struct Emitter {
    sink: Sink,
    queue: Option<Sender<ProcessedChunk>>,
    buffer: Vec<(GeoObjectId, Vec<u8>)>,
}

impl Emitter {
    /// Creates an emitter bound to one sink.
    pub fn new(sink: Sink, queue: Sender<ProcessedChunk>) -> Self {
        Self {
            sink,
            queue: Some(queue),
            buffer: Vec::with_capacity(CHUNK_FEATURES),
        }
    }

    /// Serializes and buffers one feature. Blocks when the queue is full.
    pub fn emit(&mut self, feature: &FeatureRecord) -> Result<()> {
        let frame = crate::feature::serialize_feature(feature)?;
        self.buffer.push((feature.id, frame));
        if self.buffer.len() >= CHUNK_FEATURES {
            self.flush();
        }
        Ok(())
    }

    /// Pushes any buffered features downstream.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let features = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_FEATURES));
        // A send error means the writer is gone, which only happens after a
        // fatal error already aborted the run.
        if let Some(queue) = &self.queue {
            let _ = queue.send(ProcessedChunk {
                sink: self.sink,
                features,
            });
        }
    }

    /// Flushes and releases the channel so the writer can observe the
    /// stream closing even while the translator itself is kept for the
    /// merge phase.
    pub fn close(&mut self) {
        self.flush();
        self.queue = None;
    }
}

/// One translator: a tag filter, the feature transform, and an emitter.
pub trait Translate {
    /// Tag-based pre-check.
    fn accept(&self, element: &OsmElement) -> bool;

    /// Builds and emits features for an accepted element.
    fn translate(&mut self, element: &OsmElement, builder: &FeatureBuilder) -> Result<()>;

    /// Flushes buffered output; called once per worker after the read loop.
    fn finish(&mut self);

    /// Gets the mutable stats for merging.
    fn stats_mut(&mut self) -> &mut TranslatorStats;

    /// Gets the stats.
    fn stats(&self) -> TranslatorStats;
}

/// The built-in translator kinds, dispatched statically.
pub enum Translator {
    /// Admin boundaries and place points.
    Regions(RegionsTranslator),
    /// Named highways and squares.
    Streets(StreetsTranslator),
    /// Buildings, addressed features and POIs.
    GeoObjects(GeoObjectsTranslator),
}

impl Translator {
    /// Runs one element through the filter and transform.
    pub fn emit_element(&mut self, element: &OsmElement, builder: &FeatureBuilder) -> Result<()> {
        match self {
            Self::Regions(t) => run(t, element, builder),
            Self::Streets(t) => run(t, element, builder),
            Self::GeoObjects(t) => run(t, element, builder),
        }
    }

    /// Flushes buffered output.
    pub fn finish(&mut self) {
        match self {
            Self::Regions(t) => t.finish(),
            Self::Streets(t) => t.finish(),
            Self::GeoObjects(t) => t.finish(),
        }
    }

    /// Folds another worker's clone of the same translator into this one.
    /// Merging is associative; the reduction order across workers is free.
    pub fn merge(&mut self, other: Translator) {
        match (self, other) {
            (Self::Regions(a), Self::Regions(b)) => a.stats_mut().merge(&b.stats()),
            (Self::Streets(a), Self::Streets(b)) => a.stats_mut().merge(&b.stats()),
            (Self::GeoObjects(a), Self::GeoObjects(b)) => a.stats_mut().merge(&b.stats()),
            _ => panic!("attempted to merge translators of different kinds"),
        }
    }

    /// Final counters.
    pub fn stats(&self) -> TranslatorStats {
        match self {
            Self::Regions(t) => t.stats(),
            Self::Streets(t) => t.stats(),
            Self::GeoObjects(t) => t.stats(),
        }
    }

    /// Translator name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Regions(_) => "regions",
            Self::Streets(_) => "streets",
            Self::GeoObjects(_) => "geo_objects",
        }
    }
}

fn run<T: Translate>(t: &mut T, element: &OsmElement, builder: &FeatureBuilder) -> Result<()> {
    if !t.accept(element) {
        return Ok(());
    }
    t.stats_mut().accepted += 1;
    t.translate(element, builder)
}

/// Which translators a generator run instantiates.
///
/// Workers build their own clones from the spec so that every channel
/// sender is dropped with its worker and the writer sees the stream close.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TranslatorSpec {
    /// Admin boundaries and place points.
    Regions,
    /// Named highways and squares.
    Streets,
    /// Buildings, addressed features and POIs.
    GeoObjects,
}

impl TranslatorSpec {
    /// The sink this translator writes to.
    pub fn sink(self) -> Sink {
        match self {
            Self::Regions => Sink::Regions,
            Self::Streets => Sink::Streets,
            Self::GeoObjects => Sink::GeoObjects,
        }
    }

    /// Instantiates one translator pushing into `queue`.
    pub fn build(self, queue: Sender<ProcessedChunk>) -> Translator {
        match self {
            Self::Regions => Translator::Regions(RegionsTranslator::new(queue)),
            Self::Streets => Translator::Streets(StreetsTranslator::new(queue)),
            Self::GeoObjects => Translator::GeoObjects(GeoObjectsTranslator::new(queue)),
        }
    }
}
