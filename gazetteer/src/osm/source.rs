//! Sharded access to an OSM dump.
//!
//! A file source is memory-mapped once and every worker instantiates its own
//! parser over the full byte range, decoding only the chunks it owns. Stdin
//! cannot be re-read, so it disables sharding and runs one worker.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use memmap2::Mmap;

use crate::common::OSM_CHUNK_SIZE;
use crate::errors::{GazetteerError, Result};
use crate::osm::o5m::{DatasetKind, O5mParser};
use crate::osm::xml::XmlParser;
use crate::osm::OsmElement;

/// Input format of the OSM dump.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum SourceFormat {
    /// OSM XML.
    Xml,
    /// O5M binary.
    O5m,
}

impl SourceFormat {
    /// Parses the `--osm_file_type` flag value.
    pub fn from_flag(s: &str) -> Result<Self> {
        match s {
            "xml" => Ok(Self::Xml),
            "o5m" => Ok(Self::O5m),
            _ => Err(GazetteerError::invalid_input(
                "osm_file_type",
                format!("expected \"xml\" or \"o5m\", got {s:?}"),
            )),
        }
    }
}

/// An opened OSM dump, shareable across worker threads.
pub struct OsmSource {
    format: SourceFormat,
    map: Option<Mmap>,
}

impl OsmSource {
    /// Memory-maps a dump file.
    pub fn open(path: &Path, format: SourceFormat) -> Result<Self> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        #[cfg(unix)]
        let _ = map.advise(memmap2::Advice::WillNeed);
        Ok(Self {
            format,
            map: Some(map),
        })
    }

    /// Uses stdin as the source. Sharding is disabled.
    pub fn stdin(format: SourceFormat) -> Self {
        Self { format, map: None }
    }

    /// Whether workers can shard this source.
    pub fn supports_sharding(&self) -> bool {
        self.map.is_some()
    }

    /// Creates a processor for worker `task_id` of `task_count`.
    pub fn processor(&self, task_count: u64, task_id: u64) -> Result<ElementProcessor<'_>> {
        assert!(task_id < task_count.max(1));
        if self.map.is_none() && task_count > 1 {
            return Err(GazetteerError::invalid_input(
                "osm_file_name",
                "stdin input cannot be sharded across workers",
            ));
        }
        let rdr: Box<dyn Read + '_> = match &self.map {
            Some(map) => Box::new(&map[..]),
            None => Box::new(std::io::stdin().lock()),
        };
        let inner = match self.format {
            SourceFormat::Xml => ProcessorInner::Xml(XmlParser::new(BufReader::new(rdr))),
            SourceFormat::O5m => ProcessorInner::O5m(O5mParser::new(rdr)),
        };
        Ok(ElementProcessor {
            inner,
            task_count: task_count.max(1),
            task_id,
            chunk_size: OSM_CHUNK_SIZE,
            element_counter: 0,
        })
    }
}

enum ProcessorInner<'a> {
    Xml(XmlParser<BufReader<Box<dyn Read + 'a>>>),
    O5m(O5mParser<Box<dyn Read + 'a>>),
}

/// A pull reader over owned chunks of the element stream.
pub struct ElementProcessor<'a> {
    inner: ProcessorInner<'a>,
    task_count: u64,
    task_id: u64,
    chunk_size: u64,
    element_counter: u64,
}

impl ElementProcessor<'_> {
    #[cfg(test)]
    pub(crate) fn set_chunk_size(&mut self, chunk_size: u64) {
        self.chunk_size = chunk_size;
    }

    /// Reads the next owned element. Returns `false` at the end of input.
    pub fn try_read(&mut self, element: &mut OsmElement) -> Result<bool> {
        loop {
            let chunk = self.element_counter / self.chunk_size;
            let owned = chunk % self.task_count == self.task_id;
            let got = match &mut self.inner {
                ProcessorInner::Xml(parser) => parser.try_read(element)?,
                ProcessorInner::O5m(parser) => {
                    match parser.next_dataset(element, owned)? {
                        DatasetKind::Element(_) => true,
                        DatasetKind::Other => continue,
                        DatasetKind::Eof => false,
                    }
                }
            };
            if !got {
                return Ok(false);
            }
            self.element_counter += 1;
            if owned {
                return Ok(true);
            }
        }
    }
}
