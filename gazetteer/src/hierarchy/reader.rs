//! Concurrent hierarchy loading from jsonl.
//!
//! Reader workers take line blocks from a mutex-protected stream, parse
//! them with per-thread name dictionaries, and the entries are merged with
//! their names re-interned into one dictionary.

use std::io::{BufRead, BufReader, Read};
use std::sync::Mutex;

use crate::errors::{GazetteerError, Result};
use crate::hierarchy::{
    Entry, Hierarchy, MultipleNames, NameDictionary, NameDictionaryBuilder, ParsingStats,
    TYPE_COUNT,
};
use crate::ids::GeoObjectId;

/// Progress is logged every this many entries.
const LOG_BATCH: u64 = 100_000;

/// Lines handed to a worker at a time.
const READ_BLOCK_LINE_COUNT: usize = 1000;

/// The `version <string>` head-line key.
pub const VERSION_KEY: &str = "version";

struct ParsingResult {
    entries: Vec<Entry>,
    dictionary: NameDictionary,
    stats: ParsingStats,
}

/// Reads a jsonl stream into a [`Hierarchy`].
pub struct HierarchyReader<R: Read> {
    input: Mutex<BufReader<R>>,
    data_version: String,
}

impl<R: Read> HierarchyReader<R> {
    /// Wraps a stream. With `data_version_headline`, the first line must be
    /// `version <string>`.
    pub fn new(rdr: R, data_version_headline: bool) -> Result<Self> {
        let mut input = BufReader::new(rdr);
        let mut data_version = String::new();
        if data_version_headline {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(GazetteerError::invalid_input(
                    "hierarchy",
                    "no version info in data",
                ));
            }
            let line = line.trim_end();
            match line.split_once(' ') {
                Some((VERSION_KEY, version)) => data_version = version.to_string(),
                _ => {
                    return Err(GazetteerError::invalid_input(
                        "hierarchy",
                        "no version info in data",
                    ))
                }
            }
        }
        Ok(Self {
            input: Mutex::new(input),
            data_version,
        })
    }

    /// Reads all entries with `readers_count` parser threads.
    pub fn read(self, readers_count: usize) -> Result<Hierarchy>
    where
        R: Send,
    {
        let readers_count = readers_count.max(1);
        log::info!("loading data version {}", self.data_version);
        log::info!("reading entries...");

        let results: Vec<ParsingResult> = std::thread::scope(|scope| {
            let reader = &self;
            let mut handles = Vec::with_capacity(readers_count);
            for _ in 0..readers_count {
                handles.push(scope.spawn(move || {
                    let mut entries = Vec::new();
                    let mut dictionary_builder = NameDictionaryBuilder::default();
                    let mut stats = ParsingStats::default();
                    let mut lines = Vec::with_capacity(READ_BLOCK_LINE_COUNT);
                    loop {
                        lines.clear();
                        if !reader.fill_block(&mut lines) {
                            break;
                        }
                        for line in &lines {
                            parse_line(line, &mut entries, &mut dictionary_builder, &mut stats);
                        }
                    }
                    ParsingResult {
                        entries,
                        dictionary: dictionary_builder.release(),
                        stats,
                    }
                }));
            }
            handles
                .into_iter()
                .map(|h| h.join().expect("hierarchy reader worker panicked"))
                .collect()
        });

        let mut entries = Vec::new();
        let mut dictionary_builder = NameDictionaryBuilder::default();
        let mut stats = ParsingStats::default();
        for result in results {
            for mut entry in result.entries {
                for i in 0..TYPE_COUNT {
                    let position = entry.normalized_address[i];
                    if position != 0 {
                        let names: MultipleNames = result.dictionary.get(position).clone();
                        entry.normalized_address[i] = dictionary_builder.add(names);
                    }
                }
                entries.push(entry);
            }
            stats.merge(&result.stats);
        }

        log::info!("read {} entries", stats.num_loaded);
        log::info!("sorting entries...");
        entries.sort_by_key(|e| e.osm_id);
        Self::check_duplicate_osm_ids(&entries, &mut stats);

        log::info!("finished reading and indexing the hierarchy, stats:");
        log::info!("entries loaded: {}", stats.num_loaded);
        log::info!("corrupted json lines: {}", stats.bad_jsons);
        log::info!("unreadable ids: {}", stats.bad_osm_ids);
        log::info!("duplicate ids: {}", stats.duplicate_osm_ids);
        log::info!("entries with duplicate address parts: {}", stats.duplicate_addresses);
        log::info!("entries without address: {}", stats.empty_addresses);
        log::info!("entries without names: {}", stats.empty_names);
        log::info!("street entries without a locality name: {}", stats.no_locality_streets);
        log::info!("building entries without a locality name: {}", stats.no_locality_buildings);
        log::info!("entries with names not matching their addresses: {}", stats.mismatched_names);

        Ok(Hierarchy::new(
            entries,
            dictionary_builder.release(),
            self.data_version,
        ))
    }

    fn fill_block(&self, lines: &mut Vec<String>) -> bool {
        let mut input = self.input.lock().expect("hierarchy input poisoned");
        for _ in 0..READ_BLOCK_LINE_COUNT {
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    while line.ends_with('\n') || line.ends_with('\r') {
                        line.pop();
                    }
                    lines.push(line);
                }
            }
        }
        !lines.is_empty()
    }

    fn check_duplicate_osm_ids(entries: &[Entry], stats: &mut ParsingStats) {
        let mut i = 0;
        while i < entries.len() {
            let mut j = i + 1;
            while j < entries.len() && entries[i].osm_id == entries[j].osm_id {
                j += 1;
            }
            if j != i + 1 {
                stats.duplicate_osm_ids += 1;
                log::debug!(
                    "duplicate osm id {} occurs as a key in {} key-value entries",
                    entries[i].osm_id.to_hex(),
                    j - i
                );
            }
            i = j;
        }
    }
}

fn parse_line(
    line: &str,
    entries: &mut Vec<Entry>,
    dictionary_builder: &mut NameDictionaryBuilder,
    stats: &mut ParsingStats,
) {
    if line.is_empty() {
        return;
    }
    let Some(space) = line.find(' ') else {
        log::warn!("cannot read osm id, line: {line}");
        stats.bad_osm_ids += 1;
        return;
    };
    let Some(osm_id) = GeoObjectId::from_hex(&line[..space]) else {
        log::warn!("cannot read osm id, line: {line}");
        stats.bad_osm_ids += 1;
        return;
    };
    if let Some(entry) = Entry::from_json(osm_id, &line[space + 1..], dictionary_builder, stats) {
        if stats.num_loaded % LOG_BATCH == 0 {
            log::info!("read {} entries", stats.num_loaded);
        }
        entries.push(entry);
    }
}
