//! The inverted token index over hierarchy entries.
//!
//! Doc ids are dense positions into the hierarchy's id-sorted entry list,
//! so index builds are deterministic. Buildings are indexed separately,
//! keyed by their street doc (or locality doc when streetless), so
//! house-number search only iterates candidates under a chosen parent.

use bincode::{Decode, Encode};
use hashbrown::HashMap;

use crate::hierarchy::{Hierarchy, Type};
use crate::normalize::normalize_and_tokenize;

/// Dense entry position assigned during the index build.
pub type DocId = u32;

/// The inverted index plus the related-buildings structure.
#[derive(Default, Decode, Encode)]
pub struct Index {
    /// `token -> ascending doc ids`, sorted by token.
    postings: Vec<(String, Vec<DocId>)>,
    /// `street or locality doc -> ascending building docs`, sorted by key.
    related_buildings: Vec<(DocId, Vec<DocId>)>,
}

impl Index {
    /// Builds the index over a loaded hierarchy.
    pub fn build(hierarchy: &Hierarchy) -> Self {
        let entries = hierarchy.entries();
        let dictionary = hierarchy.dictionary();

        let mut postings: HashMap<String, Vec<DocId>> = HashMap::new();
        // Main names at a level, for locating building parents.
        let mut by_level_name: HashMap<(Type, &str), Vec<DocId>> = HashMap::new();

        for (doc_id, entry) in entries.iter().enumerate() {
            let doc_id = doc_id as DocId;
            let Some(names) = entry.normalized_names(entry.entry_type, dictionary) else {
                continue;
            };
            for name in names.names() {
                for token in normalize_and_tokenize(name) {
                    let ids = postings.entry(token).or_default();
                    if ids.last() != Some(&doc_id) {
                        ids.push(doc_id);
                    }
                }
            }
            by_level_name
                .entry((entry.entry_type, names.main_name()))
                .or_default()
                .push(doc_id);
        }

        let mut related_buildings: HashMap<DocId, Vec<DocId>> = HashMap::new();
        for (doc_id, entry) in entries.iter().enumerate() {
            if entry.entry_type != Type::Building {
                continue;
            }
            // A building belongs to its street when it has one, otherwise
            // to its locality.
            let parent_type = if entry.has_field(Type::Street) {
                Type::Street
            } else {
                Type::Locality
            };
            let Some(parent_names) = entry.normalized_names(parent_type, dictionary) else {
                continue;
            };
            let Some(candidates) = by_level_name.get(&(parent_type, parent_names.main_name()))
            else {
                continue;
            };
            for parent_doc in candidates {
                let parent = &entries[*parent_doc as usize];
                if hierarchy.is_parent_to(parent, entry) {
                    related_buildings
                        .entry(*parent_doc)
                        .or_default()
                        .push(doc_id as DocId);
                }
            }
        }

        let mut postings: Vec<(String, Vec<DocId>)> = postings.into_iter().collect();
        postings.sort_by(|a, b| a.0.cmp(&b.0));
        let mut related_buildings: Vec<(DocId, Vec<DocId>)> =
            related_buildings.into_iter().collect();
        related_buildings.sort_by_key(|(k, _)| *k);
        for (_, buildings) in &mut related_buildings {
            buildings.sort_unstable();
        }

        Self {
            postings,
            related_buildings,
        }
    }

    fn posting(&self, token: &str) -> Option<&[DocId]> {
        let i = self
            .postings
            .binary_search_by(|(t, _)| t.as_str().cmp(token))
            .ok()?;
        Some(&self.postings[i].1)
    }

    /// Calls `f` for every doc containing every one of `tokens`.
    pub fn for_each_doc_id<F: FnMut(DocId)>(&self, tokens: &[String], mut f: F) {
        let mut lists = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.posting(token) {
                Some(list) => lists.push(list),
                None => return,
            }
        }
        let Some((first, rest)) = lists.split_first() else {
            return;
        };
        'outer: for doc_id in *first {
            for list in rest {
                if list.binary_search(doc_id).is_err() {
                    continue 'outer;
                }
            }
            f(*doc_id);
        }
    }

    /// Calls `f` for every building related to `doc_id`.
    pub fn for_each_related_building<F: FnMut(DocId)>(&self, doc_id: DocId, mut f: F) {
        if let Ok(i) = self.related_buildings.binary_search_by_key(&doc_id, |(k, _)| *k) {
            for building in &self.related_buildings[i].1 {
                f(*building);
            }
        }
    }
}
