//! The geocoder core: token-layered search with beam ranking.
//!
//! A depth-first recursion descends the address types from country to
//! building, trying every prefix of unused tokens as a subquery for the
//! current type. Matched candidates are pushed into a bounded beam; the
//! final list is deduplicated, filtered by the house-number position guard
//! and rescaled against the top result.

use std::io::{Read, Write};
use std::path::Path;

use crate::beam::Beam;
use crate::common::{bincode_config, TOKEN_INDEX_FORMAT_VERSION, TOKEN_INDEX_MAGIC};
use crate::errors::{GazetteerError, Result};
use crate::hierarchy::{Entry, Hierarchy, HierarchyReader, Kind, Type};
use crate::house_numbers::{looks_like_house_number, match_house_numbers, MatchResult};
use crate::ids::GeoObjectId;
use crate::index::{DocId, Index};
use crate::normalize::{is_ascii_numeric, is_street_synonym, normalize_and_tokenize, Tokens};

/// Bound of the result beam.
const MAX_RESULTS: usize = 100;

/// Preference for the city-state form (locality named like its region).
const CITY_STATE_EXTRA_WEIGHT: f64 = 0.05;

/// Top results that only partially match a house number are rescaled to
/// this, leaving room for exact matches to dominate.
const OTHER_SIMILAR_TOP_CERTAINTY: f64 = 0.95;

/// A ranked result.
#[derive(Clone, Copy, Debug)]
pub struct GeocoderResult {
    /// Matched feature id.
    pub osm_id: GeoObjectId,
    /// Certainty rescaled so the top result is 1.0 (or 0.95, see above).
    pub certainty: f64,
}

// The certainty is a log-prob style measure of the belief that the token
// labeling is correct. A naive token-coverage fraction lets one long
// matched street shadow a more relevant locality parse, so address levels
// carry uneven weights.
fn type_weight(ty: Type) -> f64 {
    match ty {
        Type::Country => 10.0,
        Type::Region => 4.0,
        Type::Subregion => 4.0,
        Type::Locality => 5.0,
        Type::Suburb => 1.0,
        Type::Sublocality => 1.0,
        Type::Street => 2.0,
        Type::Building => 0.1,
    }
}

fn kind_weight(kind: Kind) -> Option<f64> {
    match kind {
        Kind::Country => Some(10.0),
        Kind::City => Some(5.05),
        Kind::Town => Some(5.04),
        Kind::State => Some(4.05),
        Kind::Province | Kind::District | Kind::County => Some(4.01),
        Kind::Municipality => Some(4.0),
        Kind::Village => Some(3.0),
        Kind::Street => Some(2.0),
        Kind::Hamlet => Some(1.06),
        Kind::Suburb => Some(1.05),
        Kind::Quarter => Some(1.01),
        Kind::Neighbourhood => Some(1.0),
        Kind::IsolatedDwelling => Some(0.5),
        Kind::Building => Some(0.1),
        Kind::Unknown => None,
    }
}

fn entry_weight(entry: &Entry) -> f64 {
    kind_weight(entry.kind).unwrap_or_else(|| type_weight(entry.entry_type))
}

/// A candidate with the certainty of all its matched tokens.
#[derive(Clone, Copy)]
struct Candidate {
    doc_id: DocId,
    total_certainty: f64,
    is_other_similar: bool,
}

/// All candidates matched by one subquery of consecutive tokens.
struct Layer {
    layer_type: Type,
    candidates: Vec<Candidate>,
}

struct BeamKey {
    osm_id: GeoObjectId,
    entry_type: Type,
    tokens_positions: Vec<usize>,
    all_types: Vec<Type>,
    is_other_similar: bool,
}

/// Per-query search state.
struct Context {
    tokens: Tokens,
    token_types: Vec<Option<Type>>,
    num_used_tokens: usize,
    // Positions at which a subquery looked like a house number. Entries in
    // the final beam must account for them; see the position guard.
    house_number_positions: std::collections::BTreeSet<usize>,
    beam: Beam<BeamKey, f64>,
    layers: Vec<Layer>,
}

impl Context {
    fn new(query: &str) -> Self {
        let tokens = normalize_and_tokenize(query);
        let token_types = vec![None; tokens.len()];
        Self {
            tokens,
            token_types,
            num_used_tokens: 0,
            house_number_positions: Default::default(),
            beam: Beam::new(MAX_RESULTS),
            layers: vec![],
        }
    }

    fn num_tokens(&self) -> usize {
        self.tokens.len()
    }

    fn is_token_used(&self, id: usize) -> bool {
        self.token_types[id].is_some()
    }

    fn all_tokens_used(&self) -> bool {
        self.num_used_tokens == self.tokens.len()
    }

    fn mark_token(&mut self, id: usize, ty: Option<Type>) {
        let was_used = self.token_types[id].is_some();
        self.token_types[id] = ty;
        let now_used = ty.is_some();
        if was_used && !now_used {
            self.num_used_tokens -= 1;
        }
        if !was_used && now_used {
            self.num_used_tokens += 1;
        }
    }

    fn mark_house_number_positions(&mut self, positions: &[usize]) {
        self.house_number_positions.extend(positions.iter().copied());
    }

    fn is_good_for_potential_house_number(&self, key: &BeamKey) -> bool {
        if key.tokens_positions.len() == self.tokens.len() {
            return true;
        }
        if self.is_building_with_address(key) {
            return true;
        }
        // A street, locality or region whose parse covers the number-like
        // positions may pass.
        self.has_locality_or_region(key) && self.contains_positions(key)
    }

    fn is_building_with_address(&self, key: &BeamKey) -> bool {
        if key.entry_type != Type::Building {
            return false;
        }
        let mut got_locality = false;
        let mut got_street = false;
        let mut got_building = false;
        for ty in &key.all_types {
            match ty {
                Type::Region | Type::Subregion | Type::Locality => got_locality = true,
                Type::Street => got_street = true,
                Type::Building => got_building = true,
                _ => {}
            }
        }
        got_locality && got_street && got_building
    }

    fn has_locality_or_region(&self, key: &BeamKey) -> bool {
        key.all_types
            .iter()
            .any(|ty| matches!(ty, Type::Region | Type::Subregion | Type::Locality))
    }

    fn contains_positions(&self, key: &BeamKey) -> bool {
        self.house_number_positions
            .iter()
            .all(|p| key.tokens_positions.contains(p))
    }

    fn fill_results(&self) -> Vec<GeocoderResult> {
        let mut results: Vec<(GeocoderResult, bool)> = Vec::new();
        let mut seen = hashbrown::HashSet::new();
        let has_potential_house_number = !self.house_number_positions.is_empty();
        for entry in self.beam.entries() {
            if !seen.insert(entry.key.osm_id) {
                continue;
            }
            if has_potential_house_number
                && !self.is_good_for_potential_house_number(&entry.key)
            {
                continue;
            }
            results.push((
                GeocoderResult {
                    osm_id: entry.key.osm_id,
                    certainty: entry.value,
                },
                entry.key.is_other_similar,
            ));
        }

        if let Some(((top, top_other), _)) = results.split_first().map(|(f, r)| (*f, r)) {
            let target = if top_other {
                OTHER_SIMILAR_TOP_CERTAINTY
            } else {
                1.0
            };
            let scale = top.certainty / target;
            for (result, _) in &mut results {
                result.certainty /= scale;
            }
        }

        let mut results: Vec<GeocoderResult> = results.into_iter().map(|(r, _)| r).collect();
        // Determinism for equal certainties: stable order by id.
        results.sort_by(|a, b| {
            b.certainty
                .total_cmp(&a.certainty)
                .then(a.osm_id.cmp(&b.osm_id))
        });
        results
    }
}

/// The geocoder: an immutable hierarchy plus its token index.
pub struct Geocoder {
    hierarchy: Hierarchy,
    index: Index,
}

impl Geocoder {
    /// Builds the index over an already-loaded hierarchy.
    pub fn from_hierarchy(hierarchy: Hierarchy) -> Self {
        let index = Index::build(&hierarchy);
        Self { hierarchy, index }
    }

    /// Loads a jsonl (optionally gzip-compressed) hierarchy file.
    pub fn from_jsonl_path(
        path: &Path,
        data_version_headline: bool,
        load_threads_count: usize,
    ) -> Result<Self> {
        let rdr = crate::kv::open_jsonl(path)?;
        Self::from_jsonl_reader(rdr, data_version_headline, load_threads_count)
    }

    /// Loads a jsonl hierarchy from a reader.
    pub fn from_jsonl_reader<R: Read + Send>(
        rdr: R,
        data_version_headline: bool,
        load_threads_count: usize,
    ) -> Result<Self> {
        let hierarchy =
            HierarchyReader::new(rdr, data_version_headline)?.read(load_threads_count)?;
        Ok(Self::from_hierarchy(hierarchy))
    }

    /// Writes the binary token index: magic, format version, hierarchy and
    /// inverted index in one archive.
    pub fn save_to_binary_index<W: Write>(&self, mut wtr: W) -> Result<usize> {
        wtr.write_all(TOKEN_INDEX_MAGIC)?;
        wtr.write_all(&TOKEN_INDEX_FORMAT_VERSION.to_le_bytes())?;
        let mut num_bytes = TOKEN_INDEX_MAGIC.len() + 4;
        num_bytes += bincode::encode_into_std_write(&self.hierarchy, &mut wtr, bincode_config())?;
        num_bytes += bincode::encode_into_std_write(&self.index, &mut wtr, bincode_config())?;
        Ok(num_bytes)
    }

    /// Reads a binary token index. A magic or version mismatch is fatal.
    pub fn load_from_binary_index<R: Read>(mut rdr: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        rdr.read_exact(&mut magic)?;
        if &magic != TOKEN_INDEX_MAGIC {
            return Err(GazetteerError::invalid_input(
                "token_index",
                "not a token index file",
            ));
        }
        let mut version = [0u8; 4];
        rdr.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != TOKEN_INDEX_FORMAT_VERSION {
            return Err(GazetteerError::invalid_input(
                "token_index",
                format!(
                    "format version mismatch: found {version}, expected {TOKEN_INDEX_FORMAT_VERSION}"
                ),
            ));
        }
        let hierarchy = bincode::decode_from_std_read(&mut rdr, bincode_config())?;
        let index = bincode::decode_from_std_read(&mut rdr, bincode_config())?;
        Ok(Self { hierarchy, index })
    }

    /// Gets the hierarchy.
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Gets the token index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Resolves a free-text query to ranked feature ids.
    pub fn process_query(&self, query: &str) -> Vec<GeocoderResult> {
        let mut ctx = Context::new(query);
        if ctx.num_tokens() == 0 {
            return vec![];
        }
        self.go(&mut ctx, Type::Country);
        ctx.fill_results()
    }

    fn doc(&self, doc_id: DocId) -> &Entry {
        &self.hierarchy.entries()[doc_id as usize]
    }

    fn go(&self, ctx: &mut Context, ty: Type) {
        if ctx.all_tokens_used() {
            return;
        }

        let num_tokens = ctx.num_tokens();
        for i in 0..num_tokens {
            let mut subquery = Tokens::new();
            let mut subquery_positions = Vec::new();
            for j in i..num_tokens {
                if ctx.is_token_used(j) {
                    break;
                }
                subquery.push(ctx.tokens[j].clone());
                subquery_positions.push(j);

                let mut layer = Layer {
                    layer_type: ty,
                    candidates: vec![],
                };

                // Buildings are indexed separately.
                if ty == Type::Building {
                    self.fill_buildings_layer(ctx, &subquery, &subquery_positions, &mut layer);
                } else {
                    self.fill_regular_layer(ctx, ty, &subquery, &mut layer);
                }

                if layer.candidates.is_empty() {
                    continue;
                }

                for p in i..=j {
                    ctx.mark_token(p, Some(ty));
                }
                let synonym_mark = if ty == Type::Street {
                    mark_street_synonym(ctx)
                } else {
                    None
                };

                self.add_results(ctx, &layer);

                ctx.layers.push(layer);
                if let Some(next) = ty.next() {
                    self.go(ctx, next);
                }
                ctx.layers.pop();

                if let Some(p) = synonym_mark {
                    ctx.mark_token(p, None);
                }
                for p in i..=j {
                    ctx.mark_token(p, None);
                }
            }
        }

        if let Some(next) = ty.next() {
            self.go(ctx, next);
        }
    }

    fn fill_regular_layer(&self, ctx: &Context, ty: Type, subquery: &Tokens, layer: &mut Layer) {
        self.index.for_each_doc_id(subquery, |doc_id| {
            let entry = self.doc(doc_id);
            if entry.entry_type != ty {
                return;
            }

            let parent_certainty = if ctx.layers.is_empty() {
                Some(0.0)
            } else {
                self.max_certainty_in_parent_candidates(&ctx.layers, entry)
            };
            let Some(parent_certainty) = parent_certainty else {
                return;
            };

            if ty > Type::Locality && !self.is_relevant_locality_member(ctx, entry, subquery) {
                return;
            }

            layer.candidates.push(Candidate {
                doc_id,
                total_certainty: parent_certainty
                    + entry_weight(entry) * subquery.len() as f64,
                is_other_similar: false,
            });
        });
    }

    fn fill_buildings_layer(
        &self,
        ctx: &mut Context,
        subquery: &Tokens,
        subquery_positions: &[usize],
        layer: &mut Layer,
    ) {
        if ctx.layers.is_empty() {
            return;
        }

        let subquery_hn = subquery.join(" ");
        if !looks_like_house_number(&subquery_hn) {
            return;
        }

        for layer_index in (0..ctx.layers.len()).rev() {
            let layer_type = ctx.layers[layer_index].layer_type;
            if layer_type != Type::Street && layer_type != Type::Locality {
                continue;
            }

            // The filled street or locality layer is followed by something
            // resembling a house number. It can still be something else (a
            // zip code, say), so only mark the positions as potential.
            ctx.mark_house_number_positions(subquery_positions);

            for candidate_index in 0..ctx.layers[layer_index].candidates.len() {
                let parent_doc = ctx.layers[layer_index].candidates[candidate_index].doc_id;
                self.index.for_each_related_building(parent_doc, |building_doc| {
                    let building = self.doc(building_doc);
                    let Some(names) = building
                        .normalized_names(Type::Building, self.hierarchy.dictionary())
                    else {
                        return;
                    };
                    let Some(match_result) =
                        match_house_numbers(names.main_name(), &subquery_hn)
                    else {
                        return;
                    };
                    let parent_certainty = self
                        .max_certainty_in_parent_candidates(&ctx.layers, building)
                        .unwrap_or(0.0);
                    let certainty = parent_certainty
                        + self.house_number_subquery_certainty(
                            building,
                            subquery_positions.len(),
                            &match_result,
                        );
                    layer.candidates.push(Candidate {
                        doc_id: building_doc,
                        total_certainty: certainty,
                        is_other_similar: match_result.query_mismatch > 0,
                    });
                });
            }
            break;
        }
    }

    /// Certainty contribution of a partially matched house number. Parts
    /// missing from the query are cheap; parts missing from the building
    /// cost four times as much and make the candidate "other similar".
    fn house_number_subquery_certainty(
        &self,
        building: &Entry,
        subquery_len: usize,
        m: &MatchResult,
    ) -> f64 {
        let weight = entry_weight(building);
        let mut value = subquery_len as f64;
        if m.house_mismatch > 0 {
            value -= m.house_mismatch as f64 / (m.house_mismatch + m.matched) as f64;
        }
        if m.query_mismatch > 0 {
            let missing = 4.0 * m.query_mismatch as f64;
            value -= m.query_mismatch as f64 + missing / (missing + m.matched as f64);
        }
        weight * value
    }

    fn add_results(&self, ctx: &mut Context, layer: &Layer) {
        let mut tokens_positions = Vec::new();
        let mut all_types = Vec::new();
        for (position, ty) in ctx.token_types.iter().enumerate() {
            if let Some(ty) = ty {
                tokens_positions.push(position);
                if !all_types.contains(ty) {
                    all_types.push(*ty);
                }
            }
        }
        all_types.sort_unstable();

        for candidate in &layer.candidates {
            let entry = self.doc(candidate.doc_id);
            let mut certainty = candidate.total_certainty;
            // Prefer the city-state form (Moscow in Moscow) to other
            // localities of the same name.
            if self.in_city_state(entry) {
                certainty += CITY_STATE_EXTRA_WEIGHT;
            }
            ctx.beam.add(
                BeamKey {
                    osm_id: entry.osm_id,
                    entry_type: entry.entry_type,
                    tokens_positions: tokens_positions.clone(),
                    all_types: all_types.clone(),
                    is_other_similar: candidate.is_other_similar,
                },
                certainty,
            );
        }
    }

    fn in_city_state(&self, entry: &Entry) -> bool {
        let dictionary = self.hierarchy.dictionary();
        let Some(locality) = entry.normalized_names(Type::Locality, dictionary) else {
            return false;
        };
        for ty in [Type::Region, Type::Subregion] {
            if let Some(names) = entry.normalized_names(ty, dictionary) {
                if names.main_name() == locality.main_name() {
                    return true;
                }
            }
        }
        false
    }

    /// Finds the highest certainty among parent candidates, scanning the
    /// layers from the innermost outward; the first layer containing any
    /// parent decides.
    fn max_certainty_in_parent_candidates(&self, layers: &[Layer], entry: &Entry) -> Option<f64> {
        for layer in layers.iter().rev() {
            let mut max: Option<f64> = None;
            for candidate in &layer.candidates {
                let parent = self.doc(candidate.doc_id);
                if self.hierarchy.is_parent_to(parent, entry) {
                    max = Some(match max {
                        Some(current) => current.max(candidate.total_certainty),
                        None => candidate.total_certainty,
                    });
                }
            }
            if max.is_some() {
                return max;
            }
        }
        None
    }

    /// A single numeric subquery below the locality level is only relevant
    /// when a matched locality ancestor backs it up; this keeps numeric
    /// suburbs from gluing onto distant localities.
    fn is_relevant_locality_member(&self, ctx: &Context, entry: &Entry, subquery: &Tokens) -> bool {
        let is_numeric = subquery.len() == 1 && is_ascii_numeric(&subquery[0]);
        !is_numeric || self.has_member_locality_in_matching(ctx, entry)
    }

    fn has_member_locality_in_matching(&self, ctx: &Context, entry: &Entry) -> bool {
        for layer in &ctx.layers {
            if layer.layer_type > Type::Locality {
                break;
            }
            if layer.layer_type != Type::Locality {
                continue;
            }
            for candidate in &layer.candidates {
                if self.hierarchy.is_parent_to(self.doc(candidate.doc_id), entry) {
                    return true;
                }
            }
        }
        false
    }
}

/// Marks one leftover street-synonym token as Street while a street layer
/// is on the stack, returning the marked position.
fn mark_street_synonym(ctx: &mut Context) -> Option<usize> {
    for position in 0..ctx.num_tokens() {
        if !ctx.is_token_used(position) && is_street_synonym(&ctx.tokens[position]) {
            ctx.mark_token(position, Some(Type::Street));
            return Some(position);
        }
    }
    None
}
