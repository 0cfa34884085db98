//! One hierarchy entry, parsed from a key-value JSON document.

use bincode::{Decode, Encode};
use serde_json::Value;

use crate::hierarchy::{
    Kind, MultipleNames, NameDictionary, NameDictionaryBuilder, Position, Type, TYPE_COUNT,
};
use crate::ids::GeoObjectId;
use crate::normalize::normalize;

/// Counters of the hierarchy load, printed at the end of the phase.
#[derive(Clone, Copy, Default, Debug)]
pub struct ParsingStats {
    /// Entries the hierarchy was constructed from.
    pub num_loaded: u64,
    /// Corrupted JSON lines.
    pub bad_jsons: u64,
    /// Lines with unreadable ids.
    pub bad_osm_ids: u64,
    /// Ids occurring as a key in at least two entries.
    pub duplicate_osm_ids: u64,
    /// Entries with duplicate subfields in the address.
    pub duplicate_addresses: u64,
    /// Entries whose address is missing or empty.
    pub empty_addresses: u64,
    /// Entries without a name.
    pub empty_names: u64,
    /// Street entries without a locality name.
    pub no_locality_streets: u64,
    /// Building entries without a locality name.
    pub no_locality_buildings: u64,
    /// Entries whose name does not match the most specific address part.
    pub mismatched_names: u64,
}

impl ParsingStats {
    /// Folds another worker's counters into this one.
    pub fn merge(&mut self, other: &ParsingStats) {
        self.num_loaded += other.num_loaded;
        self.bad_jsons += other.bad_jsons;
        self.bad_osm_ids += other.bad_osm_ids;
        self.duplicate_osm_ids += other.duplicate_osm_ids;
        self.duplicate_addresses += other.duplicate_addresses;
        self.empty_addresses += other.empty_addresses;
        self.empty_names += other.empty_names;
        self.no_locality_streets += other.no_locality_streets;
        self.no_locality_buildings += other.no_locality_buildings;
        self.mismatched_names += other.mismatched_names;
    }
}

/// A single entry in the hierarchy graph: the `properties`/`address` part
/// of one key-value document.
#[derive(Clone, Debug, Decode, Encode)]
pub struct Entry {
    /// Feature id.
    pub osm_id: GeoObjectId,
    /// Original default-locale name; useful for debugging.
    pub name: String,
    /// Structural type: the deepest present address field, possibly
    /// overridden by the document rank.
    pub entry_type: Type,
    /// Fine-grained kind.
    pub kind: Kind,
    /// Positions of the normalized address fields, one per [`Type`];
    /// 0 means unspecified.
    pub normalized_address: [Position; TYPE_COUNT],
}

impl Entry {
    /// Parses one JSON document. Returns `None` for documents the
    /// hierarchy drops, with the reason counted in `stats`.
    pub fn from_json(
        osm_id: GeoObjectId,
        json: &str,
        dictionary_builder: &mut NameDictionaryBuilder,
        stats: &mut ParsingStats,
    ) -> Option<Entry> {
        let root: Value = match serde_json::from_str(json) {
            Ok(root) => root,
            Err(e) => {
                log::debug!("can't parse entry: {e}");
                stats.bad_jsons += 1;
                return None;
            }
        };
        if !root.is_object() {
            stats.bad_jsons += 1;
            return None;
        }

        let Some(properties) = root.get("properties") else {
            stats.bad_jsons += 1;
            return None;
        };
        let Some(locales) = properties.get("locales").and_then(|l| l.as_object()) else {
            stats.bad_jsons += 1;
            return None;
        };

        let mut normalized_address = [0 as Position; TYPE_COUNT];
        let mut entry_type: Option<Type> = None;
        for ty in Type::ALL {
            let mut multiple_names = MultipleNames::default();
            for (locale, content) in locales {
                let Some(value) = content
                    .get("address")
                    .and_then(|a| a.get(ty.as_str()))
                    .and_then(|v| v.as_str())
                else {
                    continue;
                };
                let normalized = normalize(value);
                if normalized.is_empty() {
                    continue;
                }
                if locale == "default" {
                    multiple_names.set_main_name(normalized);
                } else {
                    multiple_names.add_alt_name(normalized);
                }
            }
            if !multiple_names.main_name().is_empty() {
                normalized_address[ty as usize] = dictionary_builder.add(multiple_names);
                entry_type = Some(ty);
            }
        }

        if let Some(rank) = properties.get("rank").and_then(|r| r.as_u64()) {
            if let Some(ty) = Type::from_rank(rank) {
                if normalized_address[ty as usize] != 0 {
                    entry_type = Some(ty);
                }
            }
        }

        let Some(entry_type) = entry_type else {
            log::debug!("no address in hierarchy entry {osm_id:?}");
            stats.empty_addresses += 1;
            return None;
        };

        let has_locality = normalized_address[Type::Locality as usize] != 0
            || normalized_address[Type::Subregion as usize] != 0;
        if entry_type == Type::Street && !has_locality {
            stats.no_locality_streets += 1;
            return None;
        }
        if entry_type == Type::Building && !has_locality {
            stats.no_locality_buildings += 1;
            return None;
        }

        let kind = properties
            .get("kind")
            .and_then(|k| k.as_str())
            .map(Kind::from_str)
            .unwrap_or_default();

        let name = locales
            .get("default")
            .and_then(|l| l.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            stats.empty_names += 1;
        } else {
            let own = dictionary_builder
                .dictionary()
                .get(normalized_address[entry_type as usize]);
            if own.main_name() != normalize(&name) {
                stats.mismatched_names += 1;
            }
        }

        stats.num_loaded += 1;
        Some(Entry {
            osm_id,
            name,
            entry_type,
            kind,
            normalized_address,
        })
    }

    /// Whether an address field of this type is present.
    pub fn has_field(&self, ty: Type) -> bool {
        self.normalized_address[ty as usize] != 0
    }

    /// The normalized names at an address level.
    pub fn normalized_names<'a>(
        &self,
        ty: Type,
        dictionary: &'a NameDictionary,
    ) -> Option<&'a MultipleNames> {
        let position = self.normalized_address[ty as usize];
        if position == 0 {
            return None;
        }
        Some(dictionary.get(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> (Option<Entry>, NameDictionaryBuilder, ParsingStats) {
        let mut builder = NameDictionaryBuilder::default();
        let mut stats = ParsingStats::default();
        let entry = Entry::from_json(
            GeoObjectId::from_encoded(0x10),
            json,
            &mut builder,
            &mut stats,
        );
        (entry, builder, stats)
    }

    #[test]
    fn test_parse_full_entry() {
        let (entry, builder, stats) = parse(
            r#"{"properties": {"kind": "district", "locales": {"default": {
                "name": "Florencia",
                "address": {"subregion": "Florencia", "region": "Ciego de Ávila",
                            "country": "Cuba"}}}, "rank": 6}}"#,
        );
        let entry = entry.unwrap();
        assert_eq!(entry.entry_type, Type::Subregion);
        assert_eq!(entry.kind, Kind::District);
        let dictionary = builder.release();
        assert_eq!(
            entry
                .normalized_names(Type::Region, &dictionary)
                .unwrap()
                .main_name(),
            "ciego de avila"
        );
        assert_eq!(
            entry
                .normalized_names(Type::Country, &dictionary)
                .unwrap()
                .main_name(),
            "cuba"
        );
        assert_eq!(stats.num_loaded, 1);
    }

    #[test]
    fn test_rank_override() {
        let (entry, _, _) = parse(
            r#"{"properties": {"kind": "state", "locales": {"default": {
                "address": {"region": "Москва"}}}, "rank": 2}}"#,
        );
        assert_eq!(entry.unwrap().entry_type, Type::Region);
    }

    #[test]
    fn test_alt_locale_names() {
        let (entry, builder, _) = parse(
            r#"{"properties": {"kind": "city", "locales": {
                "default": {"address": {"locality": "Москва"}},
                "en": {"address": {"locality": "Moscow"}}}}}"#,
        );
        let entry = entry.unwrap();
        let dictionary = builder.release();
        let names = entry
            .normalized_names(Type::Locality, &dictionary)
            .unwrap();
        assert_eq!(names.main_name(), "москва");
        assert!(names.names().contains(&"moscow".to_string()));
    }

    #[test]
    fn test_street_without_locality_dropped() {
        let (entry, _, stats) = parse(
            r#"{"properties": {"kind": "street", "locales": {"default": {
                "address": {"street": "Lonely"}}}}}"#,
        );
        assert!(entry.is_none());
        assert_eq!(stats.no_locality_streets, 1);
    }

    #[test]
    fn test_empty_address_dropped() {
        let (entry, _, stats) = parse(r#"{"properties": {"locales": {"default": {}}}}"#);
        assert!(entry.is_none());
        assert_eq!(stats.empty_addresses, 1);
    }

    #[test]
    fn test_bad_json_counted() {
        let (entry, _, stats) = parse("{broken");
        assert!(entry.is_none());
        assert_eq!(stats.bad_jsons, 1);
    }
}
