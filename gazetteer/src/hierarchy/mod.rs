//! The geocoder's address hierarchy loaded from the key-value file.

mod entry;
mod name_dictionary;
mod reader;

pub use entry::{Entry, ParsingStats};
pub use name_dictionary::{MultipleNames, NameDictionary, NameDictionaryBuilder, Position};
pub use reader::HierarchyReader;

use bincode::{Decode, Encode};

use crate::ids::GeoObjectId;

/// Structural role of an address component, ordered from the more general
/// to the more specific. The order drives the geocoder's descent.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Decode, Encode)]
#[repr(u8)]
pub enum Type {
    /// Country.
    Country = 0,
    /// First-level subdivision.
    Region,
    /// Second-level subdivision.
    Subregion,
    /// Populated place.
    Locality,
    /// Part of a locality.
    Suburb,
    /// Part of a suburb.
    Sublocality,
    /// Street.
    Street,
    /// Building.
    Building,
}

/// Number of [`Type`] values.
pub const TYPE_COUNT: usize = 8;

impl Type {
    /// All types in descent order.
    pub const ALL: [Type; TYPE_COUNT] = [
        Type::Country,
        Type::Region,
        Type::Subregion,
        Type::Locality,
        Type::Suburb,
        Type::Sublocality,
        Type::Street,
        Type::Building,
    ];

    /// The next, more specific type.
    pub fn next(self) -> Option<Type> {
        Type::ALL.get(self as usize + 1).copied()
    }

    /// The address-field key of this type in key-value documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Type::Country => "country",
            Type::Region => "region",
            Type::Subregion => "subregion",
            Type::Locality => "locality",
            Type::Suburb => "suburb",
            Type::Sublocality => "sublocality",
            Type::Street => "street",
            Type::Building => "building",
        }
    }

    /// Maps a generator rank to a type, for ranks that encode one.
    pub fn from_rank(rank: u64) -> Option<Type> {
        match rank {
            1 => Some(Type::Country),
            2 => Some(Type::Region),
            3 => Some(Type::Subregion),
            4 => Some(Type::Locality),
            _ => None,
        }
    }
}

/// Fine-grained classification of an entry, from the `kind` property.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Decode, Encode)]
#[repr(u8)]
pub enum Kind {
    /// Unclassified.
    #[default]
    Unknown = 0,
    /// Country.
    Country,
    /// State.
    State,
    /// Province.
    Province,
    /// District.
    District,
    /// County.
    County,
    /// Municipality.
    Municipality,
    /// City.
    City,
    /// Town.
    Town,
    /// Village.
    Village,
    /// Hamlet.
    Hamlet,
    /// Isolated dwelling.
    IsolatedDwelling,
    /// Suburb.
    Suburb,
    /// Quarter.
    Quarter,
    /// Neighbourhood.
    Neighbourhood,
    /// Street.
    Street,
    /// Building.
    Building,
}

impl Kind {
    /// Parses the `kind` property value.
    pub fn from_str(s: &str) -> Kind {
        match s {
            "country" => Kind::Country,
            "state" => Kind::State,
            "province" => Kind::Province,
            "district" => Kind::District,
            "county" => Kind::County,
            "municipality" => Kind::Municipality,
            "city" => Kind::City,
            "town" => Kind::Town,
            "village" => Kind::Village,
            "hamlet" => Kind::Hamlet,
            "isolated_dwelling" => Kind::IsolatedDwelling,
            "suburb" => Kind::Suburb,
            "quarter" => Kind::Quarter,
            "neighbourhood" => Kind::Neighbourhood,
            "street" => Kind::Street,
            "building" => Kind::Building,
            _ => Kind::Unknown,
        }
    }

    /// The `kind` property value.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Unknown => "unknown",
            Kind::Country => "country",
            Kind::State => "state",
            Kind::Province => "province",
            Kind::District => "district",
            Kind::County => "county",
            Kind::Municipality => "municipality",
            Kind::City => "city",
            Kind::Town => "town",
            Kind::Village => "village",
            Kind::Hamlet => "hamlet",
            Kind::IsolatedDwelling => "isolated_dwelling",
            Kind::Suburb => "suburb",
            Kind::Quarter => "quarter",
            Kind::Neighbourhood => "neighbourhood",
            Kind::Street => "street",
            Kind::Building => "building",
        }
    }
}

/// The loaded hierarchy: entries sorted by id plus the shared normalized
/// name dictionary.
#[derive(Decode, Encode)]
pub struct Hierarchy {
    entries: Vec<Entry>,
    dictionary: NameDictionary,
    data_version: String,
}

impl Hierarchy {
    /// Assembles a hierarchy, sorting entries when needed.
    pub fn new(mut entries: Vec<Entry>, dictionary: NameDictionary, data_version: String) -> Self {
        let sorted = entries.windows(2).all(|w| w[0].osm_id <= w[1].osm_id);
        if !sorted {
            log::info!("sorting entries...");
            entries.sort_by_key(|e| e.osm_id);
        }
        Self {
            entries,
            dictionary,
            data_version,
        }
    }

    /// All entries, ordered by id.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The shared name dictionary.
    pub fn dictionary(&self) -> &NameDictionary {
        &self.dictionary
    }

    /// The `version` head line of the source file, if any.
    pub fn data_version(&self) -> &str {
        &self.data_version
    }

    /// Binary lookup by id.
    pub fn entry_for_osm_id(&self, osm_id: GeoObjectId) -> Option<&Entry> {
        let i = self.entries.partition_point(|e| e.osm_id < osm_id);
        self.entries.get(i).filter(|e| e.osm_id == osm_id)
    }

    /// Whether `parent` is an ancestor of `child`: every address field of
    /// the parent matches the child's field of the same type.
    pub fn is_parent_to(&self, parent: &Entry, child: &Entry) -> bool {
        for i in 0..TYPE_COUNT {
            let parent_position = parent.normalized_address[i];
            if parent_position == 0 {
                continue;
            }
            let child_position = child.normalized_address[i];
            if child_position == 0 {
                return false;
            }
            if parent_position == child_position {
                continue;
            }
            let parent_name = self.dictionary.get(parent_position).main_name();
            let child_name = self.dictionary.get(child_position).main_name();
            if parent_name != child_name {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_order() {
        assert!(Type::Country < Type::Building);
        assert_eq!(Type::Country.next(), Some(Type::Region));
        assert_eq!(Type::Building.next(), None);
    }

    #[test]
    fn test_kind_string_conversion() {
        assert_eq!(Kind::Unknown as u8, 0);
        for kind in [
            Kind::Country,
            Kind::State,
            Kind::Province,
            Kind::District,
            Kind::County,
            Kind::Municipality,
            Kind::City,
            Kind::Town,
            Kind::Village,
            Kind::Hamlet,
            Kind::IsolatedDwelling,
            Kind::Suburb,
            Kind::Quarter,
            Kind::Neighbourhood,
            Kind::Street,
            Kind::Building,
        ] {
            assert_eq!(kind, Kind::from_str(kind.as_str()));
        }
    }
}
