//! The deduplicating store of multilingual normalized name sets.

use bincode::{Decode, Encode};
use hashbrown::HashMap;

/// Position of a name set in the dictionary: 0 means unspecified,
/// stored values start at 1.
pub type Position = u32;

/// A main name with sorted alternate-locale names.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default, Decode, Encode)]
pub struct MultipleNames {
    names: Vec<String>,
}

impl MultipleNames {
    /// Creates a set with a main name.
    pub fn new(main_name: String) -> Self {
        Self {
            names: vec![main_name],
        }
    }

    /// The main name; empty when unset.
    pub fn main_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    /// Main and alternate names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Replaces the main name.
    pub fn set_main_name(&mut self, name: String) {
        if self.names.is_empty() {
            self.names.push(name);
        } else {
            self.names[0] = name;
        }
    }

    /// Inserts an alternate name, keeping alternates sorted and unique.
    pub fn add_alt_name(&mut self, name: String) {
        if self.names.is_empty() {
            // Alternates never precede the main name slot.
            self.names.push(String::new());
        }
        match self.names[1..].binary_search(&name) {
            Ok(_) => {}
            Err(i) => self.names.insert(i + 1, name),
        }
    }
}

/// The read-only dictionary.
#[derive(Default, Decode, Encode)]
pub struct NameDictionary {
    stock: Vec<MultipleNames>,
}

impl NameDictionary {
    /// Gets a stored set; `position` must be a value returned by a builder.
    pub fn get(&self, position: Position) -> &MultipleNames {
        debug_assert!(position != 0);
        &self.stock[(position - 1) as usize]
    }

    /// Number of stored sets.
    pub fn len(&self) -> usize {
        self.stock.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.stock.is_empty()
    }

    fn add(&mut self, names: MultipleNames) -> Position {
        self.stock.push(names);
        self.stock.len() as Position
    }
}

/// Builds a dictionary, deduplicating identical name sets.
#[derive(Default)]
pub struct NameDictionaryBuilder {
    dictionary: NameDictionary,
    index: HashMap<MultipleNames, Position>,
}

impl NameDictionaryBuilder {
    /// Interns a name set.
    pub fn add(&mut self, names: MultipleNames) -> Position {
        if let Some(position) = self.index.get(&names) {
            return *position;
        }
        let position = self.dictionary.add(names.clone());
        self.index.insert(names, position);
        position
    }

    /// Looks into the partially built dictionary.
    pub fn dictionary(&self) -> &NameDictionary {
        &self.dictionary
    }

    /// Finishes the build.
    pub fn release(self) -> NameDictionary {
        self.dictionary
    }
}
