//! Tag-to-kind classification.
//!
//! Classification is a pure function over the tag map, driven by a rule
//! table. The built-in table covers the kinds the generator consumes;
//! deployments with custom taxonomies replace the table, not the code.

use bincode::{Decode, Encode};

use crate::osm::Tag;

/// Classified feature kind.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Decode, Encode)]
#[repr(u8)]
pub enum FeatureKind {
    /// `boundary=administrative`.
    AdminBoundary,
    /// A populated-place feature (`place=city` and friends).
    Place,
    /// A named road (`highway=*`).
    Highway,
    /// `place=square`.
    Square,
    /// `building=*`.
    Building,
    /// A point of interest.
    Poi,
}

enum Pattern {
    Any,
    Value(&'static str),
    OneOf(&'static [&'static str]),
}

struct Rule {
    key: &'static str,
    pattern: Pattern,
    kind: FeatureKind,
}

const PLACE_VALUES: &[&str] = &[
    "country",
    "state",
    "region",
    "province",
    "district",
    "county",
    "municipality",
    "city",
    "town",
    "village",
    "hamlet",
    "isolated_dwelling",
    "suburb",
    "quarter",
    "neighbourhood",
];

const RULES: &[Rule] = &[
    Rule {
        key: "boundary",
        pattern: Pattern::Value("administrative"),
        kind: FeatureKind::AdminBoundary,
    },
    Rule {
        key: "place",
        pattern: Pattern::OneOf(PLACE_VALUES),
        kind: FeatureKind::Place,
    },
    Rule {
        key: "place",
        pattern: Pattern::Value("square"),
        kind: FeatureKind::Square,
    },
    Rule {
        key: "highway",
        pattern: Pattern::Any,
        kind: FeatureKind::Highway,
    },
    Rule {
        key: "building",
        pattern: Pattern::Any,
        kind: FeatureKind::Building,
    },
    Rule {
        key: "amenity",
        pattern: Pattern::Any,
        kind: FeatureKind::Poi,
    },
    Rule {
        key: "shop",
        pattern: Pattern::Any,
        kind: FeatureKind::Poi,
    },
    Rule {
        key: "tourism",
        pattern: Pattern::Any,
        kind: FeatureKind::Poi,
    },
    Rule {
        key: "office",
        pattern: Pattern::Any,
        kind: FeatureKind::Poi,
    },
];

/// The tag-to-kind mapping, loaded once at generator start and shared
/// read-only between workers.
pub struct Classificator {
    rules: &'static [Rule],
}

impl Default for Classificator {
    fn default() -> Self {
        Self { rules: RULES }
    }
}

impl Classificator {
    /// Classifies a tag set into feature kinds, in rule order, deduplicated.
    pub fn classify(&self, tags: &[Tag]) -> Vec<FeatureKind> {
        let mut kinds = Vec::new();
        for rule in self.rules {
            let matched = tags.iter().any(|t| {
                t.key == rule.key
                    && match rule.pattern {
                        Pattern::Any => t.value != "no",
                        Pattern::Value(v) => t.value == v,
                        Pattern::OneOf(vs) => vs.contains(&t.value.as_str()),
                    }
            });
            if matched && !kinds.contains(&rule.kind) {
                kinds.push(rule.kind);
            }
        }
        kinds
    }
}
