//! Key-value serialization of finished region trees.

use std::io::Write;

use hashbrown::HashSet;
use serde_json::{json, Map, Value};

use crate::errors::Result;
use crate::ids::GeoObjectId;
use crate::regions::{PlaceLevel, PlaceType, RegionTree, TreeNode};

/// Writes one tree as jsonl lines, skipping ids already emitted by another
/// tree. Returns the number of lines written.
pub fn write_regions_kv<W: Write>(
    tree: &RegionTree,
    seen: &mut HashSet<GeoObjectId>,
    out: &mut W,
) -> Result<u64> {
    let mut written = 0u64;
    let mut error: Option<crate::errors::GazetteerError> = None;
    tree.for_each_preorder(|index, node| {
        if error.is_some() {
            return;
        }
        if node.region.level == PlaceLevel::Unknown || node.region.region.name.is_empty() {
            return;
        }
        if index != tree.root() && node.parent.is_none() {
            return;
        }
        let id = node.region.region.id;
        if !seen.insert(id) {
            return;
        }
        let value = region_value(tree, index, node);
        if let Err(e) = writeln!(out, "{} {}", id.to_hex(), value) {
            error = Some(e.into());
            return;
        }
        written += 1;
    });
    match error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

/// The jsonl document of one region node.
fn region_value(tree: &RegionTree, index: usize, node: &TreeNode) -> Value {
    let region = &node.region.region;

    let mut locales = Map::new();
    locales.insert(
        "default".to_string(),
        json!({
            "name": region.name,
            "address": address_of(tree, index, None),
        }),
    );
    for (lang, name) in &region.names {
        if lang == "default" || lang == "int" {
            continue;
        }
        locales.insert(
            lang.clone(),
            json!({
                "name": name,
                "address": address_of(tree, index, Some(lang)),
            }),
        );
    }

    let mut properties = Map::new();
    properties.insert("kind".to_string(), Value::String(kind_of(node).to_string()));
    properties.insert("locales".to_string(), Value::Object(locales));
    if let Some(admin_level) = region.admin_level {
        properties.insert("rank".to_string(), json!(admin_level));
    }
    if let Some(parent) = node.parent {
        properties.insert(
            "dref".to_string(),
            Value::String(tree.node(parent).region.region.id.to_hex()),
        );
    }

    let center = region.center();
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [center.x, center.y]},
        "properties": Value::Object(properties),
    })
}

/// Address fields of a node: every ancestor contributes its name at its
/// level's slot; the closest ancestor wins a contested slot.
fn address_of(tree: &RegionTree, index: usize, lang: Option<&str>) -> Value {
    let mut address = Map::new();
    for (_, ancestor) in tree.ancestors(index) {
        let Some(key) = ancestor.region.level.address_key() else {
            continue;
        };
        if address.contains_key(key) {
            continue;
        }
        let name = match lang {
            None => Some(ancestor.region.region.name.as_str()),
            Some(lang) => ancestor
                .region
                .region
                .names
                .iter()
                .find(|(l, _)| l == lang)
                .map(|(_, n)| n.as_str()),
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            address.insert(key.to_string(), Value::String(name.to_string()));
        }
    }
    Value::Object(address)
}

fn kind_of(node: &TreeNode) -> &'static str {
    let region = &node.region.region;
    if region.place_type != PlaceType::Unknown {
        return region.place_type.as_str();
    }
    if let Some(label) = &region.label {
        if label.place_type != PlaceType::Unknown {
            return label.place_type.as_str();
        }
    }
    match node.region.level {
        PlaceLevel::Country => "country",
        PlaceLevel::Region => "state",
        PlaceLevel::Subregion => "district",
        PlaceLevel::Locality => "city",
        PlaceLevel::Suburb => "suburb",
        PlaceLevel::Sublocality => "neighbourhood",
        PlaceLevel::Unknown => "unknown",
    }
}
