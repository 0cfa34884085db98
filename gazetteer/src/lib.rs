//! # Gazetteer
//!
//! Gazetteer builds a searchable geographic index from bulk OpenStreetMap
//! extracts and answers free-text address queries against it.
//!
//! The crate is split into two coupled halves. The offline generator
//! ([`pipeline`], [`cache`], [`osm`], [`translator`], [`regions`],
//! [`streets`], [`cellindex`]) ingests an OSM dump, reconstructs the
//! administrative region hierarchy and emits a line-oriented key-value file
//! plus a compact spatial index. The online geocoder ([`hierarchy`],
//! [`index`], [`geocoder`]) loads the key-value hierarchy, builds an
//! inverted token index and resolves queries to ranked feature identifiers.
//!
//! ## Examples
//!
//! ```
//! use gazetteer::geocoder::Geocoder;
//!
//! let jsonl = concat!(
//!     "C00000000004B279 {\"properties\": {\"kind\": \"country\", ",
//!     "\"locales\": {\"default\": {\"name\": \"Cuba\", ",
//!     "\"address\": {\"country\": \"Cuba\"}}}, \"rank\": 2}}\n",
//! );
//! let geocoder = Geocoder::from_jsonl_reader(jsonl.as_bytes(), false, 1).unwrap();
//! let results = geocoder.process_query("cuba");
//! assert_eq!(results.len(), 1);
//! ```
#![deny(missing_docs)]

#[cfg(target_pointer_width = "16")]
compile_error!("`target_pointer_width` must be larger than or equal to 32");

pub mod cache;
pub mod cellindex;
pub mod common;
pub mod errors;
pub mod feature;
pub mod geo_objects;
pub mod geocoder;
pub mod geometry;
pub mod hierarchy;
pub mod house_numbers;
pub mod ids;
pub mod index;
pub mod kv;
pub mod locator;
pub mod normalize;
pub mod osm;
pub mod pipeline;
pub mod regions;
pub mod streets;
pub mod translator;

mod beam;
mod coding;

#[cfg(test)]
mod tests;

pub use geocoder::Geocoder;
pub use ids::GeoObjectId;
