use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use hashbrown::HashSet;

use gazetteer::cache::NodeStorageType;
use gazetteer::cellindex::{build_covering_index, GEO_OBJECTS_DEPTH, REGIONS_DEPTH};
use gazetteer::feature::FeatureKind;
use gazetteer::geo_objects::{generate_geo_objects_kv, AddresslessAllowlist};
use gazetteer::locator::RegionFinder;
use gazetteer::osm::{OsmSource, SourceFormat};
use gazetteer::pipeline::{generate_intermediate_data, GeneratorContext};
use gazetteer::regions::generate_regions_kv;
use gazetteer::streets::StreetsBuilder;
use gazetteer::translator::TranslatorSpec;
use gazetteer::Geocoder;

#[derive(Parser, Debug)]
#[clap(
    name = "generate",
    about = "A program to generate the gazetteer data from an OSM extract.",
    rename_all = "snake_case"
)]
struct Args {
    /// Input OSM file; empty reads from stdin.
    #[clap(long, default_value = "")]
    osm_file_name: String,

    /// Input OSM file type [xml, o5m].
    #[clap(long, default_value = "xml")]
    osm_file_type: String,

    /// Directory for intermediate caches and temporary feature files.
    #[clap(long)]
    intermediate_data_path: PathBuf,

    /// Directory where the generated artifacts are put.
    #[clap(long)]
    data_path: PathBuf,

    /// Base name of produced artifacts.
    #[clap(long, default_value = "")]
    output: String,

    /// Storage for intermediate node coordinates [raw, map, mem].
    #[clap(long, default_value = "map")]
    node_storage: String,

    /// 1st pass: create the nodes/ways/relations cache.
    #[clap(long)]
    preprocess: bool,

    /// 2nd pass: generate every kind of intermediate features.
    #[clap(long)]
    generate_features: bool,

    /// Generate intermediate features for regions.
    #[clap(long)]
    generate_region_features: bool,

    /// Generate intermediate features for streets.
    #[clap(long)]
    generate_streets_features: bool,

    /// Generate intermediate features for geo objects.
    #[clap(long)]
    generate_geo_objects_features: bool,

    /// Generate the regions covering index.
    #[clap(long)]
    generate_regions: bool,

    /// Generate the regions key-value file.
    #[clap(long)]
    generate_regions_kv: bool,

    /// Generate the geo objects covering index.
    #[clap(long)]
    generate_geo_objects_index: bool,

    /// Generate the geocoder token index from --key_value.
    #[clap(long)]
    generate_geocoder_token_index: bool,

    /// Input regions covering index file.
    #[clap(long, default_value = "")]
    regions_index: String,

    /// Input regions features file.
    #[clap(long, default_value = "")]
    regions_features: String,

    /// Input streets features file.
    #[clap(long, default_value = "")]
    streets_features: String,

    /// Input geo objects features file.
    #[clap(long, default_value = "")]
    geo_objects_features: String,

    /// Output (or input, for later stages) regions key-value file.
    #[clap(long, default_value = "")]
    regions_key_value: String,

    /// Output streets key-value file.
    #[clap(long, default_value = "")]
    streets_key_value: String,

    /// Output geo objects key-value file.
    #[clap(long, default_value = "")]
    geo_objects_key_value: String,

    /// Input key-value file (.jsonl or .jsonl.gz) for the token index.
    #[clap(long, default_value = "")]
    key_value: String,

    /// File with node ids to add to the geo objects index. May be empty.
    #[clap(long, default_value = "")]
    nodes_list_path: String,

    /// Output file for object ids that end up without addresses.
    #[clap(long, default_value = "")]
    ids_without_addresses: String,

    /// Allow addressless buildings only for these comma-separated countries.
    #[clap(long, default_value = "*")]
    allow_addressless_for_countries: String,

    /// Worker count; defaults to the number of logical cores.
    #[clap(long)]
    threads_count: Option<usize>,

    /// Provide more detailed output.
    #[clap(long)]
    verbose: bool,
}

fn open_source(args: &Args) -> Result<OsmSource, Box<dyn Error>> {
    let format = SourceFormat::from_flag(&args.osm_file_type)?;
    if args.osm_file_name.is_empty() {
        eprintln!("Reading OSM data from stdin");
        Ok(OsmSource::stdin(format))
    } else {
        eprintln!("Reading OSM data from {}", args.osm_file_name);
        Ok(OsmSource::open(Path::new(&args.osm_file_name), format)?)
    }
}

fn parse_nodes_list(path: &str) -> Result<Option<HashSet<u64>>, Box<dyn Error>> {
    if path.is_empty() {
        return Ok(None);
    }
    let mut ids = HashSet::new();
    for (line_number, line) in BufReader::new(File::open(path)?).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let id: u64 = line.trim().parse().map_err(|_| {
            format!("error while parsing node id at line {}", line_number + 1)
        })?;
        ids.insert(id);
    }
    Ok(Some(ids))
}

fn data_version(args: &Args) -> String {
    format!("{} {}", args.output, env!("CARGO_PKG_VERSION"))
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let threads_count = args
        .threads_count
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
    let ctx = GeneratorContext::new(
        args.intermediate_data_path.clone(),
        args.data_path.clone(),
        NodeStorageType::from_flag(&args.node_storage)?,
        threads_count,
    );

    if args.preprocess {
        eprintln!("Generating intermediate data...");
        let start = Instant::now();
        let source = open_source(args)?;
        generate_intermediate_data(&ctx, &source)?;
        eprintln!("{} seconds", start.elapsed().as_secs_f64());
    }

    let mut specs = vec![];
    if args.generate_features || args.generate_region_features {
        specs.push(TranslatorSpec::Regions);
    }
    if args.generate_features || args.generate_streets_features {
        specs.push(TranslatorSpec::Streets);
    }
    if args.generate_features || args.generate_geo_objects_features {
        specs.push(TranslatorSpec::GeoObjects);
    }
    if !specs.is_empty() {
        eprintln!("Generating features...");
        let start = Instant::now();
        let source = open_source(args)?;
        let sinks = gazetteer::pipeline::generate_features(&ctx, &source, &specs)?;
        for sink in &sinks {
            eprintln!("  {}", sink.display());
        }
        eprintln!("{} seconds", start.elapsed().as_secs_f64());
    }

    if args.generate_regions_kv {
        let features = require(&args.regions_features, "regions_features")?;
        let out_path = if args.regions_key_value.is_empty() {
            args.data_path.join(format!("{}.jsonl", args.output))
        } else {
            PathBuf::from(&args.regions_key_value)
        };
        eprintln!("Generating regions key-value...: {:?}", out_path);
        let tmp_path = out_path.with_extension("jsonl.tmp");
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        generate_regions_kv(features, &mut out, &data_version(args), threads_count)?;
        out.flush()?;
        drop(out);
        gazetteer::pipeline::publish(&tmp_path, &out_path)?;
    }

    if args.generate_regions {
        let features = require(&args.regions_features, "regions_features")?;
        let out_path = regions_index_path(args);
        eprintln!("Saving regions index to {:?}", out_path);
        build_covering_index(features, &out_path, REGIONS_DEPTH, threads_count, |f| {
            f.is_area()
        })?;
    }

    if args.generate_geo_objects_index {
        let features = require(&args.geo_objects_features, "geo_objects_features")?;
        let nodes_list = parse_nodes_list(&args.nodes_list_path)?;
        let out_path = args.data_path.join(format!("{}.locidx", args.output));
        eprintln!("Saving geo objects index to {:?}", out_path);
        build_covering_index(
            features,
            &out_path,
            GEO_OBJECTS_DEPTH,
            threads_count,
            |f| {
                let is_building = f.has_kind(FeatureKind::Building)
                    || f.house.as_deref().is_some_and(|h| !h.is_empty());
                if is_building {
                    return true;
                }
                f.has_kind(FeatureKind::Poi)
                    && nodes_list
                        .as_ref()
                        .is_some_and(|ids| ids.contains(&f.id.encoded()))
            },
        )?;
        if !args.streets_features.is_empty() {
            // Street pieces get a sibling index next to the objects one.
            let streets_out = args
                .data_path
                .join(format!("{}.streets.locidx", args.output));
            build_covering_index(
                Path::new(&args.streets_features),
                &streets_out,
                GEO_OBJECTS_DEPTH,
                threads_count,
                |_| true,
            )?;
        }
    }

    if !args.streets_key_value.is_empty() {
        eprintln!("Generating streets key-value...: {}", args.streets_key_value);
        let finder = RegionFinder::open(
            require(&args.regions_index, "regions_index")?,
            require(&args.regions_features, "regions_features")?,
            require(&args.regions_key_value, "regions_key_value")?,
        )?;
        let builder = StreetsBuilder::new(&finder, threads_count);
        let streets_features = require(&args.streets_features, "streets_features")?;
        builder.assemble_streets(streets_features)?;
        if !args.geo_objects_features.is_empty() {
            builder.assemble_bindings(Path::new(&args.geo_objects_features))?;
        }

        let out_path = PathBuf::from(&args.streets_key_value);
        let tmp_path = out_path.with_extension("jsonl.tmp");
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        let written = builder.save_streets_kv(&mut out)?;
        out.flush()?;
        drop(out);
        gazetteer::pipeline::publish(&tmp_path, &out_path)?;
        eprintln!("  {written} streets");

        builder.regenerate_aggregated_streets(streets_features)?;
    }

    if !args.geo_objects_key_value.is_empty() {
        eprintln!(
            "Generating geo objects key-value...: {}",
            args.geo_objects_key_value
        );
        let finder = RegionFinder::open(
            require(&args.regions_index, "regions_index")?,
            require(&args.regions_features, "regions_features")?,
            require(&args.regions_key_value, "regions_key_value")?,
        )?;
        let nodes_list = parse_nodes_list(&args.nodes_list_path)?;
        let allowlist = AddresslessAllowlist::from_flag(&args.allow_addressless_for_countries);

        let out_path = PathBuf::from(&args.geo_objects_key_value);
        let tmp_path = out_path.with_extension("jsonl.tmp");
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        let mut addressless = if args.ids_without_addresses.is_empty() {
            None
        } else {
            Some(BufWriter::new(File::create(&args.ids_without_addresses)?))
        };
        generate_geo_objects_kv(
            &finder,
            require(&args.geo_objects_features, "geo_objects_features")?,
            &mut out,
            addressless.as_mut(),
            &allowlist,
            nodes_list.as_ref(),
        )?;
        out.flush()?;
        drop(out);
        if let Some(mut a) = addressless {
            a.flush()?;
        }
        gazetteer::pipeline::publish(&tmp_path, &out_path)?;
    }

    if args.generate_geocoder_token_index {
        let key_value = require(&args.key_value, "key_value")?;
        eprintln!("Building the geocoder token index from {key_value:?}...");
        let start = Instant::now();
        let geocoder = Geocoder::from_jsonl_path(key_value, false, threads_count)?;
        eprintln!("{} seconds", start.elapsed().as_secs_f64());

        let out_path = args.data_path.join(&args.output);
        eprintln!("Writing the token index...: {:?}", out_path);
        let num_bytes = geocoder.save_to_binary_index(BufWriter::new(File::create(out_path)?))?;
        eprintln!("{} MiB", num_bytes as f64 / (1024. * 1024.));
    }

    Ok(())
}

fn regions_index_path(args: &Args) -> PathBuf {
    if args.regions_index.is_empty() {
        args.data_path.join(format!("{}.regions.locidx", args.output))
    } else {
        PathBuf::from(&args.regions_index)
    }
}

fn require<'a>(value: &'a str, flag: &str) -> Result<&'a Path, Box<dyn Error>> {
    if value.is_empty() {
        return Err(format!("--{flag} must be specified").into());
    }
    Ok(Path::new(value))
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if args.verbose { "debug" } else { "info" },
    ))
    .init();

    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
