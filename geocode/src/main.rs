use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use gazetteer::hierarchy::Type;
use gazetteer::Geocoder;

#[derive(Parser, Debug)]
#[clap(
    name = "geocode",
    about = "A program to answer free-text address queries against a gazetteer hierarchy.",
    rename_all = "snake_case"
)]
struct Args {
    /// Hierarchy file: .jsonl, .jsonl.gz, or a binary token index.
    #[clap(long)]
    hierarchy_path: PathBuf,

    /// File with one query per line; absent reads queries from stdin.
    #[clap(long)]
    queries_path: Option<PathBuf>,

    /// Print at most this many results per query; -1 prints them all.
    #[clap(long, default_value_t = 5)]
    top: i64,

    /// Write the binary token index here after loading.
    #[clap(long)]
    save_index_path: Option<PathBuf>,

    /// The first hierarchy line carries `version <string>`.
    #[clap(long)]
    data_version_headline: bool,

    /// Reader threads for the jsonl load.
    #[clap(long, default_value_t = 4)]
    load_threads_count: usize,
}

fn load_geocoder(args: &Args) -> Result<Geocoder, Box<dyn Error>> {
    // Binary indexes are sniffed by their magic; everything else is jsonl.
    let mut head = [0u8; 8];
    {
        use std::io::Read;
        let mut file = File::open(&args.hierarchy_path)?;
        let n = file.read(&mut head)?;
        if n == 8 && &head == gazetteer::common::TOKEN_INDEX_MAGIC {
            eprintln!("Loading the binary token index...");
            let rdr = BufReader::new(File::open(&args.hierarchy_path)?);
            return Ok(Geocoder::load_from_binary_index(rdr)?);
        }
    }
    eprintln!("Loading the jsonl hierarchy...");
    Ok(Geocoder::from_jsonl_path(
        &args.hierarchy_path,
        args.data_version_headline,
        args.load_threads_count,
    )?)
}

fn matched_fields(geocoder: &Geocoder, osm_id: gazetteer::GeoObjectId) -> String {
    let Some(entry) = geocoder.hierarchy().entry_for_osm_id(osm_id) else {
        return String::new();
    };
    let dictionary = geocoder.hierarchy().dictionary();
    let mut parts = vec![];
    for ty in Type::ALL {
        if let Some(names) = entry.normalized_names(ty, dictionary) {
            parts.push(format!("{}={}", ty.as_str(), names.main_name()));
        }
    }
    format!("[{}]", parts.join(", "))
}

fn process<R: BufRead, W: Write>(
    geocoder: &Geocoder,
    top: i64,
    queries: R,
    mut out: W,
) -> Result<(), Box<dyn Error>> {
    for line in queries.lines() {
        let query = line?;
        if query.is_empty() {
            continue;
        }
        let results = geocoder.process_query(&query);
        writeln!(out, "found {}", results.len())?;
        let shown = if top < 0 {
            results.len()
        } else {
            results.len().min(top as usize)
        };
        for result in &results[..shown] {
            writeln!(
                out,
                "{} certainty={:.6} {}",
                result.osm_id.to_hex(),
                result.certainty,
                matched_fields(geocoder, result.osm_id)
            )?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let start = Instant::now();
    let geocoder = load_geocoder(&args)?;
    eprintln!("{} seconds", start.elapsed().as_secs_f64());

    if let Some(save_index_path) = &args.save_index_path {
        eprintln!("Writing the token index...: {:?}", save_index_path);
        let num_bytes =
            geocoder.save_to_binary_index(BufWriter::new(File::create(save_index_path)?))?;
        eprintln!("{} MiB", num_bytes as f64 / (1024. * 1024.));
    }

    let stdout = std::io::stdout();
    let out = BufWriter::new(stdout.lock());
    match &args.queries_path {
        Some(path) => process(&geocoder, args.top, BufReader::new(File::open(path)?), out)?,
        None => process(&geocoder, args.top, std::io::stdin().lock(), out)?,
    }
    Ok(())
}
