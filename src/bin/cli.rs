//! inkstore CLI
//!
//! Builds, inspects and queries table files.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use inkstore::config::Config;
use inkstore::key;
use inkstore::{InkError, MemTable, Result, TableReader, TableWriter};
use tracing_subscriber::{fmt, EnvFilter};

/// inkstore CLI
#[derive(Parser, Debug)]
#[command(name = "inkstore-cli")]
#[command(about = "Build and inspect inkstore table files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a table from tab-separated `key<TAB>value` lines
    Build {
        /// Output table path
        output: PathBuf,

        /// Input file with one `key<TAB>value` pair per line
        input: PathBuf,

        /// Version assigned to every entry
        #[arg(short, long, default_value = "1")]
        version: u64,

        /// Data block size in bytes
        #[arg(short, long, default_value = "4096")]
        block_size: usize,

        /// Bloom filter bits per key (0 disables)
        #[arg(long, default_value = "10")]
        bloom_bits: usize,
    },

    /// Validate a table and print its metadata
    Inspect {
        /// Table path
        path: PathBuf,
    },

    /// Print the records of a table
    Dump {
        /// Table path
        path: PathBuf,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Look up a key as of a version
    Get {
        /// Table path
        path: PathBuf,

        /// Raw key
        key: String,

        /// Snapshot version (defaults to the newest)
        #[arg(short, long, default_value_t = u64::MAX)]
        version: u64,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,inkstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build {
            output,
            input,
            version,
            block_size,
            bloom_bits,
        } => build(output, input, version, block_size, bloom_bits),
        Commands::Inspect { path } => inspect(path),
        Commands::Dump { path, limit } => dump(path, limit),
        Commands::Get { path, key, version } => get(path, &key, version),
    }
}

/// Load the input through a memtable so duplicates and ordering are resolved
/// the same way a flush would resolve them.
fn build(
    output: PathBuf,
    input: PathBuf,
    version: u64,
    block_size: usize,
    bloom_bits: usize,
) -> Result<()> {
    let config = Config::builder()
        .block_size(block_size)
        .bloom_bits_per_key(bloom_bits)
        .build();
    config.validate()?;

    let mut memtable = MemTable::new();
    let reader = BufReader::new(File::open(&input)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let (raw, value) = line.split_once('\t').ok_or_else(|| {
            InkError::Storage(format!("{}:{}: expected key<TAB>value", input.display(), line_no + 1))
        })?;

        if !memtable.insert(&key::key_at(raw.as_bytes(), version), value.as_bytes()) {
            return Err(InkError::CapacityExhausted);
        }
    }

    let file = File::create(&output)?;
    let mut writer = TableWriter::new(BufWriter::new(file), config.table_options());
    writer.write_header()?;
    for entry in memtable.iter() {
        writer.add(entry.key, entry.value)?;
    }
    let meta = writer.finish()?;

    tracing::info!(
        path = %output.display(),
        entries = meta.entry_count,
        blocks = meta.block_count,
        bytes = meta.file_size,
        "table built"
    );
    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let reader = TableReader::open(&path)?;
    let meta = reader.meta();

    println!("path:        {}", path.display());
    println!("file size:   {}", fs::metadata(&path)?.len());
    println!("hash seed:   {:#018x}", meta.hash_seed);
    println!("entries:     {}", meta.entry_count);
    println!("blocks:      {}", meta.block_count);
    println!("versions:    {}..={}", meta.min_version, meta.max_version);
    println!("min key:     {}", String::from_utf8_lossy(&meta.min_key));
    println!("max key:     {}", String::from_utf8_lossy(&meta.max_key));
    Ok(())
}

fn dump(path: PathBuf, limit: Option<usize>) -> Result<()> {
    let reader = TableReader::open(&path)?;
    for entry in reader.iter().take(limit.unwrap_or(usize::MAX)) {
        let entry = entry?;
        match &entry.value {
            Some(value) => println!(
                "{}@{}\t{}",
                String::from_utf8_lossy(&entry.key),
                entry.version,
                String::from_utf8_lossy(value)
            ),
            None => println!("{}@{}\t<tombstone>", String::from_utf8_lossy(&entry.key), entry.version),
        }
    }
    Ok(())
}

fn get(path: PathBuf, raw: &str, version: u64) -> Result<()> {
    let reader = TableReader::open(&path)?;
    match reader.get(&key::key_at(raw.as_bytes(), version))? {
        Some(entry) => match entry.value {
            Some(value) => println!("{}@{}\t{}", raw, entry.version, String::from_utf8_lossy(&value)),
            None => println!("{}@{}\t<tombstone>", raw, entry.version),
        },
        None => println!("(not found)"),
    }
    Ok(())
}
