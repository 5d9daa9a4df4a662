use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cht::{BuildMode, Builder, CompactHistTree, IndexConfig, Key, LayoutMode};

#[derive(Parser, Debug)]
#[command(name = "cht", about = "Compact Hist-Tree index over sorted integer keys")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an index from a sorted keys file (one key per line) and dump it.
    Build {
        /// Sorted keys file.
        keys: PathBuf,
        /// Output dump.
        #[arg(short, long)]
        output: PathBuf,
        /// Key width.
        #[arg(long, value_enum, default_value_t = KeyWidth::U64)]
        key_width: KeyWidth,
        /// Bins per node, rounded up to a power of two.
        #[arg(long, default_value_t = cht::builder::DEFAULT_NUM_BINS)]
        num_bins: usize,
        /// Maximum error of a search bound.
        #[arg(long, default_value_t = cht::builder::DEFAULT_MAX_ERROR)]
        max_error: usize,
        /// Table layout.
        #[arg(long, value_enum, default_value_t = Layout::Linear)]
        layout: Layout,
        /// Count keys in a single pass instead of buffering them.
        #[arg(long)]
        single_pass: bool,
        /// Smallest indexable key (defaults to the first key in the file).
        #[arg(long, requires = "max_key")]
        min_key: Option<u64>,
        /// Largest indexable key (defaults to the last key in the file).
        #[arg(long, requires = "min_key")]
        max_key: Option<u64>,
    },
    /// Print the search bound of each key in a keys file.
    Lookup {
        /// Dump written by `build`.
        index: PathBuf,
        /// Keys to look up (one per line).
        keys: PathBuf,
        /// Key width the index was built with.
        #[arg(long, value_enum, default_value_t = KeyWidth::U64)]
        key_width: KeyWidth,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyWidth {
    U32,
    U64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Layout {
    Linear,
    CacheOblivious,
}

impl From<Layout> for LayoutMode {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Linear => LayoutMode::Linear,
            Layout::CacheOblivious => LayoutMode::CacheOblivious,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            keys,
            output,
            key_width,
            num_bins,
            max_error,
            layout,
            single_pass,
            min_key,
            max_key,
        } => {
            let mode = if single_pass {
                BuildMode::SinglePass
            } else {
                BuildMode::Offline
            };
            let config = IndexConfig::rounded(num_bins, max_error)
                .context("invalid index configuration")?
                .with_layout(layout.into())
                .with_build_mode(mode);
            let bounds = min_key.zip(max_key);
            match key_width {
                KeyWidth::U32 => run_build::<u32>(&keys, &output, config, bounds)?,
                KeyWidth::U64 => run_build::<u64>(&keys, &output, config, bounds)?,
            }
        }
        Commands::Lookup {
            index,
            keys,
            key_width,
        } => match key_width {
            KeyWidth::U32 => run_lookup::<u32>(&index, &keys)?,
            KeyWidth::U64 => run_lookup::<u64>(&index, &keys)?,
        },
    }

    Ok(())
}

fn run_build<K>(
    keys_path: &Path,
    output: &Path,
    config: IndexConfig,
    bounds: Option<(u64, u64)>,
) -> Result<()>
where
    K: Key + FromStr,
    K::Err: std::error::Error + Send + Sync + 'static,
{
    let bounds = match bounds {
        Some((min_key, max_key)) => Some((narrow::<K>(min_key)?, narrow::<K>(max_key)?)),
        // Single-pass keeps no keys, so the bounds come from a first scan.
        None if config.build_mode() == BuildMode::SinglePass => Some(scan_bounds(keys_path)?),
        None => None,
    };

    let started = Instant::now();
    let mut builder = match bounds {
        Some((min_key, max_key)) => Builder::new(min_key, max_key, config),
        None => Builder::with_inferred_bounds(config),
    }
    .context("failed to initialize builder")?;
    for_each_key(keys_path, |line, key: K| {
        builder
            .add_key(key)
            .with_context(|| format!("rejected key {} on line {}", key, line))
    })?;
    let index = builder.finalize().context("failed to build index")?;
    let elapsed = started.elapsed();
    if index.is_empty() {
        bail!("no keys in {}", keys_path.display());
    }

    std::fs::write(output, index.to_bytes())
        .with_context(|| format!("failed to write index to {}", output.display()))?;

    println!("keys\t{}", index.num_keys());
    println!("range\t[{}, {}]", index.min_key(), index.max_key());
    println!(
        "config\tnum_bins={} max_error={} layout={:?} mode={:?}",
        index.num_bins(),
        index.max_error(),
        index.layout(),
        config.build_mode()
    );
    println!("nodes\t{}", index.node_count());
    println!(
        "size\t{} bytes ({:.3} bytes/key)",
        index.size_in_bytes(),
        index.size_in_bytes() as f64 / index.num_keys() as f64
    );
    println!("build\t{:.3} ms", elapsed.as_secs_f64() * 1e3);

    Ok(())
}

fn run_lookup<K>(index_path: &Path, keys_path: &Path) -> Result<()>
where
    K: Key + FromStr,
    K::Err: std::error::Error + Send + Sync + 'static,
{
    let bytes = std::fs::read(index_path)
        .with_context(|| format!("failed to read index from {}", index_path.display()))?;
    let index = CompactHistTree::<K>::from_bytes(&bytes)
        .with_context(|| format!("failed to load index from {}", index_path.display()))?;

    for_each_key(keys_path, |_, key: K| {
        println!("{}\t{}", key, index.get_search_bound(key));
        Ok(())
    })
}

fn narrow<K: Key>(value: u64) -> Result<K> {
    K::from_u64(value).with_context(|| format!("bound {} does not fit the key width", value))
}

/// First and last key of the file, without keeping the rest.
fn scan_bounds<K>(path: &Path) -> Result<(K, K)>
where
    K: Key + FromStr,
    K::Err: std::error::Error + Send + Sync + 'static,
{
    let mut bounds: Option<(K, K)> = None;
    for_each_key(path, |_, key: K| {
        bounds = Some(bounds.map_or((key, key), |(first, _)| (first, key)));
        Ok(())
    })?;
    bounds.with_context(|| format!("no keys in {}", path.display()))
}

/// Parse one key per non-empty line and hand it to `visit` with its line number.
fn for_each_key<K, F>(path: &Path, mut visit: F) -> Result<()>
where
    K: FromStr,
    K::Err: std::error::Error + Send + Sync + 'static,
    F: FnMut(usize, K) -> Result<()>,
{
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open keys file {}", path.display()))?,
    );

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed
            .parse()
            .with_context(|| format!("invalid key '{}' on line {}", trimmed, idx + 1))?;
        visit(idx + 1, key)?;
    }
    Ok(())
}
