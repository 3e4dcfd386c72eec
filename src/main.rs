use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use splitbot::{EngineConfig, Limits, Position, ThreadPool};

#[derive(Parser, Debug)]
#[command(author, version, about = "Search a position with the YBWC thread pool", long_about = None)]
struct Args {
    /// FEN string or "startpos"
    #[arg(long, default_value = "startpos")]
    fen: String,

    /// Moves to play from the position, in coordinate notation
    #[arg(long, num_args = 0.., value_delimiter = ' ')]
    moves: Vec<String>,

    /// JSON engine configuration; command line options override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of search threads
    #[arg(long)]
    threads: Option<usize>,

    /// Transposition table size in MB
    #[arg(long)]
    hash_mb: Option<usize>,

    /// Minimum depth for sharing a node (0 = automatic)
    #[arg(long)]
    min_split_depth: Option<i32>,

    /// Create split points without recruiting slaves
    #[arg(long, default_value_t = false)]
    fake_split: bool,

    /// Fixed search depth
    #[arg(long)]
    depth: Option<i32>,

    /// Fixed time per move in milliseconds
    #[arg(long)]
    movetime: Option<u64>,

    /// Node budget
    #[arg(long)]
    nodes: Option<u64>,

    /// Suppress per-iteration info lines
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(t) = args.threads {
        config.threads = t;
    }
    if let Some(mb) = args.hash_mb {
        config.hash_mb = mb;
    }
    if let Some(d) = args.min_split_depth {
        config.min_split_depth = d;
    }
    config.fake_split |= args.fake_split;

    let pos = Position::from_fen_and_moves(&args.fen, &args.moves)?;

    let mut limits = Limits::default();
    if let Some(d) = args.depth {
        limits.depth = d;
    }
    if let Some(ms) = args.movetime {
        limits.movetime = Some(Duration::from_millis(ms));
    }
    if let Some(n) = args.nodes {
        limits.nodes = n;
    }
    if limits.depth == 0 && limits.movetime.is_none() && limits.nodes == 0 {
        limits.depth = 8;
    }

    let mut pool = ThreadPool::init(&config)?;
    if !args.quiet {
        pool.set_info_handler(|info| println!("{info}"));
    }
    let result = pool.search(&pos, limits)?;
    match result.ponder {
        Some(p) => println!("bestmove {} ponder {p}", result.bestmove_uci()),
        None => println!("bestmove {}", result.bestmove_uci()),
    }
    pool.exit();
    Ok(())
}
