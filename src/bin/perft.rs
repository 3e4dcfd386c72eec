use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Parser;
use cozy_chess::Board;
use indicatif::{ProgressBar, ProgressStyle};
use splitbot::perft::{divide, perft, perft_parallel};

#[derive(clap::Parser, Debug)]
#[command(name = "perft", about = "Perft driver for splitbot")]
struct Args {
    /// Search depth
    #[arg(value_name = "DEPTH")]
    depth: u32,
    /// FEN string or "startpos"
    #[arg(value_name = "FEN", default_value = "startpos")]
    fen: String,
    /// Number of threads for root-split
    #[arg(long, default_value_t = 1)]
    threads: usize,
    /// Report elapsed time and NPS
    #[arg(long, default_value_t = false)]
    nps: bool,
    /// Print the count below every root move
    #[arg(long, default_value_t = false)]
    divide: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let board = if args.fen == "startpos" {
        Board::default()
    } else {
        Board::from_fen(&args.fen, false).map_err(|e| anyhow!("invalid FEN '{}': {e:?}", args.fen))?
    };
    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads.max(1)).build()?;

    let t0 = Instant::now();
    let nodes = if args.divide && args.depth > 0 {
        let mut root_moves = 0u64;
        board.generate_moves(|ml| {
            root_moves += ml.len() as u64;
            false
        });
        let bar = ProgressBar::new(root_moves);
        bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
        let counts = pool.install(|| divide(&board, args.depth, |_, _| bar.inc(1)));
        bar.finish_and_clear();
        for (m, n) in &counts {
            println!("{m}: {n}");
        }
        counts.iter().map(|(_, n)| n).sum()
    } else if args.threads <= 1 {
        perft(&board, args.depth)
    } else {
        pool.install(|| perft_parallel(&board, args.depth))
    };
    let dt = t0.elapsed().as_secs_f64();

    if args.nps {
        println!("nodes: {nodes} elapsed: {dt:.3}s nps: {:.1}", nodes as f64 / dt.max(f64::EPSILON));
    } else {
        println!("nodes: {nodes}");
    }
    Ok(())
}
