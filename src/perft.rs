//! Move generation node counts.

use cozy_chess::{Board, Move};
use rayon::prelude::*;

fn root_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::with_capacity(64);
    board.generate_moves(|ml| {
        moves.extend(ml);
        false
    });
    moves
}

pub fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut nodes = 0u64;
    board.generate_moves(|moves| {
        if depth == 1 {
            nodes += moves.len() as u64;
            return false;
        }
        for m in moves {
            let mut child = board.clone();
            child.play_unchecked(m);
            nodes += perft(&child, depth - 1);
        }
        false
    });
    nodes
}

/// Same count, with the root moves spread over the rayon pool.
pub fn perft_parallel(board: &Board, depth: u32) -> u64 {
    if depth <= 1 {
        return perft(board, depth);
    }
    root_moves(board)
        .par_iter()
        .map(|&m| {
            let mut child = board.clone();
            child.play_unchecked(m);
            perft(&child, depth - 1)
        })
        .sum()
}

/// Per-root-move counts, in generation order. `on_move` sees each count as
/// soon as its subtree is done, from whichever rayon worker finished it.
pub fn divide<F>(board: &Board, depth: u32, on_move: F) -> Vec<(Move, u64)>
where
    F: Fn(Move, u64) + Sync,
{
    if depth == 0 {
        return Vec::new();
    }
    root_moves(board)
        .par_iter()
        .map(|&m| {
            let mut child = board.clone();
            child.play_unchecked(m);
            let n = perft(&child, depth - 1);
            on_move(m, n);
            (m, n)
        })
        .collect()
}
