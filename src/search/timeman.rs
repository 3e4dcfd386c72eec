//! Splits the remaining clock between this move and the ones still to come.

use std::time::Duration;

use cozy_chess::Color;

use crate::search::Limits;

const MOVE_HORIZON: u32 = 50;
const MAX_RATIO: f64 = 7.0;
const STEAL_RATIO: f64 = 0.33;

const EMERGENCY_MOVE_HORIZON: u32 = 40;
const EMERGENCY_BASE_TIME: i64 = 60;
const EMERGENCY_MOVE_TIME: i64 = 30;
const MIN_THINKING_TIME: i64 = 20;
const SLOW_MOVER: f64 = 80.0;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Optimum,
    Maximum,
}

// Weight of a move at a given game ply: the middle game gets the most.
fn move_importance(ply: u32) -> f64 {
    const XSCALE: f64 = 9.3;
    const XSHIFT: f64 = 59.8;
    const SKEW: f64 = 0.172;
    (1.0 + ((ply as f64 - XSHIFT) / XSCALE).exp()).powf(-SKEW) + f64::MIN_POSITIVE
}

fn remaining(my_time: i64, moves_to_go: u32, ply: u32, kind: Kind) -> i64 {
    let (max_ratio, steal_ratio) = match kind {
        Kind::Optimum => (1.0, 0.0),
        Kind::Maximum => (MAX_RATIO, STEAL_RATIO),
    };
    let this_move = move_importance(ply) * SLOW_MOVER / 100.0;
    let other_moves: f64 = (1..moves_to_go).map(|i| move_importance(ply + 2 * i)).sum();
    let ratio1 = max_ratio * this_move / (max_ratio * this_move + other_moves);
    let ratio2 = (this_move + steal_ratio * other_moves) / (this_move + other_moves);
    (my_time as f64 * ratio1.min(ratio2)).floor() as i64
}

#[derive(Clone, Debug, Default)]
pub struct TimeManager {
    optimum_ms: i64,
    maximum_ms: i64,
    unstable_pv_factor: f64,
}

impl TimeManager {
    /// Computes the optimum and maximum time for `us` at game ply `ply`.
    pub fn init(&mut self, limits: &Limits, ply: u32, us: Color) {
        let (time, inc) = match us {
            Color::White => (limits.wtime, limits.winc),
            Color::Black => (limits.btime, limits.binc),
        };
        let time = time.map_or(0, |t| t.as_millis() as i64);
        let inc = inc.as_millis() as i64;

        self.unstable_pv_factor = 1.0;
        self.optimum_ms = time.max(MIN_THINKING_TIME);
        self.maximum_ms = self.optimum_ms;

        let horizon = if limits.moves_to_go > 0 { limits.moves_to_go.min(MOVE_HORIZON) } else { MOVE_HORIZON };
        for mtg in 1..=horizon {
            let my_time = time + inc * (mtg as i64 - 1)
                - EMERGENCY_BASE_TIME
                - EMERGENCY_MOVE_TIME * mtg.min(EMERGENCY_MOVE_HORIZON) as i64;
            let my_time = my_time.max(0);
            let t1 = MIN_THINKING_TIME + remaining(my_time, mtg, ply, Kind::Optimum);
            let t2 = MIN_THINKING_TIME + remaining(my_time, mtg, ply, Kind::Maximum);
            self.optimum_ms = self.optimum_ms.min(t1);
            self.maximum_ms = self.maximum_ms.min(t2);
        }
        if limits.ponder {
            self.optimum_ms += self.optimum_ms / 4;
        }
        self.optimum_ms = self.optimum_ms.min(self.maximum_ms);
        log::debug!("time: optimum {}ms maximum {}ms", self.optimum_ms, self.maximum_ms);
    }

    /// Extra time while the best move keeps changing.
    pub fn pv_instability(&mut self, best_move_changes: f64) { self.unstable_pv_factor = 1.0 + best_move_changes; }

    pub fn available_time(&self) -> Duration {
        Duration::from_millis((self.optimum_ms as f64 * self.unstable_pv_factor * 0.71).max(0.0) as u64)
    }

    pub fn maximum_time(&self) -> Duration { Duration::from_millis(self.maximum_ms.max(0) as u64) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(ms: u64, inc: u64, mtg: u32) -> Limits {
        Limits {
            wtime: Some(Duration::from_millis(ms)),
            btime: Some(Duration::from_millis(ms)),
            winc: Duration::from_millis(inc),
            binc: Duration::from_millis(inc),
            moves_to_go: mtg,
            ..Limits::default()
        }
    }

    #[test]
    fn optimum_never_exceeds_maximum_or_clock() {
        let mut tm = TimeManager::default();
        tm.init(&clock(60_000, 0, 0), 20, Color::White);
        assert!(tm.available_time() <= tm.maximum_time());
        assert!(tm.maximum_time() < Duration::from_millis(60_000));
        assert!(tm.available_time() > Duration::from_millis(100));
    }

    #[test]
    fn instability_extends_available_time() {
        let mut tm = TimeManager::default();
        tm.init(&clock(10_000, 100, 0), 30, Color::Black);
        let base = tm.available_time();
        tm.pv_instability(1.5);
        assert!(tm.available_time() > base);
    }

    #[test]
    fn last_move_before_control_may_use_more() {
        let mut a = TimeManager::default();
        let mut b = TimeManager::default();
        a.init(&clock(10_000, 0, 1), 40, Color::White);
        b.init(&clock(10_000, 0, 30), 40, Color::White);
        assert!(a.maximum_time() > b.maximum_time());
    }
}
