use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{lock, read, LiveGuard, Shared};
use crate::error::{EngineError, Result};

pub(crate) const RESOLUTION: Duration = Duration::from_millis(5);

#[derive(Default)]
pub(crate) struct TimerState {
    run: AtomicBool,
    exit: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl TimerState {
    /// Starts or stops the periodic limit checks.
    pub(crate) fn set_run(&self, run: bool) {
        self.run.store(run, Ordering::SeqCst);
        let _g = lock(&self.lock);
        self.cond.notify_one();
    }

    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
        let _g = lock(&self.lock);
        self.cond.notify_one();
    }
}

pub(crate) fn spawn(shared: &Arc<Shared>) -> Result<JoinHandle<()>> {
    let shared = Arc::clone(shared);
    let live = LiveGuard::new(&shared);
    std::thread::Builder::new()
        .name("splitbot-timer".to_string())
        .spawn(move || {
            let _live = live;
            idle_loop(&shared);
        })
        .map_err(EngineError::ThreadSpawn)
}

fn idle_loop(shared: &Shared) {
    let timer = &shared.timer;
    while !timer.exit.load(Ordering::SeqCst) {
        {
            let g = lock(&timer.lock);
            if !timer.exit.load(Ordering::SeqCst) {
                if timer.run.load(Ordering::SeqCst) {
                    drop(timer.cond.wait_timeout(g, RESOLUTION).unwrap_or_else(PoisonError::into_inner));
                } else {
                    drop(timer.cond.wait(g).unwrap_or_else(PoisonError::into_inner));
                }
            }
        }
        if timer.run.load(Ordering::SeqCst) {
            check_time(shared);
        }
    }
}

/// Raises the stop signal once the time or node budget is spent.
pub(crate) fn check_time(shared: &Shared) {
    if shared.ponder.load(Ordering::SeqCst) {
        return;
    }
    let (start, use_tm, movetime, node_limit) = {
        let setup = read(&shared.setup);
        (setup.start, setup.limits.use_time_management(), setup.limits.movetime, setup.limits.nodes)
    };
    let elapsed = start.elapsed();
    let (available, maximum) = {
        let tm = lock(&shared.time);
        (tm.available_time(), tm.maximum_time())
    };
    let signals = &shared.signals;
    let still_at_first_move = signals.first_root_move.load(Ordering::SeqCst)
        && !signals.failed_low_at_root.load(Ordering::SeqCst)
        && elapsed > available * 3 / 4;
    let no_more_time = elapsed + 2 * RESOLUTION > maximum || still_at_first_move;

    let out_of_nodes = node_limit > 0 && shared.total_nodes() >= node_limit;
    if (use_tm && no_more_time) || movetime.is_some_and(|t| elapsed >= t) || out_of_nodes {
        if !signals.stopped() {
            log::debug!("timer stops search after {}ms", elapsed.as_millis());
        }
        shared.stop();
    }
}
