//! Deadline management for timed searches.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a run's time budget is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeControlMode {
    /// No limit; the level's depth schedule decides.
    #[default]
    Infinite,
    /// Fixed budget for this move, in milliseconds.
    MoveTime { time_per_move_ms: u64 },
    /// Remaining game time; a slice is allocated per move left.
    GameTime { remaining_ms: u64 },
}

/// Safety margin subtracted from every deadline.
const TIME_BUFFER_MS: u64 = 30;

/// Fraction of the budget after which no new iteration is started,
/// in percent.
const SOFT_LIMIT_PERCENT: u64 = 45;

/// Tracks the deadline of one search run.
#[derive(Debug)]
pub struct TimeManager {
    start: Instant,
    budget: Option<Duration>,
}

impl TimeManager {
    /// Allocates the budget for a move from `mode`, given the number of
    /// empties left (each side fills roughly half of them).
    pub fn new(mode: TimeControlMode, n_empties: u32) -> TimeManager {
        let budget = match mode {
            TimeControlMode::Infinite => None,
            TimeControlMode::MoveTime { time_per_move_ms } => {
                Some(Duration::from_millis(time_per_move_ms.saturating_sub(TIME_BUFFER_MS).max(1)))
            }
            TimeControlMode::GameTime { remaining_ms } => {
                let moves_left = (n_empties / 2).max(1) as u64;
                let slice = remaining_ms / moves_left;
                Some(Duration::from_millis(slice.saturating_sub(TIME_BUFFER_MS).max(1)))
            }
        };
        TimeManager {
            start: Instant::now(),
            budget,
        }
    }

    /// Hard deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.budget.map(|b| self.start + b)
    }

    /// True once enough of the budget is spent that a further iteration
    /// would likely be cut off anyway.
    pub fn past_soft_limit(&self) -> bool {
        match self.budget {
            Some(budget) => self.start.elapsed() * 100 >= budget * SOFT_LIMIT_PERCENT as u32,
            None => false,
        }
    }

    /// Milliseconds since the search started.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Whether the root should refrain from starting another iteration.
pub fn should_stop_iteration(time_manager: &Option<Arc<TimeManager>>) -> bool {
    time_manager
        .as_ref()
        .is_some_and(|tm| tm.past_soft_limit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_has_no_deadline() {
        let tm = TimeManager::new(TimeControlMode::Infinite, 30);
        assert!(tm.deadline().is_none());
        assert!(!tm.past_soft_limit());
    }

    #[test]
    fn test_move_time_sets_deadline() {
        let tm = TimeManager::new(
            TimeControlMode::MoveTime {
                time_per_move_ms: 1000,
            },
            30,
        );
        let deadline = tm.deadline().unwrap();
        assert!(deadline > Instant::now());
        assert!(deadline <= Instant::now() + Duration::from_millis(1000));
    }

    #[test]
    fn test_game_time_splits_budget() {
        let tm = TimeManager::new(
            TimeControlMode::GameTime { remaining_ms: 60_000 },
            30,
        );
        // 15 moves left for this side: around 4 seconds per move
        let deadline = tm.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(4000));
    }
}
