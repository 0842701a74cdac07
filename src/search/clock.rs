// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The search clock, time allocation, and the interrupt source the monitor
//! polls for pending commands.

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::time::Instant;

/// Wall-clock elapsed time for one search. Started at `think()` entry.
#[derive(Copy, Clone, Debug)]
pub struct SearchClock {
    start: Instant,
}

impl SearchClock {
    pub fn start() -> SearchClock {
        SearchClock {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        Instant::now().saturating_duration_since(self.start).as_millis() as u64
    }
}

/// Where the search looks for input arriving mid-search. The engine polls
/// this between node batches; a scripted implementation makes the
/// cooperative-interrupt path testable without any I/O.
pub trait InterruptSource {
    /// The next pending command line, or `None` when nothing is waiting.
    /// Never blocks.
    fn poll(&mut self) -> Option<String>;
}

/// A source that never has input. Library callers that just want a search
/// use this.
pub struct NullInterruptSource;

impl InterruptSource for NullInterruptSource {
    fn poll(&mut self) -> Option<String> {
        None
    }
}

/// Drains a channel fed by a reader thread; this is how the UCI shell lets
/// `stop` and `quit` reach a running search.
pub struct ChannelInterruptSource<'a> {
    rx: &'a Receiver<String>,
}

impl<'a> ChannelInterruptSource<'a> {
    pub fn new(rx: &'a Receiver<String>) -> ChannelInterruptSource<'a> {
        ChannelInterruptSource { rx }
    }
}

impl InterruptSource for ChannelInterruptSource<'_> {
    fn poll(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Replays a fixed sequence of lines, one per poll.
pub struct ScriptedInterruptSource {
    lines: VecDeque<String>,
}

impl ScriptedInterruptSource {
    pub fn new<I, S>(lines: I) -> ScriptedInterruptSource
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInterruptSource {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl InterruptSource for ScriptedInterruptSource {
    fn poll(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Splits the engine's remaining clock into a budget for one move.
///
/// Assumes an 80-half-move game with at least 20 half-moves always left to
/// play. When the engine is ahead on the clock it spends up to 80% of the
/// surplus. The budget never exceeds 80% of the remaining clock and never
/// rounds below one millisecond; with an increment larger than the clock
/// itself, the whole clock is the budget.
pub fn allocate_time(
    own_ms: u64,
    opponent_ms: u64,
    increment_ms: u64,
    half_moves_played: usize,
) -> u64 {
    // Keep a two-second reserve; a nearly-empty clock gets a token budget.
    let own = if own_ms <= 2_000 { 1 } else { own_ms };

    let moves_left = (80i64 - half_moves_played as i64).max(20) as u64;

    let mut max_time = if opponent_ms + increment_ms < own {
        own / moves_left + increment_ms + (8 * (own - opponent_ms - increment_ms)) / 10
    } else {
        own / moves_left
    };

    if increment_ms > 0 && own < increment_ms {
        max_time = own;
    }

    if max_time > own {
        max_time = (8 * own) / 10;
    }

    max_time.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_clocks_split_by_moves_left() {
        assert_eq!(allocate_time(60_000, 60_000, 0, 0), 750);
        // Fewer moves assumed left late in the game, but never below 20.
        assert_eq!(allocate_time(60_000, 60_000, 0, 70), 3_000);
        assert_eq!(allocate_time(60_000, 60_000, 0, 200), 3_000);
    }

    #[test]
    fn clock_surplus_is_spent() {
        let budget = allocate_time(60_000, 30_000, 1_000, 0);
        assert_eq!(budget, 750 + 1_000 + (8 * 29_000) / 10);
    }

    #[test]
    fn budget_caps_at_80_percent_of_clock() {
        // Increment plus surplus would overshoot the clock; the budget is
        // clamped to 80% of it instead.
        assert_eq!(allocate_time(10_000, 1, 9_000, 70), 8_000);
    }

    #[test]
    fn near_empty_clock_gets_a_token_budget() {
        assert_eq!(allocate_time(1_500, 60_000, 0, 0), 1);
        assert_eq!(allocate_time(500, 60_000, 1_000, 0), 1);
    }

    #[test]
    fn never_zero() {
        assert!(allocate_time(2_001, 60_000, 0, 0) >= 1);
    }

    #[test]
    fn scripted_source_replays_in_order() {
        let mut source = ScriptedInterruptSource::new(["post", "stop"]);
        assert_eq!(source.poll().as_deref(), Some("post"));
        assert_eq!(source.poll().as_deref(), Some("stop"));
        assert_eq!(source.poll(), None);
    }

    #[test]
    fn null_source_is_silent() {
        assert_eq!(NullInterruptSource.poll(), None);
    }

    #[test]
    fn channel_source_drains_without_blocking() {
        let (tx, rx) = std::sync::mpsc::channel::<String>();
        let mut source = ChannelInterruptSource::new(&rx);
        assert_eq!(source.poll(), None);
        tx.send("isready".to_owned()).unwrap();
        assert_eq!(source.poll().as_deref(), Some("isready"));
        assert_eq!(source.poll(), None);
    }
}
