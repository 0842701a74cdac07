// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The search core: an iterative-deepening driver on top of a
//! principal-variation alpha-beta recursion with a quiescence extension.
//!
//! [`Engine::think`] is the entry point. It deepens from one ply upward,
//! remembering the principal variation of each completed iteration; the next
//! iteration tries that line first, and the PV of the last completed
//! iteration is the answer when time runs out. The recursion prunes with
//! null-move reductions and late-move reductions, memoizes scores in the
//! transposition cache, and credits cutoff moves in the history tables that
//! steer move ordering.
//!
//! Cancellation is cooperative: every `UPDATE_INTERVAL` nodes the search
//! checks the clock and polls its interrupt source, and once `timed_out` is
//! set every in-flight frame unwinds without writing to the cache.

mod clock;
mod ordering;
mod pv;

use std::sync::atomic::{AtomicBool, Ordering as MemoryOrdering};
use std::sync::Arc;

pub use clock::{
    allocate_time, ChannelInterruptSource, InterruptSource, NullInterruptSource,
    ScriptedInterruptSource, SearchClock,
};
pub use ordering::{select_move, HistoryTable};
pub use pv::PvTable;

use crate::core::{Color, Move};
use crate::eval;
use crate::movegen;
use crate::position::Position;
use crate::table::{Entry, TranspositionTable};
use crate::trace::{DepthCompleted, SearchEnded, SearchStarted, SearchTrace};

/// Score of a delivered checkmate, before distance-to-mate is subtracted.
/// A mate found `n` plies into the search scores `CHECKMATE - n` for the
/// winning side.
pub const CHECKMATE: i32 = 31_000;
pub const DRAW: i32 = 0;
pub const STALEMATE: i32 = 0;
const INFINITY: i32 = 32_000;

/// Hard ceiling on search depth, counting quiescence and check extensions.
pub const MAX_PLY: usize = 64;

/// Knobs read at `think()` entry. The defaults are the values the engine
/// plays with.
pub struct Tunables {
    /// Deepest iteration the driver will run.
    pub search_depth: u32,
    /// Soft time budget per move, in milliseconds. Ignored in UCI mode,
    /// where the budget is computed from the clocks instead.
    pub max_time_ms: u64,
    /// Whether the shell speaks UCI: compute the budget from the clocks and
    /// print `info` lines after each iteration.
    pub uci: bool,
    /// Suppresses console output entirely.
    pub quiet: bool,
    /// Whether to probe and fill the transposition cache.
    pub use_cache: bool,
    /// Whether to reduce late quiet moves.
    pub lmr: bool,
    /// Fraction of the budget after which no new iteration starts.
    pub stop_frac: f64,
    /// Minimum non-pawn material (N=B=3, R=5, Q=10) the mover must have for
    /// a null move to be tried; pawn-only endgames are zugzwang-prone.
    pub nullmove_limit: i32,
    /// Depth subtracted for the null-move scout.
    pub nullmove_reduction: i32,
    /// LMR applies only below this ply...
    pub lmr_ply_start: usize,
    /// ...and only when more than this much depth remains...
    pub lmr_search_depth: i32,
    /// ...and only after this many moves have been tried at the node.
    pub lmr_move_start: u32,
    /// Cache-hit ratio above which an iteration is logged as cache-served.
    pub cache_hit_level: f64,
    /// Nodes between clock checks and input polls.
    pub update_interval: u64,
}

impl Default for Tunables {
    fn default() -> Tunables {
        Tunables {
            search_depth: 32,
            max_time_ms: 60_000,
            uci: false,
            quiet: false,
            use_cache: true,
            lmr: true,
            stop_frac: 0.6,
            nullmove_limit: 3,
            nullmove_reduction: 4,
            lmr_ply_start: 2,
            lmr_search_depth: 2,
            lmr_move_start: 4,
            cache_hit_level: 0.85,
            update_interval: 100_000,
        }
    }
}

/// Why a game is over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameOver {
    /// The named color delivered mate.
    Checkmate(Color),
    Stalemate,
    InsufficientMaterial,
    Repetition,
    /// The 75-move rule: 150 half-moves without a capture or pawn move.
    MoveRule,
}

/// Result of the end-of-game check. `legal_moves` and `only_move` are
/// populated as a side effect so the driver can shortcut a forced move
/// without searching.
#[derive(Debug)]
pub struct EndOfGame {
    pub result: Option<GameOver>,
    pub legal_moves: usize,
    pub only_move: Move,
}

/// The engine: board, cache, history, PV memory, clock state, and tunables,
/// all owned in one place. One search runs at a time; everything scoped to
/// a single `think()` call is reset at its entry.
pub struct Engine {
    position: Position,
    cache: TranspositionTable,
    history: HistoryTable,
    pv: PvTable,
    pub tunables: Tunables,
    trace: Option<SearchTrace>,

    // Clock state fed by the shell, milliseconds.
    pub(crate) clock_ms: u64,
    pub(crate) opponent_clock_ms: u64,
    pub(crate) increment_ms: u64,

    // State scoped to one think() call.
    clock: SearchClock,
    max_time_ms: u64,
    nodes: u64,
    countdown: i64,
    timed_out: bool,
    follow_pv: bool,
    allow_null: bool,
    cache_hits: u64,
    last_score: i32,
    pending_command: Option<String>,
    stop: Arc<AtomicBool>,
}

impl Engine {
    pub fn new() -> Engine {
        Engine::with_position(Position::starting())
    }

    pub fn with_position(position: Position) -> Engine {
        Engine {
            position,
            cache: TranspositionTable::new(),
            history: HistoryTable::new(),
            pv: PvTable::new(),
            tunables: Tunables::default(),
            trace: None,
            clock_ms: 0,
            opponent_clock_ms: 0,
            increment_ms: 0,
            clock: SearchClock::start(),
            max_time_ms: 0,
            nodes: 0,
            countdown: 0,
            timed_out: false,
            follow_pv: false,
            allow_null: false,
            cache_hits: 0,
            last_score: 0,
            pending_command: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resets for a fresh game: starting position, empty cache, cleared
    /// history and PV memory.
    pub fn new_game(&mut self) {
        self.position = Position::starting();
        self.cache.clear();
        self.history.clear();
        self.pv.clear();
        self.last_score = 0;
        self.pending_command = None;
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn set_clocks(&mut self, own_ms: u64, opponent_ms: u64, increment_ms: u64) {
        self.clock_ms = own_ms;
        self.opponent_clock_ms = opponent_ms;
        self.increment_ms = increment_ms;
    }

    pub fn set_trace(&mut self, trace: SearchTrace) {
        self.trace = Some(trace);
    }

    /// A handle other threads may set to stop the current search.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Nodes searched by the last `think()` call.
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Cache hits recorded by the last `think()` call.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Root score of the last completed iteration, from the mover's
    /// perspective.
    pub fn last_score(&self) -> i32 {
        self.last_score
    }

    /// The principal variation of the last completed iteration.
    pub fn principal_variation(&self) -> &[Move] {
        self.pv.last_line()
    }

    pub fn cache(&self) -> &TranspositionTable {
        &self.cache
    }

    /// A command that arrived mid-search and stopped it; the shell must
    /// process it after `think()` returns.
    pub fn take_pending_command(&mut self) -> Option<String> {
        self.pending_command.take()
    }

    /// Picks a move for the side to move, or `None` when the game is over.
    ///
    /// The search stops at the first of: no legal moves, a single legal
    /// move (returned without searching), the depth limit, the time budget,
    /// a forced mate, or an interrupt.
    pub fn think(&mut self, interrupts: &mut dyn InterruptSource) -> Option<Move> {
        self.cache_hits = 0;
        self.nodes = 0;

        let end = self.end_of_game();
        if let Some(result) = end.result {
            tracing::debug!(?result, "game is over, nothing to search");
            return None;
        }
        if end.legal_moves == 1 {
            return Some(end.only_move);
        }

        self.pv.clear();
        self.history.clear();
        self.countdown = self.tunables.update_interval as i64;
        self.timed_out = false;
        self.last_score = 0;
        self.pending_command = None;

        self.max_time_ms = if self.tunables.uci && self.clock_ms > 0 {
            allocate_time(
                self.clock_ms,
                self.opponent_clock_ms,
                self.increment_ms,
                self.position.plies_played(),
            )
        } else {
            self.tunables.max_time_ms
        };

        // A zero budget never starts iteration one.
        if self.max_time_ms == 0 {
            return None;
        }

        self.clock = SearchClock::start();
        let depth_limit = self.tunables.search_depth.clamp(1, MAX_PLY as u32 - 1);

        if let Some(trace) = self.trace.as_mut() {
            trace.record(
                0,
                SearchStarted {
                    fen: self.position.as_fen(),
                    depth_limit,
                    max_time_ms: self.max_time_ms,
                },
            );
        }

        for current_depth in 1..=depth_limit {
            self.pv.clear_rows();
            self.follow_pv = true;
            self.allow_null = true;

            let score = self.alphabeta(interrupts, 0, current_depth as i32, -INFINITY, INFINITY);

            if self.timed_out || self.stop.load(MemoryOrdering::Acquire) {
                // The partial iteration is discarded; the previous completed
                // PV is the answer.
                tracing::debug!(depth = current_depth, "search interrupted");
                break;
            }

            self.last_score = score;
            self.pv.remember();
            let elapsed = self.clock.elapsed_ms();
            self.report_iteration(current_depth, score, elapsed);

            if elapsed > self.max_time_ms {
                break;
            }
            if elapsed as f64 > self.tunables.stop_frac * self.max_time_ms as f64 {
                break;
            }
            if score.abs() > CHECKMATE - current_depth as i32 {
                tracing::debug!(depth = current_depth, score, "forced mate found");
                break;
            }
        }

        let best = self.pv.first_remembered();
        if let Some(trace) = self.trace.as_mut() {
            trace.record(
                self.clock.elapsed_ms(),
                SearchEnded {
                    best_move: best.map(|m| m.as_uci()),
                    nodes: self.nodes,
                },
            );
        }
        best
    }

    fn report_iteration(&mut self, depth: u32, score: i32, elapsed: u64) {
        let pv: Vec<String> = self.pv.last_line().iter().map(|m| m.as_uci()).collect();
        let pv_text = pv.join(" ");
        let hit_ratio = if self.nodes > 0 {
            self.cache_hits as f64 / self.nodes as f64
        } else {
            0.0
        };

        tracing::debug!(
            depth,
            score,
            nodes = self.nodes,
            elapsed_ms = elapsed,
            hit_ratio,
            pv = %pv_text,
            "completed iteration"
        );
        if hit_ratio > self.tunables.cache_hit_level {
            tracing::debug!(depth, "iteration served mostly from cache");
        }

        if self.tunables.uci && !self.tunables.quiet {
            println!(
                "info depth {} score cp {} nodes {} time {} pv {}",
                depth, score, self.nodes, elapsed, pv_text
            );
        }

        if let Some(trace) = self.trace.as_mut() {
            trace.record(
                elapsed,
                DepthCompleted {
                    depth,
                    score,
                    nodes: self.nodes,
                    pv,
                },
            );
        }
    }

    /// The principal-variation alpha-beta recursion.
    fn alphabeta(
        &mut self,
        interrupts: &mut dyn InterruptSource,
        ply: usize,
        depth: i32,
        mut alpha: i32,
        beta: i32,
    ) -> i32 {
        if ply >= MAX_PLY - 1 {
            self.pv.enter(ply);
            return eval::evaluate(&self.position);
        }
        self.pv.enter(ply);

        if depth <= 0 {
            self.follow_pv = false;
            return self.qsearch(interrupts, ply, alpha, beta);
        }

        if ply > 0 && self.position.repetition_count() >= 3 {
            return DRAW;
        }

        // Null-move reduction: pass the turn and search shallow with a
        // zero-width window. A fail-high here means the position is good
        // enough that the full search would almost certainly fail high too.
        // Skipped while following the PV, when in check, and without enough
        // non-pawn material to rule out zugzwang.
        if !self.follow_pv
            && self.allow_null
            && self.position.non_pawn_material(self.position.side_to_move())
                > self.tunables.nullmove_limit
            && !self.own_king_attacked()
        {
            self.allow_null = false;
            self.nodes += 1;
            self.countdown -= 1;
            if self.countdown <= 0 {
                self.read_clock_and_input(interrupts);
            }

            self.position.make_null_move();
            let val = -self.alphabeta(
                interrupts,
                ply,
                depth - self.tunables.nullmove_reduction,
                -beta,
                -beta + 1,
            );
            self.position.unmake_null_move();

            if self.timed_out {
                return 0;
            }
            self.allow_null = true;
            if val >= beta {
                return val;
            }
        }
        self.allow_null = true;

        let mut moves = Vec::new();
        movegen::generate_moves(&self.position, &mut moves);

        let side = self.position.side_to_move();
        let mut moves_found = 0u32;
        let mut pv_moves_found = 0u32;
        let mut move_no = 0u32;

        for i in 0..moves.len() {
            select_move(
                &mut moves,
                i,
                ply,
                depth,
                self.follow_pv,
                self.pv.last_line(),
                &self.history,
                side,
            );
            let mov = moves[i];
            self.position.make_move(mov);

            // Probe the cache before the legality check; the entry is
            // trusted only when its stored depth covers the depth still
            // needed here.
            let child_key = self.position.zobrist_hash();
            let mut cached = false;
            let mut val = 0;
            if self.tunables.use_cache {
                if let Some(entry) = self.cache.find(child_key, depth as i16) {
                    self.cache_hits += 1;
                    val = entry.score;
                    cached = true;
                    self.pv.store(ply, mov);
                }
            }

            // Pseudo-legal filter: the mover may not leave their king hanging.
            if self.other_king_attacked() {
                self.position.unmake_move(mov);
                continue;
            }

            self.nodes += 1;
            move_no += 1;
            self.countdown -= 1;
            if self.countdown <= 0 {
                self.read_clock_and_input(interrupts);
            }
            moves_found += 1;

            if !cached {
                // Late-move reduction: quiet moves far down the list at an
                // untroubled node get one ply less, as long as no PV move
                // has been found yet.
                let mut next_depth = depth - 1;
                if self.tunables.lmr
                    && ply > self.tunables.lmr_ply_start
                    && depth > self.tunables.lmr_search_depth
                    && !mov.is_capture()
                    && !mov.is_promotion()
                    && !self.own_king_attacked()
                    && !self.other_king_attacked()
                    && move_no > self.tunables.lmr_move_start
                    && pv_moves_found == 0
                {
                    next_depth = depth - 2;
                }

                if pv_moves_found > 0 {
                    // Scout with a zero-width window; re-search in full only
                    // if the move beats alpha after all.
                    val = -self.alphabeta(interrupts, ply + 1, depth - 1, -alpha - 1, -alpha);
                    if val > alpha && val < beta {
                        val = -self.alphabeta(interrupts, ply + 1, depth - 1, -beta, -alpha);
                    }
                } else {
                    val = -self.alphabeta(interrupts, ply + 1, next_depth, -beta, -alpha);
                }
            }

            self.position.unmake_move(mov);

            if self.timed_out {
                return 0;
            }

            if val >= beta {
                self.history.reward(side, mov, depth);
                return beta;
            }

            if val > alpha {
                alpha = val;
                pv_moves_found += 1;
                self.pv.store(ply, mov);
                if cached {
                    // A cached score has no child line to append.
                    self.pv.truncate(ply);
                } else {
                    self.pv.adopt_child(ply);
                }
            }

            if self.tunables.use_cache && !cached && -CHECKMATE < val && val < CHECKMATE {
                self.cache.add(
                    child_key,
                    Entry {
                        key: child_key,
                        depth: depth as i16,
                        score: val,
                    },
                );
            }
        }

        if pv_moves_found > 0 {
            self.history.reward(side, self.pv.move_at(ply), depth);
        }

        if self.position.halfmove_clock() > 149 {
            return DRAW;
        }

        if moves_found == 0 {
            return if self.own_king_attacked() {
                -(CHECKMATE - ply as i32)
            } else {
                STALEMATE
            };
        }

        alpha
    }

    /// Quiescence: search only forcing moves past the horizon, so the
    /// static evaluation is never applied to a position mid-exchange. In
    /// check, the node gets a full one-ply extension instead.
    fn qsearch(
        &mut self,
        interrupts: &mut dyn InterruptSource,
        ply: usize,
        mut alpha: i32,
        beta: i32,
    ) -> i32 {
        if self.timed_out {
            return 0;
        }
        if ply >= MAX_PLY - 1 {
            self.pv.enter(ply);
            return eval::evaluate(&self.position);
        }
        self.pv.enter(ply);

        if self.own_king_attacked() {
            return self.alphabeta(interrupts, ply, 1, alpha, beta);
        }

        let stand_pat = eval::evaluate(&self.position);
        if stand_pat >= beta {
            return stand_pat;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut moves = Vec::new();
        movegen::generate_captures(&self.position, &mut moves);
        for mov in moves {
            self.position.make_move(mov);
            if self.other_king_attacked() {
                self.position.unmake_move(mov);
                continue;
            }

            self.nodes += 1;
            self.countdown -= 1;
            if self.countdown <= 0 {
                self.read_clock_and_input(interrupts);
            }

            let val = -self.qsearch(interrupts, ply + 1, -beta, -alpha);
            self.position.unmake_move(mov);

            if val >= beta {
                return val;
            }
            if val > alpha {
                alpha = val;
                self.pv.store(ply, mov);
                self.pv.adopt_child(ply);
            }
        }

        alpha
    }

    /// The cooperative interruption point, reached every `update_interval`
    /// nodes. Checks the clock and the stop handle, then drains pending
    /// input: stream no-ops are discarded, clock updates are applied, and
    /// any other command stops the search and is buffered for the shell.
    fn read_clock_and_input(&mut self, interrupts: &mut dyn InterruptSource) {
        self.countdown = self.tunables.update_interval as i64;

        if self.clock.elapsed_ms() > self.max_time_ms || self.stop.load(MemoryOrdering::Acquire) {
            self.timed_out = true;
            return;
        }

        while let Some(line) = interrupts.poll() {
            let mut words = line.split_whitespace();
            let command = match words.next() {
                Some(word) => word,
                None => continue,
            };
            match command {
                "." | "?" | "bk" | "easy" | "hard" | "nopost" | "post" | "hint" => continue,
                "time" => {
                    // XBoard clocks arrive in centiseconds.
                    if let Some(cs) = words.next().and_then(|w| w.parse::<u64>().ok()) {
                        self.clock_ms = cs * 10;
                    }
                }
                "otim" => {
                    if let Some(cs) = words.next().and_then(|w| w.parse::<u64>().ok()) {
                        self.opponent_clock_ms = cs * 10;
                    }
                }
                _ => {
                    self.timed_out = true;
                    self.pending_command = Some(line);
                    return;
                }
            }
        }
    }

    fn own_king_attacked(&self) -> bool {
        self.position.is_check(self.position.side_to_move())
    }

    fn other_king_attacked(&self) -> bool {
        self.position
            .is_check(self.position.side_to_move().toggle())
    }

    /// Checks whether the game is already decided, counting legal moves
    /// along the way. Checked in order: a king already en prise (the
    /// previous move ended the game), no legal moves (mate or stalemate),
    /// insufficient material, threefold repetition, and the 75-move rule.
    pub fn end_of_game(&mut self) -> EndOfGame {
        let us = self.position.side_to_move();

        if self.other_king_attacked() {
            return EndOfGame {
                result: Some(GameOver::Checkmate(us)),
                legal_moves: 0,
                only_move: Move::null(),
            };
        }

        let mut moves = Vec::new();
        movegen::generate_moves(&self.position, &mut moves);
        let mut legal_moves = 0;
        let mut only_move = Move::null();
        for mov in moves {
            self.position.make_move(mov);
            if !self.other_king_attacked() {
                legal_moves += 1;
                only_move = mov;
            }
            self.position.unmake_move(mov);
        }

        if legal_moves == 0 {
            let result = if self.own_king_attacked() {
                GameOver::Checkmate(us.toggle())
            } else {
                GameOver::Stalemate
            };
            return EndOfGame {
                result: Some(result),
                legal_moves: 0,
                only_move: Move::null(),
            };
        }

        let result = if self.insufficient_material() {
            Some(GameOver::InsufficientMaterial)
        } else if self.position.repetition_count() >= 3 {
            Some(GameOver::Repetition)
        } else if self.position.halfmove_clock() > 149 {
            Some(GameOver::MoveRule)
        } else {
            None
        };

        EndOfGame {
            result,
            legal_moves,
            only_move,
        }
    }

    /// Draws that need no move counting, considered only with no pawns on
    /// the board: bare kings, king and knight versus king, same-coloured
    /// bishops only, and minor piece versus minor piece.
    fn insufficient_material(&self) -> bool {
        use crate::core::PieceKind::*;

        let pos = &self.position;
        if pos.count_pieces(Color::White, Pawn) > 0 || pos.count_pieces(Color::Black, Pawn) > 0 {
            return false;
        }

        let wn = pos.count_pieces(Color::White, Knight);
        let wb = pos.count_pieces(Color::White, Bishop);
        let wr = pos.count_pieces(Color::White, Rook);
        let wq = pos.count_pieces(Color::White, Queen);
        let bn = pos.count_pieces(Color::Black, Knight);
        let bb = pos.count_pieces(Color::Black, Bishop);
        let br = pos.count_pieces(Color::Black, Rook);
        let bq = pos.count_pieces(Color::Black, Queen);
        let white = 3 * wn + 3 * wb + 5 * wr + 10 * wq;
        let black = 3 * bn + 3 * bb + 5 * br + 10 * bq;

        // King versus king.
        if white == 0 && black == 0 {
            return true;
        }

        // King and knight versus king.
        if (white == 3 && wn == 1 && black == 0) || (black == 3 && bn == 1 && white == 0) {
            return true;
        }

        // Only bishops left, all standing on the same colour.
        if wb + bb > 0 && wn + bn + wr + br + wq + bq == 0 {
            let mut light = 0;
            let mut dark = 0;
            for (sq, piece) in pos.pieces() {
                if piece.kind == Bishop {
                    if sq.is_light() {
                        light += 1;
                    } else {
                        dark += 1;
                    }
                }
            }
            if light == 0 || dark == 0 {
                return true;
            }
        }

        // Minor piece against minor piece.
        white == 3 && black == 3
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen;

    fn quiet_engine() -> Engine {
        let mut engine = Engine::new();
        engine.tunables.quiet = true;
        engine
    }

    fn engine_at(fen: &str) -> Engine {
        let mut engine = quiet_engine();
        engine.set_position(Position::from_fen(fen).unwrap());
        engine
    }

    fn legal_moves(pos: &Position) -> Vec<Move> {
        let mut pseudo = Vec::new();
        movegen::generate_moves(pos, &mut pseudo);
        let mut scratch = pos.clone();
        pseudo
            .into_iter()
            .filter(|&mov| {
                scratch.make_move(mov);
                let ok = !scratch.is_check(scratch.side_to_move().toggle());
                scratch.unmake_move(mov);
                ok
            })
            .collect()
    }

    fn play(engine: &mut Engine, moves: &[&str]) {
        for &text in moves {
            let mov = movegen::move_from_uci(engine.position(), text)
                .unwrap_or_else(|| panic!("illegal scripted move {}", text));
            engine.position_mut().make_move(mov);
        }
    }

    #[test]
    fn depth_one_returns_a_legal_opening_move() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 1;

        let best = engine.think(&mut NullInterruptSource).expect("a move");
        assert!(legal_moves(&Position::starting()).contains(&best));
        assert!(engine.last_score().abs() <= 100);
        assert!(!engine.principal_variation().is_empty());
    }

    #[test]
    fn fools_mate_is_found() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 4;
        play(&mut engine, &["f2f3", "e7e5", "g2g4"]);

        let best = engine.think(&mut NullInterruptSource).expect("a move");
        assert_eq!(best.as_uci(), "d8h4");
        assert_eq!(engine.last_score(), CHECKMATE - 1);
    }

    #[test]
    fn back_rank_mate_in_one() {
        let mut engine = engine_at("6k1/5ppp/8/8/8/8/8/4R2K w - - 0 1");
        engine.tunables.search_depth = 3;

        let best = engine.think(&mut NullInterruptSource).expect("a move");
        assert_eq!(best.as_uci(), "e1e8");
        assert_eq!(engine.last_score(), CHECKMATE - 1);
    }

    #[test]
    fn stalemate_returns_no_move() {
        let mut engine = engine_at("8/8/8/8/8/kq6/8/K7 w - - 0 1");
        let end = engine.end_of_game();
        assert_eq!(end.result, Some(GameOver::Stalemate));
        assert_eq!(end.legal_moves, 0);
        assert_eq!(engine.think(&mut NullInterruptSource), None);
    }

    #[test]
    fn checkmated_position_returns_no_move() {
        // Fool's mate, one move later: White is mated.
        let mut engine = quiet_engine();
        play(&mut engine, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        let end = engine.end_of_game();
        assert_eq!(end.result, Some(GameOver::Checkmate(Color::Black)));
        assert_eq!(engine.think(&mut NullInterruptSource), None);
    }

    #[test]
    fn bare_kings_are_a_draw() {
        let mut engine = engine_at("8/8/4k3/8/4K3/8/8/8 w - - 0 1");
        assert_eq!(
            engine.end_of_game().result,
            Some(GameOver::InsufficientMaterial)
        );
        assert_eq!(engine.think(&mut NullInterruptSource), None);
    }

    #[test]
    fn minor_piece_endings_draw() {
        // King and knight versus king.
        let mut engine = engine_at("8/8/4k3/8/4K3/8/8/1N6 w - - 0 1");
        assert_eq!(
            engine.end_of_game().result,
            Some(GameOver::InsufficientMaterial)
        );

        // Minor piece against minor piece.
        let mut engine = engine_at("8/8/4kb2/8/4K3/2B5/8/8 w - - 0 1");
        assert_eq!(
            engine.end_of_game().result,
            Some(GameOver::InsufficientMaterial)
        );

        // Two bishops on the same colour cannot make progress either.
        let mut engine = engine_at("8/8/4k3/8/4KB2/8/1B6/8 w - - 0 1");
        assert_eq!(
            engine.end_of_game().result,
            Some(GameOver::InsufficientMaterial)
        );

        // Two bishops on opposite colours can mate.
        let mut engine = engine_at("8/8/4k3/8/4KB2/8/8/5B2 w - - 0 1");
        assert_eq!(engine.end_of_game().result, None);

        // A rook is plenty of material.
        let mut engine = engine_at("8/8/4k3/8/4KR2/8/8/8 w - - 0 1");
        assert_eq!(engine.end_of_game().result, None);
    }

    #[test]
    fn threefold_repetition_is_detected() {
        let mut engine = quiet_engine();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        play(&mut engine, &shuffle);
        assert_eq!(engine.end_of_game().result, None);

        play(&mut engine, &shuffle);
        assert_eq!(engine.end_of_game().result, Some(GameOver::Repetition));
        assert_eq!(engine.think(&mut NullInterruptSource), None);
    }

    #[test]
    fn repetition_draws_inside_the_search() {
        let mut engine = quiet_engine();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        play(&mut engine, &shuffle);
        play(&mut engine, &shuffle);

        // The third occurrence is on the board; any non-root frame scores
        // it as a draw outright.
        let score = engine.alphabeta(&mut NullInterruptSource, 1, 3, -INFINITY, INFINITY);
        assert_eq!(score, DRAW);
    }

    #[test]
    fn seventy_five_move_rule() {
        let mut engine = engine_at("4k3/8/8/8/8/8/8/R3K3 w - - 150 1");
        assert_eq!(engine.end_of_game().result, Some(GameOver::MoveRule));

        let mut engine = engine_at("4k3/8/8/8/8/8/8/R3K3 w - - 149 1");
        assert_eq!(engine.end_of_game().result, None);
    }

    #[test]
    fn single_legal_move_skips_the_search() {
        // The cornered white king has exactly one square left.
        let mut engine = engine_at("7r/8/8/8/8/8/2k5/K7 w - - 0 1");
        let end = engine.end_of_game();
        assert_eq!(end.result, None);
        assert_eq!(end.legal_moves, 1);

        let best = engine.think(&mut NullInterruptSource).expect("a move");
        assert_eq!(best, end.only_move);
        assert_eq!(engine.nodes(), 0);
    }

    #[test]
    fn zero_time_budget_never_touches_the_cache() {
        let mut engine = quiet_engine();
        engine.tunables.max_time_ms = 0;
        assert_eq!(engine.think(&mut NullInterruptSource), None);
        assert_eq!(engine.cache().positions(), 0);
        assert_eq!(engine.nodes(), 0);
    }

    #[test]
    fn tiny_time_budget_still_returns_a_legal_move() {
        let mut engine = quiet_engine();
        engine.tunables.max_time_ms = 1;
        engine.tunables.update_interval = 4_096;

        let best = engine.think(&mut NullInterruptSource).expect("a move");
        assert!(legal_moves(&Position::starting()).contains(&best));
    }

    #[test]
    fn scores_stay_inside_the_mate_bounds() {
        let fens = [
            crate::position::START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "6k1/5ppp/8/8/8/8/8/4R2K w - - 0 1",
        ];
        for fen in fens {
            let mut engine = engine_at(fen);
            engine.tunables.search_depth = 3;
            engine.think(&mut NullInterruptSource);
            assert!(
                engine.last_score().abs() <= CHECKMATE,
                "score out of bounds for {}",
                fen
            );
        }
    }

    #[test]
    fn principal_variation_is_a_legal_line() {
        let mut engine = engine_at("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        engine.tunables.search_depth = 3;
        engine.think(&mut NullInterruptSource).expect("a move");

        let mut pos = engine.position().clone();
        for &mov in engine.principal_variation() {
            assert!(
                legal_moves(&pos).contains(&mov),
                "PV move {} is not legal in {}",
                mov,
                pos.as_fen()
            );
            pos.make_move(mov);
        }
    }

    #[test]
    fn search_leaves_the_position_untouched() {
        let mut engine = engine_at("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        engine.tunables.search_depth = 3;
        let fen_before = engine.position().as_fen();
        let hash_before = engine.position().zobrist_hash();

        engine.think(&mut NullInterruptSource);
        assert_eq!(engine.position().as_fen(), fen_before);
        assert_eq!(engine.position().zobrist_hash(), hash_before);
    }

    #[test]
    fn cache_does_not_change_the_shallow_search() {
        let mut cached = quiet_engine();
        cached.tunables.search_depth = 2;
        cached.tunables.use_cache = true;
        let cached_best = cached.think(&mut NullInterruptSource).expect("a move");

        let mut uncached = quiet_engine();
        uncached.tunables.search_depth = 2;
        uncached.tunables.use_cache = false;
        let uncached_best = uncached.think(&mut NullInterruptSource).expect("a move");

        assert_eq!(cached_best, uncached_best);
        assert_eq!(cached.last_score(), uncached.last_score());
    }

    #[test]
    fn transpositions_are_served_from_the_cache() {
        // Two move orders reaching the same position.
        let mut first = Position::starting();
        for text in ["e2e3", "d7d6", "d2d3"] {
            let mov = movegen::move_from_uci(&first, text).unwrap();
            first.make_move(mov);
        }
        let mut second = Position::starting();
        for text in ["d2d3", "d7d6", "e2e3"] {
            let mov = movegen::move_from_uci(&second, text).unwrap();
            second.make_move(mov);
        }
        assert_eq!(first.zobrist_hash(), second.zobrist_hash());

        let mut engine = quiet_engine();
        engine.set_position(first);
        engine.tunables.search_depth = 4;
        engine.think(&mut NullInterruptSource).expect("a move");
        let deep_score = engine.last_score();
        assert!(engine.cache().positions() > 0);

        // A shallower search of the transposed position rides the cache to
        // the same score.
        engine.set_position(second);
        engine.tunables.search_depth = 3;
        engine.think(&mut NullInterruptSource).expect("a move");
        assert!(engine.cache_hits() > 0);
        assert_eq!(engine.last_score(), deep_score);
    }

    #[test]
    fn foreign_command_interrupts_and_is_buffered() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 6;
        engine.tunables.update_interval = 1;

        let mut source = ScriptedInterruptSource::new(["quit"]);
        // The interrupt lands during iteration one, before any PV exists.
        assert_eq!(engine.think(&mut source), None);
        assert_eq!(engine.take_pending_command().as_deref(), Some("quit"));
        assert_eq!(engine.take_pending_command(), None);
    }

    #[test]
    fn noop_commands_do_not_interrupt() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 2;
        engine.tunables.update_interval = 1;

        let mut source =
            ScriptedInterruptSource::new([".", "?", "bk", "easy", "hard", "nopost", "post", "hint"]);
        let best = engine.think(&mut source).expect("a move");
        assert!(legal_moves(&Position::starting()).contains(&best));
        assert_eq!(engine.take_pending_command(), None);
    }

    #[test]
    fn clock_updates_are_consumed_mid_search() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 2;
        engine.tunables.update_interval = 1;

        let mut source = ScriptedInterruptSource::new(["time 500", "otim 700"]);
        engine.think(&mut source).expect("a move");
        assert_eq!(engine.clock_ms, 5_000);
        assert_eq!(engine.opponent_clock_ms, 7_000);
        assert_eq!(engine.take_pending_command(), None);
    }

    #[test]
    fn stop_handle_interrupts_the_search() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 8;
        engine.tunables.update_interval = 1;
        engine.stop_handle().store(true, MemoryOrdering::Release);

        assert_eq!(engine.think(&mut NullInterruptSource), None);
        engine.stop_handle().store(false, MemoryOrdering::Release);
    }

    #[test]
    fn new_game_clears_the_cache() {
        let mut engine = quiet_engine();
        engine.tunables.search_depth = 3;
        engine.think(&mut NullInterruptSource);
        assert!(engine.cache().positions() > 0);

        engine.new_game();
        assert_eq!(engine.cache().positions(), 0);
        assert_eq!(engine.position().as_fen(), crate::position::START_FEN);
    }
}
