// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Machine-readable search diagnostics.
//!
//! When a trace sink is attached to the engine, every search appends a
//! stream of JSON-lines events to it: one event when the search starts, one
//! per completed deepening iteration, and one when the search returns. The
//! records are meant for offline analysis of search behaviour, not for
//! humans mid-game.

use std::io::Write;

use derive_more::From;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub elapsed_ms: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Serialize, From)]
pub enum TraceEventKind {
    Started(SearchStarted),
    Depth(DepthCompleted),
    Ended(SearchEnded),
}

#[derive(Debug, Serialize)]
pub struct SearchStarted {
    pub fen: String,
    pub depth_limit: u32,
    pub max_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct DepthCompleted {
    pub depth: u32,
    pub score: i32,
    pub nodes: u64,
    pub pv: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchEnded {
    pub best_move: Option<String>,
    pub nodes: u64,
}

/// A sink for search events. Serialization failures are swallowed; tracing
/// must never interfere with the search that is being traced.
pub struct SearchTrace {
    writer: Box<dyn Write + Send>,
}

impl SearchTrace {
    pub fn new<W: Write + Send + 'static>(writer: W) -> SearchTrace {
        SearchTrace {
            writer: Box::new(writer),
        }
    }

    pub fn record<K: Into<TraceEventKind>>(&mut self, elapsed_ms: u64, kind: K) {
        let event = TraceEvent {
            elapsed_ms,
            kind: kind.into(),
        };
        if serde_json::to_writer(&mut self.writer, &event).is_ok() {
            let _ = writeln!(&mut self.writer);
            let _ = self.writer.flush();
        }
    }
}
