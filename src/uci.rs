// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A minimal UCI shell around the engine.
//!
//! A reader thread pumps stdin lines into a channel. While idle, the shell
//! blocks on that channel; while searching, the engine itself drains it
//! through its interrupt source, so `stop` and `quit` reach a running
//! search. A command that stops a search is buffered by the engine and
//! handled here once `think` returns.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::Result;

use crate::movegen;
use crate::position::Position;
use crate::search::{ChannelInterruptSource, Engine};
use crate::trace::SearchTrace;

pub fn run(trace: Option<SearchTrace>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut engine = Engine::new();
    engine.tunables.uci = true;
    if let Some(trace) = trace {
        engine.set_trace(trace);
    }

    loop {
        let line = match engine.take_pending_command() {
            Some(line) => line,
            None => match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };

        tracing::debug!(command = %line, "uci command");
        if !handle_command(&mut engine, &rx, &line) {
            break;
        }
    }

    Ok(())
}

/// Dispatches one command line. Returns `false` on `quit`.
fn handle_command(engine: &mut Engine, rx: &Receiver<String>, line: &str) -> bool {
    let components: Vec<&str> = line.split_whitespace().collect();
    let (&command, arguments) = match components.split_first() {
        Some(split) => split,
        None => return true,
    };

    match command {
        "uci" => {
            println!(
                "id name {} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
            println!("id author {}", env!("CARGO_PKG_AUTHORS"));
            println!("uciok");
        }
        "isready" => println!("readyok"),
        "ucinewgame" => engine.new_game(),
        "position" => handle_position(engine, arguments),
        "go" => handle_go(engine, rx, arguments),
        // A search that was running has already been stopped by the time
        // this is read back out of the buffer.
        "stop" => {}
        "quit" => return false,
        _ => tracing::warn!(command, "unrecognized command"),
    }

    true
}

fn handle_position(engine: &mut Engine, arguments: &[&str]) {
    let (mut position, rest) = match arguments.split_first() {
        Some((&"startpos", rest)) => (Position::starting(), rest),
        Some((&"fen", rest)) => {
            let fen_words: Vec<&str> =
                rest.iter().take_while(|&&w| w != "moves").copied().collect();
            match Position::from_fen(&fen_words.join(" ")) {
                Ok(position) => (position, &rest[fen_words.len()..]),
                Err(err) => {
                    tracing::warn!(%err, "rejecting position command");
                    return;
                }
            }
        }
        _ => {
            tracing::warn!("position requires startpos or fen");
            return;
        }
    };

    if let Some((&"moves", moves)) = rest.split_first() {
        for &text in moves {
            match movegen::move_from_uci(&position, text) {
                Some(mov) => position.make_move(mov),
                None => {
                    tracing::warn!(%text, "rejecting illegal move in position command");
                    return;
                }
            }
        }
    }

    engine.set_position(position);
}

fn handle_go(engine: &mut Engine, rx: &Receiver<String>, arguments: &[&str]) {
    let mut wtime = None;
    let mut btime = None;
    let mut winc = 0u64;
    let mut binc = 0u64;
    let mut movetime = None;
    let mut depth = None;
    let mut infinite = false;

    let mut words = arguments.iter();
    while let Some(&word) = words.next() {
        let mut number = || words.next().and_then(|w| w.parse::<u64>().ok());
        match word {
            "wtime" => wtime = number(),
            "btime" => btime = number(),
            "winc" => winc = number().unwrap_or(0),
            "binc" => binc = number().unwrap_or(0),
            "movetime" => movetime = number(),
            "depth" => depth = number(),
            "infinite" => infinite = true,
            _ => {}
        }
    }

    if let Some(depth) = depth {
        engine.tunables.search_depth = depth as u32;
    }

    if let Some(movetime) = movetime {
        engine.set_clocks(0, 0, 0);
        engine.tunables.max_time_ms = movetime;
    } else if infinite || (wtime.is_none() && btime.is_none()) {
        engine.set_clocks(0, 0, 0);
        engine.tunables.max_time_ms = u64::MAX / 2;
    } else {
        let (own, opponent, increment) = match engine.position().side_to_move() {
            crate::core::Color::White => (wtime.unwrap_or(0), btime.unwrap_or(0), winc),
            crate::core::Color::Black => (btime.unwrap_or(0), wtime.unwrap_or(0), binc),
        };
        engine.set_clocks(own, opponent, increment);
    }

    let mut source = ChannelInterruptSource::new(rx);
    match engine.think(&mut source) {
        Some(best) => println!("bestmove {}", best),
        None => println!("bestmove 0000"),
    }
}
