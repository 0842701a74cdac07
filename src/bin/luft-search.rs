// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! One-shot analysis: search a FEN to a fixed depth and print the result.

use anyhow::{anyhow, Result};
use luft::search::{Engine, NullInterruptSource};
use luft::Position;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Options {
    /// FEN of the position to analyze.
    #[structopt(name = "FEN")]
    fen: String,
    /// Depth to search to.
    #[structopt(short, long, default_value = "6")]
    depth: u32,
    /// Serialize the result as JSON.
    #[structopt(long)]
    json: bool,
}

fn main() -> Result<()> {
    let options = Options::from_args();
    let position = Position::from_fen(&options.fen)
        .map_err(|err| anyhow!("bad FEN {:?}: {}", options.fen, err))?;

    let mut engine = Engine::with_position(position);
    engine.tunables.search_depth = options.depth;
    engine.tunables.max_time_ms = u64::MAX / 2;
    engine.tunables.quiet = true;

    let best = engine.think(&mut NullInterruptSource);
    let pv: Vec<String> = engine
        .principal_variation()
        .iter()
        .map(|m| m.as_uci())
        .collect();

    if options.json {
        let result = serde_json::json!({
            "best_move": best.map(|m| m.as_uci()),
            "score": engine.last_score(),
            "nodes": engine.nodes(),
            "pv": pv,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match best {
            Some(best) => println!(
                "best {} score {} nodes {} pv {}",
                best,
                engine.last_score(),
                engine.nodes(),
                pv.join(" ")
            ),
            None => println!("game over, no move"),
        }
    }

    Ok(())
}
