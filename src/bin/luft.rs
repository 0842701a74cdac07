// Copyright 2022 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use luft::trace::SearchTrace;
use luft::uci;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
struct Options {
    /// Append a JSON-lines trace of every search to this file.
    #[structopt(long)]
    trace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let options = Options::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let trace = match options.trace {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create trace file {}", path.display()))?;
            Some(SearchTrace::new(file))
        }
        None => None,
    };

    uci::run(trace)
}
