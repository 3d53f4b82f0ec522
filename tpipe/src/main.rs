use std::{env, io, process};

use anyhow::Context;
use tpipe::errors::ParseError;
use tpipe::logging;
use tpipe::pipeline::{self, Pipeline};
use tpipe::signals::SignalPolicy;

const USAGE: &str = "usage: tpipe program [args...] [! program [args...]]...";

fn run_main() -> anyhow::Result<i32> {
	logging::init_logging().context("initialising logging")?;

	let pipeline = match Pipeline::parse(env::args_os().skip(1)) {
		Ok(pipeline) => pipeline,
		Err(ParseError::EmptyInvocation) => return Ok(0),
		Err(e) => {
			eprintln!("tpipe: {}\n{}", e, USAGE);
			return Ok(pipeline::EXIT_USAGE);
		},
	};

	let signals = SignalPolicy::install().context("ignoring SIGINT")?;
	let outcome = pipeline.run(&signals, &mut io::stdout());
	Ok(outcome.exit_code())
}

fn main() {
	let code = match run_main() {
		Ok(code) => code,
		Err(err) => {
			eprintln!("tpipe: {:#}", err);
			pipeline::EXIT_FAILURE
		},
	};
	process::exit(code)
}
