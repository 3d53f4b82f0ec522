use std::ffi::OsString;
use std::io::{self, Write};

use tracing::{debug, warn};

use crate::errors::{LaunchError, ParseError};
use crate::launcher::{self, ProcessRecord};
use crate::parser;
use crate::pipes::PipeTable;
use crate::signals::SignalPolicy;
use crate::timekeeper::{self, CompletionReport, Termination};
use crate::types::Stage;

/// Exit status when the pipeline could not be fully launched or reaped.
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for malformed invocations.
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug)]
pub struct Pipeline {
	stages: Vec<Stage>,
}

/// What happened to one run of a pipeline.
#[derive(Debug, Default)]
pub struct Outcome {
	pub reports: Vec<CompletionReport>,
	/// Set when a stage could not be launched. Stages launched before it
	/// still ran to completion and are reported.
	pub launch_error: Option<LaunchError>,
	last_stage: usize,
}

impl Outcome {
	/// Exit status of the launcher: the last stage's status the way a shell
	/// computes it, or `EXIT_FAILURE` when the pipeline did not run whole.
	pub fn exit_code(&self) -> i32 {
		if self.launch_error.is_some() {
			return EXIT_FAILURE;
		}
		self.reports.iter()
			.find(|r| r.stage == self.last_stage)
			.map_or(EXIT_FAILURE, |r| r.termination.exit_code())
	}
}

impl Pipeline {
	pub fn parse<I>(args: I) -> Result<Pipeline, ParseError>
		where I: IntoIterator, I::Item: Into<OsString>
	{
		parser::parse(args).map(|stages| Pipeline { stages: stages })
	}

	fn launch<W: Write>(&self, signals: &SignalPolicy, records: &mut Vec<ProcessRecord>, out: &mut W)
		-> Result<(), LaunchError>
	{
		let mut pipes = PipeTable::allocate(self.stages.len())?;
		let launched = launcher::launch_all(&self.stages, &mut pipes, signals, records, out);
		debug!(open = pipes.open_count(), "closing remaining pipe descriptors");
		drop(pipes);
		launched
	}

	/// Runs every stage and reports each one on `out`, in launch order.
	///
	/// All stages are forked before the first wait, so no stage can block on
	/// a full pipe whose reader does not exist yet. A stage that cannot be
	/// waited on is reported on stderr and gets no report line.
	pub fn run<W: Write>(&self, signals: &SignalPolicy, out: &mut W) -> Outcome {
		let mut records = Vec::with_capacity(self.stages.len());
		let launch_error = self.launch(signals, &mut records, out).err();
		if let Some(ref e) = launch_error {
			let _ = writeln!(&mut io::stderr(), "tpipe: {}", e);
		}

		let mut outcome = Outcome {
			last_stage: self.stages.len().saturating_sub(1),
			launch_error: launch_error,
			..Outcome::default()
		};
		for result in timekeeper::wait_all(records) {
			match result {
				Ok(report) => {
					if let Termination::Stopped(_) = report.termination {
						warn!(pid = %report.pid, program = %report.program, "stage left stopped");
					}
					let _ = writeln!(out, "{}", report);
					outcome.reports.push(report);
				},
				Err(e) => {
					let _ = writeln!(&mut io::stderr(), "tpipe: {}", e);
				},
			}
		}
		let _ = out.flush();
		outcome
	}
}
