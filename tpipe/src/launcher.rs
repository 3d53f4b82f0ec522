use std::convert::Infallible;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::time::Instant;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::errors::LaunchError;
use crate::pipes::PipeTable;
use crate::resolve::Lookup;
use crate::signals::SignalPolicy;
use crate::types::Stage;

/// Exit status of a child whose program was not found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child whose program could not be run for another reason.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// A launched stage, waiting to be reaped.
#[derive(Debug)]
pub struct ProcessRecord {
	pub stage: usize,
	pub pid: Pid,
	pub program: String,
	pub started: Instant,
	/// Set when the child reported that exec failed.
	pub exec_error: Option<Errno>,
}

pub fn exec_failure_status(err: Errno) -> i32 {
	match err {
		Errno::ENOENT | Errno::ENOTDIR => EXIT_NOT_FOUND,
		_ => EXIT_CANNOT_EXECUTE,
	}
}

fn do_exec_stage(stage: &Stage, pipes: &mut PipeTable, signals: &SignalPolicy) -> nix::Result<Infallible> {
	signals.reset_in_child()?;
	pipes.attach(stage.index)?;
	let executable = &stage.executable;
	match executable.lookup {
		Lookup::Path => unistd::execv(executable.target.as_c_str(), stage.argv.as_slice()),
		Lookup::Search => unistd::execvp(executable.target.as_c_str(), stage.argv.as_slice()),
	}
}

/// Child side of a launch. Never returns into launcher code.
fn exec_stage(stage: &Stage, pipes: &mut PipeTable, signals: &SignalPolicy, status: OwnedFd) -> ! {
	let err = match do_exec_stage(stage, pipes, signals) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	let _ = writeln!(&mut io::stderr(), "tpipe: {}: exec failed: {}", stage.program(), err.desc());
	let _ = File::from(status).write_all(&(err as i32).to_ne_bytes());
	unsafe { libc::_exit(exec_failure_status(err)) }
}

/// Blocks until the child either execs (the close-on-exec write end goes
/// away, end of stream) or reports its exec errno.
fn read_exec_status(read: OwnedFd) -> Option<Errno> {
	let mut buf = [0u8; 4];
	match File::from(read).read_exact(&mut buf) {
		Ok(()) => Some(Errno::from_raw(i32::from_ne_bytes(buf))),
		Err(_) => None,
	}
}

fn launch_stage<W: Write>(stage: &Stage, pipes: &mut PipeTable, signals: &SignalPolicy, out: &mut W)
	-> Result<ProcessRecord, LaunchError>
{
	let (status_read, status_write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| LaunchError::StatusChannel {
		program: stage.program().to_string(),
		source: e,
	})?;
	let _ = out.flush();
	let started = Instant::now();
	let fork = unsafe { unistd::fork() }.map_err(|e| LaunchError::ForkFailed {
		program: stage.program().to_string(),
		source: e,
	})?;
	match fork {
		ForkResult::Child => {
			drop(status_read);
			exec_stage(stage, pipes, signals, status_write)
		},
		ForkResult::Parent { child: pid } => {
			pipes.release(stage.index);
			drop(status_write);
			let exec_error = read_exec_status(status_read);
			let _ = writeln!(out, "Process {} created with command {}", pid, stage.program());
			match exec_error {
				None => debug!(stage = stage.index, %pid, program = stage.program(), "stage launched"),
				Some(e) => debug!(stage = stage.index, %pid, program = stage.program(), error = e.desc(), "stage exec failed"),
			}
			Ok(ProcessRecord {
				stage: stage.index,
				pid: pid,
				program: stage.program().to_string(),
				started: started,
				exec_error: exec_error,
			})
		},
	}
}

/// Forks every stage, in order, before anything is waited on.
///
/// Launched stages are appended to `records` as they start, so on error the
/// caller still holds every child that is already running. The first failure
/// stops further launches.
pub fn launch_all<W: Write>(stages: &[Stage], pipes: &mut PipeTable, signals: &SignalPolicy,
                            records: &mut Vec<ProcessRecord>, out: &mut W) -> Result<(), LaunchError> {
	for stage in stages {
		let record = launch_stage(stage, pipes, signals, out)?;
		records.push(record);
	}
	Ok(())
}
