//! Reaping launched stages and describing how they ended.

use std::ffi::CStr;
use std::fmt;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::debug;

use crate::errors::WaitError;
use crate::launcher::{self, ProcessRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
	Exited(i32),
	Signaled { signal: Signal, core_dumped: bool },
	/// The stage is left stopped; it is not resumed.
	Stopped(Signal),
	ExecFailed(Errno),
}

impl Termination {
	/// Maps a wait status to a final outcome. `None` for states that are not
	/// an outcome (still running, continued).
	pub fn classify(status: WaitStatus) -> Option<Termination> {
		match status {
			WaitStatus::Exited(_, code) => Some(Termination::Exited(code)),
			WaitStatus::Signaled(_, signal, core_dumped) => Some(Termination::Signaled { signal: signal, core_dumped: core_dumped }),
			WaitStatus::Stopped(_, signal) => Some(Termination::Stopped(signal)),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(_, signal, _) => Some(Termination::Stopped(signal)),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceSyscall(_) => Some(Termination::Stopped(Signal::SIGTRAP)),
			WaitStatus::Continued(_) | WaitStatus::StillAlive => None,
		}
	}

	/// Exit status a shell would give for this outcome.
	pub fn exit_code(&self) -> i32 {
		match *self {
			Termination::Exited(code) => code,
			Termination::Signaled { signal, .. } => 128 + signal as i32,
			Termination::Stopped(signal) => 128 + signal as i32,
			Termination::ExecFailed(err) => launcher::exec_failure_status(err),
		}
	}
}

fn describe_signal(signal: Signal) -> String {
	let text = unsafe {
		let ptr = libc::strsignal(signal as libc::c_int);
		if ptr.is_null() {
			None
		} else {
			Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
		}
	};
	match text {
		Some(text) => format!("{}: {}", signal.as_str(), text),
		None => signal.as_str().to_string(),
	}
}

impl fmt::Display for Termination {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Termination::Exited(code) => write!(f, "exited normally with status {}", code),
			Termination::Signaled { signal, core_dumped } => {
				write!(f, "terminated by signal {} ({})", signal as i32, describe_signal(signal))?;
				if core_dumped {
					write!(f, ", core dumped")?;
				}
				Ok(())
			},
			Termination::Stopped(signal) => write!(f, "stopped by signal {} ({})", signal as i32, describe_signal(signal)),
			Termination::ExecFailed(err) => write!(f, "could not be executed: {}", err.desc()),
		}
	}
}

/// Resource usage of one reaped process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
	pub user: Duration,
	pub system: Duration,
	/// Voluntary plus involuntary.
	pub context_switches: u64,
}

fn timeval_duration(tv: libc::timeval) -> Duration {
	let secs = tv.tv_sec.max(0) as u64;
	let micros = tv.tv_usec.clamp(0, 999_999) as u32;
	Duration::new(secs, micros * 1000)
}

impl From<&libc::rusage> for Usage {
	fn from(ru: &libc::rusage) -> Usage {
		Usage {
			user: timeval_duration(ru.ru_utime),
			system: timeval_duration(ru.ru_stime),
			context_switches: (ru.ru_nvcsw.max(0) + ru.ru_nivcsw.max(0)) as u64,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
	pub stage: usize,
	pub pid: Pid,
	pub program: String,
	pub termination: Termination,
	pub elapsed: Duration,
	pub usage: Usage,
}

impl fmt::Display for CompletionReport {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "Process {} ({}) {}", self.pid, self.program, self.termination)?;
		write!(f, "  real {:.2}s  user {:.2}s  system {:.2}s  context switches {}",
		       self.elapsed.as_secs_f64(),
		       self.usage.user.as_secs_f64(),
		       self.usage.system.as_secs_f64(),
		       self.usage.context_switches)
	}
}

/// `wait4` on any child, including stops. Retries on EINTR.
fn wait_any() -> nix::Result<(Pid, WaitStatus, libc::rusage)> {
	let mut status: libc::c_int = 0;
	let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
	loop {
		let res = unsafe { libc::wait4(-1, &mut status, libc::WUNTRACED, &mut ru) };
		match Errno::result(res) {
			Ok(raw) => {
				let pid = Pid::from_raw(raw);
				return Ok((pid, WaitStatus::from_raw(pid, status)?, ru));
			},
			Err(Errno::EINTR) => continue,
			Err(e) => return Err(e),
		}
	}
}

/// Builds the report of a record the moment its process is reaped.
fn complete(record: ProcessRecord, termination: Termination, ru: &libc::rusage) -> CompletionReport {
	let elapsed = record.started.elapsed();
	let termination = match record.exec_error {
		Some(err) => Termination::ExecFailed(err),
		None => termination,
	};
	debug!(stage = record.stage, pid = %record.pid, ?termination, ?elapsed, "stage reaped");
	CompletionReport {
		stage: record.stage,
		pid: record.pid,
		program: record.program,
		termination: termination,
		elapsed: elapsed,
		usage: Usage::from(ru),
	}
}

/// Reaps every recorded process in whatever order they end or stop, and
/// returns one result per record in the records' order.
///
/// Each process is timed when it is reaped, so a stage that ends early is not
/// charged for a slower stage launched before it. If waiting fails, every
/// process not yet reaped gets that error.
pub fn wait_all(records: Vec<ProcessRecord>) -> Vec<Result<CompletionReport, WaitError>> {
	let mut results: Vec<Option<Result<CompletionReport, WaitError>>> = records.iter().map(|_| None).collect();
	let mut pending: Vec<Option<ProcessRecord>> = records.into_iter().map(Some).collect();
	let mut remaining = pending.len();
	while remaining > 0 {
		match wait_any() {
			Ok((pid, status, ru)) => {
				let slot = match pending.iter().position(|r| r.as_ref().map_or(false, |r| r.pid == pid)) {
					Some(slot) => slot,
					None => {
						debug!(%pid, "reaped a process outside the pipeline");
						continue;
					},
				};
				let termination = match Termination::classify(status) {
					Some(termination) => termination,
					None => continue,
				};
				if let Some(record) = pending[slot].take() {
					results[slot] = Some(Ok(complete(record, termination, &ru)));
					remaining -= 1;
				}
			},
			Err(e) => {
				for (slot, record) in pending.iter_mut().enumerate() {
					if let Some(record) = record.take() {
						results[slot] = Some(Err(WaitError { pid: record.pid, program: record.program, source: e }));
					}
				}
				remaining = 0;
			},
		}
	}
	results.into_iter().flatten().collect()
}
