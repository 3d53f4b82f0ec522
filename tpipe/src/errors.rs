//! Error taxonomy of a pipeline invocation.
//!
//! Parse and allocation errors happen before any process exists. Launch and
//! wait errors carry the stage's program so the diagnostic names the failing
//! stage.

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
	#[error("no command given")]
	EmptyInvocation,

	#[error("stage {index} is empty (check delimiter placement)")]
	EmptyStage { index: usize },

	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] std::ffi::NulError),
}

#[derive(Error, Debug)]
pub enum LaunchError {
	#[error("cannot create pipe: {}", .0.desc())]
	ResourceExhausted(Errno),

	/// The per-stage exec status pipe could not be created. Stages before
	/// this one may already be running.
	#[error("{program}: cannot create exec status pipe: {}", .source.desc())]
	StatusChannel { program: String, source: Errno },

	#[error("{program}: fork failed: {}", .source.desc())]
	ForkFailed { program: String, source: Errno },
}


#[derive(Error, Debug)]
#[error("{program}: wait for process {pid} failed: {}", .source.desc())]
pub struct WaitError {
	pub pid: Pid,
	pub program: String,
	pub source: Errno,
}
