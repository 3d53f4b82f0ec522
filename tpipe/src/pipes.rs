//! The pipe descriptor table of one pipeline.
//!
//! `pipe[k]` connects stage `k`'s stdout to stage `k + 1`'s stdin. Every end
//! is held as an `Option<OwnedFd>`: releasing an end takes it out of the table
//! and drops it, so an end is closed exactly once and anything still held is
//! closed when the table goes away.

use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::unistd;
use tracing::{debug, trace};

use crate::errors::LaunchError;
use crate::types::Position;

#[derive(Debug)]
struct Pipe {
	read: Option<OwnedFd>,
	write: Option<OwnedFd>,
}

#[derive(Debug, Default)]
pub struct PipeTable {
	pipes: Vec<Pipe>,
}

impl PipeTable {
	/// Creates the `stages - 1` pipes of a pipeline of `stages` stages.
	///
	/// Every pipe is created close-on-exec. On failure the pipes created so
	/// far are closed and no stage may be launched.
	pub fn allocate(stages: usize) -> Result<PipeTable, LaunchError> {
		let count = stages.saturating_sub(1);
		let mut pipes = Vec::with_capacity(count);
		for _ in 0 .. count {
			let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::ResourceExhausted)?;
			trace!(read = read.as_raw_fd(), write = write.as_raw_fd(), "pipe created");
			pipes.push(Pipe { read: Some(read), write: Some(write) });
		}
		debug!(stages, pipes = count, "pipe table allocated");
		Ok(PipeTable { pipes: pipes })
	}

	pub fn len(&self) -> usize {
		self.pipes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pipes.is_empty()
	}

	/// Number of descriptors still held by this table.
	pub fn open_count(&self) -> usize {
		self.pipes.iter()
			.map(|p| p.read.is_some() as usize + p.write.is_some() as usize)
			.sum()
	}

	fn position(&self, stage: usize) -> Position {
		Position::of(stage, self.pipes.len() + 1)
	}

	/// Closes this process's copies of the ends owned by `stage`'s child.
	pub fn release(&mut self, stage: usize) {
		let position = self.position(stage);
		if position.reads_pipe() {
			drop(self.pipes[stage - 1].read.take());
		}
		if position.writes_pipe() {
			drop(self.pipes[stage].write.take());
		}
		trace!(stage, open = self.open_count(), "stage descriptors released");
	}

	/// Wires `stage`'s standard streams to its pipes and closes every
	/// descriptor in the table, leaving it empty. Meant to run in the stage's
	/// child.
	pub fn attach(&mut self, stage: usize) -> nix::Result<()> {
		let position = self.position(stage);
		if position.reads_pipe() {
			if let Some(fd) = self.pipes[stage - 1].read.take() {
				redirect(fd, libc::STDIN_FILENO)?;
			}
		}
		if position.writes_pipe() {
			if let Some(fd) = self.pipes[stage].write.take() {
				redirect(fd, libc::STDOUT_FILENO)?;
			}
		}
		self.pipes.clear();
		Ok(())
	}
}

/// Moves `fd` onto `target`, leaving `target` open across exec.
fn redirect(fd: OwnedFd, target: RawFd) -> nix::Result<()> {
	if fd.as_raw_fd() == target {
		// Already in place: keep it open and clear close-on-exec.
		let raw = fd.into_raw_fd();
		fcntl::fcntl(raw, FcntlArg::F_SETFD(FdFlag::empty()))?;
		return Ok(());
	}
	unistd::dup2(fd.as_raw_fd(), target)?;
	Ok(())
}
