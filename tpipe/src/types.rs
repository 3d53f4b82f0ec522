use std::ffi::CString;

use crate::resolve::Executable;

/// One program invocation within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
	pub index: usize,
	/// `argv[0]` is the program identifier. The exec call receives this as a
	/// null-terminated pointer array.
	pub argv: Vec<CString>,
	pub executable: Executable,
}

impl Stage {
	pub fn program(&self) -> &str {
		self.executable.display()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position { Sole, First, Middle, Last }

impl Position {
	pub fn of(index: usize, count: usize) -> Position {
		match (index, count) {
			(_, 1) => Position::Sole,
			(0, _) => Position::First,
			(i, n) if i + 1 == n => Position::Last,
			_ => Position::Middle,
		}
	}

	pub fn reads_pipe(self) -> bool {
		match self {
			Position::Middle | Position::Last => true,
			_ => false,
		}
	}

	pub fn writes_pipe(self) -> bool {
		match self {
			Position::First | Position::Middle => true,
			_ => false,
		}
	}
}
