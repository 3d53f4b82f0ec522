use std::ffi::{CStr, CString, OsStr};
use std::fs;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// How the exec call locates the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
	/// `target` is a filesystem path, passed to `execv` as is.
	Path,
	/// `target` is a bare name, resolved against `PATH` by `execvp`.
	Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
	pub target: CString,
	pub lookup: Lookup,
	shown: String,
}

fn is_path(name: &[u8]) -> bool {
	match name.first() {
		Some(&b'/') | Some(&b'.') => true,
		_ => false,
	}
}

fn canonicalize(name: &CStr) -> Option<CString> {
	let path = fs::canonicalize(OsStr::from_bytes(name.to_bytes())).ok()?;
	CString::new(path.into_os_string().into_vec()).ok()
}

impl Executable {
	/// Resolves the program identifier of a stage.
	///
	/// A path that cannot be canonicalized (missing file, dangling symlink) is
	/// kept verbatim; the failure shows up when the stage is exec'd.
	pub fn resolve(name: &CStr) -> Executable {
		let (target, lookup) = if is_path(name.to_bytes()) {
			(canonicalize(name).unwrap_or_else(|| name.to_owned()), Lookup::Path)
		} else {
			(name.to_owned(), Lookup::Search)
		};
		let shown = String::from_utf8_lossy(target.to_bytes()).into_owned();
		Executable { target: target, lookup: lookup, shown: shown }
	}

	pub fn display(&self) -> &str {
		&self.shown
	}
}
