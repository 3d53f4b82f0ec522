use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStringExt;

use crate::errors::ParseError;
use crate::resolve::Executable;
use crate::types::Stage;

/// Token separating two stages. Only an exact match counts.
pub const DELIMITER: &str = "!";

type ParseResult<T> = Result<T, ParseError>;

struct Parser<I> {
	tokens: I,
	stages: Vec<Stage>,
}

impl<I: Iterator<Item = OsString>> Parser<I> {
	/// Collects tokens up to the next delimiter. Returns the stage's words and
	/// whether a delimiter ended it.
	fn read_stage(&mut self) -> (Vec<OsString>, bool) {
		let mut words = vec![];
		while let Some(token) = self.tokens.next() {
			if token == DELIMITER {
				return (words, true);
			}
			words.push(token);
		}
		(words, false)
	}

	fn push_stage(&mut self, words: Vec<OsString>) -> ParseResult<()> {
		let index = self.stages.len();
		if words.is_empty() {
			return Err(ParseError::EmptyStage { index: index });
		}
		let argv = words.into_iter()
			.map(|w| CString::new(w.into_vec()))
			.collect::<Result<Vec<CString>, _>>()?;
		let executable = Executable::resolve(&argv[0]);
		self.stages.push(Stage { index: index, argv: argv, executable: executable });
		Ok(())
	}

	fn parse_pipeline(mut self) -> ParseResult<Vec<Stage>> {
		loop {
			let (words, more) = self.read_stage();
			self.push_stage(words)?;
			if !more {
				return Ok(self.stages);
			}
		}
	}
}

/// Splits the arguments following the program name into stages.
pub fn parse<I>(args: I) -> ParseResult<Vec<Stage>>
	where I: IntoIterator, I::Item: Into<OsString>
{
	let mut tokens = args.into_iter().map(Into::<OsString>::into).peekable();
	if tokens.peek().is_none() {
		return Err(ParseError::EmptyInvocation);
	}
	Parser { tokens: tokens, stages: vec![] }.parse_pipeline()
}
