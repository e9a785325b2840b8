use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flips the quoted region on and off. Never part of a token.
pub const QUOTE_TOGGLE: char = '|';

/// An executable and its arguments, parsed from one configured command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
	pub executable: String,
	pub arguments: Vec<String>,
}

/// Raw tokenizer output. `open_quote` is set when the input ended inside a
/// `|...|` region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
	pub tokens: Vec<String>,
	pub open_quote: bool,
}

/// Split on unquoted spaces. Spaces inside `|...|` are kept, runs of spaces
/// outside collapse.
pub fn tokenize(raw: &str) -> Tokens {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut quoted = false;

	for c in raw.chars() {
		match c {
			QUOTE_TOGGLE => quoted = !quoted,
			' ' if quoted => current.push(c),
			' ' => {
				if !current.is_empty() {
					tokens.push(std::mem::take(&mut current));
				}
			}
			_ => current.push(c),
		}
	}

	if !current.is_empty() {
		tokens.push(current);
	}

	Tokens {
		tokens,
		open_quote: quoted,
	}
}

impl CommandSpec {
	pub fn new(executable: impl Into<String>, arguments: Vec<String>) -> Self {
		Self {
			executable: executable.into(),
			arguments,
		}
	}

	/// Parse a configured command line.
	///
	/// Empty input and an odd number of `|` are configuration errors rather
	/// than entries to skip.
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		let Tokens { tokens, open_quote } = tokenize(raw);
		if open_quote {
			return Err(ConfigError::UnbalancedQuote { raw: raw.to_string() });
		}

		let mut tokens = tokens.into_iter();
		let executable = tokens
			.next()
			.ok_or_else(|| ConfigError::EmptyCommand { raw: raw.to_string() })?;

		Ok(Self {
			executable,
			arguments: tokens.collect(),
		})
	}

	/// Parse every configured command, failing on the first bad one.
	pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Self>, ConfigError> {
		if raws.is_empty() {
			return Err(ConfigError::NoCommands);
		}
		raws.iter().map(|raw| Self::parse(raw.as_ref())).collect()
	}

	/// Render back into the configuration syntax, quoting tokens that hold spaces.
	pub fn to_command_line(&self) -> String {
		std::iter::once(&self.executable)
			.chain(self.arguments.iter())
			.map(|token| {
				if token.contains(' ') {
					format!("{}{}{}", QUOTE_TOGGLE, token, QUOTE_TOGGLE)
				} else {
					token.clone()
				}
			})
			.collect::<Vec<_>>()
			.join(" ")
	}
}

impl FromStr for CommandSpec {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for CommandSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_command_line())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn strings(items: &[&str]) -> Vec<String> {
		items.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn parse_simple_command() {
		let spec = CommandSpec::parse("node server.js").unwrap();
		assert_eq!(spec.executable, "node");
		assert_eq!(spec.arguments, strings(&["server.js"]));
	}

	#[test]
	fn parse_quoted_region_keeps_spaces() {
		let spec = CommandSpec::parse("cmd |run this| --flag").unwrap();
		assert_eq!(spec.executable, "cmd");
		assert_eq!(spec.arguments, strings(&["run this", "--flag"]));
	}

	#[test]
	fn parse_executable_only() {
		let spec = CommandSpec::parse("worker").unwrap();
		assert_eq!(spec.executable, "worker");
		assert!(spec.arguments.is_empty());
	}

	#[test]
	fn repeated_spaces_collapse() {
		let tokens = tokenize("  a   b  c ");
		assert_eq!(tokens.tokens, strings(&["a", "b", "c"]));
		assert!(!tokens.open_quote);
	}

	#[test]
	fn toggle_joins_adjacent_text() {
		// the toggle only changes state, so it can sit mid-token
		let tokens = tokenize("--name=|my app| x");
		assert_eq!(tokens.tokens, strings(&["--name=my app", "x"]));
	}

	#[test]
	fn empty_quoted_region_produces_no_token() {
		let tokens = tokenize("a || b");
		assert_eq!(tokens.tokens, strings(&["a", "b"]));
	}

	#[test]
	fn tabs_are_literal() {
		let tokens = tokenize("a\tb c");
		assert_eq!(tokens.tokens, strings(&["a\tb", "c"]));
	}

	#[test]
	fn empty_input_is_config_error() {
		assert!(matches!(CommandSpec::parse(""), Err(ConfigError::EmptyCommand { .. })));
		assert!(matches!(CommandSpec::parse("   "), Err(ConfigError::EmptyCommand { .. })));
		assert!(matches!(CommandSpec::parse("||"), Err(ConfigError::EmptyCommand { .. })));
	}

	#[test]
	fn unbalanced_toggle_is_config_error() {
		let tokens = tokenize("cmd |never closed");
		assert!(tokens.open_quote);
		assert_eq!(tokens.tokens, strings(&["cmd", "never closed"]));

		let err = CommandSpec::parse("cmd |never closed").unwrap_err();
		assert!(matches!(err, ConfigError::UnbalancedQuote { .. }));
		assert!(err.to_string().contains("never closed"));
	}

	#[test]
	fn parse_all_stops_on_first_error() {
		let ok = CommandSpec::parse_all(&["a b", "c"]).unwrap();
		assert_eq!(ok.len(), 2);

		let err = CommandSpec::parse_all(&["a b", "", "c"]).unwrap_err();
		assert!(matches!(err, ConfigError::EmptyCommand { .. }));

		let none: [&str; 0] = [];
		assert!(matches!(CommandSpec::parse_all(&none), Err(ConfigError::NoCommands)));
	}

	#[test]
	fn rejoined_tokens_match_unquoted_split() {
		let inputs = [
			"node server.js --port 8080",
			"python |my script.py| -v",
			"a |b c| |d e f| g",
			"  spaced   out  ",
		];
		for input in inputs {
			let spec = CommandSpec::parse(input).unwrap();
			let rendered = spec.to_command_line();
			assert_eq!(CommandSpec::parse(&rendered).unwrap(), spec, "input: {}", input);

			if !input.contains(QUOTE_TOGGLE) {
				let joined = std::iter::once(spec.executable.clone())
					.chain(spec.arguments.clone())
					.collect::<Vec<_>>()
					.join(" ");
				let expected: Vec<&str> = input.split(' ').filter(|t| !t.is_empty()).collect();
				assert_eq!(joined.split(' ').collect::<Vec<_>>(), expected);
			}
		}
	}

	#[test]
	fn display_quotes_multi_word_tokens() {
		let spec = CommandSpec::new("cmd", strings(&["run this", "--flag"]));
		assert_eq!(spec.to_string(), "cmd |run this| --flag");
	}
}
