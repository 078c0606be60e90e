//! Strongly typed identifiers used by the session layer.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use uuid::Builder as UuidBuilder;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "RawIdentifier", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl TryFrom<RawIdentifier> for $name {
			type Error = IdentifierError;

			fn try_from(value: RawIdentifier) -> Result<Self, Self::Error> {
				match value {
					RawIdentifier::Text(text) => Self::try_from(text),
					RawIdentifier::Number(number) => Ok(Self(number.to_string())),
				}
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (user, correlation).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (user, correlation).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (user, correlation).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Wire form accepted for identifiers; backends emit user ids as strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
#[doc(hidden)]
pub enum RawIdentifier {
	/// JSON string form.
	Text(String),
	/// JSON number form.
	Number(i64),
}

def_id! { UserId, "Backend identifier of an authenticated user.", "User" }
def_id! { CorrelationId, "Per-call tracing identifier carried in `X-Correlation-Id`.", "Correlation" }

impl CorrelationId {
	/// Generates a fresh identifier in the random (v4) UUID layout.
	pub fn generate() -> Self {
		let bytes: [u8; 16] = rand::random();

		Self(UuidBuilder::from_random_bytes(bytes).into_uuid().hyphenated().to_string())
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
