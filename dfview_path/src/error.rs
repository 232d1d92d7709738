use std::{error::Error, fmt};

/// A syntax error while parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError(pub String);

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path syntax error: {}", self.0)
    }
}

impl Error for PathParseError {}
