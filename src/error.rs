use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::frontend::SyntaxError;

/// Unified error type for the build pipeline.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// An import path could not be resolved to a buildable package.
    Resolve { message: String },
    /// The package pulls in foreign-function-interface sources, which the
    /// JavaScript target cannot express.
    ForeignImport { import_path: String },
    /// Accumulated syntax errors from one or more source files.
    Parse(ErrorList),
    Codegen { message: String },
    /// The installed toolchain does not match the code generator.
    Version { message: String },
    Internal { message: String },
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve {
            message: message.into(),
        }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }

    pub fn version(message: impl Into<String>) -> Self {
        Self::Version {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Resolve { message } => write!(f, "{message}"),
            Error::ForeignImport { import_path } => {
                write!(f, "{import_path}: importing \"ffi\" is not supported by glintjs")
            }
            Error::Parse(list) => write!(f, "{list}"),
            Error::Codegen { message } => write!(f, "codegen error: {message}"),
            Error::Version { message } => write!(f, "{message}"),
            Error::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

/// Syntax errors collected across a package's source files. One broken file
/// does not stop the others from being parsed, so callers can render every
/// diagnostic at once.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<SyntaxError>,
}

impl ErrorList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SyntaxError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = SyntaxError>) {
        self.errors.extend(errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }
}

impl From<Vec<SyntaxError>> for ErrorList {
    fn from(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}
