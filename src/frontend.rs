use std::fmt;
use std::path::Path;

use crate::syntax::{Position, SourceFile};

/// One syntax error reported by the parser.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub pos: Position,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

/// Seam to the Glint parser. The real frontend lives in the compiler
/// proper; this crate only requires enough structure to overlay natives and
/// shadow declarations.
pub trait Frontend {
    /// Parses one source file. All syntax errors for the file are returned
    /// together; the augmentor decides how many to keep.
    fn parse_file(
        &self,
        path: &Path,
        source: &[u8],
    ) -> std::result::Result<SourceFile, Vec<SyntaxError>>;
}
