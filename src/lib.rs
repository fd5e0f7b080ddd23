//! Build orchestration core for the glintjs compiler.
//!
//! Given an import path, a package directory, or a set of loose source
//! files, this crate resolves the transitive dependency graph, locates
//! sources on disk or in the embedded toolchain trees, overlays the
//! natives replacements onto parsed sources, drives the downstream code
//! generator per package, caches the resulting archives in memory and on
//! disk, and links executables into a single JavaScript artifact with an
//! optional source map.
//!
//! The parser and the code generator live in the compiler proper and are
//! reached through the [`frontend::Frontend`] and [`codegen::CodeGen`]
//! seams; a [`session::Session`] owns one of each for the duration of a
//! top-level build.

pub mod augment;
pub mod codegen;
pub mod context;
pub mod error;
pub mod frontend;
pub mod link;
pub mod package;
pub mod paths;
pub mod session;
pub mod sourcemap;
pub mod syntax;
pub mod version;
pub mod vfs;
pub mod watch;

#[cfg(test)]
pub(crate) mod testkit;

pub use codegen::{Archive, CodeGen, ImportContext, TypeInfo};
pub use context::BuildContext;
pub use error::{Error, ErrorList, Result};
pub use frontend::{Frontend, SyntaxError};
pub use package::{ImportMode, PackageDescriptor};
pub use session::{Options, Session};
pub use vfs::VirtualFs;
