use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::syntax::Position;

pub mod resolver;
pub mod scan;

pub use resolver::{import_dir, import_package, import_with_src_dir};

/// Package name of executables.
pub const MAIN_PACKAGE: &str = "main";
/// Suffix of primary Glint source files.
pub const SOURCE_SUFFIX: &str = ".g";
/// Suffix of auxiliary scripts injected verbatim into linked output.
pub const SCRIPT_SUFFIX: &str = ".inc.js";
/// Pseudo-package whose import marks a file as foreign-interface code.
pub const FFI_IMPORT: &str = "ffi";
/// Pseudo-package satisfied by the code generator itself.
pub const UNSAFE_IMPORT: &str = "unsafe";
/// The concurrency package rewritten to its no-op replacement.
pub const SYNC_IMPORT: &str = "sync";
/// The toolchain's no-op concurrency replacement.
pub const NOSYNC_IMPORT: &str = "glintjs/nosync";

/// How a package lookup behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportMode {
    /// Stop after locating the directory; no file classification.
    pub find_only: bool,
    /// Skip vendor directories during lookup.
    pub ignore_vendor: bool,
}

/// One resolved, compilable unit. Mutable only during its own build call;
/// once its archive is cached, callers observe a stable view through the
/// session.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub import_path: String,
    /// Package name from the package clauses (empty for find-only lookups).
    pub name: String,
    /// Absolute directory; synthetic under the library root for virtual
    /// packages.
    pub dir: PathBuf,
    pub g_files: Vec<String>,
    pub script_files: Vec<String>,
    pub test_files: Vec<String>,
    pub xtest_files: Vec<String>,
    pub ffi_files: Vec<String>,
    pub imports: Vec<String>,
    /// Source positions referencing each import, used to tell declarations
    /// in this package's own files from implicit toolchain additions.
    pub import_positions: HashMap<String, Vec<Position>>,
    /// Where the compiled archive is (or would be) stored; empty when the
    /// package is not persistable.
    pub object_path: PathBuf,
    pub bin_dir: PathBuf,
    /// Sources come from the embedded toolchain tree; there is no
    /// watchable directory on disk.
    pub is_virtual: bool,
    /// Maximum modification time over own sources and transitive
    /// dependencies; populated during the build.
    pub source_mod_time: SystemTime,
    pub up_to_date: bool,
}

impl Default for PackageDescriptor {
    fn default() -> Self {
        Self {
            import_path: String::new(),
            name: String::new(),
            dir: PathBuf::new(),
            g_files: Vec::new(),
            script_files: Vec::new(),
            test_files: Vec::new(),
            xtest_files: Vec::new(),
            ffi_files: Vec::new(),
            imports: Vec::new(),
            import_positions: HashMap::new(),
            object_path: PathBuf::new(),
            bin_dir: PathBuf::new(),
            is_virtual: false,
            source_mod_time: SystemTime::UNIX_EPOCH,
            up_to_date: false,
        }
    }
}

impl PackageDescriptor {
    /// Executables are exactly the packages named `main`.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.name == MAIN_PACKAGE
    }

    #[must_use]
    pub fn has_object(&self) -> bool {
        !self.object_path.as_os_str().is_empty()
    }

    /// Last segment of the import path.
    #[must_use]
    pub fn base_name(&self) -> &str {
        self.import_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.import_path)
    }
}
