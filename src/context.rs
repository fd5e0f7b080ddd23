use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::trace;

use crate::paths;
use crate::version;
use crate::vfs::{FileMeta, VirtualFs};

/// The fixed pseudo-architecture every build targets.
pub const PSEUDO_ARCH: &str = "js";

/// Always-on build tag selecting the non-networked stdlib variants.
pub const TAG_NONET: &str = "nonet";
/// Always-on build tag selecting the non-FFI stdlib variants.
pub const TAG_NOFFI: &str = "noffi";
/// Implicit tag present while foreign-interface detection is enabled.
pub const TAG_FFI: &str = "ffi";

const KNOWN_OS: &[&str] = &["linux", "macos", "windows", "freebsd", "openbsd", "netbsd"];
const KNOWN_ARCH: &[&str] = &["amd64", "arm64", "arm", "386", "wasm", "riscv64", "js"];

/// Target tag for the machine the toolchain itself runs on. Tags are kept
/// underscore-free so they compose with the `_os_arch` file-name
/// convention.
#[must_use]
pub fn host_arch_tag() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "riscv64" => "riscv64",
        "arm" => "arm",
        _ => "amd64",
    }
}

/// Per-build lookup configuration: where packages live, which source files
/// qualify, and how to reach them. Effectively immutable once the session
/// is constructed; the resolver works on short-lived copies when a package
/// override needs to bend a field.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub lib_root: PathBuf,
    pub workspaces: Vec<PathBuf>,
    pub os: String,
    pub arch: String,
    pub install_suffix: String,
    pub build_tags: Vec<String>,
    pub release_tags: Vec<String>,
    /// Kept on so imports of the "ffi" pseudo-package are diagnosed rather
    /// than silently dropped.
    pub ffi_enabled: bool,
    dispatch: Dispatch,
}

#[derive(Debug, Clone)]
enum Dispatch {
    /// Real filesystem, with the embedded toolchain tree consulted first
    /// for paths under `<lib_root>/src/glintjs`.
    Host { toolchain_fs: Arc<VirtualFs> },
    /// Embedded tree only; used by the augmentor for the natives overlay.
    VirtualOnly { fs: Arc<VirtualFs> },
}

impl BuildContext {
    #[must_use]
    pub fn new(
        install_suffix: &str,
        build_tags: &[String],
        lib_root: PathBuf,
        workspaces: Vec<PathBuf>,
        toolchain_fs: Arc<VirtualFs>,
        language_minor: u32,
    ) -> Self {
        let mut tags = build_tags.to_vec();
        tags.push(TAG_NONET.to_string());
        tags.push(TAG_NOFFI.to_string());
        Self {
            lib_root,
            workspaces,
            os: std::env::consts::OS.to_string(),
            arch: PSEUDO_ARCH.to_string(),
            install_suffix: install_suffix.to_string(),
            build_tags: tags,
            release_tags: version::release_tags(language_minor),
            ffi_enabled: true,
            dispatch: Dispatch::Host { toolchain_fs },
        }
    }

    /// Synthetic context rooted at `/` over the natives tree, used by the
    /// augmentor to look up override packages.
    #[must_use]
    pub fn for_natives(fs: Arc<VirtualFs>, os: &str, arch: &str) -> Self {
        Self {
            lib_root: PathBuf::from("/"),
            workspaces: Vec::new(),
            os: os.to_string(),
            arch: arch.to_string(),
            install_suffix: String::new(),
            build_tags: Vec::new(),
            release_tags: Vec::new(),
            ffi_enabled: false,
            dispatch: Dispatch::VirtualOnly { fs },
        }
    }

    fn virtual_key(&self, path: &Path) -> Option<(&VirtualFs, String)> {
        match &self.dispatch {
            Dispatch::VirtualOnly { fs } => {
                Some((fs.as_ref(), path.to_string_lossy().replace('\\', "/")))
            }
            Dispatch::Host { toolchain_fs } => paths::under_toolchain_tree(path, &self.lib_root)
                .map(|key| (toolchain_fs.as_ref(), key)),
        }
    }

    #[must_use]
    pub fn is_dir(&self, path: &Path) -> bool {
        if let Some((fs, key)) = self.virtual_key(path) {
            if fs.is_dir(&key) {
                return true;
            }
            if matches!(self.dispatch, Dispatch::VirtualOnly { .. }) {
                return false;
            }
        }
        fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
    }

    pub fn read_dir(&self, path: &Path) -> io::Result<Vec<FileMeta>> {
        if let Some((fs, key)) = self.virtual_key(path) {
            if let Some(entries) = fs.read_dir(&key) {
                trace!(path = %path.display(), "read_dir served from embedded tree");
                return Ok(entries);
            }
            if matches!(self.dispatch, Dispatch::VirtualOnly { .. }) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
            }
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(FileMeta {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn open_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some((fs, key)) = self.virtual_key(path) {
            if let Some(contents) = fs.open(&key) {
                return Ok(contents.to_vec());
            }
            if matches!(self.dispatch, Dispatch::VirtualOnly { .. }) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
        }
        fs::read(path)
    }

    pub fn stat(&self, path: &Path) -> io::Result<FileMeta> {
        if let Some((fs, key)) = self.virtual_key(path) {
            if let Some(meta) = fs.stat(&key) {
                return Ok(meta);
            }
            if matches!(self.dispatch, Dispatch::VirtualOnly { .. }) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
        }
        let meta = fs::metadata(path)?;
        Ok(FileMeta {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            is_dir: meta.is_dir(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    /// Whether one `//build:` term is satisfied. A leading `!` negates.
    #[must_use]
    pub fn tag_ok(&self, term: &str) -> bool {
        let (negate, name) = match term.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, term),
        };
        self.tag_set_contains(name) != negate
    }

    fn tag_set_contains(&self, name: &str) -> bool {
        name == self.os
            || name == self.arch
            || (name == TAG_FFI && self.ffi_enabled)
            || self.build_tags.iter().any(|tag| tag == name)
            || self.release_tags.iter().any(|tag| tag == name)
    }

    /// Whether a file name's `_os` / `_arch` suffix convention admits it
    /// for this target. Segments before the first underscore never
    /// constrain, so `linux.g` is not an OS-specific file.
    #[must_use]
    pub fn file_matches_target(&self, name: &str) -> bool {
        let stem = name.split('.').next().unwrap_or(name);
        let Some(index) = stem.find('_') else {
            return true;
        };
        let mut parts: Vec<&str> = stem[index + 1..].split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return parts[n - 2] == self.os && parts[n - 1] == self.arch;
        }
        if n >= 1 {
            let last = parts[n - 1];
            if KNOWN_OS.contains(&last) {
                return last == self.os;
            }
            if KNOWN_ARCH.contains(&last) {
                return last == self.arch;
            }
        }
        true
    }
}
