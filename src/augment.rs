//! Source augmentation: parse a package's sources while overlaying the
//! declarations shipped in the natives tree.
//!
//! Natives files are added to the package as-is. Every top-level name they
//! define joins the replacement set; original declarations with a replaced
//! name are renamed to `_` (and function bodies dropped, so they cannot
//! pin imports the replacement does not need). Initializer functions stay
//! additive, and brand-new native names simply coexist with the originals.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::context::{self, BuildContext};
use crate::error::{Error, ErrorList, Result};
use crate::frontend::{Frontend, SyntaxError};
use crate::package::{resolver, ImportMode, PackageDescriptor, NOSYNC_IMPORT, SYNC_IMPORT};
use crate::syntax::{Decl, SourceFile, BLANK};
use crate::vfs::VirtualFs;

/// Standard-library packages whose sources import the concurrency package;
/// their `sync` imports resolve to the toolchain's no-op replacement.
const NOSYNC_PACKAGES: &[&str] = &[
    "crypto/rand",
    "encoding/gob",
    "encoding/json",
    "expvar",
    "log",
    "math/big",
    "math/rand",
    "regexp",
    "time",
];

const EXTERNAL_TEST_SUFFIX: &str = "_test";
const MAX_ERRORS_PER_FILE: usize = 10;

/// Parses all primary sources of `pkg`, overlaid with its natives package
/// when one exists. Syntax errors are accumulated across files.
pub fn parse_and_augment(
    ctx: &BuildContext,
    frontend: &dyn Frontend,
    natives_fs: &Arc<VirtualFs>,
    pkg: &PackageDescriptor,
    is_test: bool,
) -> Result<Vec<SourceFile>> {
    let mut files: Vec<SourceFile> = Vec::new();
    let mut replaced: HashSet<String> = HashSet::new();

    let is_xtest = pkg.import_path.ends_with(EXTERNAL_TEST_SUFFIX);
    let base_import = if is_xtest {
        &pkg.import_path[..pkg.import_path.len() - EXTERNAL_TEST_SUFFIX.len()]
    } else {
        pkg.import_path.as_str()
    };

    let mut natives_ctx = BuildContext::for_natives(Arc::clone(natives_fs), &ctx.os, &ctx.arch);
    if base_import == "syscall" {
        // The natives for the system-call package are classified against
        // the host architecture, same as the package itself.
        natives_ctx.arch = context::host_arch_tag().to_string();
        natives_ctx.build_tags.push("js".to_string());
    }

    if let Ok(native) = resolver::lookup(&natives_ctx, base_import, Path::new(""), ImportMode::default())
    {
        let mut names = native.g_files.clone();
        if is_test {
            names.extend(native.test_files.iter().cloned());
        }
        if is_xtest {
            names = native.xtest_files.clone();
        }
        debug!(import_path = base_import, count = names.len(), "overlaying natives");
        for name in &names {
            let full = native.dir.join(name);
            let source = natives_ctx.open_file(&full)?;
            let file = frontend.parse_file(&full, &source).map_err(|errors| {
                // Natives ship with the toolchain; they are expected to parse.
                Error::internal(format!(
                    "cannot parse native override {}: {}",
                    full.display(),
                    ErrorList::from(errors)
                ))
            })?;
            for decl in &file.decls {
                match decl {
                    Decl::Func(func) => {
                        replaced.insert(func.qualified_name());
                    }
                    Decl::Type(decl) => {
                        for spec in &decl.specs {
                            replaced.insert(spec.name.clone());
                        }
                    }
                    Decl::Value(decl) => {
                        for spec in &decl.specs {
                            for name in &spec.names {
                                replaced.insert(name.clone());
                            }
                        }
                    }
                }
            }
            files.push(file);
        }
    }
    // Initializers are additive, never shadowed.
    replaced.remove("init");

    let mut errors = ErrorList::new();
    for name in &pkg.g_files {
        // Loose-file builds may list absolute sources directly.
        let full = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            pkg.dir.join(name)
        };
        let source = ctx.open_file(&full)?;
        let mut file = match frontend.parse_file(&full, &source) {
            Ok(file) => file,
            Err(list) => {
                errors.extend(cap_errors(list));
                continue;
            }
        };

        if NOSYNC_PACKAGES.contains(&pkg.import_path.as_str()) {
            for import in &mut file.imports {
                if import.path == SYNC_IMPORT {
                    if import.alias.is_none() {
                        // Unqualified references must keep resolving.
                        import.alias = Some(SYNC_IMPORT.to_string());
                    }
                    import.path = NOSYNC_IMPORT.to_string();
                }
            }
        }

        for decl in &mut file.decls {
            match decl {
                Decl::Func(func) => {
                    if replaced.contains(&func.qualified_name()) {
                        func.name = BLANK.to_string();
                        func.body = None;
                    }
                }
                Decl::Type(decl) => {
                    for spec in &mut decl.specs {
                        if replaced.contains(&spec.name) {
                            spec.name = BLANK.to_string();
                        }
                    }
                }
                Decl::Value(decl) => {
                    for spec in &mut decl.specs {
                        for name in &mut spec.names {
                            if replaced.contains(name.as_str()) {
                                *name = BLANK.to_string();
                            }
                        }
                    }
                }
            }
        }

        prune_unused_imports(&mut file);
        files.push(file);
    }

    if !errors.is_empty() {
        return Err(Error::Parse(errors));
    }
    Ok(files)
}

/// Keeps at most ten errors per file, appending a sentinel when truncated.
fn cap_errors(mut list: Vec<SyntaxError>) -> Vec<SyntaxError> {
    if list.len() > MAX_ERRORS_PER_FILE {
        let pos = list[MAX_ERRORS_PER_FILE - 1].pos.clone();
        list.truncate(MAX_ERRORS_PER_FILE);
        list.push(SyntaxError {
            pos,
            message: "too many errors".to_string(),
        });
    }
    list
}

/// Shadowed bodies may have been the only users of an import.
fn prune_unused_imports(file: &mut SourceFile) {
    let retained: Vec<bool> = file
        .imports
        .iter()
        .map(|import| {
            let local = import.local_name();
            local == "_" || local == "." || file.uses_qualifier(local)
        })
        .collect();
    let mut keep = retained.into_iter();
    file.imports.retain(|_| keep.next().unwrap_or(false));
}
