use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::context::{self, BuildContext};
use crate::error::{Error, Result};
use crate::package::scan;
use crate::package::{ImportMode, PackageDescriptor, SCRIPT_SUFFIX, SOURCE_SUFFIX};
use crate::paths;
use crate::syntax::Position;
use crate::vfs::VirtualFs;

/// Resolves the package named by an import path, relative paths being
/// unresolvable when the working directory cannot be determined.
///
/// This is the configuration-injecting entry point; sessions go through
/// [`import_with_src_dir`] with their own context.
pub fn import_package(
    path: &str,
    mode: ImportMode,
    install_suffix: &str,
    build_tags: &[String],
    lib_root: PathBuf,
    workspaces: Vec<PathBuf>,
    toolchain_fs: Arc<VirtualFs>,
    language_minor: u32,
) -> Result<PackageDescriptor> {
    // A missing working directory only disables relative imports.
    let wd = env::current_dir().unwrap_or_default();
    let ctx = BuildContext::new(
        install_suffix,
        build_tags,
        lib_root,
        workspaces,
        toolchain_fs,
        language_minor,
    );
    import_with_src_dir(&ctx, path, &wd, mode, install_suffix)
}

/// Resolves an import path against a source directory, applying the
/// per-package overrides and file-list rewrites that make the standard
/// library buildable for the JavaScript target.
pub fn import_with_src_dir(
    ctx: &BuildContext,
    path: &str,
    src_dir: &Path,
    mode: ImportMode,
    install_suffix: &str,
) -> Result<PackageDescriptor> {
    let mut ctx = ctx.clone();
    let mut mode = mode;
    let mut is_virtual = false;
    match path {
        "syscall" => {
            // The system-call package needs a real architecture to pick up
            // its host definitions; the distinct install suffix keeps the
            // produced archive apart from a host-native one.
            ctx.arch = context::host_arch_tag().to_string();
            ctx.install_suffix = if install_suffix.is_empty() {
                "js".to_string()
            } else {
                format!("js_{install_suffix}")
            };
        }
        "syscall/js" => {
            // No compilable sources here; only the directory matters, the
            // implementation comes entirely from natives.
            mode.find_only = true;
        }
        "math/big" => {
            ctx.build_tags.push("math_big_pure".to_string());
        }
        "crypto/x509" | "os/user" => {
            // These carry FFI and non-FFI variants; pick the latter.
            ctx.ffi_enabled = false;
        }
        "glintjs/js" | "glintjs/nosync" => {
            // Served from the embedded toolchain tree; a vendored copy must
            // not shadow it.
            mode.ignore_vendor = true;
            is_virtual = true;
        }
        _ => {}
    }

    let mut pkg = lookup(&ctx, path, src_dir, mode)?;
    pkg.is_virtual = is_virtual;

    match path {
        "os" => {
            // The executable implementation files perform system calls from
            // package-scope initializers.
            pkg.g_files = paths::exclude_prefixed(&pkg.g_files, "executable_");
            // Keep the host-specific directory-entry helper out so output
            // does not depend on the build host.
            pkg.g_files = paths::exclude(&pkg.g_files, &["dirent_js.g"]);
        }
        "runtime" => {
            // Completely replaced by natives.
            pkg.g_files.clear();
        }
        "runtime/internal/sys" => {
            pkg.g_files = vec![format!("zos_{}.g", ctx.os), "zversion.g".to_string()];
        }
        "runtime/pprof" => {
            pkg.g_files.clear();
        }
        "internal/poll" => {
            pkg.g_files = paths::exclude(&pkg.g_files, &["fd_poll_runtime.g"]);
        }
        "sync" => {
            // The object pool assumes multi-threading; natives ship a
            // single-threaded replacement.
            pkg.g_files = paths::exclude(&pkg.g_files, &["pool.g"]);
        }
        "crypto/rand" => {
            pkg.g_files = vec!["rand.g".to_string(), "util.g".to_string()];
            pkg.test_files = paths::exclude(&pkg.test_files, &["rand_linux_test.g"]);
        }
        "crypto/x509" => {
            // OS root-certificate stores are unreachable from JavaScript.
            pkg.g_files = paths::include(
                &paths::exclude(&pkg.g_files, &[format!("root_{}.g", ctx.os).as_str()]),
                &["root_unix.g", "root_js.g"],
            );
        }
        "syscall/js" => {
            // Reuse the upstream tests for conformance; the implementation
            // itself is replaced.
            pkg.xtest_files = pkg.test_files.clone();
            pkg.xtest_files.push("js_test.g".to_string());
        }
        _ => {}
    }

    if !pkg.ffi_files.is_empty() {
        return Err(Error::ForeignImport {
            import_path: path.to_string(),
        });
    }

    if pkg.is_command() {
        pkg.object_path = pkg.bin_dir.join(format!("{}.js", pkg.base_name()));
    }

    if pkg.has_object()
        && pkg.object_path.starts_with(&ctx.lib_root)
        && !pkg.object_path.exists()
    {
        // The library tree is often read-only; a previously compiled copy
        // may live in a workspace instead.
        // TODO: check the remaining workspaces, not just the first.
        if let (Some(first), Ok(rel)) = (
            ctx.workspaces.first(),
            pkg.object_path.strip_prefix(&ctx.lib_root),
        ) {
            let candidate = first.join(rel);
            if candidate.exists() {
                pkg.object_path = candidate;
            }
        }
    }

    pkg.script_files = script_files_from_dir(&ctx, &pkg.dir)?;
    Ok(pkg)
}

/// Resolves the package located in `dir`, without the import-path override
/// tables.
pub fn import_dir(ctx: &BuildContext, dir: &Path, mode: ImportMode) -> Result<PackageDescriptor> {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(dir)
    };
    if !ctx.is_dir(&dir) {
        return Err(Error::resolve(format!(
            "cannot find package directory {}",
            dir.display()
        )));
    }

    let mut pkg = PackageDescriptor {
        dir: dir.clone(),
        bin_dir: default_bin_dir(ctx),
        ..PackageDescriptor::default()
    };
    match deduce_import_path(ctx, &dir) {
        Some((root, import_path, in_workspace)) => {
            pkg.import_path = import_path;
            if in_workspace {
                pkg.bin_dir = root.join("bin");
            }
            pkg.object_path = object_path_under(ctx, &root, &pkg.import_path);
        }
        None => {
            pkg.import_path = dir.display().to_string();
        }
    }

    if !mode.find_only {
        classify_files(ctx, &mut pkg)?;
    }
    if pkg.is_command() {
        pkg.object_path = pkg.bin_dir.join(format!("{}.js", pkg.base_name()));
    }
    pkg.script_files = script_files_from_dir(ctx, &pkg.dir)?;
    Ok(pkg)
}

/// Generic path-to-package lookup: locate the directory, classify its
/// sources, and compute the archive location. The natives overlay reuses
/// this against its own synthetic context.
pub(crate) fn lookup(
    ctx: &BuildContext,
    path: &str,
    src_dir: &Path,
    mode: ImportMode,
) -> Result<PackageDescriptor> {
    if path.is_empty() {
        return Err(Error::resolve("import path is empty"));
    }

    let mut pkg = PackageDescriptor {
        import_path: path.to_string(),
        bin_dir: default_bin_dir(ctx),
        ..PackageDescriptor::default()
    };
    let mut object_root: Option<PathBuf> = None;

    let is_relative = path.starts_with("./") || path.starts_with("../");
    if is_relative || Path::new(path).is_absolute() {
        let dir = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            if src_dir.as_os_str().is_empty() {
                return Err(Error::resolve(format!(
                    "cannot resolve relative import {path:?} without a working directory"
                )));
            }
            src_dir.join(path)
        };
        if !ctx.is_dir(&dir) {
            return Err(Error::resolve(format!(
                "cannot find package in {}",
                dir.display()
            )));
        }
        match deduce_import_path(ctx, &dir) {
            Some((root, import_path, in_workspace)) => {
                pkg.import_path = import_path;
                if in_workspace {
                    pkg.bin_dir = root.join("bin");
                }
                object_root = Some(root);
            }
            None => {
                pkg.import_path = dir.display().to_string();
            }
        }
        pkg.dir = dir;
    } else {
        if !mode.ignore_vendor && !src_dir.as_os_str().is_empty() {
            if let Some(vendored) = vendor_lookup(ctx, path, src_dir) {
                // Vendored archives are not persisted; the session rebuilds
                // them in memory.
                pkg.dir = vendored;
            }
        }
        if pkg.dir.as_os_str().is_empty() {
            let root_dir = ctx.lib_root.join("src").join(path);
            if ctx.is_dir(&root_dir) {
                pkg.dir = root_dir;
                object_root = Some(ctx.lib_root.clone());
            } else {
                for workspace in &ctx.workspaces {
                    let candidate = workspace.join("src").join(path);
                    if ctx.is_dir(&candidate) {
                        pkg.dir = candidate;
                        pkg.bin_dir = workspace.join("bin");
                        object_root = Some(workspace.clone());
                        break;
                    }
                }
            }
        }
        if pkg.dir.as_os_str().is_empty() {
            let mut tried = vec![ctx.lib_root.join("src").join(path)];
            tried.extend(
                ctx.workspaces
                    .iter()
                    .map(|workspace| workspace.join("src").join(path)),
            );
            let tried = tried
                .iter()
                .map(|candidate| format!("\t{}", candidate.display()))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::resolve(format!(
                "cannot find package \"{path}\" in any of:\n{tried}"
            )));
        }
    }

    if let Some(root) = object_root {
        pkg.object_path = object_path_under(ctx, &root, &pkg.import_path);
    }

    debug!(import_path = %pkg.import_path, dir = %pkg.dir.display(), "located package");

    if mode.find_only {
        return Ok(pkg);
    }
    classify_files(ctx, &mut pkg)?;
    Ok(pkg)
}

fn default_bin_dir(ctx: &BuildContext) -> PathBuf {
    ctx.workspaces
        .first()
        .map(|workspace| workspace.join("bin"))
        .unwrap_or_else(|| ctx.lib_root.join("bin"))
}

fn object_path_under(ctx: &BuildContext, root: &Path, import_path: &str) -> PathBuf {
    root.join("pkg")
        .join(target_dir(ctx))
        .join(format!("{import_path}.a"))
}

/// `<os>_<arch>` plus the install suffix, segregating archive caches
/// compiled with different options.
fn target_dir(ctx: &BuildContext) -> String {
    let mut name = format!("{}_{}", ctx.os, ctx.arch);
    if !ctx.install_suffix.is_empty() {
        name.push('_');
        name.push_str(&ctx.install_suffix);
    }
    name
}

fn deduce_import_path(ctx: &BuildContext, dir: &Path) -> Option<(PathBuf, String, bool)> {
    if let Ok(rel) = dir.strip_prefix(ctx.lib_root.join("src")) {
        return Some((ctx.lib_root.clone(), slashify(rel), false));
    }
    for workspace in &ctx.workspaces {
        if let Ok(rel) = dir.strip_prefix(workspace.join("src")) {
            return Some((workspace.clone(), slashify(rel), true));
        }
    }
    None
}

fn slashify(rel: &Path) -> String {
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks from `src_dir` up to its source root looking for a vendored copy.
fn vendor_lookup(ctx: &BuildContext, path: &str, src_dir: &Path) -> Option<PathBuf> {
    let src_root = source_root_of(ctx, src_dir)?;
    let mut current = src_dir.to_path_buf();
    loop {
        let candidate = current.join("vendor").join(path);
        if ctx.is_dir(&candidate) {
            return Some(candidate);
        }
        if current == src_root || !current.pop() {
            return None;
        }
    }
}

fn source_root_of(ctx: &BuildContext, dir: &Path) -> Option<PathBuf> {
    let root_src = ctx.lib_root.join("src");
    if dir.starts_with(&root_src) {
        return Some(root_src);
    }
    ctx.workspaces
        .iter()
        .map(|workspace| workspace.join("src"))
        .find(|src| dir.starts_with(src))
}

fn classify_files(ctx: &BuildContext, pkg: &mut PackageDescriptor) -> Result<()> {
    let entries = ctx.read_dir(&pkg.dir).map_err(|err| {
        Error::resolve(format!(
            "cannot read package directory {}: {err}",
            pkg.dir.display()
        ))
    })?;

    let mut package_name: Option<String> = None;
    for entry in entries {
        if entry.is_dir {
            continue;
        }
        let name = entry.name;
        if !name.ends_with(SOURCE_SUFFIX) || name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if !ctx.file_matches_target(&name) {
            continue;
        }

        let full = pkg.dir.join(&name);
        let source = ctx.open_file(&full)?;
        let header = scan::scan_header(&String::from_utf8_lossy(&source))
            .map_err(|message| Error::resolve(format!("{}: {message}", full.display())))?;

        if let Some(terms) = &header.build_terms {
            if !terms.iter().all(|term| ctx.tag_ok(term)) {
                continue;
            }
        }

        if header.imports_ffi() {
            // With detection disabled the non-FFI variant files are the
            // ones that qualify; this file simply does not participate.
            if ctx.ffi_enabled {
                pkg.ffi_files.push(name);
            }
            continue;
        }

        if name.ends_with("_test.g") {
            if header.package_name.ends_with("_test") {
                pkg.xtest_files.push(name);
            } else {
                pkg.test_files.push(name);
            }
            continue;
        }

        match &package_name {
            None => package_name = Some(header.package_name.clone()),
            Some(existing) if *existing != header.package_name => {
                return Err(Error::resolve(format!(
                    "found packages {existing} and {} in {}",
                    header.package_name,
                    pkg.dir.display()
                )));
            }
            _ => {}
        }

        for import in &header.imports {
            if !pkg.imports.contains(&import.path) {
                pkg.imports.push(import.path.clone());
            }
            pkg.import_positions
                .entry(import.path.clone())
                .or_default()
                .push(Position::new(full.display().to_string(), import.line, 1));
        }
        pkg.g_files.push(name);
    }

    if pkg.g_files.is_empty() && pkg.ffi_files.is_empty() {
        return Err(Error::resolve(format!(
            "no buildable Glint source files in {}",
            pkg.dir.display()
        )));
    }
    pkg.name = package_name.unwrap_or_default();
    Ok(())
}

/// Collects the auxiliary script files of a package directory.
fn script_files_from_dir(ctx: &BuildContext, dir: &Path) -> Result<Vec<String>> {
    let entries = ctx.read_dir(dir)?;
    Ok(entries
        .into_iter()
        .filter(|entry| {
            !entry.is_dir
                && entry.name.ends_with(SCRIPT_SUFFIX)
                && !entry.name.starts_with('_')
                && !entry.name.starts_with('.')
        })
        .map(|entry| entry.name)
        .collect())
}
