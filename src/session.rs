//! The incremental compilation session: options, the archive and type
//! caches, staleness analysis, and the build/link entry points.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::augment;
use crate::codegen::{Archive, CodeGen, ImportContext, TypeInfo};
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::frontend::Frontend;
use crate::link::{self, SourceMapFilter};
use crate::package::{resolver, ImportMode, PackageDescriptor, MAIN_PACKAGE, SCRIPT_SUFFIX, UNSAFE_IMPORT};
use crate::paths;
use crate::sourcemap::SourceMap;
use crate::version;
use crate::vfs::VirtualFs;
use crate::watch::WatchSet;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RESET: &str = "\x1b[39m";

/// Environment override for the library root; takes precedence over the
/// host default.
pub const LIB_ROOT_ENV: &str = "GLINTJS_ROOT";
const HOST_ROOT_ENV: &str = "GLINTROOT";
const WORKSPACE_ENV: &str = "GLINTPATH";

/// Library root used when the options leave it unset: the toolchain's own
/// override variable, then the host toolchain default.
#[must_use]
pub fn default_lib_root() -> PathBuf {
    if let Some(root) = env::var_os(LIB_ROOT_ENV) {
        return PathBuf::from(root);
    }
    if let Some(root) = env::var_os(HOST_ROOT_ENV) {
        return PathBuf::from(root);
    }
    PathBuf::from("/usr/local/glint")
}

/// Workspace list used when the options leave it unset.
#[must_use]
pub fn default_workspace_path() -> String {
    if let Some(value) = env::var_os(WORKSPACE_ENV) {
        return value.to_string_lossy().into_owned();
    }
    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("glint").display().to_string())
        .unwrap_or_default()
}

/// Session configuration. Environment defaults are resolved once at
/// session construction; nothing is read from the process environment
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub lib_root: PathBuf,
    pub workspace_path: String,
    pub verbose: bool,
    pub quiet: bool,
    pub watch: bool,
    pub create_map_file: bool,
    pub map_to_local_disk: bool,
    pub minify: bool,
    pub color: bool,
    pub build_tags: Vec<String>,
    /// Embedded toolchain packages, mounted under `<lib_root>/src/glintjs`.
    pub toolchain_fs: Arc<VirtualFs>,
    /// Embedded natives overlay consumed by the augmentor.
    pub natives_fs: Arc<VirtualFs>,
}

impl Options {
    fn finalize(&mut self) {
        if self.lib_root.as_os_str().is_empty() {
            self.lib_root = default_lib_root();
        }
        if self.workspace_path.is_empty() {
            self.workspace_path = default_workspace_path();
        }
        self.verbose = self.verbose || self.watch;
    }

    #[must_use]
    pub fn workspaces(&self) -> Vec<PathBuf> {
        paths::split_path_list(&self.workspace_path)
    }

    /// Writes a diagnostic to stderr, framed red when color is on.
    pub fn print_error(&self, message: &str) {
        if self.color {
            eprint!("{ANSI_RED}{message}{ANSI_RESET}");
        } else {
            eprint!("{message}");
        }
    }

    /// Writes a progress message to stderr, framed green when color is on.
    /// Suppressed by `quiet`.
    pub fn print_success(&self, message: &str) {
        if self.quiet {
            return;
        }
        if self.color {
            eprint!("{ANSI_GREEN}{message}{ANSI_RESET}");
        } else {
            eprint!("{message}");
        }
    }
}

/// One top-level build invocation. Archives and type information live for
/// the session's lifetime; the first insertion of an import path wins and
/// all later requests observe it.
pub struct Session {
    options: Options,
    bctx: BuildContext,
    archives: HashMap<String, Rc<Archive>>,
    types: HashMap<String, Rc<TypeInfo>>,
    frontend: Rc<dyn Frontend>,
    codegen: Rc<dyn CodeGen>,
    watcher: Option<WatchSet>,
}

impl Session {
    pub fn new(
        mut options: Options,
        frontend: Rc<dyn Frontend>,
        codegen: Rc<dyn CodeGen>,
    ) -> Result<Self> {
        options.finalize();
        version::check_toolchain_version(&options.lib_root, codegen.language_version())?;

        let install_suffix = if options.minify { "min" } else { "" };
        let bctx = BuildContext::new(
            install_suffix,
            &options.build_tags,
            options.lib_root.clone(),
            options.workspaces(),
            Arc::clone(&options.toolchain_fs),
            codegen.language_version(),
        );
        let watcher = if options.watch {
            Some(WatchSet::new()?)
        } else {
            None
        };
        Ok(Self {
            options,
            bctx,
            archives: HashMap::new(),
            types: HashMap::new(),
            frontend,
            codegen,
            watcher,
        })
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn build_context(&self) -> &BuildContext {
        &self.bctx
    }

    #[must_use]
    pub fn install_suffix(&self) -> &'static str {
        if self.options.minify {
            "min"
        } else {
            ""
        }
    }

    /// The cached archive for an import path, if it has been built.
    #[must_use]
    pub fn archive(&self, import_path: &str) -> Option<Rc<Archive>> {
        self.archives.get(import_path).cloned()
    }

    /// Type information the code generator produced for an import path.
    #[must_use]
    pub fn type_info(&self, import_path: &str) -> Option<Rc<TypeInfo>> {
        self.types.get(import_path).cloned()
    }

    /// Builds the package found in `package_dir` and, for executables,
    /// links the output (defaulting to `<base>.js` in the working
    /// directory).
    pub fn build_dir(&mut self, package_dir: &Path, output: Option<&Path>) -> Result<()> {
        if let Some(watcher) = &mut self.watcher {
            watcher.add(package_dir);
        }
        let mut pkg = resolver::import_dir(&self.bctx, package_dir, ImportMode::default())?;
        let archive = self.build_package(&mut pkg)?;

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => {
                let base = package_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "out".to_string());
                PathBuf::from(format!("{base}.js"))
            }
        };
        if pkg.is_command() && !pkg.up_to_date {
            let archive = archive
                .ok_or_else(|| Error::internal("command package produced no archive"))?;
            self.write_command_package(&archive, &output)?;
        }
        Ok(())
    }

    /// Builds a `main` package synthesized from loose files, partitioned
    /// into sources and scripts by suffix, and links the output.
    pub fn build_files(
        &mut self,
        filenames: &[String],
        output: &Path,
        package_dir: &Path,
    ) -> Result<()> {
        let mut pkg = PackageDescriptor {
            import_path: MAIN_PACKAGE.to_string(),
            name: MAIN_PACKAGE.to_string(),
            dir: package_dir.to_path_buf(),
            ..PackageDescriptor::default()
        };
        for file in filenames {
            if file.ends_with(SCRIPT_SUFFIX) {
                pkg.script_files.push(file.clone());
            } else {
                pkg.g_files.push(file.clone());
            }
        }

        let archive = self
            .build_package(&mut pkg)?
            .ok_or_else(|| Error::internal("loose-file build produced no archive"))?;
        let is_main = self
            .types
            .get(MAIN_PACKAGE)
            .map(|info| info.name == MAIN_PACKAGE)
            .unwrap_or(false);
        if !is_main {
            return Err(Error::resolve("cannot build/run non-main package"));
        }
        self.write_command_package(&archive, output)
    }

    /// Resolves and builds an import path. `None` exactly when the package
    /// is an executable whose linked output is already up to date.
    pub fn build_import_path(&mut self, path: &str) -> Result<Option<Rc<Archive>>> {
        let (_pkg, archive) = self.build_import_path_in(path, Path::new(""))?;
        Ok(archive)
    }

    fn build_import_path_in(
        &mut self,
        path: &str,
        src_dir: &Path,
    ) -> Result<(PackageDescriptor, Option<Rc<Archive>>)> {
        let mut pkg =
            resolver::import_with_src_dir(&self.bctx, path, src_dir, ImportMode::default(), self.install_suffix())?;
        if let Some(watcher) = &mut self.watcher {
            watcher.add(&pkg.dir);
        }
        let archive = self.build_package(&mut pkg)?;
        Ok((pkg, archive))
    }

    /// Builds one resolved package: memoized per import path, staleness
    /// checked against the stored archive, dependencies built depth-first.
    /// Returns `None` exactly for up-to-date executables.
    pub fn build_package(&mut self, pkg: &mut PackageDescriptor) -> Result<Option<Rc<Archive>>> {
        if let Some(archive) = self.archives.get(&pkg.import_path) {
            return Ok(Some(Rc::clone(archive)));
        }

        if pkg.has_object() {
            // Seed with the toolchain binary's own modification time so a
            // toolchain upgrade invalidates every cached archive.
            pkg.source_mod_time = match env::current_exe()
                .and_then(fs::metadata)
                .and_then(|meta| meta.modified())
            {
                Ok(time) => time,
                Err(_) => {
                    eprintln!(
                        "Could not get the glintjs binary's modification timestamp. Please report issue."
                    );
                    SystemTime::now()
                }
            };

            let imports = pkg.imports.clone();
            for import in imports {
                if import == UNSAFE_IMPORT || !self.import_in_own_files(pkg, &import) {
                    // Implicit toolchain additions do not feed staleness.
                    continue;
                }
                let src_dir = pkg.dir.clone();
                let (dep, _archive) = self.build_import_path_in(&import, &src_dir)?;
                if dep.source_mod_time > pkg.source_mod_time {
                    pkg.source_mod_time = dep.source_mod_time;
                }
            }

            let mut newest = pkg.source_mod_time;
            for name in pkg.g_files.iter().chain(pkg.script_files.iter()) {
                let meta = self.bctx.stat(&pkg.dir.join(name))?;
                if meta.modified > newest {
                    newest = meta.modified;
                }
            }
            pkg.source_mod_time = newest;

            if let Ok(object_meta) = fs::metadata(&pkg.object_path) {
                let object_time = object_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                if pkg.source_mod_time <= object_time {
                    pkg.up_to_date = true;
                    if pkg.is_command() {
                        return Ok(None);
                    }
                    debug!(import_path = %pkg.import_path, "loading up-to-date archive");
                    let data = fs::read(&pkg.object_path)?;
                    let generator = Rc::clone(&self.codegen);
                    let archive = {
                        let mut imports = SessionImports::new(self, pkg.dir.clone());
                        generator.read_archive(&pkg.import_path, &data, &mut imports)?
                    };
                    let archive = Rc::new(archive);
                    self.archives
                        .insert(pkg.import_path.clone(), Rc::clone(&archive));
                    return Ok(Some(archive));
                }
            }
        }

        let files = augment::parse_and_augment(
            &self.bctx,
            self.frontend.as_ref(),
            &self.options.natives_fs,
            pkg,
            false,
        )?;

        let generator = Rc::clone(&self.codegen);
        let minify = self.options.minify;
        let mut archive = {
            let mut imports = SessionImports::new(self, pkg.dir.clone());
            generator.compile(&pkg.import_path, files, minify, &mut imports)?
        };

        for script in &pkg.script_files {
            let code = self.bctx.open_file(&pkg.dir.join(script))?;
            archive
                .included_scripts
                .extend_from_slice(b"\t(function() {\n");
            archive.included_scripts.extend_from_slice(&code);
            archive
                .included_scripts
                .extend_from_slice(b"\n\t}).call($global);\n");
        }

        if self.options.verbose {
            println!("{}", pkg.import_path);
        }
        info!(import_path = %pkg.import_path, "compiled package");

        let archive = Rc::new(archive);
        self.archives
            .insert(pkg.import_path.clone(), Rc::clone(&archive));

        if !pkg.has_object() || pkg.is_command() {
            return Ok(Some(archive));
        }

        if let Err(err) = self.write_library_package(&archive, &pkg.object_path) {
            if pkg.object_path.starts_with(&self.options.lib_root) {
                // The library tree may be read-only; persist under the
                // first workspace instead.
                if let (Some(first), Ok(rel)) = (
                    self.bctx.workspaces.first().cloned(),
                    pkg.object_path.strip_prefix(&self.options.lib_root),
                ) {
                    self.write_library_package(&archive, &first.join(rel))?;
                    return Ok(Some(archive));
                }
            }
            return Err(err);
        }
        Ok(Some(archive))
    }

    /// Whether an import is mentioned by one of the package's own source
    /// files, rather than added implicitly by the toolchain.
    fn import_in_own_files(&self, pkg: &PackageDescriptor, import: &str) -> bool {
        let Some(positions) = pkg.import_positions.get(import) else {
            return false;
        };
        positions.iter().any(|pos| {
            let base = Path::new(&pos.filename)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("");
            pkg.g_files.iter().any(|file| file == base)
        })
    }

    fn write_library_package(&self, archive: &Archive, object_path: &Path) -> Result<()> {
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(object_path)?;
        self.codegen.write_archive(archive, &mut file)
    }

    /// Links an executable: walks the transitive archive closure, emits
    /// the program through the source-map filter, and finalizes the
    /// optional `.map` sibling.
    pub fn write_command_package(&mut self, archive: &Rc<Archive>, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let base = output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out.js".to_string());

        let generator = Rc::clone(&self.codegen);
        let deps = generator.dependency_closure(archive, &mut |path| {
            if let Some(existing) = self.archives.get(path) {
                return Ok(Rc::clone(existing));
            }
            let (_pkg, built) = self.build_import_path_in(path, Path::new(""))?;
            built.ok_or_else(|| Error::internal(format!("dependency {path} produced no archive")))
        })?;
        debug!(output = %output.display(), deps = deps.len(), "linking command package");

        let mut code_file = fs::File::create(output)?;
        if self.options.create_map_file {
            let mut map_name = output.as_os_str().to_os_string();
            map_name.push(".map");
            let mut map_file = fs::File::create(PathBuf::from(map_name))?;
            let mut map = SourceMap::new(&base);
            {
                let mut filter = SourceMapFilter::new(&mut code_file);
                filter.set_mapping_callback(link::mapping_callback(
                    &mut map,
                    self.options.lib_root.clone(),
                    self.bctx.workspaces.clone(),
                    self.options.map_to_local_disk,
                ));
                generator.write_program(&deps, &mut filter)?;
            }
            map.write_to(&mut map_file)?;
            writeln!(code_file, "//# sourceMappingURL={base}.map")?;
        } else {
            let mut filter = SourceMapFilter::new(&mut code_file);
            generator.write_program(&deps, &mut filter)?;
        }
        Ok(())
    }

    /// Blocks until a watched source changes. No-op without `watch`.
    pub fn wait_for_change(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.wait_for_change(&self.options);
        }
    }
}

/// Import resolution handed to the code generator: re-enters the session
/// for dependency builds, with a per-build memo so the type checker does
/// not repeat the recursion for every mention of a path.
struct SessionImports<'a> {
    session: &'a mut Session,
    src_dir: PathBuf,
    local: HashMap<String, Rc<Archive>>,
}

impl<'a> SessionImports<'a> {
    fn new(session: &'a mut Session, src_dir: PathBuf) -> Self {
        Self {
            session,
            src_dir,
            local: HashMap::new(),
        }
    }
}

impl ImportContext for SessionImports<'_> {
    fn import(&mut self, path: &str) -> Result<Rc<Archive>> {
        if let Some(archive) = self.local.get(path) {
            return Ok(Rc::clone(archive));
        }
        let src_dir = self.src_dir.clone();
        let (_pkg, archive) = self.session.build_import_path_in(path, &src_dir)?;
        let archive = archive
            .ok_or_else(|| Error::internal(format!("import {path} produced no archive")))?;
        self.local.insert(path.to_string(), Rc::clone(&archive));
        Ok(archive)
    }

    fn lookup_type(&self, import_path: &str) -> Option<Rc<TypeInfo>> {
        self.session.types.get(import_path).cloned()
    }

    fn define_type(&mut self, import_path: &str, info: TypeInfo) -> Rc<TypeInfo> {
        let entry = self
            .session
            .types
            .entry(import_path.to_string())
            .or_insert_with(|| Rc::new(info));
        Rc::clone(entry)
    }
}
