use std::collections::HashSet;
use std::io::Write;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::SourceMapFilter;
use crate::package::UNSAFE_IMPORT;
use crate::syntax::SourceFile;

/// Compiled artifact of one package: everything needed to link it or to
/// serve as an import target. The wire format is handled by the code
/// generator (a serde_json document by default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub import_path: String,
    /// Package name; `main` for executables.
    pub name: String,
    /// Import paths this archive depends on.
    pub imports: Vec<String>,
    /// Generated JavaScript for the package body.
    pub code: Vec<u8>,
    /// Auxiliary script code injected with the linked output, already
    /// wrapped in its scoped-invocation prologue/epilogue.
    pub included_scripts: Vec<u8>,
    pub minified: bool,
}

/// Type information the generator derives per package; cached by the
/// session for the lifetime of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
}

/// Re-entry point handed to [`CodeGen::compile`]: importing a dependency
/// builds it through the session on demand.
pub trait ImportContext {
    fn import(&mut self, path: &str) -> Result<Rc<Archive>>;
    fn lookup_type(&self, import_path: &str) -> Option<Rc<TypeInfo>>;
    /// First definition wins; later calls observe the stored value.
    fn define_type(&mut self, import_path: &str, info: TypeInfo) -> Rc<TypeInfo>;
}

/// Seam to the code generator proper. Only `compile` has no default: the
/// wire format, dependency walk, and program concatenation below match
/// what the session needs, and a full generator overrides them as its
/// formats evolve.
pub trait CodeGen {
    /// Language minor version this generator supports (`glint1.<minor>`).
    fn language_version(&self) -> u32;

    /// Compiles augmented sources into an archive, resolving imports
    /// through `imports`.
    fn compile(
        &self,
        import_path: &str,
        files: Vec<SourceFile>,
        minify: bool,
        imports: &mut dyn ImportContext,
    ) -> Result<Archive>;

    /// Deserializes an archive previously written by [`CodeGen::write_archive`],
    /// registering its type information.
    fn read_archive(
        &self,
        import_path: &str,
        data: &[u8],
        imports: &mut dyn ImportContext,
    ) -> Result<Archive> {
        let archive: Archive = serde_json::from_slice(data).map_err(|err| {
            Error::codegen(format!("malformed archive for {import_path}: {err}"))
        })?;
        if archive.import_path != import_path {
            return Err(Error::codegen(format!(
                "archive belongs to {}, expected {import_path}",
                archive.import_path
            )));
        }
        imports.define_type(
            import_path,
            TypeInfo {
                name: archive.name.clone(),
            },
        );
        Ok(archive)
    }

    fn write_archive(&self, archive: &Archive, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer(out, archive).map_err(|err| {
            Error::codegen(format!(
                "cannot serialize archive for {}: {err}",
                archive.import_path
            ))
        })
    }

    /// Transitive dependencies of an executable in link order: every
    /// archive appears after the archives it imports, the root last.
    fn dependency_closure(
        &self,
        archive: &Rc<Archive>,
        load: &mut dyn FnMut(&str) -> Result<Rc<Archive>>,
    ) -> Result<Vec<Rc<Archive>>> {
        let mut order: Vec<Rc<Archive>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(archive.import_path.clone());
        let mut stack: Vec<(Rc<Archive>, usize)> = vec![(Rc::clone(archive), 0)];
        while let Some((current, index)) = stack.pop() {
            if index < current.imports.len() {
                let import = current.imports[index].clone();
                stack.push((current, index + 1));
                if import == UNSAFE_IMPORT || !seen.insert(import.clone()) {
                    continue;
                }
                stack.push((load(&import)?, 0));
            } else {
                order.push(current);
            }
        }
        Ok(order)
    }

    /// Emits the linked program through the source-map-aware filter.
    fn write_program(&self, deps: &[Rc<Archive>], out: &mut SourceMapFilter<'_>) -> Result<()> {
        for dep in deps {
            out.write_all(&dep.code)?;
            out.write_all(&dep.included_scripts)?;
        }
        Ok(())
    }
}
