//! Test support: a miniature Glint frontend, a recording code generator,
//! and on-disk toolchain trees built under a tempdir.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::SystemTime;

use crate::codegen::{Archive, CodeGen, ImportContext, TypeInfo};
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::frontend::{Frontend, SyntaxError};
use crate::package::UNSAFE_IMPORT;
use crate::session::{Options, Session};
use crate::syntax::{
    Decl, FuncBody, FuncDecl, ImportSpec, Position, SourceFile, TypeDecl, TypeSpec, ValueDecl,
    ValueKind, ValueSpec,
};
use crate::vfs::VirtualFs;

/// Language minor version the fixtures are pinned to.
pub(crate) const LANGUAGE_MINOR: u32 = 12;

/// Embedded toolchain tree with the two runtime-support packages.
pub(crate) fn toolchain_fs() -> Arc<VirtualFs> {
    Arc::new(
        VirtualFs::builder()
            .file("/js/js.g", "package js\n\nfunc Global() {\n}\n")
            .file("/nosync/nosync.g", "package nosync\n\nfunc Lock() {\n}\n")
            .build(),
    )
}

/// A library root plus one workspace under a tempdir, with a matching
/// VERSION file.
pub(crate) struct TestTree {
    root: tempfile::TempDir,
    pub lib_root: PathBuf,
    pub workspace: PathBuf,
}

impl TestTree {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let lib_root = root.path().join("lib");
        let workspace = root.path().join("ws");
        fs::create_dir_all(lib_root.join("src")).expect("create lib src");
        fs::create_dir_all(workspace.join("src")).expect("create workspace src");
        fs::write(
            lib_root.join("VERSION"),
            format!("glint1.{LANGUAGE_MINOR}\n"),
        )
        .expect("write VERSION");
        Self {
            root,
            lib_root,
            workspace,
        }
    }

    pub(crate) fn root_path(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(rel);
        self.write_abs(&path, contents);
        path
    }

    pub(crate) fn write_abs(&self, path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, contents).expect("write fixture file");
    }

    pub(crate) fn write_dir(&self, rel: &str) -> PathBuf {
        let path = self.root.path().join(rel);
        fs::create_dir_all(&path).expect("create fixture dir");
        path
    }

    /// Writes a standard-library package under `<lib_root>/src`.
    pub(crate) fn std_pkg(&self, import_path: &str, files: &[(&str, &str)]) {
        for (name, contents) in files {
            self.write_abs(
                &self.lib_root.join("src").join(import_path).join(name),
                contents,
            );
        }
    }

    /// Writes a workspace package under `<workspace>/src`.
    pub(crate) fn ws_pkg(&self, import_path: &str, files: &[(&str, &str)]) {
        for (name, contents) in files {
            self.write_abs(
                &self.workspace.join("src").join(import_path).join(name),
                contents,
            );
        }
    }

    pub(crate) fn context(&self) -> BuildContext {
        self.context_with(Arc::new(VirtualFs::default()))
    }

    pub(crate) fn context_with(&self, toolchain_fs: Arc<VirtualFs>) -> BuildContext {
        BuildContext::new(
            "",
            &[],
            self.lib_root.clone(),
            vec![self.workspace.clone()],
            toolchain_fs,
            LANGUAGE_MINOR,
        )
    }

    pub(crate) fn options(&self) -> Options {
        Options {
            lib_root: self.lib_root.clone(),
            workspace_path: self.workspace.display().to_string(),
            ..Options::default()
        }
    }

    pub(crate) fn try_session_with(
        &self,
        configure: impl FnOnce(&mut Options),
    ) -> Result<TestSession> {
        let mut options = self.options();
        configure(&mut options);
        let generator = FakeCodeGen::new(LANGUAGE_MINOR);
        let log = generator.log_handle();
        let session = Session::new(options, Rc::new(MiniFrontend), Rc::new(generator))?;
        Ok(TestSession { session, log })
    }

    pub(crate) fn try_session(&self) -> Result<TestSession> {
        self.try_session_with(|_| {})
    }

    pub(crate) fn session(&self) -> TestSession {
        self.try_session().expect("session")
    }

    pub(crate) fn session_with(&self, configure: impl FnOnce(&mut Options)) -> TestSession {
        self.try_session_with(configure).expect("session")
    }

    pub(crate) fn set_mtime(&self, path: &Path, time: SystemTime) {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(path)
            .expect("open for mtime update");
        file.set_modified(time).expect("set mtime");
    }

    /// Directory name archives land under for the default (unsuffixed)
    /// target.
    pub(crate) fn target_dir(&self) -> String {
        format!("{}_js", std::env::consts::OS)
    }
}

/// A session wired to the fake generator, with access to the compile log.
pub(crate) struct TestSession {
    session: Session,
    log: Rc<RefCell<Vec<String>>>,
}

impl std::fmt::Debug for TestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSession").finish_non_exhaustive()
    }
}

impl TestSession {
    /// Import paths compiled so far, in order. Loads from disk do not
    /// appear here.
    pub(crate) fn codegen_log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl Deref for TestSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Code generator standing in for the real one: archives record their
/// package name, dependency list, and a comment per declaration.
pub(crate) struct FakeCodeGen {
    version: u32,
    log: Rc<RefCell<Vec<String>>>,
}

impl FakeCodeGen {
    pub(crate) fn new(version: u32) -> Self {
        Self {
            version,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn log_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }
}

impl CodeGen for FakeCodeGen {
    fn language_version(&self) -> u32 {
        self.version
    }

    fn compile(
        &self,
        import_path: &str,
        files: Vec<SourceFile>,
        minify: bool,
        imports: &mut dyn ImportContext,
    ) -> Result<Archive> {
        let mut dep_paths: Vec<String> = Vec::new();
        for file in &files {
            for import in &file.imports {
                if import.path == UNSAFE_IMPORT || import.path == import_path {
                    continue;
                }
                if !dep_paths.contains(&import.path) {
                    dep_paths.push(import.path.clone());
                }
            }
        }
        // The real type checker resolves every import; mirror that so
        // dependency builds happen at the same point.
        for dep in &dep_paths {
            imports.import(dep)?;
        }

        let name = files
            .first()
            .map(|file| file.package_name.clone())
            .unwrap_or_default();
        imports.define_type(import_path, TypeInfo { name: name.clone() });
        self.log.borrow_mut().push(import_path.to_string());

        let mut code = format!("// package {import_path}\n").into_bytes();
        for file in &files {
            for decl in &file.decls {
                if let Decl::Func(func) = decl {
                    code.extend_from_slice(format!("// func {}\n", func.qualified_name()).as_bytes());
                }
            }
        }
        Ok(Archive {
            import_path: import_path.to_string(),
            name,
            imports: dep_paths,
            code,
            included_scripts: Vec::new(),
            minified: minify,
        })
    }
}

/// Import context that refuses imports; used where only type registration
/// is expected.
#[derive(Default)]
pub(crate) struct NullImports {
    pub(crate) defined: HashMap<String, String>,
}

impl ImportContext for NullImports {
    fn import(&mut self, path: &str) -> Result<Rc<Archive>> {
        Err(Error::internal(format!("unexpected import of {path}")))
    }

    fn lookup_type(&self, _import_path: &str) -> Option<Rc<TypeInfo>> {
        None
    }

    fn define_type(&mut self, import_path: &str, info: TypeInfo) -> Rc<TypeInfo> {
        self.defined.insert(import_path.to_string(), info.name.clone());
        Rc::new(info)
    }
}

/// Line-oriented parser for the fixture subset of Glint: package clause,
/// imports, functions with brace-delimited bodies, and single-line
/// type/var/const declarations.
pub(crate) struct MiniFrontend;

impl Frontend for MiniFrontend {
    fn parse_file(
        &self,
        path: &Path,
        source: &[u8],
    ) -> std::result::Result<SourceFile, Vec<SyntaxError>> {
        let text = String::from_utf8_lossy(source);
        let filename = path.display().to_string();
        let mut errors: Vec<SyntaxError> = Vec::new();
        let mut file = SourceFile {
            path: path.to_path_buf(),
            package_name: String::new(),
            imports: Vec::new(),
            decls: Vec::new(),
        };

        let lines: Vec<&str> = text.lines().collect();
        let mut saw_package = false;
        let mut in_imports = false;
        let mut index = 0;
        while index < lines.len() {
            let line_no = (index + 1) as u32;
            let line = lines[index].trim();
            index += 1;

            if line.is_empty() || (line.starts_with("//") && !in_imports) {
                continue;
            }

            if in_imports {
                if line == ")" {
                    in_imports = false;
                } else if line.starts_with("//") {
                    continue;
                } else if let Some(spec) = parse_import(line, &filename, line_no) {
                    file.imports.push(spec);
                } else {
                    errors.push(error_at(&filename, line_no, "malformed import spec"));
                }
                continue;
            }

            if !saw_package {
                match line.strip_prefix("package ") {
                    Some(name) => {
                        file.package_name = name.trim().to_string();
                        saw_package = true;
                    }
                    None => errors.push(error_at(&filename, line_no, "expected package clause")),
                }
                continue;
            }

            if line == "import (" {
                in_imports = true;
                continue;
            }
            if let Some(spec) = line.strip_prefix("import ") {
                match parse_import(spec.trim(), &filename, line_no) {
                    Some(spec) => file.imports.push(spec),
                    None => errors.push(error_at(&filename, line_no, "malformed import spec")),
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("func ") {
                match parse_func(rest, &lines, &mut index) {
                    Some(decl) => file.decls.push(Decl::Func(decl)),
                    None => errors.push(error_at(&filename, line_no, "malformed function")),
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("type ") {
                let mut refs = Vec::new();
                let name = first_ident(rest);
                collect_refs(&rest[name.len()..], &mut refs);
                if line.ends_with('{') {
                    consume_block(&lines, &mut index, &mut refs);
                }
                if name.is_empty() {
                    errors.push(error_at(&filename, line_no, "malformed type declaration"));
                } else {
                    file.decls.push(Decl::Type(TypeDecl {
                        specs: vec![TypeSpec { name, refs }],
                    }));
                }
                continue;
            }
            let value_kind = if line.starts_with("var ") {
                Some(ValueKind::Var)
            } else if line.starts_with("const ") {
                Some(ValueKind::Const)
            } else {
                None
            };
            if let Some(kind) = value_kind {
                let rest = line.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
                let (names_part, init) = match rest.split_once('=') {
                    Some((names, init)) => (names, init),
                    None => (rest, ""),
                };
                let names: Vec<String> = names_part
                    .split(',')
                    .map(|group| first_ident(group.trim()))
                    .filter(|name| !name.is_empty())
                    .collect();
                let mut refs = Vec::new();
                collect_refs(init, &mut refs);
                if names.is_empty() {
                    errors.push(error_at(&filename, line_no, "malformed value declaration"));
                } else {
                    file.decls.push(Decl::Value(ValueDecl {
                        kind,
                        specs: vec![ValueSpec { names, refs }],
                    }));
                }
                continue;
            }

            errors.push(error_at(&filename, line_no, "unexpected top-level statement"));
        }

        if !saw_package && errors.is_empty() {
            errors.push(error_at(&filename, 1, "missing package clause"));
        }
        if errors.is_empty() {
            Ok(file)
        } else {
            Err(errors)
        }
    }
}

fn error_at(filename: &str, line: u32, message: &str) -> SyntaxError {
    SyntaxError {
        pos: Position::new(filename, line, 1),
        message: message.to_string(),
    }
}

fn parse_import(spec: &str, filename: &str, line: u32) -> Option<ImportSpec> {
    let open = spec.find('"')?;
    let rest = &spec[open + 1..];
    let close = rest.find('"')?;
    let path = &rest[..close];
    if path.is_empty() {
        return None;
    }
    let alias = spec[..open].trim();
    Some(ImportSpec {
        alias: if alias.is_empty() {
            None
        } else {
            Some(alias.to_string())
        },
        path: path.to_string(),
        pos: Position::new(filename, line, 1),
    })
}

fn parse_func(rest: &str, lines: &[&str], index: &mut usize) -> Option<FuncDecl> {
    let rest = rest.trim_start();
    let (receiver, rest) = if let Some(after) = rest.strip_prefix('(') {
        let close = after.find(')')?;
        let receiver = after[..close]
            .split_whitespace()
            .last()?
            .trim_start_matches('*')
            .to_string();
        (Some(receiver), after[close + 1..].trim_start())
    } else {
        (None, rest)
    };

    let name = first_ident(rest);
    if name.is_empty() {
        return None;
    }
    let signature = &rest[name.len()..];
    let mut sig_refs = Vec::new();
    collect_refs(signature.trim_end_matches(['{', '}', ' ']), &mut sig_refs);

    let body = if signature.trim_end().ends_with("{}") {
        Some(FuncBody { refs: Vec::new() })
    } else if signature.trim_end().ends_with('{') {
        let mut refs = Vec::new();
        consume_block(lines, index, &mut refs);
        Some(FuncBody { refs })
    } else {
        None
    };

    Some(FuncDecl {
        receiver,
        name,
        sig_refs,
        body,
    })
}

/// Consumes lines until the closing `}` at the start of a line, collecting
/// qualifier references along the way.
fn consume_block(lines: &[&str], index: &mut usize, refs: &mut Vec<String>) {
    while *index < lines.len() {
        let line = lines[*index].trim();
        *index += 1;
        if line == "}" {
            return;
        }
        collect_refs(line, refs);
    }
}

fn first_ident(text: &str) -> String {
    text.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Collects `qualifier.Selector` references.
fn collect_refs(text: &str, refs: &mut Vec<String>) {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            if i + 1 < bytes.len()
                && bytes[i] == b'.'
                && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_')
            {
                let qualifier = &text[start..i];
                if !refs.iter().any(|existing| existing == qualifier) {
                    refs.push(qualifier.to_string());
                }
            }
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SourceFile {
        MiniFrontend
            .parse_file(Path::new("/tmp/fixture.g"), source.as_bytes())
            .expect("fixture parses")
    }

    #[test]
    fn parses_functions_methods_and_values() {
        let file = parse(
            "package demo\n\nimport \"fmt\"\n\nfunc Greet(name string) {\n\tfmt.Println(name)\n}\n\nfunc (w *Writer) Flush() {\n}\n\ntype Writer struct {}\n\nvar count, total = 0, 0\n\nconst Limit = 10\n",
        );
        assert_eq!(file.package_name, "demo");
        assert_eq!(file.imports.len(), 1);
        assert_eq!(file.decls.len(), 5);

        let Decl::Func(greet) = &file.decls[0] else {
            panic!("expected func");
        };
        assert_eq!(greet.name, "Greet");
        assert_eq!(
            greet.body.as_ref().expect("body").refs,
            vec!["fmt".to_string()]
        );

        let Decl::Func(flush) = &file.decls[1] else {
            panic!("expected method");
        };
        assert_eq!(flush.qualified_name(), "Writer.Flush");

        let Decl::Value(values) = &file.decls[3] else {
            panic!("expected var decl");
        };
        assert_eq!(values.specs[0].names, vec!["count", "total"]);
    }

    #[test]
    fn reports_every_bad_line() {
        let err = MiniFrontend
            .parse_file(Path::new("/tmp/bad.g"), b"package bad\n?!\n?!\n")
            .expect_err("garbage must not parse");
        assert_eq!(err.len(), 2);
        assert_eq!(err[0].pos.line, 2);
    }
}
