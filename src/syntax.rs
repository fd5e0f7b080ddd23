use std::fmt;
use std::path::PathBuf;

/// Name a declaration is rewritten to when a native override shadows it.
pub const BLANK: &str = "_";

/// A location inside an original source file, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(filename: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// One parsed source file, as handed to the code generator. The augmentor
/// rewrites declarations in place; the model carries the referenced import
/// qualifiers so unused imports can be detected after bodies are pruned.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub package_name: String,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

impl SourceFile {
    /// True when any remaining declaration references the qualifier.
    #[must_use]
    pub fn uses_qualifier(&self, name: &str) -> bool {
        self.decls.iter().any(|decl| decl.references(name))
    }
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
    pub pos: Position,
}

impl ImportSpec {
    /// The name this import is referenced by inside the file.
    #[must_use]
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Type(TypeDecl),
    Value(ValueDecl),
}

impl Decl {
    fn references(&self, name: &str) -> bool {
        match self {
            Decl::Func(func) => {
                func.sig_refs.iter().any(|r| r == name)
                    || func
                        .body
                        .as_ref()
                        .is_some_and(|body| body.refs.iter().any(|r| r == name))
            }
            Decl::Type(decl) => decl
                .specs
                .iter()
                .any(|spec| spec.refs.iter().any(|r| r == name)),
            Decl::Value(decl) => decl
                .specs
                .iter()
                .any(|spec| spec.refs.iter().any(|r| r == name)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    /// Receiver type name for methods, without any pointer marker.
    pub receiver: Option<String>,
    pub name: String,
    /// Import qualifiers referenced by the signature.
    pub sig_refs: Vec<String>,
    pub body: Option<FuncBody>,
}

impl FuncDecl {
    /// Replacement-set key: method names are prefixed by their receiver.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{receiver}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuncBody {
    /// Import qualifiers referenced by the body.
    pub refs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub specs: Vec<TypeSpec>,
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub name: String,
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Var,
    Const,
}

#[derive(Debug, Clone)]
pub struct ValueDecl {
    pub kind: ValueKind,
    pub specs: Vec<ValueSpec>,
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub names: Vec<String>,
    pub refs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_prefixes_receiver() {
        let plain = FuncDecl {
            receiver: None,
            name: "Read".into(),
            sig_refs: vec![],
            body: None,
        };
        assert_eq!(plain.qualified_name(), "Read");

        let method = FuncDecl {
            receiver: Some("Reader".into()),
            name: "Read".into(),
            sig_refs: vec![],
            body: None,
        };
        assert_eq!(method.qualified_name(), "Reader.Read");
    }

    #[test]
    fn local_name_falls_back_to_last_path_segment() {
        let spec = ImportSpec {
            alias: None,
            path: "glintjs/nosync".into(),
            pos: Position::new("a.g", 1, 1),
        };
        assert_eq!(spec.local_name(), "nosync");

        let aliased = ImportSpec {
            alias: Some("sync".into()),
            path: "glintjs/nosync".into(),
            pos: Position::new("a.g", 1, 1),
        };
        assert_eq!(aliased.local_name(), "sync");
    }

    #[test]
    fn pruned_bodies_no_longer_pin_qualifiers() {
        let mut file = SourceFile {
            path: PathBuf::from("a.g"),
            package_name: "a".into(),
            imports: vec![],
            decls: vec![Decl::Func(FuncDecl {
                receiver: None,
                name: "now".into(),
                sig_refs: vec![],
                body: Some(FuncBody {
                    refs: vec!["sync".into()],
                }),
            })],
        };
        assert!(file.uses_qualifier("sync"));
        if let Decl::Func(func) = &mut file.decls[0] {
            func.body = None;
        }
        assert!(!file.uses_qualifier("sync"));
    }
}
