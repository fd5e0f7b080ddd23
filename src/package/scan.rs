//! Lightweight source-header scanner.
//!
//! The resolver classifies files without invoking the full parser: it only
//! needs the package clause, the optional `//build:` constraint line, and
//! the import block. Anything past the imports is ignored.

use crate::package::FFI_IMPORT;

/// Header of one `.g` file as seen by the resolver.
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    pub package_name: String,
    pub imports: Vec<HeaderImport>,
    /// Terms of the `//build:` line, all of which must be satisfied.
    pub build_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct HeaderImport {
    pub alias: Option<String>,
    pub path: String,
    /// 1-based line of the import spec.
    pub line: u32,
}

impl FileHeader {
    #[must_use]
    pub fn imports_ffi(&self) -> bool {
        self.imports.iter().any(|imp| imp.path == FFI_IMPORT)
    }
}

/// Scans the header of one source file. Returns a human-readable message
/// on malformed headers; the resolver attributes it to the file.
pub fn scan_header(source: &str) -> Result<FileHeader, String> {
    let mut header = FileHeader::default();
    let mut saw_package = false;
    let mut in_import_block = false;

    for (index, raw) in source.lines().enumerate() {
        let line_no = (index + 1) as u32;
        let line = raw.trim();

        if in_import_block {
            if line == ")" {
                in_import_block = false;
                continue;
            }
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let import = parse_import_spec(line, line_no)
                .ok_or_else(|| format!("line {line_no}: malformed import spec"))?;
            header.imports.push(import);
            continue;
        }

        if line.is_empty() {
            continue;
        }
        if let Some(terms) = line.strip_prefix("//build:") {
            if !saw_package {
                header.build_terms =
                    Some(terms.split_whitespace().map(str::to_string).collect());
            }
            continue;
        }
        if line.starts_with("//") {
            continue;
        }

        if !saw_package {
            let Some(name) = line.strip_prefix("package ") else {
                return Err(format!("line {line_no}: expected package clause"));
            };
            let name = name.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(format!("line {line_no}: malformed package name {name:?}"));
            }
            header.package_name = name.to_string();
            saw_package = true;
            continue;
        }

        if line == "import (" {
            in_import_block = true;
            continue;
        }
        if let Some(spec) = line.strip_prefix("import ") {
            let import = parse_import_spec(spec.trim(), line_no)
                .ok_or_else(|| format!("line {line_no}: malformed import spec"))?;
            header.imports.push(import);
            continue;
        }

        // First non-import declaration ends the header.
        break;
    }

    if !saw_package {
        return Err("missing package clause".to_string());
    }
    Ok(header)
}

fn parse_import_spec(spec: &str, line: u32) -> Option<HeaderImport> {
    let open = spec.find('"')?;
    let rest = &spec[open + 1..];
    let close = rest.find('"')?;
    let path = &rest[..close];
    if path.is_empty() {
        return None;
    }
    let alias = spec[..open].trim();
    let alias = if alias.is_empty() {
        None
    } else {
        Some(alias.to_string())
    };
    Some(HeaderImport {
        alias,
        path: path.to_string(),
        line,
    })
}
