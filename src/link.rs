//! Link-time output plumbing: the source-map-aware writer the code
//! generator emits the program through, and the callback that rewrites
//! original positions into stable, workspace-relative map paths.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::paths;
use crate::sourcemap::{Mapping, OriginalPosition, SourceMap};
use crate::syntax::Position;

/// Receives one mapping per emitted position: generated line (1-based),
/// generated column (0-based), and the original position when known.
pub type MappingCallback<'a> = Box<dyn FnMut(u32, u32, Option<&Position>) + 'a>;

/// Wraps the output writer, tracking the generated line/column so the code
/// generator can record mappings while it emits.
pub struct SourceMapFilter<'a> {
    out: &'a mut dyn Write,
    mapping: Option<MappingCallback<'a>>,
    line: u32,
    column: u32,
}

impl<'a> SourceMapFilter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            mapping: None,
            line: 1,
            column: 0,
        }
    }

    pub fn set_mapping_callback(&mut self, callback: MappingCallback<'a>) {
        self.mapping = Some(callback);
    }

    /// Current generated position: (1-based line, 0-based column).
    #[must_use]
    pub fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    /// Records that the bytes written next correspond to `original`.
    pub fn map(&mut self, original: Option<&Position>) {
        if let Some(callback) = &mut self.mapping {
            callback(self.line, self.column, original);
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        for byte in bytes {
            if *byte == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        Ok(())
    }
}

/// Builds the mapping callback for a linked executable. Shipped maps carry
/// stable paths: workspace-relative where possible, library-relative for
/// stdlib sources, bare file names otherwise. With `map_to_local_disk` the
/// absolute paths are preserved for local debugging.
pub fn mapping_callback<'a>(
    map: &'a mut SourceMap,
    lib_root: PathBuf,
    workspaces: Vec<PathBuf>,
    map_to_local_disk: bool,
) -> MappingCallback<'a> {
    Box::new(move |generated_line, generated_column, original| {
        let Some(position) = original else {
            map.add_mapping(Mapping {
                generated_line,
                generated_column,
                original: None,
            });
            return;
        };

        let file = Path::new(&position.filename);
        let rewritten = if map_to_local_disk {
            position.filename.clone()
        } else if let Some(workspace) = paths::workspace_prefix(file, &workspaces) {
            strip_source_root(file, workspace)
        } else if file.starts_with(&lib_root) {
            strip_source_root(file, &lib_root)
        } else {
            file.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| position.filename.clone())
        };

        map.add_mapping(Mapping {
            generated_line,
            generated_column,
            original: Some(OriginalPosition {
                file: rewritten,
                line: position.line,
                column: position.column,
            }),
        });
    })
}

/// Drops `root` plus the leading `src` segment, yielding a slash-separated
/// relative path.
fn strip_source_root(file: &Path, root: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let rel = rel.strip_prefix("src").unwrap_or(rel);
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
