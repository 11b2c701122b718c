//! Mapping module names to files on disk.
//!
//! A module name is a path. Names without an extension are tried with
//! `.luau` and then `.lua`. Relative names are looked up in each search
//! directory in order; `-` is the text read from stdin.

use std::path::{Path, PathBuf};

/// Extensions tried for names that have none
const EXTENSIONS: &[&str] = &["luau", "lua"];

/// Name under which stdin is checked
pub const STDIN_MODULE: &str = "-";

#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    search: Vec<PathBuf>,
    stdin: Option<String>,
}

impl ModuleResolver {
    pub fn new(search: Vec<PathBuf>) -> Self {
        Self {
            search,
            stdin: None,
        }
    }

    /// Serve `text` for the stdin module.
    pub fn with_stdin(mut self, text: String) -> Self {
        self.stdin = Some(text);
        self
    }

    /// File backing `name`, if any.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return candidates(path).find(|p| p.is_file());
        }

        self.search
            .iter()
            .flat_map(|dir| candidates(&dir.join(path)).collect::<Vec<_>>())
            .find(|p| p.is_file())
    }

    /// Source text of `name`.
    pub fn read(&self, name: &str) -> Option<String> {
        if name == STDIN_MODULE {
            return self.stdin.clone();
        }

        let path = self.locate(name)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(module = name, path = %path.display(), "failed to read module: {}", e);
                None
            }
        }
    }
}

fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    let with_extensions: Vec<PathBuf> = if path.extension().is_none() {
        EXTENSIONS.iter().map(|ext| path.with_extension(ext)).collect()
    } else {
        Vec::new()
    };
    std::iter::once(path.to_path_buf()).chain(with_extensions)
}
