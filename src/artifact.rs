// Local artifacts written by the steps. Writes go through a temporary file
// in the target directory that is renamed into place, so readers only ever
// see the previous contents or the complete new contents.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::api::{parse_catalog, Book};
use crate::error::StepError;

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StepError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| StepError::io(dir, err))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| StepError::io(tmp.path(), err))?;
    tmp.persist(path)
        .map_err(|err| StepError::io(path, err.error))?;
    Ok(())
}

/// The catalog file written by `fetch-books` and read by `rent-books`.
#[derive(Debug, Clone)]
pub struct CatalogArtifact {
    path: PathBuf,
}

impl CatalogArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CatalogArtifact { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the books as a pretty-printed JSON array. The same catalog
    /// always produces the same bytes.
    pub fn save(&self, books: &[Book]) -> Result<(), StepError> {
        let mut json = serde_json::to_string_pretty(books).map_err(|source| StepError::Artifact {
            path: self.path.clone(),
            source,
        })?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), count = books.len(), "saved catalog");
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<Book>, StepError> {
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StepError::MissingFile {
                    path: self.path.clone(),
                }
            } else {
                StepError::io(&self.path, err)
            }
        })?;
        parse_catalog(&contents).map_err(|source| StepError::Artifact {
            path: self.path.clone(),
            source,
        })
    }
}
