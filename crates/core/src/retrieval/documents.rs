use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::RetrievalError;

const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }

    /// Anonymous documents named by position, as used by ad hoc corpora.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<Self> {
        texts
            .into_iter()
            .enumerate()
            .map(|(position, text)| Self::new(format!("document-{position}"), text))
            .collect()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub fn load_document(path: &Path) -> Result<SourceDocument, RetrievalError> {
    let text = fs::read_to_string(path).map_err(|error| {
        RetrievalError::DocumentSource(format!("{}: {error}", path.display()))
    })?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceDocument::new(name, text))
}

/// Reads every `.txt`/`.md` file under `root`, sorted by path.
///
/// Files that cannot be read are logged and skipped. A missing root is an error; a root with
/// no readable text is left for the index build to reject as an empty corpus.
pub fn load_documents(root: &Path) -> Result<Vec<SourceDocument>, RetrievalError> {
    if !root.is_dir() {
        return Err(RetrievalError::DocumentSource(format!(
            "documents directory `{}` does not exist",
            root.display()
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .map(|extension| DOCUMENT_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match load_document(&path) {
            Ok(document) if document.has_text() => documents.push(document),
            Ok(_) => warn!(
                event_name = "retrieval.documents.no_text",
                path = %path.display(),
                "no text extracted from document"
            ),
            Err(error) => warn!(
                event_name = "retrieval.documents.unreadable",
                path = %path.display(),
                error = %error,
                "skipping unreadable document"
            ),
        }
    }

    info!(
        event_name = "retrieval.documents.loaded",
        root = %root.display(),
        count = documents.len(),
        "loaded knowledge base documents"
    );
    Ok(documents)
}
