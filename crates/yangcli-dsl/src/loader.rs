//! Schema loading: a directory of `*.yang` documents → [`CommandModel`].

use crate::digest::schema_digest_v1;
use crate::extract::extract_document;
use crate::model::CommandModel;
use crate::yang::{parse_statements, YangParseError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCHEMA_EXTENSION: &str = "yang";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no schema documents (*.yang) found in {}", .dir.display())]
    NotFound { dir: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: YangParseError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSource {
    pub path: PathBuf,
    pub digest: String,
    pub rpc_count: usize,
    pub status_leaf_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedSchema {
    pub model: CommandModel,
    pub documents: Vec<DocumentSource>,
}

/// Load every `*.yang` file directly inside `dir`, in file-name order.
pub fn load_schema_dir(dir: &Path) -> Result<LoadedSchema, SchemaError> {
    let files = schema_files(dir);
    if files.is_empty() {
        return Err(SchemaError::NotFound {
            dir: dir.to_path_buf(),
        });
    }

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(&path).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;
        sources.push((path, text));
    }

    load_schema_sources(sources)
}

/// Build a model from in-memory `(path, text)` documents, in the given order.
pub fn load_schema_sources<I>(sources: I) -> Result<LoadedSchema, SchemaError>
where
    I: IntoIterator<Item = (PathBuf, String)>,
{
    let mut documents = Vec::new();
    let mut extracted = Vec::new();

    for (path, text) in sources {
        let statements = parse_statements(&text).map_err(|source| SchemaError::Parse {
            path: path.clone(),
            source,
        })?;
        let doc = extract_document(&statements);
        tracing::debug!(
            path = %path.display(),
            rpcs = doc.rpcs.len(),
            status_leaves = doc.status_leaves.len(),
            "loaded schema document"
        );
        documents.push(DocumentSource {
            path,
            digest: schema_digest_v1(&text),
            rpc_count: doc.rpcs.len(),
            status_leaf_count: doc.status_leaves.len(),
        });
        extracted.push(doc);
    }

    let model = CommandModel::from_documents(extracted);
    tracing::info!(
        documents = documents.len(),
        commands = model.commands().len(),
        status_fields = model.status_fields().len(),
        "command model built"
    );

    Ok(LoadedSchema { model, documents })
}

fn schema_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(SCHEMA_EXTENSION)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sources_merge_in_order() {
        let loaded = load_schema_sources([
            (
                PathBuf::from("a.yang"),
                r#"rpc hello { description "from a"; }"#.to_string(),
            ),
            (
                PathBuf::from("b.yang"),
                r#"rpc hello { description "from b"; } rpc add;"#.to_string(),
            ),
        ])
        .expect("load");
        let names: Vec<_> = loaded
            .model
            .commands()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["hello", "add"]);
        assert_eq!(
            loaded.model.command("hello").and_then(|c| c.description.as_deref()),
            Some("from a")
        );
        assert_eq!(loaded.documents[1].rpc_count, 2);
    }

    #[test]
    fn parse_error_names_the_document() {
        let err = load_schema_sources([(PathBuf::from("bad.yang"), "rpc {".to_string())])
            .expect_err("should fail");
        assert!(matches!(err, SchemaError::Parse { .. }));
        assert!(err.to_string().contains("bad.yang"), "err={err}");
    }

    #[test]
    fn missing_directory_is_not_found() {
        let err = load_schema_dir(Path::new("/definitely/not/a/schema/dir"))
            .expect_err("should fail");
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }
}
