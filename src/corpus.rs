use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Category description file present in every element directory.
pub const DIRECTORY_FILE_NAME: &str = "qet_directory";
/// Extension of element definition files.
pub const ELEMENT_EXTENSION: &str = "elmt";

/// Whether a file takes part in localization.
pub fn is_document(path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) == Some(DIRECTORY_FILE_NAME) {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ELEMENT_EXTENSION))
}

/// All documents under `root`, sorted by path so every run enumerates them
/// in the same order.
pub fn collect_documents(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Element directory not found: {}", root.display());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && is_document(entry.path()) {
            documents.push(entry.into_path());
        }
    }

    documents.sort();
    Ok(documents)
}

pub async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn write_document(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_document() {
        assert!(is_document(Path::new("a/b/qet_directory")));
        assert!(is_document(Path::new("a/lamp.elmt")));
        assert!(is_document(Path::new("a/LAMP.ELMT")));
        assert!(!is_document(Path::new("a/qet_directory.bak")));
        assert!(!is_document(Path::new("a/readme.txt")));
        assert!(!is_document(Path::new("a/elmt")));
    }

    #[test]
    fn test_collect_documents_recurses_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("b/nested/switch.elmt"), "").unwrap();
        std::fs::write(root.join("a/qet_directory"), "").unwrap();
        std::fs::write(root.join("a/lamp.ELMT"), "").unwrap();
        std::fs::write(root.join("a/notes.txt"), "").unwrap();

        let documents = collect_documents(root).unwrap();
        let relative: Vec<_> = documents
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            relative,
            vec![
                PathBuf::from("a/lamp.ELMT"),
                PathBuf::from("a/qet_directory"),
                PathBuf::from("b/nested/switch.elmt"),
            ]
        );
    }

    #[test]
    fn test_collect_documents_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(collect_documents(&temp_dir.path().join("nope")).is_err());
    }

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lamp.elmt");

        write_document(&path, "<names/>").await.unwrap();
        assert_eq!(read_document(&path).await.unwrap(), "<names/>");
    }
}
