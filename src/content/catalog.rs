//! # File Catalog
//!
//! The set of files a content server serves: name → size, built once at
//! startup from the storage directory. Only names in the catalog are ever
//! opened, so request paths never reach the filesystem directly.

use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    files: BTreeMap<String, u64>,
}

impl Catalog {
    /// Enumerate regular files in `dir`, creating the directory if needed.
    pub async fn scan(dir: &Path) -> Result<Self> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating files directory {}", dir.display()))?;
            info!("📁 Created files directory: {}", dir.display());
        }

        let mut files = BTreeMap::new();
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("listing {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("⚠️  Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if name.split_whitespace().count() != 1 {
                warn!("⚠️  Skipping {:?}: names cannot contain whitespace", name);
                continue;
            }
            info!("📄 Found file: {} ({} bytes)", name, metadata.len());
            files.insert(name, metadata.len());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    /// [`scan`](Self::scan), then write the placeholder set if storage is
    /// empty and `seed_samples` is on.
    pub async fn load(dir: &Path, server_id: &str, seed_samples: bool) -> Result<Self> {
        let mut catalog = Self::scan(dir).await?;
        if catalog.files.is_empty() && seed_samples {
            info!("📝 No files found in directory. Creating sample files...");
            for (name, content) in sample_files(server_id) {
                let path = dir.join(&name);
                fs::write(&path, &content)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("📄 Created sample file: {} ({} bytes)", name, content.len());
                catalog.files.insert(name, content.len() as u64);
            }
        }
        Ok(catalog)
    }

    pub fn size(&self, name: &str) -> Option<u64> {
        self.files.get(name).copied()
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.files.contains_key(name).then(|| self.dir.join(name))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.files.iter().map(|(name, size)| (name.as_str(), *size))
    }
}

/// Deterministic placeholder content for an empty server.
pub fn sample_files(server_id: &str) -> Vec<(String, Vec<u8>)> {
    let first = format!(
        "Hello from Content Server {}!\nThis is sample file 1.\n",
        server_id
    );
    let second = format!("Sample file 2 content from {}{}", server_id, "\n".repeat(100));
    let shared = "This file might be on multiple servers.\n".repeat(50);

    vec![
        (format!("sample_{}_1.txt", server_id), first.into_bytes()),
        (format!("sample_{}_2.txt", server_id), second.into_bytes()),
        ("shared_file.txt".to_string(), shared.into_bytes()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_lists_regular_files_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), vec![7u8; 100]).unwrap();
        std::fs::write(dir.path().join("b.bin"), b"xyz").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let catalog = Catalog::scan(dir.path()).await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.size("a.txt"), Some(100));
        assert_eq!(catalog.size("b.bin"), Some(3));
        assert_eq!(catalog.size("nested"), None);
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("files_CS9");

        let catalog = Catalog::scan(&dir).await.unwrap();
        assert!(catalog.is_empty());
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn empty_storage_gets_placeholders() {
        let dir = tempfile::tempdir().unwrap();

        let catalog = Catalog::load(dir.path(), "CS1", true).await.unwrap();
        let names: Vec<_> = catalog.entries().map(|(n, _)| n.to_string()).collect();
        assert_eq!(
            names,
            vec!["sample_CS1_1.txt", "sample_CS1_2.txt", "shared_file.txt"]
        );
        assert_eq!(catalog.size("shared_file.txt"), Some(40 * 50));
        let on_disk = std::fs::read(dir.path().join("shared_file.txt")).unwrap();
        assert_eq!(on_disk.len(), 2000);
    }

    #[tokio::test]
    async fn seeding_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(dir.path(), "CS1", false).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn existing_files_suppress_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let catalog = Catalog::load(dir.path(), "CS1", true).await.unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn path_only_for_catalogued_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let catalog = Catalog::scan(dir.path()).await.unwrap();

        assert_eq!(catalog.path("a.txt"), Some(dir.path().join("a.txt")));
        assert_eq!(catalog.path("../etc/passwd"), None);
    }

    #[test]
    fn samples_are_deterministic() {
        assert_eq!(sample_files("X"), sample_files("X"));
        assert_ne!(sample_files("X")[0].1, sample_files("Y")[0].1);
    }
}
