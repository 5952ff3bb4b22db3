//! Where migration entries come from

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// A provider of named migration entries
///
/// The loader only needs to list entry names and fetch the content of the
/// ones it schedules, so migrations can live in a directory, be embedded in
/// the binary, or come from anywhere else.
#[async_trait]
pub trait MigrationSource: Send + Sync {
    /// Human readable location, used in logs
    fn describe(&self) -> String;

    /// Names of every entry in the source, migration or not
    async fn list(&self) -> Result<Vec<String>>;

    /// Full content of one entry
    async fn fetch(&self, name: &str) -> Result<String>;
}

/// Migrations stored as files in a flat directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory this source reads from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a named entry
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl MigrationSource for DirectorySource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    async fn list(&self) -> Result<Vec<String>> {
        let discovery = |source| Error::Discovery {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(discovery)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(discovery)? {
            let file_type = entry.file_type().await.map_err(discovery)?;
            if file_type.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::debug!("Skipping non UTF-8 entry {:?}", raw),
            }
        }

        Ok(names)
    }

    async fn fetch(&self, name: &str) -> Result<String> {
        tokio::fs::read_to_string(self.path_of(name))
            .await
            .map_err(|source| Error::Fetch {
                name: self.path_of(name).display().to_string(),
                source,
            })
    }
}

/// Migrations held in memory, e.g. gathered with `include_str!`
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSource {
    entries: BTreeMap<String, String>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any previous one with the same name
    pub fn with_entry(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(name.into(), content.into());
        self
    }
}

impl<N, C> FromIterator<(N, C)> for EmbeddedSource
where
    N: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, c)| (n.into(), c.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl MigrationSource for EmbeddedSource {
    fn describe(&self) -> String {
        format!("embedded ({} entries)", self.entries.len())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    async fn fetch(&self, name: &str) -> Result<String> {
        self.entries.get(name).cloned().ok_or_else(|| Error::Fetch {
            name: name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such embedded entry"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_source_lists_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001-foo.up.sql"), "CREATE TABLE foo (id int);").unwrap();
        std::fs::write(dir.path().join("README.md"), "notes").unwrap();
        std::fs::create_dir(dir.path().join("002-nested.up.sql")).unwrap();

        let source = DirectorySource::new(dir.path());
        let mut names = source.list().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["001-foo.up.sql", "README.md"]);

        let content = source.fetch("001-foo.up.sql").await.unwrap();
        assert_eq!(content, "CREATE TABLE foo (id int);");
    }

    #[tokio::test]
    async fn test_directory_source_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("nope"));
        let err = source.list().await.unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_directory_source_fetch_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        let err = source.fetch("001-foo.up.sql").await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_embedded_source() {
        let source: EmbeddedSource = [("1.up.sql", "SELECT 1;"), ("1.down.sql", "SELECT 0;")]
            .into_iter()
            .collect();
        assert_eq!(source.list().await.unwrap(), vec!["1.down.sql", "1.up.sql"]);
        assert_eq!(source.fetch("1.up.sql").await.unwrap(), "SELECT 1;");
        assert!(source.fetch("2.up.sql").await.is_err());
    }
}
