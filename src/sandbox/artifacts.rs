//! Working-directory snapshots used to collect execution artifacts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::SystemTime;

use super::language::CODE_FILE_PREFIX;

/// Modification time and size of every top-level regular file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DirSnapshot {
    files: HashMap<String, (Option<SystemTime>, u64)>,
}

impl DirSnapshot {
    pub(crate) async fn capture(dir: &Path) -> std::io::Result<Self> {
        let mut files = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(CODE_FILE_PREFIX) {
                continue;
            }
            files.insert(name, (metadata.modified().ok(), metadata.len()));
        }
        Ok(Self { files })
    }

    /// Names of files that are new or changed relative to `before`.
    pub(crate) fn changed_since(&self, before: &DirSnapshot) -> Vec<String> {
        let mut changed: Vec<String> = self
            .files
            .iter()
            .filter(|(name, stamp)| before.files.get(*name) != Some(stamp))
            .map(|(name, _)| name.clone())
            .collect();
        changed.sort();
        changed
    }
}

/// Read the given files from `dir`; unreadable files are skipped with a warning.
pub(crate) async fn read_artifacts(dir: &Path, names: &[String]) -> BTreeMap<String, Vec<u8>> {
    let mut artifacts = BTreeMap::new();
    for name in names {
        match tokio::fs::read(dir.join(name)).await {
            Ok(bytes) => {
                artifacts.insert(name.clone(), bytes);
            }
            Err(err) => tracing::warn!(artifact = %name, error = %err, "skipping unreadable artifact"),
        }
    }
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_new_and_modified_files_but_not_code_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("keep.txt"), b"same").await.unwrap();
        tokio::fs::write(dir.path().join("grow.txt"), b"a").await.unwrap();
        let before = DirSnapshot::capture(dir.path()).await.unwrap();

        tokio::fs::write(dir.path().join("grow.txt"), b"abc").await.unwrap();
        tokio::fs::write(dir.path().join("output.gif"), b"GIF89a").await.unwrap();
        tokio::fs::write(dir.path().join("tmp_code_abc.py"), b"print(1)").await.unwrap();
        let after = DirSnapshot::capture(dir.path()).await.unwrap();

        let changed = after.changed_since(&before);
        assert_eq!(changed, vec!["grow.txt".to_string(), "output.gif".to_string()]);

        let artifacts = read_artifacts(dir.path(), &changed).await;
        assert_eq!(artifacts["output.gif"], b"GIF89a".to_vec());
    }
}
