//! Local artifact storage: one file per task, `<root>/<task_id>.<ext>`.

use std::io;
use std::path::{Path, PathBuf};

use fluxgen_comfyui::messages::ArtifactDescriptor;
use fluxgen_core::TaskId;

/// Extension used when the engine's file name has none we accept.
pub const DEFAULT_EXTENSION: &str = "png";

/// Directory of retrieved artifacts keyed by task id.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifact of `task_id` with `extension` is stored.
    pub fn path_for(&self, task_id: &TaskId, extension: &str) -> PathBuf {
        self.root.join(format!("{task_id}.{extension}"))
    }

    /// Persist `bytes` for `task_id`, keeping the engine file's extension.
    ///
    /// Writes to a `.part` file first and renames it into place, so a
    /// reader never sees a partial artifact. Files stored earlier for the
    /// same task under another extension are removed.
    pub async fn write(
        &self,
        task_id: &TaskId,
        descriptor: &ArtifactDescriptor,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        let extension = extension_of(descriptor);
        let path = self.path_for(task_id, &extension);
        let partial = self.path_for(task_id, &format!("{extension}.part"));
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        for stale in self.stored_files(task_id).await? {
            if stale == path {
                continue;
            }
            match tokio::fs::remove_file(&stale).await {
                Ok(()) => tracing::debug!(
                    task_id = %task_id,
                    path = %stale.display(),
                    "Removed superseded artifact",
                ),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            task_id = %task_id,
            path = %path.display(),
            bytes = bytes.len(),
            "Artifact stored",
        );
        Ok(path)
    }

    /// Path of the stored artifact of `task_id`, if there is one.
    pub async fn find(&self, task_id: &TaskId) -> io::Result<Option<PathBuf>> {
        Ok(self.stored_files(task_id).await?.into_iter().next())
    }

    /// Bytes of the stored artifact of `task_id`, or `None` if absent.
    pub async fn read(&self, task_id: &TaskId) -> io::Result<Option<Vec<u8>>> {
        match self.find(task_id).await? {
            Some(path) => tokio::fs::read(path).await.map(Some),
            None => Ok(None),
        }
    }

    /// Completed files under the root named `<task_id>.<ext>`.
    async fn stored_files(&self, task_id: &TaskId) -> io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let stem = path.file_stem().and_then(|s| s.to_str());
            let is_partial = path.extension().and_then(|e| e.to_str()) == Some("part");
            if stem == Some(task_id.as_str()) && !is_partial {
                found.push(path);
            }
        }
        Ok(found)
    }
}

/// Lower-cased extension of the engine-side file name, or
/// [`DEFAULT_EXTENSION`] when it is missing or not plain alphanumeric.
pub fn extension_of(descriptor: &ArtifactDescriptor) -> String {
    Path::new(&descriptor.filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> TaskId {
        TaskId::parse(id).unwrap()
    }

    fn ext(filename: &str) -> String {
        extension_of(&ArtifactDescriptor::output(filename))
    }

    #[test]
    fn extension_follows_engine_filename() {
        assert_eq!(ext("a_00001_.png"), "png");
        assert_eq!(ext("a_00001_.WEBP"), "webp");
        assert_eq!(ext("no-extension"), "png");
        assert_eq!(ext("odd.p/g"), "png");
    }

    #[test]
    fn path_is_keyed_by_task_id() {
        let store = ArtifactStore::new("/srv/out");
        assert_eq!(
            store.path_for(&task("t-1"), "png"),
            PathBuf::from("/srv/out/t-1.png")
        );
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"));
        let descriptor = ArtifactDescriptor::output("flux_output_t-1_00001_.png");

        let path = store
            .write(&task("t-1"), &descriptor, b"image")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("nested/t-1.png"));

        let stored = store.read(&task("t-1")).await.unwrap();
        assert_eq!(stored, Some(b"image".to_vec()));
        assert_eq!(store.find(&task("t-1")).await.unwrap(), Some(path));
    }

    #[tokio::test]
    async fn missing_artifact_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.read(&task("absent")).await.unwrap(), None);

        let never_created = ArtifactStore::new(dir.path().join("does-not-exist"));
        assert_eq!(never_created.find(&task("absent")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn similar_task_ids_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let png = ArtifactDescriptor::output("x.png");

        store.write(&task("job"), &png, b"a").await.unwrap();
        store.write(&task("job-2"), &png, b"b").await.unwrap();

        let first = store.read(&task("job")).await.unwrap();
        let second = store.read(&task("job-2")).await.unwrap();
        assert_eq!(first, Some(b"a".to_vec()));
        assert_eq!(second, Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn rewrite_with_new_extension_replaces_earlier_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = task("reused");

        let old = ArtifactDescriptor::output("flux_output_reused_00001_.png");
        let new = ArtifactDescriptor::output("flux_output_reused_00002_.webp");
        let old_path = store.write(&id, &old, b"old").await.unwrap();
        let new_path = store.write(&id, &new, b"new").await.unwrap();

        assert!(!old_path.exists());
        assert_eq!(store.find(&id).await.unwrap(), Some(new_path));
        assert_eq!(store.read(&id).await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rewrite_with_same_extension_keeps_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = task("again");
        let descriptor = ArtifactDescriptor::output("a.png");

        store.write(&id, &descriptor, b"one").await.unwrap();
        let path = store.write(&id, &descriptor, b"two").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
