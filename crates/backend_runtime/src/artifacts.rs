use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the packaged backend bundle shipped with the app.
pub const ARCHIVE_FILE_NAME: &str = "backend.zip";

/// Marker file recording the version of the extracted runtime tree.
pub const VERSION_MARKER_FILE: &str = "VERSION";

const RUNTIME_DIR: [&str; 2] = ["ember-chat", "backend-runtime"];

/// Read-only resolution of backend artifact locations.
///
/// The store answers where things are; it never creates, removes, or
/// mutates anything on disk.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    archive_override: Option<PathBuf>,
    runtime_root_override: Option<PathBuf>,
}

impl ArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the archive location instead of searching next to the executable.
    #[must_use]
    pub fn with_archive(mut self, archive: impl Into<PathBuf>) -> Self {
        self.archive_override = Some(archive.into());
        self
    }

    /// Pins the runtime root instead of the per-user default.
    #[must_use]
    pub fn with_runtime_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_root_override = Some(root.into());
        self
    }

    /// Locates the packaged backend archive, if one is present.
    ///
    /// Searches the pinned location first, then paths relative to the
    /// running executable (flat next to it, a `resources` sibling, and the
    /// macOS bundle `Resources` layout).
    #[must_use]
    pub fn locate_archive(&self) -> Option<PathBuf> {
        if let Some(pinned) = &self.archive_override {
            return pinned.is_file().then(|| pinned.clone());
        }

        let exe_dir = env::current_exe().ok()?.parent()?.to_path_buf();
        let candidates = [
            exe_dir.join(ARCHIVE_FILE_NAME),
            exe_dir.join("resources").join(ARCHIVE_FILE_NAME),
            exe_dir.join("..").join("Resources").join(ARCHIVE_FILE_NAME),
        ];

        candidates.into_iter().find(|candidate| candidate.is_file())
    }

    /// The writable, per-user directory that holds the unpacked runtime.
    #[must_use]
    pub fn runtime_root(&self) -> PathBuf {
        if let Some(pinned) = &self.runtime_root_override {
            return pinned.clone();
        }

        dirs::data_local_dir()
            .unwrap_or_else(env::temp_dir)
            .join(RUNTIME_DIR[0])
            .join(RUNTIME_DIR[1])
    }

    /// Reads the version marker inside an extracted runtime tree.
    ///
    /// Absence, unreadable content, or an empty marker all yield `None`;
    /// callers treat every `None` identically as "needs extraction".
    #[must_use]
    pub fn installed_version(runtime_root: &Path) -> Option<String> {
        let raw = fs::read_to_string(runtime_root.join(VERSION_MARKER_FILE)).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ArtifactStore, VERSION_MARKER_FILE};

    #[test]
    fn installed_version_is_none_when_marker_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        assert_eq!(ArtifactStore::installed_version(dir.path()), None);
    }

    #[test]
    fn installed_version_is_none_for_unreadable_or_blank_markers() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join(VERSION_MARKER_FILE), "   \n").expect("marker should write");
        assert_eq!(ArtifactStore::installed_version(dir.path()), None);

        fs::remove_file(dir.path().join(VERSION_MARKER_FILE)).expect("marker should remove");
        fs::create_dir(dir.path().join(VERSION_MARKER_FILE)).expect("dir should create");
        assert_eq!(ArtifactStore::installed_version(dir.path()), None);
    }

    #[test]
    fn installed_version_trims_trailing_newline() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join(VERSION_MARKER_FILE), "1.4.2\n").expect("marker should write");
        assert_eq!(
            ArtifactStore::installed_version(dir.path()).as_deref(),
            Some("1.4.2")
        );
    }

    #[test]
    fn pinned_archive_is_only_reported_when_present() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let archive = dir.path().join("bundle.zip");

        let store = ArtifactStore::new().with_archive(&archive);
        assert_eq!(store.locate_archive(), None);

        fs::write(&archive, b"stub").expect("archive stub should write");
        assert_eq!(store.locate_archive(), Some(archive));
    }

    #[test]
    fn pinned_runtime_root_wins_over_default() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = ArtifactStore::new().with_runtime_root(dir.path());
        assert_eq!(store.runtime_root(), dir.path());
    }
}
