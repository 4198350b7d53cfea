use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use zip::ZipArchive;

use crate::artifacts::{ArtifactStore, VERSION_MARKER_FILE};
use crate::error::ExtractError;

/// Unpacks the packaged backend archive into the runtime directory.
///
/// Extraction is version-gated: the runtime tree is reused as long as its
/// marker matches the target version, and replaced atomically otherwise.
/// The replacement is staged in a sibling temporary directory and renamed
/// into place, with the marker written inside the staging tree as the last
/// step before the swap; a crash at any point leaves either the previous
/// consistent tree or no tree at all, never a half-populated one.
#[derive(Debug, Default)]
pub struct RuntimeExtractor {
    slot: Mutex<InflightSlot>,
    done: Condvar,
    extractions: AtomicU64,
}

#[derive(Debug, Default)]
struct InflightSlot {
    running: bool,
    epoch: u64,
    last: Option<(u64, Result<PathBuf, String>)>,
}

impl RuntimeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of destructive unpacks this extractor has performed.
    #[must_use]
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Acquire)
    }

    /// Ensures `runtime_root` holds a consistent unpack of `target_version`.
    ///
    /// Concurrent callers within the same process join the in-flight
    /// operation instead of starting a second unpack; every joiner observes
    /// the same outcome.
    pub fn ensure_extracted(
        &self,
        archive: &Path,
        runtime_root: &Path,
        target_version: &str,
    ) -> Result<PathBuf, ExtractError> {
        loop {
            let my_epoch = {
                let mut slot = lock_unpoisoned(&self.slot);
                if slot.running {
                    let joined_epoch = slot.epoch;
                    while slot.running {
                        slot = wait_unpoisoned(&self.done, slot);
                    }
                    match slot.last.as_ref() {
                        Some((epoch, result)) if *epoch >= joined_epoch => {
                            return result.clone().map_err(|message| {
                                ExtractError::InFlightFailed { message }
                            });
                        }
                        _ => continue,
                    }
                }

                if is_current(runtime_root, target_version) {
                    return Ok(runtime_root.to_path_buf());
                }

                slot.running = true;
                slot.epoch += 1;
                slot.epoch
            };

            let result = self.extract_into(archive, runtime_root, target_version);

            let summary = match &result {
                Ok(path) => Ok(path.clone()),
                Err(error) => Err(error.to_string()),
            };
            {
                let mut slot = lock_unpoisoned(&self.slot);
                slot.running = false;
                slot.last = Some((my_epoch, summary));
            }
            self.done.notify_all();

            return result;
        }
    }

    fn extract_into(
        &self,
        archive: &Path,
        runtime_root: &Path,
        target_version: &str,
    ) -> Result<PathBuf, ExtractError> {
        if !archive.is_file() {
            return Err(ExtractError::ArchiveMissing {
                path: archive.to_path_buf(),
            });
        }

        let parent = runtime_root.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|source| ExtractError::io("creating runtime parent directory", parent, source))?;

        let staging = tempfile::Builder::new()
            .prefix(".backend-runtime-staging-")
            .tempdir_in(parent)
            .map_err(|source| ExtractError::io("creating staging directory", parent, source))?;

        log::info!(
            "extracting backend runtime {} into {}",
            target_version,
            runtime_root.display()
        );
        self.extractions.fetch_add(1, Ordering::AcqRel);

        unpack_archive(archive, staging.path())?;

        let marker = staging.path().join(VERSION_MARKER_FILE);
        fs::write(&marker, target_version)
            .map_err(|source| ExtractError::io("writing version marker", &marker, source))?;

        match fs::remove_dir_all(runtime_root) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ExtractError::io(
                    "removing previous runtime directory",
                    runtime_root,
                    source,
                ));
            }
        }

        let staged = staging.into_path();
        if let Err(source) = fs::rename(&staged, runtime_root) {
            let _ = fs::remove_dir_all(&staged);
            return Err(ExtractError::io(
                "activating staged runtime directory",
                runtime_root,
                source,
            ));
        }

        Ok(runtime_root.to_path_buf())
    }
}

fn is_current(runtime_root: &Path, target_version: &str) -> bool {
    runtime_root.is_dir()
        && ArtifactStore::installed_version(runtime_root).as_deref() == Some(target_version)
}

fn unpack_archive(archive: &Path, destination: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive)
        .map_err(|source| ExtractError::io("opening backend archive", archive, source))?;
    let mut zip = ZipArchive::new(file).map_err(|source| ExtractError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|source| ExtractError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;

        // enclosed_name rejects entries that would escape the destination.
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        if should_skip(&relative) {
            continue;
        }

        let target = destination.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|source| ExtractError::io("creating extracted directory", &target, source))?;
            continue;
        }

        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)
                .map_err(|source| ExtractError::io("creating extracted directory", dir, source))?;
        }
        let mut output = File::create(&target)
            .map_err(|source| ExtractError::io("creating extracted file", &target, source))?;
        io::copy(&mut entry, &mut output)
            .map_err(|source| ExtractError::io("writing extracted file", &target, source))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode)).map_err(|source| {
                ExtractError::io("restoring extracted permissions", &target, source)
            })?;
        }
    }

    Ok(())
}

// Interpreter caches and editable-install debris serve no purpose in the
// runtime tree and may reference build-machine paths.
fn should_skip(relative: &Path) -> bool {
    let cached = relative
        .components()
        .any(|component| component.as_os_str() == "__pycache__");
    if cached {
        return true;
    }

    match relative.file_name().and_then(|name| name.to_str()) {
        Some(name) => {
            name.ends_with(".pyc") || name.ends_with(".egg-link") || name == ".DS_Store"
        }
        None => false,
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait_unpoisoned<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
) -> std::sync::MutexGuard<'a, T> {
    match condvar.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
