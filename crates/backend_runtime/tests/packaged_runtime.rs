//! End-to-end: packaged archive -> extraction -> supervised process.

#![cfg(unix)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backend_runtime::{
    ArtifactStore, ExtractError, PackagedRuntimeResolver, ProcessState, ProcessSupervisor,
    RuntimeExtractor, SupervisorError,
};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builds an archive whose "interpreter" is a shell script that ignores its
/// arguments and idles, standing in for the real runtime tree.
fn build_runtime_archive(dir: &Path) -> PathBuf {
    let path = dir.join("backend.zip");
    let file = std::fs::File::create(&path).expect("archive file should create");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    writer
        .start_file("app/app.py", options)
        .expect("entry should start");
    writer
        .write_all(b"# backend application payload\n")
        .expect("entry should write");

    writer
        .start_file("python/bin/python3", options.unix_permissions(0o755))
        .expect("entry should start");
    writer
        .write_all(b"#!/bin/sh\nsleep 30\n")
        .expect("entry should write");

    writer.finish().expect("archive should finish");
    path
}

#[test]
fn packaged_profile_extracts_then_supervises_the_backend() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let archive = build_runtime_archive(dir.path());
    let runtime_root = dir.path().join("runtime");

    let store = ArtifactStore::new()
        .with_archive(&archive)
        .with_runtime_root(&runtime_root);
    let resolver =
        PackagedRuntimeResolver::new(store, Arc::new(RuntimeExtractor::new()), "1.0.0");
    let supervisor = ProcessSupervisor::new(resolver);

    let handle = supervisor.start().expect("packaged start should succeed");
    assert_eq!(handle.description, "packaged runtime");
    assert!(supervisor.state().is_running());
    assert_eq!(
        ArtifactStore::installed_version(&runtime_root).as_deref(),
        Some("1.0.0")
    );

    supervisor.stop();
    assert!(matches!(
        supervisor.state(),
        ProcessState::Exited {
            requested: true,
            ..
        }
    ));
}

#[test]
fn repeated_starts_reuse_the_extracted_runtime() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let archive = build_runtime_archive(dir.path());
    let runtime_root = dir.path().join("runtime");

    let store = ArtifactStore::new()
        .with_archive(&archive)
        .with_runtime_root(&runtime_root);
    let extractor = Arc::new(RuntimeExtractor::new());
    let resolver = PackagedRuntimeResolver::new(store, Arc::clone(&extractor), "1.0.0");
    let supervisor = ProcessSupervisor::new(resolver);

    supervisor.start().expect("first start should succeed");
    supervisor.stop();
    supervisor.start().expect("second start should succeed");
    supervisor.stop();

    assert_eq!(extractor.extraction_count(), 1);
}

#[test]
fn an_unbundled_archive_fails_the_launch_attempt() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ArtifactStore::new()
        .with_archive(dir.path().join("missing.zip"))
        .with_runtime_root(dir.path().join("runtime"));
    let resolver =
        PackagedRuntimeResolver::new(store, Arc::new(RuntimeExtractor::new()), "1.0.0");
    let supervisor = ProcessSupervisor::new(resolver);

    let error = supervisor.start().expect_err("start must fail");
    assert!(matches!(
        error,
        SupervisorError::Extract(ExtractError::ArchiveNotBundled)
    ));
}
