//! Integration tests for the generation lifecycle of directory bundles.
//!
//! These tests stage real bundle directories below a temporary storage root and walk
//! through creation, derived state, deletion and restoration the way an installer does.

use bundlestore::{prelude::*, Result};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

fn write_bundle(dir: &Path, manifest: &str) -> PathBuf {
    fs::create_dir_all(dir.join("META-INF")).unwrap();
    fs::write(dir.join("META-INF/MANIFEST.MF"), manifest).unwrap();
    dir.to_path_buf()
}

fn storage(root: &Path) -> Result<Arc<Storage>> {
    let config = StorageConfig::new(root.join("storage"))
        .with_default_locale("en")
        .with_generation_lock_timeout(Duration::from_millis(200));
    Ok(Storage::new(config)?.into_shared())
}

#[test]
fn test_stage_directory_bundle() -> Result<()> {
    let root = tempfile::tempdir()?;
    let content = write_bundle(
        &root.path().join("app"),
        "Manifest-Version: 1.0\nBundle-SymbolicName: org.example.app\nImplementation-Version: 2.1.0\n",
    );
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 21, 0);

    let generation = storage.stage_generation(&info, &content)?;

    assert_eq!(generation.generation_id(), 0);
    assert!(generation.is_directory());
    assert!(generation.has_package_info());
    assert_eq!(generation.content(), Some(content.clone()));
    assert_eq!(
        generation.headers()?.get("Bundle-SymbolicName"),
        Some("org.example.app")
    );

    let bundle_file = generation.bundle_file()?;
    assert_eq!(bundle_file.base_file(), Some(content));
    assert!(Arc::ptr_eq(&bundle_file, &generation.bundle_file()?));

    assert_eq!(
        generation
            .entry_url("META-INF/MANIFEST.MF")?
            .map(|url| url.to_string()),
        Some("bundleentry://21:0/META-INF/MANIFEST.MF".to_string())
    );
    Ok(())
}

#[test]
fn test_update_creates_next_generation() -> Result<()> {
    let root = tempfile::tempdir()?;
    let v1 = write_bundle(
        &root.path().join("v1"),
        "Manifest-Version: 1.0\nBundle-Version: 1.0.0\n",
    );
    let v2 = write_bundle(
        &root.path().join("v2"),
        "Manifest-Version: 1.0\nBundle-Version: 2.0.0\n",
    );
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 4, 0);

    let first = storage.stage_generation(&info, &v1)?;
    let second = storage.stage_generation(&info, &v2)?;

    assert_eq!(second.generation_id(), first.generation_id() + 1);
    assert_eq!(first.headers()?.get("Bundle-Version"), Some("1.0.0"));
    assert_eq!(second.headers()?.get("Bundle-Version"), Some("2.0.0"));
    assert!(!first.has_package_info());
    assert_eq!(info.next_generation_id(), 2);
    Ok(())
}

#[test]
fn test_concurrent_installs_get_distinct_ids() -> Result<()> {
    let root = tempfile::tempdir()?;
    let content = write_bundle(
        &root.path().join("app"),
        "Manifest-Version: 1.0\nBundle-SymbolicName: org.example.app\n",
    );
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 30, 10);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let info = Arc::clone(&info);
            let content = content.clone();
            thread::spawn(move || {
                (0..5)
                    .map(|_| {
                        storage
                            .stage_generation(&info, &content)
                            .map(|generation| generation.generation_id())
                    })
                    .collect::<Result<Vec<u64>>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap()?;
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(seen.insert(id));
        }
    }

    assert_eq!(seen.len(), 30);
    assert_eq!(seen.iter().min(), Some(&10));
    assert_eq!(seen.iter().max(), Some(&39));
    Ok(())
}

#[test]
fn test_delete_and_restore() -> Result<()> {
    let root = tempfile::tempdir()?;
    let content = write_bundle(&root.path().join("app"), "Manifest-Version: 1.0\n");
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 5, 0);

    let generation = storage.stage_generation(&info, &content)?;
    let extracted = generation.extract_file("lib/libdemo.so");
    fs::create_dir_all(extracted.parent().unwrap())?;
    fs::write(&extracted, b"\x7fELF")?;
    assert_eq!(extracted, storage.file("5/0/lib/libdemo.so"));

    generation.close();
    generation.delete();
    assert!(!storage.file("5/0").exists());
    // Deleting storage never touches the content location
    assert!(content.join("META-INF/MANIFEST.MF").exists());

    let restored = info.restore_generation(generation.generation_id(), None, false, false);
    assert!(restored.content().is_none());
    assert!(!restored.is_directory());
    assert!(!restored.has_package_info());
    assert!(matches!(restored.bundle_file(), Err(Error::IllegalState(_))));
    Ok(())
}

#[test]
fn test_restore_after_restart() -> Result<()> {
    let root = tempfile::tempdir()?;
    let content = write_bundle(
        &root.path().join("app"),
        "Manifest-Version: 1.0\nSpecification-Title: Demo API\n",
    );

    // First run stages a generation and records its attributes
    let (generation_id, next_generation_id, has_package_info) = {
        let storage = storage(root.path())?;
        let info = BundleInfo::new(storage.clone(), 8, 0);
        let generation = storage.stage_generation(&info, &content)?;
        (
            generation.generation_id(),
            info.next_generation_id(),
            generation.has_package_info(),
        )
    };
    assert!(has_package_info);

    // Second run replays them
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage, 8, next_generation_id);
    let restored =
        info.restore_generation(generation_id, Some(content.clone()), true, has_package_info);

    assert_eq!(
        restored.headers()?.get("Specification-Title"),
        Some("Demo API")
    );
    assert_eq!(
        restored.extract_file("lib/a.so"),
        root.path().join("storage/8/0/lib/a.so")
    );
    assert_eq!(info.create_generation()?.generation_id(), 1);
    Ok(())
}

#[test]
fn test_archive_content_is_rejected() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = root.path().join("app.jar");
    fs::write(&archive, b"PK\x03\x04")?;
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 9, 0);

    let result = storage.stage_generation(&info, &archive);
    assert!(matches!(result, Err(Error::NotSupported(_))));
    assert!(!storage.file("9/0").exists());

    // The identifier was unlocked and consumed
    assert_eq!(info.create_generation()?.generation_id(), 1);
    Ok(())
}

#[test]
fn test_data_directory() -> Result<()> {
    let root = tempfile::tempdir()?;
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 11, 0);

    let state = info.data_file(Some("state.properties")).unwrap();
    fs::write(&state, "started=true\n")?;
    assert_eq!(state, storage.file("11/data/state.properties"));

    let read_only = Storage::new(
        StorageConfig::new(root.path().join("storage")).with_read_only(true),
    )?
    .into_shared();
    let info = BundleInfo::new(read_only, 12, 0);
    assert!(info.data_file(None).is_none());
    Ok(())
}

#[test]
fn test_domain_contract() -> Result<()> {
    let root = tempfile::tempdir()?;
    let content = write_bundle(
        &root.path().join("app"),
        "Manifest-Version: 1.0\nBundle-SymbolicName: org.example.app;singleton:=true\nBundle-Version: 3.0.0\n",
    );
    let storage = storage(root.path())?;
    let info = BundleInfo::new(storage.clone(), 14, 0);
    let generation = storage.stage_generation(&info, &content)?;

    assert!(matches!(generation.domain(), Err(Error::IllegalState(_))));

    let revision = ModuleRevision::from_headers(&*generation.headers()?).unwrap();
    assert_eq!(revision.to_string(), "org.example.app_3.0.0");
    generation.set_revision(Arc::new(revision));

    let domain = generation.domain()?.unwrap();
    assert_eq!(domain.bundle_id(), 14);
    assert_eq!(domain.code_source(), Some(content.as_path()));
    Ok(())
}
