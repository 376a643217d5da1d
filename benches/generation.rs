#![allow(unused)]
extern crate bundlestore;

use bundlestore::{
    manifest::{JarManifestParser, ManifestParser},
    BundleInfo, Storage, StorageConfig,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::{fs, hint::black_box, path::Path};

const MANIFEST: &str = "Manifest-Version: 1.0\n\
Bundle-ManifestVersion: 2\n\
Bundle-SymbolicName: org.example.bench; singleton:=true\n\
Bundle-Version: 1.0.0.qualifier\n\
Bundle-Name: %bundle.name\n\
Bundle-Vendor: %bundle.vendor\n\
Implementation-Version: 1.0.0\n\
Export-Package: org.example.bench.api;version=\"1.0.0\",\n\
 org.example.bench.spi;version=\"1.0.0\"\n\
Import-Package: org.osgi.framework;version=\"[1.8,2)\"\n";

fn write_bundle(dir: &Path) {
    fs::create_dir_all(dir.join("META-INF")).unwrap();
    fs::create_dir_all(dir.join("OSGI-INF/l10n")).unwrap();
    fs::write(dir.join("META-INF/MANIFEST.MF"), MANIFEST).unwrap();
    fs::write(
        dir.join("OSGI-INF/l10n/bundle.properties"),
        "bundle.name=Bench\nbundle.vendor=Example\n",
    )
    .unwrap();
    fs::write(
        dir.join("OSGI-INF/l10n/bundle_de.properties"),
        "bundle.name=Messung\n",
    )
    .unwrap();
}

/// Parsing a typical manifest with continuation lines.
fn bench_manifest_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest");
    group.throughput(Throughput::Bytes(MANIFEST.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| {
            let headers = JarManifestParser
                .parse(&mut black_box(MANIFEST.as_bytes()))
                .unwrap();
            black_box(headers)
        });
    });
    group.finish();
}

/// Allocation of generation identifiers, including the lock round trip.
fn bench_create_generation(c: &mut Criterion) {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(StorageConfig::new(root.path()))
        .unwrap()
        .into_shared();
    let info = BundleInfo::new(storage, 1, 0);

    c.bench_function("create_generation", |b| {
        b.iter(|| {
            let generation = info.create_generation().unwrap();
            info.unlock_generation(&generation).unwrap();
            black_box(generation)
        });
    });
}

/// Cold derivation of headers and translations against cached reads.
fn bench_derived_state(c: &mut Criterion) {
    let root = tempfile::tempdir().unwrap();
    let content = root.path().join("content");
    write_bundle(&content);

    let storage = Storage::new(StorageConfig::new(root.path().join("storage")))
        .unwrap()
        .into_shared();
    let info = BundleInfo::new(storage, 2, 0);

    c.bench_function("headers_cold", |b| {
        b.iter(|| {
            let generation = info.restore_generation(0, Some(content.clone()), true, false);
            black_box(generation.localized_headers(Some("de_CH")).unwrap())
        });
    });

    let generation = info.restore_generation(1, Some(content.clone()), true, false);
    generation.localized_headers(Some("de_CH")).unwrap();
    c.bench_function("headers_cached", |b| {
        b.iter(|| black_box(generation.localized_headers(Some("de_CH")).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_manifest_parse,
    bench_create_generation,
    bench_derived_state
);
criterion_main!(benches);
