//! Performance benchmarks for the per-request hot paths.
//!
//! These benchmarks measure:
//! - Credential checks
//! - Path authorization against the sandbox
//! - Envelope encoding of listings and file records

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use connector::{Credential, CredentialGate, FileService, PathGuard};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use protocol::{Envelope, FileRecord};

/// Benchmark the credential gate.
fn bench_credential_check(c: &mut Criterion) {
    let credential = Credential::basic("alice", "s3cret");
    let gate = CredentialGate::new(&credential);
    let wrong = Credential::basic("alice", "wrong");

    let mut group = c.benchmark_group("credential_check");
    group.bench_function("valid", |b| {
        b.iter(|| gate.authenticate(black_box(Some(credential.header_value()))))
    });
    group.bench_function("invalid", |b| {
        b.iter(|| gate.authenticate(black_box(Some(wrong.header_value()))))
    });
    group.finish();
}

/// Benchmark path authorization.
fn bench_authorize(c: &mut Criterion) {
    let temp_dir = tempfile::TempDir::new().expect("tempdir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("a/b/c/d")).expect("mkdir");
    fs::write(root.join("a/b/c/d/file.txt"), "x").expect("write");
    let guard = PathGuard::new(root, Vec::<PathBuf>::new()).expect("guard");

    let mut group = c.benchmark_group("authorize");
    group.bench_function("shallow_dir", |b| b.iter(|| guard.authorize(black_box("a"))));
    group.bench_function("deep_file", |b| {
        b.iter(|| guard.authorize(black_box("a/b/c/d/file.txt")))
    });
    group.bench_function("traversal_rejected", |b| {
        b.iter(|| guard.authorize(black_box("a/../../..")))
    });
    group.bench_function("new_path", |b| {
        b.iter(|| guard.authorize_new(black_box("a/b/new/dir/file.txt")))
    });
    group.finish();
}

/// Benchmark envelope encoding.
fn bench_envelope_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_encoding");

    let temp_dir = tempfile::TempDir::new().expect("tempdir");
    for i in 0..200 {
        fs::write(temp_dir.path().join(format!("file{:03}", i)), "x").expect("write");
    }
    let guard = Arc::new(PathGuard::new(temp_dir.path(), Vec::<PathBuf>::new()).expect("guard"));
    let service = FileService::new(guard.clone());
    let listing = service.list(&guard.authorize_root()).expect("list");
    group.bench_function("listing_200", |b| {
        b.iter(|| Envelope::success(black_box(&listing)).to_json())
    });

    let text = FileRecord::from_bytes("a.txt", "a.txt", vec![b'a'; 65536], 0.0);
    group.throughput(Throughput::Bytes(65536));
    group.bench_function("text_64KB", |b| {
        b.iter(|| Envelope::success(black_box(&text)).to_json())
    });

    let binary = FileRecord::from_bytes("a.bin", "a.bin", vec![0xff; 65536], 0.0);
    group.bench_function("binary_64KB", |b| {
        b.iter(|| Envelope::success(black_box(&binary)).to_json())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_credential_check,
    bench_authorize,
    bench_envelope_encoding
);
criterion_main!(benches);
