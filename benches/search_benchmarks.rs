//! Criterion benchmarks for the grouping and content-scan hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;

use rustfind::duplicates::{DuplicateFlags, DuplicateGrouper};
use rustfind::search::{ContentScanner, ContentSpec, FoundEntry, ResultSink, ScanningPath};

struct NullSink;
impl ResultSink for NullSink {}

fn synthetic_entries(count: usize) -> Vec<FoundEntry> {
    (0..count)
        .map(|i| FoundEntry {
            path: format!("/bench/dir{}", i % 64),
            name: format!("file{}.dat", i % 256),
            size: (i % 128) as u64,
            attr: 0,
            modified: SystemTime::UNIX_EPOCH,
            is_dir: false,
        })
        .collect()
}

fn bench_grouping(c: &mut Criterion) {
    let entries = synthetic_entries(10_000);
    c.bench_function("group_10k_by_name_size", |b| {
        b.iter(|| {
            let mut grouper = DuplicateGrouper::new(DuplicateFlags {
                by_name: true,
                by_size: true,
                ..Default::default()
            });
            for entry in &entries {
                grouper.push(entry.clone()).unwrap();
            }
            let scanning = ScanningPath::default();
            grouper.examine(&AtomicBool::new(false), &scanning, &NullSink, false);
            black_box(grouper.into_candidates())
        });
    });
}

fn bench_literal_scan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hay.bin");
    let mut content = vec![b'x'; 4 * 1024 * 1024];
    let at = content.len() - 100;
    content[at..at + 6].copy_from_slice(b"needle");
    std::fs::write(&path, &content).unwrap();

    let scanner = ContentScanner::new(
        &ContentSpec::literal("needle"),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    let total = content.len() as u64;

    c.bench_function("literal_scan_4mb", |b| {
        b.iter(|| black_box(scanner.scan(&path, total, false).unwrap()));
    });
}

criterion_group!(benches, bench_grouping, bench_literal_scan);
criterion_main!(benches);
