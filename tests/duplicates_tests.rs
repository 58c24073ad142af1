//! End-to-end duplicate-search scenarios through the controller.

use std::fs::{self, File};
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use rustfind::duplicates::{DuplicateCandidate, DuplicateFlags};
use rustfind::search::{
    FilterCriteria, ResultSink, SearchController, SearchJob, SearchSpec, SearchStatus,
};

#[derive(Default)]
struct DupSink {
    candidates: Mutex<Vec<DuplicateCandidate>>,
    statuses: Mutex<Vec<SearchStatus>>,
}

impl ResultSink for DupSink {
    fn duplicates_ready(&self, candidates: Vec<DuplicateCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
    fn finished(&self, status: SearchStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}

fn write(dir: &TempDir, rel: &str, content: &[u8]) {
    let path = dir.path().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    f.write_all(content).unwrap();
}

fn run_duplicates(dir: &TempDir, flags: DuplicateFlags) -> (Arc<DupSink>, SearchStatus) {
    let spec = SearchSpec::new(dir.path(), "*", true).unwrap();
    let job =
        SearchJob::new(vec![spec], Arc::new(FilterCriteria::default())).with_duplicates(flags);
    let sink = Arc::new(DupSink::default());
    let mut controller = SearchController::new();
    controller.start(job, sink.clone()).unwrap();
    let status = controller.wait().unwrap();
    (sink, status)
}

fn names(sink: &DupSink) -> Vec<String> {
    let mut names: Vec<String> = sink
        .candidates
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.entry.name.clone())
        .collect();
    names.sort();
    names
}

#[test]
fn size_and_content_yield_one_group_excluding_singleton() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.txt", b"hello");
    write(&dir, "b.txt", b"hello");
    write(&dir, "c.txt", b"world");

    let (sink, status) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        },
    );

    assert_eq!(status, SearchStatus::Completed);
    assert_eq!(names(&sink), vec!["a.txt", "b.txt"]);
    let candidates = sink.candidates.lock().unwrap();
    assert!(candidates.iter().all(|c| c.group_id == Some(0)));
    assert!(candidates.iter().all(|c| c.content_hash.is_some()));
    assert_eq!(sink.statuses.lock().unwrap().as_slice(), &[status]);
}

#[test]
fn same_size_different_content_splits_groups() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.bin", b"aaaaa");
    write(&dir, "b.bin", b"aaaaa");
    write(&dir, "c.bin", b"bbbbb");
    write(&dir, "d.bin", b"bbbbb");

    let (sink, _) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        },
    );

    let candidates = sink.candidates.lock().unwrap();
    assert_eq!(candidates.len(), 4);
    // Two groups with distinct ids; members of one group share a digest.
    let ids: std::collections::BTreeSet<_> =
        candidates.iter().filter_map(|c| c.group_id).collect();
    assert_eq!(ids.len(), 2);
    for pair in candidates.chunks(2) {
        assert_eq!(pair[0].group_id, pair[1].group_id);
        assert_eq!(pair[0].content_hash, pair[1].content_hash);
    }
}

#[test]
fn by_name_groups_across_directories() {
    let dir = TempDir::new().unwrap();
    write(&dir, "x/report.txt", b"one");
    write(&dir, "y/REPORT.TXT", b"two-longer");
    write(&dir, "z/other.txt", b"three");

    let (sink, _) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_name: true,
            ..Default::default()
        },
    );

    let lowered: Vec<String> = names(&sink).iter().map(|n| n.to_lowercase()).collect();
    assert_eq!(lowered, vec!["report.txt", "report.txt"]);
}

#[test]
fn directories_never_join_duplicate_groups() {
    let dir = TempDir::new().unwrap();
    write(&dir, "same/file", b"zz");
    write(&dir, "other/same", b"zz"); // file named like the directory

    let (sink, _) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_name: true,
            ..Default::default()
        },
    );

    // The directory "same" and the file "same" must not pair up.
    assert!(sink
        .candidates
        .lock()
        .unwrap()
        .iter()
        .all(|c| !c.entry.is_dir));
}

#[test]
fn empty_files_group_together_without_digests() {
    let dir = TempDir::new().unwrap();
    write(&dir, "e1", b"");
    write(&dir, "e2", b"");
    write(&dir, "full", b"data");

    let (sink, _) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        },
    );

    assert_eq!(names(&sink), vec!["e1", "e2"]);
    assert!(sink
        .candidates
        .lock()
        .unwrap()
        .iter()
        .all(|c| c.content_hash.is_none()));
}

#[test]
fn many_equal_sized_files_group_without_overflow() {
    let dir = TempDir::new().unwrap();
    for i in 0..500 {
        write(&dir, &format!("f{i:03}"), b"");
    }

    let (sink, status) = run_duplicates(
        &dir,
        DuplicateFlags {
            by_size: true,
            ..Default::default()
        },
    );

    assert_eq!(status, SearchStatus::Completed);
    let candidates = sink.candidates.lock().unwrap();
    assert_eq!(candidates.len(), 500);
    assert!(candidates.iter().all(|c| c.group_id == Some(0)));
    assert!(candidates.iter().all(|c| !c.distinct));
}

#[test]
fn cancelled_walk_still_delivers_metadata_groups() {
    use rustfind::search::EntryCriteria;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::SystemTime;

    /// Accepts everything, raising the stop flag at the nth entry.
    struct StopAfterCriteria {
        stop: Arc<AtomicBool>,
        seen: AtomicUsize,
        after: usize,
    }
    impl EntryCriteria for StopAfterCriteria {
        fn accepts(&self, _attr: u32, _size: u64, _modified: SystemTime) -> bool {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.stop.store(true, Ordering::SeqCst);
            }
            true
        }
    }

    let dir = TempDir::new().unwrap();
    for i in 0..6 {
        write(&dir, &format!("f{i}.txt"), b"hello");
    }

    let spec = SearchSpec::new(dir.path(), "*", true).unwrap();
    let mut controller = SearchController::new();
    let criteria = StopAfterCriteria {
        stop: controller.stop_flag(),
        seen: AtomicUsize::new(0),
        after: 4,
    };
    let job = SearchJob::new(vec![spec], Arc::new(criteria)).with_duplicates(DuplicateFlags {
        by_size: true,
        by_content: true,
        ..Default::default()
    });

    let sink = Arc::new(DupSink::default());
    controller.start(job, sink.clone()).unwrap();
    let status = controller.wait().unwrap();

    assert_eq!(status, SearchStatus::Cancelled);
    let candidates = sink.candidates.lock().unwrap();
    // The entries accepted before the flag was observed are still grouped,
    // by metadata only; the traversal never reached the rest.
    assert!(!candidates.is_empty());
    assert!(candidates.len() < 6);
    assert!(candidates.iter().all(|c| c.content_hash.is_none()));
    assert!(candidates.iter().all(|c| c.group_id == Some(0)));
}
