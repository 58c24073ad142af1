//! Sorting and grouping of duplicate candidates.
//!
//! The grouper holds every file the walker accepted and, once traversal is
//! done, classifies them:
//!
//! 1. Sort by the selected criteria (explicit-stack quicksort).
//! 2. Drop candidates whose key occurs only once.
//! 3. If content comparison is on, stream a digest for every surviving file
//!    with size > 0, then sort and drop singletons again with digests.
//! 4. Assign the alternating distinct flag and the per-group id.
//!
//! Cancellation during digesting keeps the already-classified tail so the
//! user still sees what was found.

use std::cmp::Ordering;
use std::collections::TryReserveError;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use super::{Digest, DuplicateCandidate, DuplicateFlags};
use crate::search::controller::{ResultSink, ScanningPath};
use crate::search::{FoundEntry, LogEntry};

/// Read size for digest computation.
const DIGEST_BUFFER_SIZE: usize = 16 * 1024;

/// Accumulates candidates during traversal and groups them afterwards.
#[derive(Debug)]
pub struct DuplicateGrouper {
    flags: DuplicateFlags,
    candidates: Vec<DuplicateCandidate>,
}

enum DigestAbort {
    Stopped,
    Io(std::io::Error),
}

impl DuplicateGrouper {
    /// Create a grouper for the given (validated) criteria.
    #[must_use]
    pub fn new(flags: DuplicateFlags) -> Self {
        Self {
            flags,
            candidates: Vec::new(),
        }
    }

    /// Number of candidates currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether no candidate has been accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Accept a candidate found by the walker. Directories never take part
    /// in duplicate grouping and must be filtered by the caller.
    ///
    /// # Errors
    ///
    /// Returns the allocation error when the candidate store cannot grow;
    /// the caller treats this as fatal to the run.
    pub fn push(&mut self, entry: FoundEntry) -> Result<(), TryReserveError> {
        if self.candidates.len() == self.candidates.capacity() {
            self.candidates.try_reserve(1)?;
        }
        self.candidates.push(DuplicateCandidate::new(entry));
        Ok(())
    }

    /// Consume the grouper, yielding the final candidate order.
    #[must_use]
    pub fn into_candidates(self) -> Vec<DuplicateCandidate> {
        self.candidates
    }

    /// Sort, digest and group the held candidates.
    ///
    /// With `metadata_only` (set when the run was cancelled during
    /// traversal), the digest phase is skipped and the retained candidates
    /// are grouped by name/size alone.
    pub fn examine(
        &mut self,
        stop: &AtomicBool,
        scanning: &ScanningPath,
        sink: &dyn ResultSink,
        metadata_only: bool,
    ) {
        if self.candidates.is_empty() {
            return;
        }

        let by_name = self.flags.by_name;
        let by_size = self.flags.by_size;
        let by_content = self.flags.by_content && by_size && !metadata_only;

        self.quicksort(by_name, by_size, false);
        self.remove_singletons(by_name, by_size, false);

        if by_content && !self.candidates.is_empty() {
            self.digest_candidates(stop, scanning, sink);
            if !self.candidates.is_empty() {
                self.quicksort(by_name, by_size, true);
                self.remove_singletons(by_name, by_size, true);
            }
        }

        self.set_distinct_flags(by_name, by_size, by_content);
        self.set_group_ids();
    }

    /// Digest every candidate with size > 0, walking from the end so that a
    /// cancellation can cut off exactly the not-yet-processed front.
    fn digest_candidates(&mut self, stop: &AtomicBool, scanning: &ScanningPath, sink: &dyn ResultSink) {
        let total_bytes: u64 = self.candidates.iter().map(|c| c.entry.size).sum();
        let mut read_bytes: u64 = 0;
        let mut last_percent: i32 = -1;

        let mut i = self.candidates.len();
        while i > 0 {
            i -= 1;
            if self.candidates[i].entry.size == 0 {
                continue;
            }

            let full = self.candidates[i].full_path();
            scanning.set(&full.to_string_lossy());

            match digest_file(
                &full,
                stop,
                &mut read_bytes,
                total_bytes,
                &mut last_percent,
                sink,
            ) {
                Ok(digest) => self.candidates[i].content_hash = Some(digest),
                Err(DigestAbort::Stopped) => {
                    // Cut the unexplored front; show at least what was found.
                    self.candidates.drain(..=i);
                    break;
                }
                Err(DigestAbort::Io(err)) => {
                    sink.log(&LogEntry::error(
                        format!("Error reading file: {err}"),
                        full.to_string_lossy(),
                    ));
                    self.candidates.remove(i);
                }
            }
        }
    }

    /// Compare two candidates under the active criteria. `by_path` adds the
    /// lowest-priority tie-break used only for a deterministic output order.
    fn compare(
        a: &DuplicateCandidate,
        b: &DuplicateCandidate,
        by_name: bool,
        by_size: bool,
        by_digest: bool,
        by_path: bool,
    ) -> Ordering {
        let mut ord = if by_size {
            let mut ord = if by_name {
                a.name_key.cmp(&b.name_key)
            } else {
                Ordering::Equal
            };
            if ord == Ordering::Equal {
                ord = a.entry.size.cmp(&b.entry.size);
                if ord == Ordering::Equal && by_digest && a.entry.size > 0 {
                    ord = match (&a.content_hash, &b.content_hash) {
                        (Some(x), Some(y)) => x.cmp(y),
                        _ => Ordering::Equal,
                    };
                }
            }
            ord
        } else {
            // by_name && !by_size
            a.name_key.cmp(&b.name_key)
        };
        if by_path && ord == Ordering::Equal {
            ord = a.path_key.cmp(&b.path_key);
        }
        ord
    }

    /// Quicksort with an explicit stack: the smaller partition is pushed, the
    /// larger one is looped, bounding the stack at O(log n) even for inputs
    /// that are all equal keys.
    fn quicksort(&mut self, by_name: bool, by_size: bool, by_digest: bool) {
        let n = self.candidates.len();
        if n < 2 {
            return;
        }
        let cmp = |a: &DuplicateCandidate, b: &DuplicateCandidate| {
            Self::compare(a, b, by_name, by_size, by_digest, true)
        };

        let mut stack: Vec<(isize, isize)> = vec![(0, (n - 1) as isize)];
        while let Some((mut left, mut right)) = stack.pop() {
            loop {
                let mut i = left;
                let mut j = right;
                let pivot = self.candidates[((left + right) / 2) as usize].clone();
                loop {
                    while cmp(&self.candidates[i as usize], &pivot) == Ordering::Less && i < right {
                        i += 1;
                    }
                    while cmp(&pivot, &self.candidates[j as usize]) == Ordering::Less && j > left {
                        j -= 1;
                    }
                    if i <= j {
                        self.candidates.swap(i as usize, j as usize);
                        i += 1;
                        j -= 1;
                    }
                    if i > j {
                        break;
                    }
                }

                if left < j && i < right {
                    if j - left < right - i {
                        stack.push((left, j));
                        left = i;
                    } else {
                        stack.push((i, right));
                        right = j;
                    }
                } else if left < j {
                    right = j;
                } else if i < right {
                    left = i;
                } else {
                    break;
                }
            }
        }
    }

    /// Drop every maximal run of length 1 under the comparator (ignoring the
    /// path tie-break). Requires the candidates to be sorted.
    fn remove_singletons(&mut self, by_name: bool, by_size: bool, by_digest: bool) {
        let n = self.candidates.len();
        if n == 0 {
            return;
        }
        let mut keep = vec![false; n];
        let mut run_start = 0;
        for i in 1..=n {
            let run_ended = i == n
                || Self::compare(
                    &self.candidates[i],
                    &self.candidates[run_start],
                    by_name,
                    by_size,
                    by_digest,
                    false,
                ) != Ordering::Equal;
            if run_ended {
                if i - run_start >= 2 {
                    for k in &mut keep[run_start..i] {
                        *k = true;
                    }
                }
                run_start = i;
            }
        }
        let mut it = keep.into_iter();
        self.candidates.retain(|_| it.next().unwrap_or(false));
    }

    /// Assign the alternating distinct flag: each maximal equal run shares a
    /// flag, flipping between consecutive runs. Requires sorted candidates.
    fn set_distinct_flags(&mut self, by_name: bool, by_size: bool, by_digest: bool) {
        if self.candidates.is_empty() {
            return;
        }
        let mut distinct = false;
        self.candidates[0].distinct = distinct;
        let mut run_start = 0;
        for i in 1..self.candidates.len() {
            if Self::compare(
                &self.candidates[i],
                &self.candidates[run_start],
                by_name,
                by_size,
                by_digest,
                false,
            ) != Ordering::Equal
            {
                distinct = !distinct;
                run_start = i;
            }
            self.candidates[i].distinct = distinct;
        }
    }

    /// Assign ascending group ids, bumping at every distinct-flag transition.
    fn set_group_ids(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        let mut group: u32 = 0;
        self.candidates[0].group_id = Some(group);
        let mut last_flag = self.candidates[0].distinct;
        for i in 1..self.candidates.len() {
            if self.candidates[i].distinct != last_flag {
                group += 1;
                last_flag = self.candidates[i].distinct;
            }
            self.candidates[i].group_id = Some(group);
        }
    }
}

/// Stream one file through MD5, updating the shared byte/percent progress.
fn digest_file(
    path: &Path,
    stop: &AtomicBool,
    read_bytes: &mut u64,
    total_bytes: u64,
    last_percent: &mut i32,
    sink: &dyn ResultSink,
) -> Result<Digest, DigestAbort> {
    let mut file = File::open(path).map_err(DigestAbort::Io)?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; DIGEST_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).map_err(DigestAbort::Io)?;
        if stop.load(AtomicOrdering::Relaxed) {
            return Err(DigestAbort::Stopped);
        }
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);

        *read_bytes += read as u64;
        let percent = if *read_bytes >= total_bytes {
            if total_bytes == 0 {
                0
            } else {
                100
            }
        } else {
            ((*read_bytes * 100) / total_bytes) as i32
        };
        if percent != *last_percent {
            *last_percent = percent;
            sink.digest_progress(percent as u8);
        }
    }

    Ok(digest_to_bytes(context.finalize()))
}

fn digest_to_bytes(digest: md5::Digest) -> Digest {
    digest.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::time::SystemTime;
    use tempfile::TempDir;

    struct NullSink;
    impl ResultSink for NullSink {}

    fn entry(dir: &str, name: &str, size: u64) -> FoundEntry {
        FoundEntry {
            path: dir.to_string(),
            name: name.to_string(),
            size,
            attr: 0,
            modified: SystemTime::UNIX_EPOCH,
            is_dir: false,
        }
    }

    fn examine(grouper: &mut DuplicateGrouper) {
        examine_with_stop(grouper, &AtomicBool::new(false), false);
    }

    fn examine_with_stop(grouper: &mut DuplicateGrouper, stop: &AtomicBool, metadata_only: bool) {
        let scanning = ScanningPath::default();
        grouper.examine(stop, &scanning, &NullSink, metadata_only);
    }

    fn names(grouper: &DuplicateGrouper) -> Vec<&str> {
        grouper
            .candidates
            .iter()
            .map(|c| c.entry.name.as_str())
            .collect()
    }

    #[test]
    fn test_groups_by_name_and_size_drop_singletons() {
        let flags = DuplicateFlags {
            by_name: true,
            by_size: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/a", "x.txt", 10)).unwrap();
        g.push(entry("/b", "X.TXT", 10)).unwrap();
        g.push(entry("/c", "x.txt", 11)).unwrap(); // same name, other size
        g.push(entry("/d", "lonely.txt", 10)).unwrap();
        examine(&mut g);

        assert_eq!(names(&g), vec!["x.txt", "X.TXT"]);
        for c in &g.candidates {
            assert_eq!(c.group_id, Some(0));
            assert!(!c.distinct);
        }
    }

    #[test]
    fn test_groups_by_size_only() {
        let flags = DuplicateFlags {
            by_size: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/a", "one", 5)).unwrap();
        g.push(entry("/b", "two", 5)).unwrap();
        g.push(entry("/c", "three", 7)).unwrap();
        g.push(entry("/d", "four", 7)).unwrap();
        g.push(entry("/e", "five", 9)).unwrap();
        examine(&mut g);

        assert_eq!(g.len(), 4);
        let ids: Vec<_> = g.candidates.iter().map(|c| c.group_id).collect();
        assert_eq!(ids, vec![Some(0), Some(0), Some(1), Some(1)]);
        let flags_: Vec<_> = g.candidates.iter().map(|c| c.distinct).collect();
        assert_eq!(flags_, vec![false, false, true, true]);
    }

    #[test]
    fn test_alternating_flags_across_many_groups() {
        let flags = DuplicateFlags {
            by_size: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        for size in [1u64, 2, 3, 4] {
            g.push(entry("/a", &format!("a{size}"), size)).unwrap();
            g.push(entry("/b", &format!("b{size}"), size)).unwrap();
        }
        examine(&mut g);

        let flags_: Vec<_> = g.candidates.iter().map(|c| c.distinct).collect();
        assert_eq!(
            flags_,
            vec![false, false, true, true, false, false, true, true]
        );
        let ids: Vec<_> = g.candidates.iter().filter_map(|c| c.group_id).collect();
        assert_eq!(ids, vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_path_tiebreak_makes_order_deterministic() {
        let flags = DuplicateFlags {
            by_size: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/zzz", "f", 5)).unwrap();
        g.push(entry("/aaa", "f", 5)).unwrap();
        g.push(entry("/mmm", "f", 5)).unwrap();
        examine(&mut g);

        let dirs: Vec<_> = g.candidates.iter().map(|c| c.entry.path.as_str()).collect();
        assert_eq!(dirs, vec!["/aaa", "/mmm", "/zzz"]);
    }

    #[test]
    fn test_quicksort_survives_many_equal_keys() {
        let flags = DuplicateFlags {
            by_size: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        for i in 0..10_000 {
            g.push(entry(&format!("/d{i}"), "same", 0)).unwrap();
        }
        examine(&mut g);

        assert_eq!(g.len(), 10_000);
        assert!(g.candidates.iter().all(|c| c.group_id == Some(0)));
    }

    #[test]
    fn test_content_digests_split_same_size_files() {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, content: &[u8]| {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(content).unwrap();
        };
        write("a.txt", b"hello");
        write("b.txt", b"hello");
        write("c.txt", b"world");

        let dir_str = dir.path().to_string_lossy().to_string();
        let flags = DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry(&dir_str, "a.txt", 5)).unwrap();
        g.push(entry(&dir_str, "b.txt", 5)).unwrap();
        g.push(entry(&dir_str, "c.txt", 5)).unwrap();
        examine(&mut g);

        // c.txt differs in content and drops out as a singleton.
        let mut kept = names(&g);
        kept.sort_unstable();
        assert_eq!(kept, vec!["a.txt", "b.txt"]);
        let d0 = g.candidates[0].content_hash.unwrap();
        let d1 = g.candidates[1].content_hash.unwrap();
        assert_eq!(d0, d1);
    }

    #[test]
    fn test_zero_size_files_group_without_digest() {
        let flags = DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/a", "e1", 0)).unwrap();
        g.push(entry("/b", "e2", 0)).unwrap();
        examine(&mut g);

        assert_eq!(g.len(), 2);
        assert!(g.candidates.iter().all(|c| c.content_hash.is_none()));
        assert!(g.candidates.iter().all(|c| c.group_id == Some(0)));
    }

    #[test]
    fn test_unreadable_file_is_dropped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, content: &[u8]| {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(content).unwrap();
        };
        write("a.txt", b"hello");
        write("b.txt", b"hello");

        let dir_str = dir.path().to_string_lossy().to_string();
        let flags = DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry(&dir_str, "a.txt", 5)).unwrap();
        g.push(entry(&dir_str, "b.txt", 5)).unwrap();
        g.push(entry(&dir_str, "missing.txt", 5)).unwrap();
        examine(&mut g);

        let mut kept = names(&g);
        kept.sort_unstable();
        assert_eq!(kept, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_cancel_before_hashing_truncates_candidates() {
        let dir = TempDir::new().unwrap();
        let mut f = File::create(dir.path().join("a.txt")).unwrap();
        f.write_all(b"hello").unwrap();
        let mut f = File::create(dir.path().join("b.txt")).unwrap();
        f.write_all(b"hello").unwrap();

        let dir_str = dir.path().to_string_lossy().to_string();
        let flags = DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry(&dir_str, "a.txt", 5)).unwrap();
        g.push(entry(&dir_str, "b.txt", 5)).unwrap();
        examine_with_stop(&mut g, &AtomicBool::new(true), false);

        // Every candidate was still pending when the stop flag was observed.
        assert!(g.is_empty());
    }

    #[test]
    fn test_metadata_only_grouping_after_cancelled_walk() {
        let flags = DuplicateFlags {
            by_size: true,
            by_content: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/a", "x", 5)).unwrap();
        g.push(entry("/b", "y", 5)).unwrap();
        examine_with_stop(&mut g, &AtomicBool::new(true), true);

        // Digests are skipped; the partial result is grouped by size.
        assert_eq!(g.len(), 2);
        assert!(g.candidates.iter().all(|c| c.content_hash.is_none()));
    }

    #[test]
    fn test_by_name_only_groups_across_sizes() {
        let flags = DuplicateFlags {
            by_name: true,
            ..Default::default()
        };
        let mut g = DuplicateGrouper::new(flags);
        g.push(entry("/a", "dup.txt", 1)).unwrap();
        g.push(entry("/b", "dup.txt", 99)).unwrap();
        g.push(entry("/c", "other.txt", 1)).unwrap();
        examine(&mut g);

        assert_eq!(names(&g), vec!["dup.txt", "dup.txt"]);
    }
}
