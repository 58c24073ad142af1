//! Windowed file-content scanning.
//!
//! Files are mapped in fixed-size windows and scanned for a literal byte
//! pattern or a line-oriented regular expression. Matches that straddle a
//! window boundary are never lost:
//!
//! - In literal mode the next window starts `pattern_len + 1` bytes before
//!   the end of the current one, so a split occurrence is still seen exactly
//!   once, with both of its neighbor bytes visible for whole-word checks.
//! - In regex mode a line that cannot be terminated before the window's end
//!   (and the window does not reach end-of-file) is not evaluated; the next
//!   window is mapped from the start of that line instead.
//!
//! Whole-word boundaries are judged on *file* offsets: a match at the start
//! of a rewound window counts as file-start only when its absolute offset is
//! zero.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memchr::{memchr, memchr2, memmem};
use memmap2::MmapOptions;
use regex::bytes::{Regex, RegexBuilder};

/// Default mapping window: large enough to hold the longest supported line
/// plus generous slack, small enough to leave address space alone.
pub const DEFAULT_WINDOW_SIZE: usize = 40 * 1024 * 1024 + 16 * 1024;

/// Longest line the regex scanner will evaluate. Longer runs without a line
/// terminator are evaluated truncated at this limit.
pub const MAX_LINE_LEN: usize = 10_000;

/// Which byte sequences terminate a line in regex mode. Flags combine freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EolPolicy {
    /// `\r\n`
    pub crlf: bool,
    /// lone `\r`
    pub cr: bool,
    /// lone `\n`
    pub lf: bool,
    /// NUL byte (lets binary files terminate lines)
    pub nul: bool,
}

impl Default for EolPolicy {
    fn default() -> Self {
        Self {
            crlf: true,
            cr: true,
            lf: true,
            nul: true,
        }
    }
}

/// What to look for in file contents, as provided by the caller.
#[derive(Debug, Clone)]
pub struct ContentSpec {
    /// Pattern text: literal bytes, hex pairs or a regular expression.
    pub pattern: String,
    /// Interpret `pattern` as a line-oriented regular expression.
    pub regex: bool,
    /// Interpret `pattern` as hex byte pairs (`"DE AD be ef"`); literal only.
    pub hex: bool,
    /// Case-sensitive matching.
    pub case_sensitive: bool,
    /// Require word boundaries around the match.
    pub whole_words: bool,
    /// Line terminators recognized in regex mode.
    pub eol: EolPolicy,
    /// Mapping window override; `None` uses [`DEFAULT_WINDOW_SIZE`]. Mainly
    /// for tests exercising window-boundary behavior.
    pub window_size: Option<usize>,
}

impl ContentSpec {
    /// A case-insensitive literal search for `pattern`.
    #[must_use]
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: false,
            hex: false,
            case_sensitive: false,
            whole_words: false,
            eol: EolPolicy::default(),
            window_size: None,
        }
    }

    /// A case-insensitive regular-expression search for `pattern`.
    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex: true,
            ..Self::literal(pattern)
        }
    }

    /// Toggle whole-word matching.
    #[must_use]
    pub fn with_whole_words(mut self, on: bool) -> Self {
        self.whole_words = on;
        self
    }

    /// Toggle case sensitivity.
    #[must_use]
    pub fn with_case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }
}

/// Error compiling a content pattern.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    /// The pattern text is empty.
    #[error("empty search pattern")]
    Empty,
    /// The hex pattern is not a sequence of hex byte pairs.
    #[error("invalid hex pattern '{0}'")]
    InvalidHex(String),
    /// The regular expression did not compile.
    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Recoverable error while scanning one file. The file is treated as not
/// matching; the run continues.
#[derive(thiserror::Error, Debug)]
pub enum ContentError {
    /// The file could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// File being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The real size of a link target could not be determined.
    #[error("cannot size link target {path}: {source}")]
    LinkSize {
        /// File being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A window could not be mapped (e.g. the file shrank mid-scan).
    #[error("cannot read {path}: {source}")]
    Map {
        /// File being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
enum ScanMode {
    Literal(LiteralPattern),
    Lines(Regex),
}

/// Scans file contents window by window.
#[derive(Debug)]
pub struct ContentScanner {
    mode: ScanMode,
    whole_words: bool,
    eol: EolPolicy,
    window_size: usize,
    stop: Arc<AtomicBool>,
}

impl ContentScanner {
    /// Compile a scanner from a [`ContentSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern is empty or does not compile.
    pub fn new(spec: &ContentSpec, stop: Arc<AtomicBool>) -> Result<Self, PatternError> {
        if spec.pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let mode = if spec.regex {
            ScanMode::Lines(
                RegexBuilder::new(&spec.pattern)
                    .case_insensitive(!spec.case_sensitive)
                    .build()?,
            )
        } else {
            let needle = if spec.hex {
                parse_hex(&spec.pattern)?
            } else {
                spec.pattern.clone().into_bytes()
            };
            // Hex patterns name exact bytes; case folding does not apply.
            ScanMode::Literal(LiteralPattern::new(needle, spec.case_sensitive || spec.hex))
        };
        Ok(Self {
            mode,
            whole_words: spec.whole_words,
            eol: spec.eol,
            window_size: spec.window_size.unwrap_or(DEFAULT_WINDOW_SIZE).max(2),
            stop,
        })
    }

    /// Override the mapping window size. Primarily for tests; the effective
    /// literal window never drops below `pattern_len + 2`.
    #[must_use]
    pub fn with_window_size(mut self, bytes: usize) -> Self {
        self.window_size = bytes.max(2);
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Scan one file, returning the absolute byte offset of the first
    /// accepted match.
    ///
    /// `entry_size` is the size reported by directory enumeration; reparse
    /// points report 0 there, so for `is_reparse_point` the target's real
    /// size is taken from the opened file. A zero-size non-link file is
    /// trivially not found without any mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] on open/size/map failures; the caller logs it
    /// and treats the file as not matching.
    pub fn scan(
        &self,
        path: &Path,
        entry_size: u64,
        is_reparse_point: bool,
    ) -> Result<Option<u64>, ContentError> {
        if entry_size == 0 && !is_reparse_point {
            return Ok(None);
        }

        let file = File::open(path).map_err(|source| ContentError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let total = if is_reparse_point {
            file.metadata()
                .map_err(|source| ContentError::LinkSize {
                    path: path.to_path_buf(),
                    source,
                })?
                .len()
        } else {
            entry_size
        };
        if total == 0 {
            return Ok(None);
        }

        let window = match &self.mode {
            ScanMode::Literal(p) => self.window_size.max(p.len() + 2),
            ScanMode::Lines(_) => self.window_size,
        };

        let mut offset: u64 = 0;
        while offset < total && !self.stopped() {
            let view_len = (total - offset).min(window as u64) as usize;
            let map = unsafe { MmapOptions::new().offset(offset).len(view_len).map(&file) }
                .map_err(|source| ContentError::Map {
                    path: path.to_path_buf(),
                    source,
                })?;
            let at_eof = offset + view_len as u64 >= total;

            match &self.mode {
                ScanMode::Lines(re) => match self.scan_lines(re, &map, offset, at_eof) {
                    LineScan::Found(abs) => return Ok(Some(abs)),
                    LineScan::Continue(next) => offset = next,
                },
                ScanMode::Literal(p) => {
                    if let Some(abs) = self.scan_literal(p, &map, offset, total) {
                        return Ok(Some(abs));
                    }
                    if at_eof || p.len() + 1 >= view_len {
                        // The pattern cannot occur in what is left.
                        break;
                    }
                    offset = offset + view_len as u64 - (p.len() as u64 + 1);
                }
            }
        }
        Ok(None)
    }

    /// Line-oriented regex scan over one window.
    fn scan_lines(&self, re: &Regex, win: &[u8], file_offset: u64, at_eof: bool) -> LineScan {
        let len = win.len();
        let mut beg = 0usize;
        while beg < len {
            if self.stopped() {
                break;
            }

            let limit = (beg + MAX_LINE_LEN).min(len);
            let mut end = beg;
            let mut next_beg: Option<usize> = None;
            while end < limit {
                match win[end] {
                    b'\r' => {
                        if self.eol.crlf && end + 1 < len && win[end + 1] == b'\n' {
                            next_beg = Some(end + 2);
                            break;
                        }
                        // A CR as the window's last byte is ambiguous when
                        // CRLF is enabled and more file follows.
                        if self.eol.cr && (end + 1 < len || !self.eol.crlf || at_eof) {
                            next_beg = Some(end + 1);
                            break;
                        }
                        end += 1;
                    }
                    b'\n' if self.eol.lf => {
                        next_beg = Some(end + 1);
                        break;
                    }
                    0 if self.eol.nul => {
                        next_beg = Some(end + 1);
                        break;
                    }
                    _ => end += 1,
                }
            }

            if next_beg.is_none() && end == len && !at_eof && beg > 0 {
                // The line may continue past the window edge: rewind so the
                // next window starts at the line head and sees it whole.
                return LineScan::Continue(file_offset + beg as u64);
            }
            // Otherwise the line ends at EOF, or hit the length limit and is
            // evaluated truncated; degenerate windows smaller than one line
            // are evaluated as-is so scanning always advances.

            if let Some(rel) = self.match_line(re, &win[beg..end]) {
                return LineScan::Found(file_offset + (beg + rel) as u64);
            }
            beg = next_beg.unwrap_or(end);
        }
        LineScan::Continue(file_offset + len as u64)
    }

    /// First accepted regex match within one line. Line start/end are word
    /// boundaries; lines are never split across windows.
    fn match_line(&self, re: &Regex, line: &[u8]) -> Option<usize> {
        let mut start = 0;
        loop {
            let m = re.find_at(line, start)?;
            if !self.whole_words {
                return Some(m.start());
            }
            let before_ok = m.start() == 0 || !is_word_byte(line[m.start() - 1]);
            let after_ok = m.end() == line.len() || !is_word_byte(line[m.end()]);
            if before_ok && after_ok {
                return Some(m.start());
            }
            start = m.start() + 1;
            if start >= line.len() {
                return None;
            }
        }
    }

    /// Literal scan over one window. Word boundaries at the window edges are
    /// decided on absolute file offsets; an occurrence whose neighbor byte
    /// lies outside this window is skipped here and adjudicated by the
    /// overlapping next window.
    fn scan_literal(
        &self,
        pattern: &LiteralPattern,
        win: &[u8],
        file_offset: u64,
        total: u64,
    ) -> Option<u64> {
        let plen = pattern.len();
        let mut from = 0usize;
        while let Some(found) = pattern.find(win, from) {
            if self.stopped() {
                return None;
            }
            let abs = file_offset + found as u64;
            if !self.whole_words {
                return Some(abs);
            }
            let before_ok = abs == 0 || (found > 0 && !is_word_byte(win[found - 1]));
            let after_ok = abs + plen as u64 >= total
                || (found + plen < win.len() && !is_word_byte(win[found + plen]));
            if before_ok && after_ok {
                return Some(abs);
            }
            from = found + 1;
        }
        None
    }
}

enum LineScan {
    /// Absolute offset of an accepted match.
    Found(u64),
    /// No match in this window; next window starts here.
    Continue(u64),
}

/// Word characters for whole-word boundaries: `_`, ASCII alphanumerics, and
/// any non-ASCII byte (conservatively, since those are letters in UTF-8).
fn is_word_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric() || b >= 0x80
}

/// Parse `"DE AD be ef"` / `"DEADbeef"` into raw bytes.
fn parse_hex(text: &str) -> Result<Vec<u8>, PatternError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(PatternError::InvalidHex(text.to_string()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| PatternError::InvalidHex(text.to_string()))
        })
        .collect()
}

/// A literal byte pattern, optionally ASCII-case-insensitive.
#[derive(Debug)]
struct LiteralPattern {
    /// Lower-cased when `case_sensitive` is false.
    needle: Vec<u8>,
    case_sensitive: bool,
}

impl LiteralPattern {
    fn new(mut needle: Vec<u8>, case_sensitive: bool) -> Self {
        if !case_sensitive {
            needle.make_ascii_lowercase();
        }
        Self {
            needle,
            case_sensitive,
        }
    }

    fn len(&self) -> usize {
        self.needle.len()
    }

    /// First occurrence at or after `from`, as an index into `hay`.
    fn find(&self, hay: &[u8], from: usize) -> Option<usize> {
        if from >= hay.len() || hay.len() - from < self.needle.len() {
            return None;
        }
        if self.case_sensitive {
            return memmem::find(&hay[from..], &self.needle).map(|i| from + i);
        }

        let lower = self.needle[0];
        let upper = lower.to_ascii_uppercase();
        let mut pos = from;
        while pos + self.needle.len() <= hay.len() {
            let idx = if lower == upper {
                memchr(lower, &hay[pos..])?
            } else {
                memchr2(lower, upper, &hay[pos..])?
            };
            let at = pos + idx;
            if at + self.needle.len() > hay.len() {
                return None;
            }
            if hay[at..at + self.needle.len()]
                .iter()
                .zip(&self.needle)
                .all(|(h, n)| h.to_ascii_lowercase() == *n)
            {
                return Some(at);
            }
            pos = at + 1;
        }
        None
    }
}
