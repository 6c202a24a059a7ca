use std::{
    collections::{BTreeMap, VecDeque},
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::error::ReadError;

/// A log file as a sequence of text lines, decompressed when needed.
pub enum LineSource {
    Plain(BufReader<File>),
    Gzip(BufReader<MultiGzDecoder<File>>),
}

impl LineSource {
    /// Picks the variant by extension: `.gz` files are gzip streams.
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(if is_gzip(path) {
            Self::Gzip(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Self::Plain(BufReader::new(file))
        })
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read_until(b'\n', buf),
            Self::Gzip(r) => r.read_until(b'\n', buf),
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// One line as read from disk, without its line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    Text(String),
    Undecodable(Vec<u8>),
}

/// Lines of one log file. Stops after the first read error; a line that is
/// not UTF-8 is handed out as [`RawLine::Undecodable`] and reading goes on.
pub struct LogFile {
    path: PathBuf,
    source: LineSource,
    line: usize,
    done: bool,
}

impl LogFile {
    pub fn open(path: PathBuf) -> Result<Self, ReadError> {
        let source = LineSource::open(&path)?;
        Ok(Self {
            path,
            source,
            line: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LogFile {
    type Item = Result<RawLine, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.source.read_line(&mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line += 1;
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                Some(Ok(match String::from_utf8(buf) {
                    Ok(text) => RawLine::Text(text),
                    Err(e) => RawLine::Undecodable(e.into_bytes()),
                }))
            }
            Err(source) => {
                self.done = true;
                Some(Err(ReadError::Read {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadStats {
    pub files_opened: usize,
    pub files_completed: usize,
    pub lines: usize,
    /// Lines skipped because they are not UTF-8.
    pub undecodable: usize,
    pub failures: Vec<ReadError>,
}

impl ReadStats {
    /// True when not a single line or clean end-of-file came out of any log.
    pub fn nothing_read(&self) -> bool {
        self.files_completed == 0 && self.lines == 0
    }
}

/// Chains log files, oldest first, into one line sequence. A file that cannot
/// be opened or decoded is recorded and skipped; lines already produced from it
/// stay in the sequence.
pub struct LogReader {
    pending: VecDeque<PathBuf>,
    current: Option<LogFile>,
    stats: ReadStats,
}

impl LogReader {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pending: paths.into_iter().collect(),
            current: None,
            stats: ReadStats::default(),
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(LogFile::path)
    }

    pub fn into_stats(self) -> ReadStats {
        self.stats
    }
}

impl Iterator for LogReader {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(file) = self.current.as_mut() {
                match file.next() {
                    Some(Ok(RawLine::Text(line))) => {
                        self.stats.lines += 1;
                        return Some(line);
                    }
                    Some(Ok(RawLine::Undecodable(bytes))) => {
                        self.stats.lines += 1;
                        self.stats.undecodable += 1;
                        debug!(
                            path = %file.path().display(),
                            line = file.line,
                            text = %String::from_utf8_lossy(&bytes),
                            "skipping line that is not UTF-8"
                        );
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "skipping rest of log");
                        self.stats.failures.push(e);
                    }
                    None => {
                        debug!(path = %file.path().display(), lines = file.line, "finished log");
                        self.stats.files_completed += 1;
                    }
                }
                self.current = None;
            }
            let path = self.pending.pop_front()?;
            debug!(path = %path.display(), "opening log");
            match LogFile::open(path) {
                Ok(file) => {
                    self.stats.files_opened += 1;
                    self.current = Some(file);
                }
                Err(e) => {
                    warn!(error = %e, "skipping log");
                    self.stats.failures.push(e);
                }
            }
        }
    }
}

/// Finds every rotation generation of `base` (`base.1`, `base.2.gz`, ...) and
/// returns them oldest first, ending with `base` itself when it exists.
pub fn discover_rotations(base: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let pattern = format!("{}.*", glob::Pattern::escape(&base.to_string_lossy()));
    let candidates = glob::glob(&pattern).map_err(|source| ReadError::Discover {
        base: base.to_path_buf(),
        source,
    })?;

    let mut generations: BTreeMap<u32, PathBuf> = BTreeMap::new();
    for path in candidates.filter_map(Result::ok) {
        let Some(index) = rotation_index(base, &path) else {
            continue;
        };
        match generations.get(&index) {
            // A plain copy next to its .gz twin means compression is in
            // progress; the plain file is the complete one.
            Some(existing) if !is_gzip(existing) => {
                warn!(kept = %existing.display(), ignored = %path.display(), "duplicate rotation");
            }
            Some(existing) => {
                warn!(kept = %path.display(), ignored = %existing.display(), "duplicate rotation");
                generations.insert(index, path);
            }
            None => {
                generations.insert(index, path);
            }
        }
    }

    let mut paths: Vec<PathBuf> = generations.into_values().rev().collect();
    if base.is_file() {
        paths.push(base.to_path_buf());
    }
    Ok(paths)
}

fn rotation_index(base: &Path, candidate: &Path) -> Option<u32> {
    let base_name = base.file_name()?.to_str()?;
    let name = candidate.file_name()?.to_str()?;
    let rest = name.strip_prefix(base_name)?.strip_prefix('.')?;
    let digits = rest.strip_suffix(".gz").unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
