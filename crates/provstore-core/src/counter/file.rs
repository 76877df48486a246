//! # File Counter Backend
//!
//! One text file per (prefix, entity type, scope kind). Each counter occupies
//! one fixed-width line: the decimal value left-justified, padded with spaces
//! and terminated by `\n`. Entity counters live on line 1 of
//! `info_file_{short}.txt`; the snapshot counter of subject `n` lives on line
//! `n` of `prov_file_{short}.txt`.
//!
//! Fixed widths make a counter addressable by offset. When a value outgrows
//! the current width the whole file is rewritten at the new width while the
//! lock is still held.

use super::{CounterKey, CounterScope, CounterStore, check_regression};
use crate::lock::FileLockGuard;
use crate::primitives::{
    COUNTER_FILLER, ENTITY_COUNTER_PREFIX, FALLBACK_BUCKET, INITIAL_LINE_WIDTH,
    SNAPSHOT_COUNTER_PREFIX,
};
use crate::ProvstoreError;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::debug;

/// Counters persisted as fixed-width lines in plain text files.
#[derive(Debug, Clone)]
pub struct FileCounter {
    root: PathBuf,
}

impl FileCounter {
    /// Counter files are created under `root` on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File and 1-based line holding `key`.
    pub fn location(&self, key: &CounterKey) -> Result<(PathBuf, usize), ProvstoreError> {
        let dir = self
            .root
            .join(key.prefix.as_deref().unwrap_or(FALLBACK_BUCKET));
        let short = key.entity_type.short_name();
        match key.scope {
            CounterScope::Entity => Ok((dir.join(format!("{ENTITY_COUNTER_PREFIX}{short}.txt")), 1)),
            CounterScope::Snapshot { subject } => {
                let line = usize::try_from(subject)
                    .ok()
                    .filter(|l| *l > 0)
                    .ok_or_else(|| {
                        ProvstoreError::InvalidArgument(format!(
                            "snapshot counter needs a positive subject number, got {subject}"
                        ))
                    })?;
                Ok((dir.join(format!("{SNAPSHOT_COUNTER_PREFIX}{short}.txt")), line))
            }
        }
    }

    /// Run `op` on the locked contents of the file holding `key`.
    fn with_line<T>(
        &self,
        key: &CounterKey,
        op: impl FnOnce(&mut LockedCounterFile, usize) -> Result<T, ProvstoreError>,
    ) -> Result<T, ProvstoreError> {
        let (path, line) = self.location(key)?;
        let guard = FileLockGuard::open(&path)?;
        let mut file = LockedCounterFile::load(guard)?;
        op(&mut file, line)
    }
}

impl CounterStore for FileCounter {
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        let (path, _) = self.location(key)?;
        if !path.exists() {
            return Ok(0);
        }
        self.with_line(key, |file, line| file.value(line))
    }

    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError> {
        self.with_line(key, |file, line| {
            check_regression(key, file.value(line)?, value, force)?;
            file.store(line, value)
        })
    }

    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        self.with_line(key, |file, line| {
            let next = file.value(line)?.checked_add(1).ok_or_else(|| {
                ProvstoreError::InvalidState(format!("counter {key} overflowed"))
            })?;
            file.store(line, next)?;
            Ok(next)
        })
    }

    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        self.with_line(key, |file, line| {
            let current = file.value(line)?;
            if value > current {
                file.store(line, value)?;
                Ok(value)
            } else {
                Ok(current)
            }
        })
    }
}

// =============================================================================
// LOCKED FILE
// =============================================================================

/// A counter file's bytes, read while its lock is held.
struct LockedCounterFile {
    guard: FileLockGuard,
    content: Vec<u8>,
    width: usize,
}

impl LockedCounterFile {
    fn load(mut guard: FileLockGuard) -> Result<Self, ProvstoreError> {
        let mut content = Vec::new();
        let file = guard.file_mut();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut content)?;
        let width = content
            .iter()
            .position(|b| *b == b'\n')
            .map_or(INITIAL_LINE_WIDTH, |pos| pos + 1);
        let torn = content.len() % width != 0
            || content.chunks(width).any(|line| line.last() != Some(&b'\n'));
        if torn {
            return Err(ProvstoreError::InvalidState(format!(
                "counter file has lines of uneven width (expected {width} bytes each)"
            )));
        }
        Ok(Self {
            guard,
            content,
            width,
        })
    }

    fn line_count(&self) -> usize {
        self.content.len().div_ceil(self.width)
    }

    fn offset(&self, line: usize, width: usize) -> Result<usize, ProvstoreError> {
        (line - 1).checked_mul(width).ok_or_else(|| {
            ProvstoreError::InvalidArgument(format!("counter line {line} is out of range"))
        })
    }

    /// Parsed value at `line`. Past the end of file or blank is 0.
    fn value(&self, line: usize) -> Result<u64, ProvstoreError> {
        self.parsed(line).map(|v| v.unwrap_or(0))
    }

    fn parsed(&self, line: usize) -> Result<Option<u64>, ProvstoreError> {
        let start = self.offset(line, self.width)?;
        if start >= self.content.len() {
            return Ok(None);
        }
        let end = (start + self.width).min(self.content.len());
        parse_line(&self.content[start..end])
    }

    fn store(&mut self, line: usize, value: u64) -> Result<(), ProvstoreError> {
        let digits = value.to_string();
        if digits.len() + 1 > self.width {
            return self.rewrite(line, value, digits.len() + 1);
        }

        let existing = self.line_count();
        let file = self.guard.file_mut();
        if line > existing {
            // Pad the gap with blank lines so every counter stays at its offset.
            let mut tail = Vec::with_capacity((line - existing) * self.width);
            for _ in existing + 1..line {
                tail.extend(render_line(None, self.width));
            }
            tail.extend(render_line(Some(value), self.width));
            let start = existing * self.width;
            file.seek(SeekFrom::Start(start as u64))?;
            file.write_all(&tail)?;
            self.content.truncate(start);
            self.content.extend(tail);
        } else {
            let start = (line - 1) * self.width;
            let rendered = render_line(Some(value), self.width);
            file.seek(SeekFrom::Start(start as u64))?;
            file.write_all(&rendered)?;
            self.content[start..start + self.width].copy_from_slice(&rendered);
        }
        file.flush()?;
        Ok(())
    }

    /// Rewrite every line of the file at `new_width`, on the same locked handle.
    fn rewrite(&mut self, line: usize, value: u64, new_width: usize) -> Result<(), ProvstoreError> {
        let rows = self.line_count().max(line);
        let mut values = Vec::with_capacity(rows);
        for row in 1..=rows {
            values.push(self.parsed(row)?);
        }
        values[line - 1] = Some(value);

        let mut buf = Vec::with_capacity(rows * new_width);
        for v in values {
            buf.extend(render_line(v, new_width));
        }

        debug!(
            old_width = self.width,
            new_width, rows, "Widening counter file"
        );

        let file = self.guard.file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;
        file.flush()?;

        self.content = buf;
        self.width = new_width;
        Ok(())
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<u64>, ProvstoreError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProvstoreError::InvalidState("counter line is not ASCII".to_string()))?;
    let trimmed = text.trim_end_matches('\n').trim_matches(COUNTER_FILLER as char);
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<u64>().map(Some).map_err(|_| {
        ProvstoreError::InvalidState(format!("corrupt counter line '{trimmed}'"))
    })
}

fn render_line(value: Option<u64>, width: usize) -> Vec<u8> {
    let mut line = value.map(|v| v.to_string().into_bytes()).unwrap_or_default();
    line.resize(width - 1, COUNTER_FILLER);
    line.push(b'\n');
    line
}

// =============================================================================
// TESTS
// =============================================================================
