//! Array-like view over a span of buffer lines.
//!
//! Indices are zero-based and may be negative, counting from the end of the
//! span (`-1` is the last line). Every operation re-reads the buffer's line
//! count and normalizes against it, so a range stays correct while the buffer
//! changes underneath it. Normalization is done by the pure functions at the
//! bottom of this module and fails before anything is sent.

use super::Buffer;
use crate::client::Client;
use crate::{NvimError, Result};
use std::ops::{Bound, RangeBounds};

/// Lines `start..=end` of a buffer, either end possibly negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRange {
    buffer: Buffer,
    start: i64,
    end: i64,
}

impl LineRange {
    /// Lines `start` through `end`, both inclusive.
    pub fn new(buffer: Buffer, start: i64, end: i64) -> Self {
        Self { buffer, start, end }
    }

    /// Every line of the buffer.
    pub fn all(buffer: Buffer) -> Self {
        Self::new(buffer, 0, -1)
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The span on the wire, `[start, end)`, against the current line count.
    async fn span(&self, client: &mut Client) -> Result<(usize, usize)> {
        let count = self.buffer.line_count(client).await?;
        normalize_bounds(self.start..=self.end, count)
    }

    /// Current number of lines in the span.
    pub async fn len(&self, client: &mut Client) -> Result<usize> {
        let (start, end) = self.span(client).await?;
        Ok(end - start)
    }

    pub async fn is_empty(&self, client: &mut Client) -> Result<bool> {
        Ok(self.len(client).await? == 0)
    }

    /// Read one line.
    pub async fn get(&self, client: &mut Client, index: i64) -> Result<String> {
        let (start, end) = self.span(client).await?;
        let offset = start + normalize_index(index, end - start)?;
        let mut lines = self.buffer.get_lines(client, offset, offset + 1).await?;
        lines.pop().ok_or_else(|| NvimError::Index {
            index,
            length: end - start,
        })
    }

    /// Read a sub-range in one round trip: `1..3`, `0..=-1`, `..`, `-2..`.
    pub async fn get_range(
        &self,
        client: &mut Client,
        range: impl RangeBounds<i64>,
    ) -> Result<Vec<String>> {
        let (start, end) = self.span(client).await?;
        let (from, to) = normalize_bounds(range, end - start)?;
        self.fetch(client, start + from, start + to).await
    }

    /// Read `count` lines starting at `start`; the count is clipped at the end.
    pub async fn get_slice(&self, client: &mut Client, start: i64, count: i64) -> Result<Vec<String>> {
        let (span_start, span_end) = self.span(client).await?;
        let (from, to) = normalize_slice(start, count, span_end - span_start)?;
        self.fetch(client, span_start + from, span_start + to).await
    }

    /// Read the whole span.
    pub async fn to_vec(&self, client: &mut Client) -> Result<Vec<String>> {
        let (start, end) = self.span(client).await?;
        self.fetch(client, start, end).await
    }

    /// Replace one line.
    pub async fn set(&self, client: &mut Client, index: i64, line: &str) -> Result<()> {
        let (start, end) = self.span(client).await?;
        let offset = start + normalize_index(index, end - start)?;
        self.buffer
            .set_lines(client, offset, offset + 1, vec![line.to_string()])
            .await
    }

    /// Replace a sub-range with `lines`, which may differ in length.
    pub async fn set_range(
        &self,
        client: &mut Client,
        range: impl RangeBounds<i64>,
        lines: Vec<String>,
    ) -> Result<()> {
        let (start, end) = self.span(client).await?;
        let (from, to) = normalize_bounds(range, end - start)?;
        self.buffer
            .set_lines(client, start + from, start + to, lines)
            .await
    }

    /// Replace the whole span.
    pub async fn replace(&self, client: &mut Client, lines: Vec<String>) -> Result<()> {
        self.set_range(client, .., lines).await
    }

    /// Insert `lines` before `index`; `-1` or the span length appends.
    pub async fn insert(&self, client: &mut Client, index: i64, lines: Vec<String>) -> Result<()> {
        let (start, end) = self.span(client).await?;
        let at = start + normalize_position(index, end - start)?;
        self.buffer.set_lines(client, at, at, lines).await
    }

    /// Remove one line; later lines shift up.
    pub async fn delete(&self, client: &mut Client, index: i64) -> Result<()> {
        let (start, end) = self.span(client).await?;
        let offset = start + normalize_index(index, end - start)?;
        self.buffer
            .set_lines(client, offset, offset + 1, Vec::new())
            .await
    }

    async fn fetch(&self, client: &mut Client, start: usize, end: usize) -> Result<Vec<String>> {
        if start == end {
            return Ok(Vec::new());
        }
        self.buffer.get_lines(client, start, end).await
    }
}

fn from_end(index: i64, len: usize) -> i64 {
    if index < 0 {
        index + len as i64
    } else {
        index
    }
}

/// Normalize a single element index against `len`.
///
/// Negative indices count from the end. The result is in `0..len`.
pub fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let normalized = from_end(index, len);
    if normalized < 0 || normalized >= len as i64 {
        return Err(NvimError::Index { index, length: len });
    }
    Ok(normalized as usize)
}

/// Normalize a range of indices to a half-open `(start, end)` pair.
///
/// Each bound is normalized independently: `0..=-1` is the whole sequence,
/// `0..-1` all but the last element, and `..` everything.
pub fn normalize_bounds(range: impl RangeBounds<i64>, len: usize) -> Result<(usize, usize)> {
    let start = match range.start_bound() {
        Bound::Included(start) => from_end(*start, len),
        Bound::Excluded(start) => from_end(*start, len) + 1,
        Bound::Unbounded => 0,
    };
    let (end, raw_end) = match range.end_bound() {
        Bound::Included(end) => (from_end(*end, len) + 1, *end),
        Bound::Excluded(end) => (from_end(*end, len), *end),
        Bound::Unbounded => (len as i64, len as i64),
    };

    if start < 0 || start > len as i64 {
        let index = match range.start_bound() {
            Bound::Included(start) | Bound::Excluded(start) => *start,
            Bound::Unbounded => 0,
        };
        return Err(NvimError::Index { index, length: len });
    }
    if end < 0 || end > len as i64 {
        return Err(NvimError::Index {
            index: raw_end,
            length: len,
        });
    }
    if start > end {
        return Err(NvimError::Argument {
            message: format!("range start {} is after end {}", start, end),
        });
    }
    Ok((start as usize, end as usize))
}

/// Normalize a `(start, count)` slice to a half-open pair, clipping the count.
pub fn normalize_slice(start: i64, count: i64, len: usize) -> Result<(usize, usize)> {
    if count < 0 {
        return Err(NvimError::Argument {
            message: format!("negative slice length {}", count),
        });
    }
    let from = from_end(start, len);
    if from < 0 || from > len as i64 {
        return Err(NvimError::Index {
            index: start,
            length: len,
        });
    }
    let from = from as usize;
    let to = from.saturating_add(count as usize).min(len);
    Ok((from, to))
}

/// Normalize an insertion point against `len`.
///
/// `0..=len` are taken as-is; negative positions count from past the end, so
/// `-1` appends and `-(len + 1)` prepends.
pub fn normalize_position(position: i64, len: usize) -> Result<usize> {
    let normalized = if position < 0 {
        position + len as i64 + 1
    } else {
        position
    };
    if normalized < 0 || normalized > len as i64 {
        return Err(NvimError::Index {
            index: position,
            length: len,
        });
    }
    Ok(normalized as usize)
}
