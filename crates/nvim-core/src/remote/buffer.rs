//! Buffer proxy with line access helpers.

use super::{LineRange, RemoteObject};
use crate::client::{decode_value, Client};
use crate::{NvimError, Result};
use rmpv::Value;
use std::ops::Deref;

/// A remote text buffer.
///
/// Line helpers on the buffer itself are 1-indexed, like Ex line numbers;
/// [`LineRange`] is 0-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Buffer(RemoteObject);

impl Deref for Buffer {
    type Target = RemoteObject;

    fn deref(&self) -> &RemoteObject {
        &self.0
    }
}

impl From<Buffer> for RemoteObject {
    fn from(buffer: Buffer) -> Self {
        buffer.0
    }
}

impl Buffer {
    pub const TYPE_NAME: &'static str = "Buffer";

    pub fn new(object: RemoteObject) -> Self {
        Self(object)
    }

    /// All lines of the buffer as a range view.
    pub fn lines(&self) -> LineRange {
        LineRange::all(self.clone())
    }

    /// Replace every line of the buffer.
    pub async fn set_all_lines(&self, client: &mut Client, lines: Vec<String>) -> Result<()> {
        self.lines().replace(client, lines).await
    }

    pub async fn name(&self, client: &mut Client) -> Result<String> {
        let value = self.call(client, "get_name", vec![]).await?;
        decode_value("buffer name", value)
    }

    /// Buffer number; newer peers use the handle itself.
    pub async fn number(&self, client: &mut Client) -> Result<i64> {
        if !client.has_method(self, "get_number") {
            return Ok(self.handle());
        }
        let value = self.call(client, "get_number", vec![]).await?;
        decode_value("buffer number", value)
    }

    /// Number of lines.
    pub async fn len(&self, client: &mut Client) -> Result<usize> {
        self.line_count(client).await
    }

    pub async fn count(&self, client: &mut Client) -> Result<usize> {
        self.line_count(client).await
    }

    /// Line `index`, counting from 1.
    pub async fn get(&self, client: &mut Client, index: i64) -> Result<String> {
        check_line_number(index)?;
        self.lines().get(client, index - 1).await
    }

    /// Replace line `index`, counting from 1.
    pub async fn set(&self, client: &mut Client, index: i64, line: &str) -> Result<()> {
        check_line_number(index)?;
        self.lines().set(client, index - 1, line).await
    }

    /// Remove line `index`, counting from 1.
    pub async fn delete(&self, client: &mut Client, index: i64) -> Result<()> {
        check_line_number(index)?;
        self.lines().delete(client, index - 1).await
    }

    /// Insert `text` after line `index` (0 inserts at the top).
    ///
    /// `text` is split on `\n`; trailing empty lines are dropped, so
    /// `"a\n\n"` appends the single line `"a"`. The focused window's cursor
    /// is put back where it was, since the peer moves it to follow the edit.
    pub async fn append(&self, client: &mut Client, index: i64, text: &str) -> Result<()> {
        if index < 0 {
            return Err(NvimError::Argument {
                message: format!("line number {} is negative", index),
            });
        }
        let lines = split_lines(text);

        let window = client.current_window().await?;
        let cursor = window.cursor(client).await?;

        let at = index as usize;
        self.set_lines(client, at, at, lines).await?;
        window.set_cursor(client, cursor).await
    }

    /// Whether this is the current buffer.
    pub async fn is_active(&self, client: &mut Client) -> Result<bool> {
        Ok(client.current_buffer().await? == *self)
    }

    /// The cursor line, if this buffer is current.
    pub async fn line(&self, client: &mut Client) -> Result<Option<String>> {
        if !self.is_active(client).await? {
            return Ok(None);
        }
        client.current_line().await.map(Some)
    }

    /// Replace the cursor line if this buffer is current. Returns whether it was.
    pub async fn set_line(&self, client: &mut Client, line: &str) -> Result<bool> {
        if !self.is_active(client).await? {
            return Ok(false);
        }
        client.set_current_line(line).await?;
        Ok(true)
    }

    /// 1-based cursor line, if this buffer is current.
    pub async fn line_number(&self, client: &mut Client) -> Result<Option<i64>> {
        if !self.is_active(client).await? {
            return Ok(None);
        }
        let window = client.current_window().await?;
        let (row, _) = window.cursor(client).await?;
        Ok(Some(row))
    }

    pub(crate) async fn line_count(&self, client: &mut Client) -> Result<usize> {
        let value = self.call(client, "line_count", vec![]).await?;
        decode_value("line count", value)
    }

    /// Lines `[start, end)` on the wire.
    pub(crate) async fn get_lines(
        &self,
        client: &mut Client,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>> {
        let bounds = vec![Value::from(start as i64), Value::from(end as i64)];
        let value = if client.has_method(self, "get_lines") {
            let mut args = bounds;
            args.push(Value::from(true));
            self.call(client, "get_lines", args).await?
        } else {
            let mut args = bounds;
            args.extend([Value::from(true), Value::from(false)]);
            self.call(client, "get_line_slice", args).await?
        };
        decode_value("buffer lines", value)
    }

    /// Replace lines `[start, end)` on the wire.
    pub(crate) async fn set_lines(
        &self,
        client: &mut Client,
        start: usize,
        end: usize,
        lines: Vec<String>,
    ) -> Result<()> {
        let mut args = vec![Value::from(start as i64), Value::from(end as i64)];
        let replacement = Value::Array(lines.into_iter().map(Value::from).collect());
        if client.has_method(self, "set_lines") {
            args.extend([Value::from(true), replacement]);
            self.call(client, "set_lines", args).await?;
        } else {
            args.extend([Value::from(true), Value::from(false), replacement]);
            self.call(client, "set_line_slice", args).await?;
        }
        Ok(())
    }
}

fn check_line_number(index: i64) -> Result<()> {
    if index < 1 {
        return Err(NvimError::Argument {
            message: format!("line number {} is out of bounds; lines start at 1", index),
        });
    }
    Ok(())
}

fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}
