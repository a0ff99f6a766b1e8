//! PSX line protocol: one `key=value` pair per newline-terminated line.

use std::collections::HashSet;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Key carrying this client's connection number.
pub const KEY_CLIENT_ID: &str = "id";
/// Key carrying the PSX server version.
pub const KEY_VERSION: &str = "version";
/// Key carrying the virtual printer output.
pub const KEY_PRINTOUT: &str = "Qs119";

/// Line sent to the server before closing so it can drop the client cleanly.
pub const EXIT_LINE: &[u8] = b"exit\n";

/// Longest accepted line, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// One decoded `key=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// Splits a line on its first `=`.
///
/// A line without `=` yields the whole line as key and an empty value.
pub fn split_line(line: &str) -> (&str, &str) {
    line.split_once('=').unwrap_or((line, ""))
}

/// Set of keys the bridge tracks. Everything else is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    keys: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The keys the printout relay needs.
    pub fn psx_default() -> Self {
        Self::new([KEY_CLIENT_ID, KEY_VERSION, KEY_PRINTOUT])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::psx_default()
    }
}

/// Turns raw lines into entries for allow-listed keys.
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    allow: AllowList,
}

impl LineParser {
    pub fn new(allow: AllowList) -> Self {
        Self { allow }
    }

    /// Parses one line, returning `None` when its key is not tracked.
    pub fn parse(&self, line: &str) -> Option<Entry> {
        let (key, value) = split_line(line.trim());
        if !self.allow.contains(key) {
            return None;
        }
        Some(Entry {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Reads the next line from the server without its line ending.
///
/// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced rather
/// than rejected so one bad line cannot end the session. A line longer than
/// [`MAX_LINE_BYTES`] is an `InvalidData` error.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let bytes = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if bytes == 0 {
        return Ok(None);
    }
    if bytes == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_BYTES} bytes"),
        ));
    }

    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Tells the server this client is leaving.
pub async fn write_exit<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(EXIT_LINE).await?;
    writer.flush().await
}
