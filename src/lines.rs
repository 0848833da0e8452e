//! Line reading that survives bytes which are not UTF-8.
//!
//! Captures pulled off devices over a serial console or a remote shell often
//! carry stray bytes. Those lines are decoded lossily so the parsers can skip
//! them as noise instead of the whole read failing.

use crate::Result;
use log::debug;
use std::borrow::Cow;
use std::io::BufRead;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const NEWLINE: u8 = b'\n';

/// Decodes one raw line, dropping the trailing `\n` or `\r\n`.
///
/// # Examples
///
/// ```
/// use iperf_parse::lines::decode_line;
///
/// assert_eq!(decode_line(b"[  3] local\xff\r\n"), "[  3] local\u{fffd}");
/// ```
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(line) => line.to_string(),
        Cow::Owned(line) => {
            debug!("Replaced invalid UTF-8 in {:?}", line);
            line
        }
    }
}

/// Iterator over the lines of a reader, decoded with [`decode_line`].
///
/// Only I/O failures are errors.
pub struct LossyLines<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.reader.read_until(NEWLINE, &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => Some(Ok(decode_line(&self.buffer))),
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Reads the next line from an async reader, decoded with [`decode_line`].
///
/// `buffer` is scratch space reused between calls. Returns `None` at end of
/// input.
pub async fn read_lossy_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buffer.clear();
    if reader.read_until(NEWLINE, buffer).await? == 0 {
        return Ok(None);
    }
    Ok(Some(decode_line(buffer)))
}
