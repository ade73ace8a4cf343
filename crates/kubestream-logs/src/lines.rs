use std::io;

use futures::AsyncBufReadExt;

use kubestream_k8s::LogStream;

/// Result of reading one line from a log stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadLine {
    /// A line with content, line terminator stripped
    Text(String),
    /// A line that was empty or only whitespace
    Blank,
    /// The stream ended
    End,
}

/// Splits a log byte stream into lines
pub struct LineReader {
    stream: LogStream,
    buf: Vec<u8>,
    /// Read error held back until the partial line before it is delivered
    pending: Option<io::Error>,
}

impl LineReader {
    pub fn new(stream: LogStream) -> Self {
        Self {
            stream,
            buf: Vec::with_capacity(1024),
            pending: None,
        }
    }

    /// Read up to and including the next `\n`
    ///
    /// A trailing line without a terminator is returned before [`ReadLine::End`].
    /// The same holds for a read error: bytes received ahead of it come back
    /// as a line first and the error is returned by the next call.
    pub async fn read_line(&mut self) -> io::Result<ReadLine> {
        if let Some(e) = self.pending.take() {
            return Err(e);
        }

        self.buf.clear();
        let n = match self.stream.read_until(b'\n', &mut self.buf).await {
            Ok(n) => n,
            Err(e) => match frame_line(&self.buf) {
                Some(text) => {
                    self.pending = Some(e);
                    return Ok(ReadLine::Text(text));
                }
                None => return Err(e),
            },
        };
        if n == 0 {
            return Ok(ReadLine::End);
        }
        Ok(match frame_line(&self.buf) {
            Some(text) => ReadLine::Text(text),
            None => ReadLine::Blank,
        })
    }
}

/// Strip trailing CR/LF from a raw line; `None` if nothing but whitespace remains
///
/// Invalid UTF-8 is replaced rather than rejected, since container output is
/// not guaranteed to be text.
pub fn frame_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
