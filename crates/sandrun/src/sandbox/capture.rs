//! Bounded capture of process output streams

use tokio::io::{AsyncRead, AsyncReadExt};

/// Appended to a stream that hit the capture limit
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Accumulates bytes up to a fixed limit, remembering whether anything was dropped
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode as UTF-8 (lossy), with the marker if the stream was cut
    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Drain a reader to EOF, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the writer never blocks on a full pipe.
pub async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<OutputBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = OutputBuffer::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.push(&chunk[..n]);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_limit_is_untouched() {
        let mut buffer = OutputBuffer::new(16);
        buffer.push(b"hello\n");
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.into_string(), "hello\n");
    }

    #[test]
    fn over_limit_is_cut_and_marked() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push(b"ab");
        buffer.push(b"cdef");
        buffer.push(b"gh");
        assert!(buffer.is_truncated());
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.into_string(), format!("abcd{TRUNCATION_MARKER}"));
    }

    #[test]
    fn exactly_at_limit_is_not_truncated() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push(b"abcd");
        buffer.push(b"");
        assert!(!buffer.is_truncated());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buffer = OutputBuffer::new(16);
        buffer.push(&[b'o', b'k', 0xff]);
        assert_eq!(buffer.into_string(), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn read_capped_drains_everything() {
        let data = vec![b'x'; 50_000];
        let buffer = read_capped(&data[..], 1000).await.unwrap();
        assert_eq!(buffer.len(), 1000);
        assert!(buffer.is_truncated());
    }
}
