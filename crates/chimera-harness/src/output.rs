//! Background draining of a child's stdout/stderr.

use log::warn;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 8192;
const FINISH_POLL: Duration = Duration::from_millis(10);

/// Bytes kept per pipe; older output is discarded
pub const CAPTURE_LIMIT: usize = 64 * 1024;

/// The most recent `limit` bytes of a pipe, plus how many were discarded.
#[derive(Debug)]
struct Tail {
    bytes: VecDeque<u8>,
    dropped: usize,
    limit: usize,
}

impl Tail {
    fn new(limit: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(limit.min(READ_CHUNK)),
            dropped: 0,
            limit,
        }
    }

    fn push(&mut self, data: &[u8]) {
        let data = if data.len() > self.limit {
            let skip = data.len() - self.limit;
            self.dropped += skip;
            &data[skip..]
        } else {
            data
        };

        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.limit);
        self.bytes.drain(..overflow);
        self.dropped += overflow;
        self.bytes.extend(data);
    }

    fn render(&self) -> String {
        let (front, back) = self.bytes.as_slices();
        let mut contiguous = Vec::with_capacity(self.bytes.len());
        contiguous.extend_from_slice(front);
        contiguous.extend_from_slice(back);
        let text = String::from_utf8_lossy(&contiguous);

        if self.dropped == 0 {
            text.into_owned()
        } else {
            format!("[... {} earlier bytes discarded ...]\n{}", self.dropped, text)
        }
    }
}

/// The tail of what has been read from one pipe.
///
/// A reader thread drains the pipe until it closes, so the child never blocks
/// on a full pipe buffer. Only the last [`CAPTURE_LIMIT`] bytes are kept.
pub struct OutputCapture {
    buffer: Arc<Mutex<Tail>>,
    reader: Option<JoinHandle<()>>,
}

impl OutputCapture {
    pub fn spawn<R>(name: &'static str, source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with_limit(name, source, CAPTURE_LIMIT)
    }

    pub fn spawn_with_limit<R>(name: &'static str, mut source: R, limit: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Tail::new(limit)));
        let sink = Arc::clone(&buffer);

        let reader = thread::Builder::new()
            .name(format!("chimera-{}", name))
            .spawn(move || {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    match source.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(&chunk[..n]),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("Stopped capturing daemon {}: {}", name, e);
                            break;
                        }
                    }
                }
            });

        let reader = match reader {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start {} capture thread: {}", name, e);
                None
            }
        };

        Self { buffer, reader }
    }

    /// Captured tail, waiting up to `wait` for the pipe to reach EOF.
    pub fn snapshot(&self, wait: Duration) -> String {
        if let Some(reader) = &self.reader {
            let deadline = Instant::now() + wait;
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(FINISH_POLL);
            }
        }
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render()
    }

    /// Whether the pipe has been read to EOF.
    pub fn is_closed(&self) -> bool {
        self.reader.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_captures_until_eof() {
        let capture = OutputCapture::spawn("stdout", Cursor::new(b"hello\nworld\n".to_vec()));
        assert_eq!(capture.snapshot(Duration::from_secs(2)), "hello\nworld\n");
        assert!(capture.is_closed());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let capture = OutputCapture::spawn("stderr", Cursor::new(vec![b'o', b'k', 0xff]));
        assert_eq!(capture.snapshot(Duration::from_secs(2)), "ok\u{fffd}");
    }

    #[test]
    fn test_keeps_only_the_tail() {
        let capture =
            OutputCapture::spawn_with_limit("stdout", Cursor::new(b"0123456789abcdef".to_vec()), 8);
        assert_eq!(
            capture.snapshot(Duration::from_secs(2)),
            "[... 8 earlier bytes discarded ...]\n89abcdef"
        );
    }

    #[test]
    fn test_tail_across_many_writes() {
        let mut tail = Tail::new(4);
        tail.push(b"ab");
        tail.push(b"cd");
        assert_eq!(tail.render(), "abcd");

        tail.push(b"e");
        tail.push(b"fghij");
        assert_eq!(tail.bytes.len(), 4);
        assert_eq!(tail.dropped, 6);
        assert!(tail.render().ends_with("\nghij"));
    }

    #[test]
    fn test_large_stream_is_bounded() {
        let capture = OutputCapture::spawn("stdout", Cursor::new(vec![b'x'; CAPTURE_LIMIT * 3]));
        let text = capture.snapshot(Duration::from_secs(5));
        assert!(text.starts_with(&format!("[... {} earlier bytes", CAPTURE_LIMIT * 2)));
        assert!(text.ends_with(&"x".repeat(CAPTURE_LIMIT)));
    }
}
