//! Bounded capture of transcoder output streams.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Lines kept in a diagnostic excerpt.
const EXCERPT_LINES: usize = 8;

const REDACTED: &str = "<redacted>";

/// Needles without a path separator shorter than this are left alone.
const MIN_BARE_REDACTION_LEN: usize = 6;

/// Tail of a byte stream, capped at a fixed size.
///
/// Older bytes are discarded as new ones arrive so a chatty transcoder
/// cannot grow memory without bound.
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    buf: VecDeque<u8>,
    cap: usize,
    total: u64,
}

impl OutputTail {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap.min(64 * 1024)),
            cap,
            total: 0,
        }
    }

    /// Append bytes, dropping from the front past the cap.
    pub fn push(&mut self, bytes: &[u8]) {
        self.total += bytes.len() as u64;
        if self.cap == 0 {
            return;
        }
        let bytes = if bytes.len() > self.cap {
            &bytes[bytes.len() - self.cap..]
        } else {
            bytes
        };
        let overflow = (self.buf.len() + bytes.len()).saturating_sub(self.cap);
        self.buf.drain(..overflow);
        self.buf.extend(bytes);
    }

    /// Read `reader` to EOF, keeping only the last `cap` bytes.
    ///
    /// Read errors end the drain; whatever was captured so far is kept.
    pub async fn drain<R>(mut reader: R, cap: usize) -> Self
    where
        R: AsyncRead + Unpin,
    {
        let mut tail = Self::new(cap);
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => tail.push(&chunk[..n]),
            }
        }
        tail
    }

    /// Total bytes seen, including discarded ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }
}

/// Turn a raw stderr tail into a short excerpt safe to return to callers.
///
/// Every occurrence of a `redactions` entry (scratch paths, source
/// locators) is replaced, control characters other than newline and tab
/// are stripped, and only the last few lines within `max_bytes` are kept.
/// Returns `None` when nothing printable remains.
pub fn sanitize_excerpt(raw: &[u8], redactions: &[&str], max_bytes: usize) -> Option<String> {
    let mut text = String::from_utf8_lossy(raw).into_owned();

    // Longest first so a path is not partially rewritten by its own prefix
    let mut redactions: Vec<&str> = redactions.iter().copied().filter(|r| is_redactable(r)).collect();
    redactions.sort_by_key(|r| std::cmp::Reverse(r.len()));
    for needle in redactions {
        text = text.replace(needle, REDACTED);
    }

    let cleaned: String = text
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let lines: Vec<&str> = cleaned
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.is_empty() || max_bytes == 0 {
        return None;
    }

    let mut excerpt = lines[lines.len().saturating_sub(EXCERPT_LINES)..].join("\n");
    if excerpt.len() > max_bytes {
        let mut cut = excerpt.len() - max_bytes;
        while !excerpt.is_char_boundary(cut) {
            cut += 1;
        }
        excerpt = excerpt[cut..].to_string();
    }

    Some(excerpt)
}

/// Short bare names (a relative source like `a`) would match ordinary
/// text; only path-like or reasonably long needles are redacted.
fn is_redactable(needle: &str) -> bool {
    needle.contains(['/', '\\']) || needle.len() >= MIN_BARE_REDACTION_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_bytes() {
        let mut tail = OutputTail::new(4);
        tail.push(b"abc");
        tail.push(b"defg");
        assert_eq!(tail.to_bytes(), b"defg");
        assert_eq!(tail.total(), 7);

        tail.push(b"0123456789");
        assert_eq!(tail.to_bytes(), b"6789");
    }

    #[test]
    fn test_drain_reader() {
        let data: &[u8] = b"first line\nsecond line\n";
        let tail = tokio_test::block_on(OutputTail::drain(data, 12));
        assert_eq!(tail.to_bytes(), b"second line\n");
        assert_eq!(tail.total(), data.len() as u64);
    }

    #[test]
    fn test_sanitize_redacts_paths() {
        let raw = b"/tmp/clipper/clip-abc/out.mp4: Invalid data found\n";
        let excerpt = sanitize_excerpt(raw, &["/tmp/clipper/clip-abc"], 2048).unwrap();
        assert_eq!(excerpt, "<redacted>/out.mp4: Invalid data found");
    }

    #[test]
    fn test_sanitize_strips_control_and_limits_lines() {
        let mut raw = Vec::new();
        for i in 0..20 {
            raw.extend_from_slice(format!("line {i}\x1b[0m\r\n").as_bytes());
        }
        let excerpt = sanitize_excerpt(&raw, &[], 2048).unwrap();
        assert!(!excerpt.contains('\x1b'));
        assert_eq!(excerpt.lines().count(), EXCERPT_LINES);
        assert!(excerpt.ends_with("line 19[0m"));
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let raw = "ééééé".as_bytes();
        let excerpt = sanitize_excerpt(raw, &[], 3).unwrap();
        assert_eq!(excerpt, "é");
    }

    #[test]
    fn test_sanitize_empty_is_none() {
        assert!(sanitize_excerpt(b"\n\n  \n", &[], 2048).is_none());
    }

    #[test]
    fn test_short_bare_locator_not_redacted() {
        let raw = b"a: Invalid data found when processing input\n";
        let excerpt = sanitize_excerpt(raw, &["a", "/srv/scratch/clip-1"], 1024).unwrap();
        assert_eq!(excerpt, "a: Invalid data found when processing input");

        let excerpt = sanitize_excerpt(b"media/a.mp4: No such file\n", &["media/a.mp4"], 1024).unwrap();
        assert_eq!(excerpt, format!("{}: No such file", REDACTED));
    }
}
