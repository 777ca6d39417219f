//! Stream draining helpers.
//!
//! Control-mode output and one-shot command output both arrive as raw
//! bytes that may contain stray NUL bytes (tmux passes pane titles and
//! option values through unfiltered). Every sink in this crate is
//! NUL-sanitized at the boundary: interior `0x00` becomes `0x01` so the
//! parser can use NUL as a chunk separator and `String` conversion never
//! truncates silently.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;
use crate::ring::Ring;

/// Replace interior NUL bytes in place.
pub fn sanitize_nul(data: &mut [u8]) {
    for byte in data {
        if *byte == 0 {
            *byte = 1;
        }
    }
}

/// Await one chunk from `reader`, sanitize it, and append it to the ring
/// followed by a single NUL separator.
///
/// Returns the number of payload bytes read; `0` means end of stream (the
/// separator is not written in that case).
pub async fn drain_chunk<R>(reader: &mut R, ring: &mut Ring) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    let n = reader.read(&mut chunk).await?;
    if n == 0 {
        return Ok(0);
    }
    sanitize_nul(&mut chunk[..n]);
    ring.push(&chunk[..n]);
    ring.push(&[0]);
    Ok(n)
}

/// Read `reader` to end of stream, sanitizing NULs, and return the result
/// as a `String` (lossy on invalid UTF-8, which tmux should never emit for
/// the formats we request).
pub async fn read_to_end_sanitized<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    reader.read_to_end(&mut buf).await?;
    sanitize_nul(&mut buf);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read and discard everything until end of stream.
pub async fn drain_discard<R>(reader: &mut R) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    let mut total = 0;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunk_drain_appends_separator() {
        let data: &[u8] = b"%begin 1 0 0\n";
        let mut reader = data;
        let mut ring = Ring::new();
        let n = drain_chunk(&mut reader, &mut ring).await.unwrap();
        assert_eq!(n, 13);
        let bytes: Vec<u8> = ring.iter().collect();
        assert_eq!(&bytes[..13], data);
        assert_eq!(bytes[13], 0);
    }

    #[tokio::test]
    async fn interior_nuls_are_sanitized() {
        let data: &[u8] = b"ab\0cd";
        let mut reader = data;
        let mut ring = Ring::new();
        drain_chunk(&mut reader, &mut ring).await.unwrap();
        let bytes: Vec<u8> = ring.iter().collect();
        // Exactly one NUL: the separator at the end.
        assert_eq!(bytes.iter().filter(|&&b| b == 0).count(), 1);
        assert_eq!(&bytes[..5], b"ab\x01cd");
    }

    #[tokio::test]
    async fn eof_reads_nothing() {
        let mut reader: &[u8] = b"";
        let mut ring = Ring::new();
        assert_eq!(drain_chunk(&mut reader, &mut ring).await.unwrap(), 0);
        assert!(ring.is_empty());
    }

    #[tokio::test]
    async fn heap_sink_sanitizes() {
        let mut reader: &[u8] = b"on\0\n";
        let out = read_to_end_sanitized(&mut reader).await.unwrap();
        assert_eq!(out, "on\u{1}\n");
    }

    #[tokio::test]
    async fn discard_counts_but_keeps_nothing() {
        let mut reader: &[u8] = b"sixteen bytes!!\n";
        assert_eq!(drain_discard(&mut reader).await.unwrap(), 16);
    }
}
