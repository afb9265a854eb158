//! # Batch Compression
//!
//! Gzip framing for replayed spool batches.
//!
//! Batches are compressed with the standard gzip header and trailer at the
//! default compression level, so the receiving endpoint can decode them from
//! the `Content-Encoding: gzip` header alone.

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

/// Gzip-compress a batch of newline-terminated records.
///
/// # Arguments
///
/// * `lines` - Records to compress, in file order; each line must not carry
///   its own trailing newline
///
/// # Returns
///
/// * `io::Result<Vec<u8>>` - Gzip stream containing every line followed by `\n`
///
/// # Errors
///
/// Returns error if the encoder fails to write or finish the stream
///
/// # Examples
///
/// ```
/// use sensor_uplink::spool::compress::compress_batch;
///
/// let lines = vec![b"m v=1.000000 1".to_vec(), b"m v=2.000000 2".to_vec()];
/// let gz = compress_batch(&lines)?;
/// assert_eq!(&gz[..2], &[0x1f, 0x8b]);
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn compress_batch<L: AsRef<[u8]>>(lines: &[L]) -> io::Result<Vec<u8>> {
    let raw_len: usize = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw_len / 4 + 32), Compression::default());

    for line in lines {
        encoder.write_all(line.as_ref())?;
        encoder.write_all(b"\n")?;
    }

    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decompress(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_magic_header() {
        let gz = compress_batch(&["m v=1i 1"]).unwrap();
        assert_eq!(gz[0], 0x1f);
        assert_eq!(gz[1], 0x8b);
        // Deflate method
        assert_eq!(gz[2], 0x08);
    }

    #[test]
    fn test_every_line_keeps_newline() {
        let gz = compress_batch(&["a v=1i 1", "b v=2i 2", "c v=3i 3"]).unwrap();
        assert_eq!(decompress(&gz), "a v=1i 1\nb v=2i 2\nc v=3i 3\n");
    }

    #[test]
    fn test_empty_batch_is_valid_stream() {
        let lines: [&str; 0] = [];
        let gz = compress_batch(&lines).unwrap();
        assert_eq!(decompress(&gz), "");
    }

    #[test]
    fn test_repetitive_batch_shrinks() {
        let lines: Vec<String> = (0..5000)
            .map(|i| format!("measurements,source=instrumentacao A0=1.250000 {}", 1_700_000_000 + i))
            .collect();
        let raw_len: usize = lines.iter().map(|l| l.len() + 1).sum();

        let gz = compress_batch(&lines).unwrap();
        assert!(gz.len() < raw_len / 5);
    }
}
