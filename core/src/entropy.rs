use std::io::Write;

use flate2::{write::ZlibEncoder, Compression};

/// zlib level used for every compression ratio, so ratios are comparable
/// across runs and catalog records.
pub const COMPRESSION_LEVEL: u32 = 6;

/// Shannon entropy in bits per byte. Always in `[0, 8]`, zero for empty input.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for byte in data {
        counts[*byte as usize] += 1;
    }
    let len = data.len() as f64;
    let entropy = counts
        .iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / len;
            -p * p.log2()
        })
        .sum::<f64>();
    // A single repeated byte yields -0.0.
    entropy.max(0.0)
}

/// Compressed length over raw length, rounded to 3 decimals.
///
/// Empty input and compressor failures both map to `1.0`.
pub fn compression_ratio(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 1.0;
    }
    match compress(data) {
        Ok(compressed) => round3(compressed.len() as f64 / data.len() as f64),
        Err(_) => 1.0,
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len()),
        Compression::new(COMPRESSION_LEVEL),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
