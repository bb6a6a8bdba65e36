//! Entropy for the protocol engine
//!
//! Hardware sources hand out 32-bit words; buffers whose length is not a
//! multiple of four take only the leading bytes of the last word.

use rand::rngs::OsRng;
use rand::RngCore;

/// A source of full-entropy 32-bit words
pub trait EntropySource: Send + Sync {
    fn next_word(&self) -> u32;
}

/// Operating system CSPRNG
///
/// Panics if the OS source is unavailable; run [`super::self_test`] at
/// startup to catch that before the engine needs randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_word(&self) -> u32 {
        OsRng.next_u32()
    }
}

/// Fill `buf` with one fresh word per 4 bytes, truncating the final word
pub fn fill_from_words(buf: &mut [u8], mut next_word: impl FnMut() -> u32) {
    for chunk in buf.chunks_mut(4) {
        let word = next_word().to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_word_is_truncated_not_repeated() {
        let mut counter = 0u32;
        let mut buf = [0u8; 6];
        fill_from_words(&mut buf, || {
            counter += 1;
            0x0403_0200 | counter
        });

        // two words drawn for six bytes, second one cut after two bytes
        assert_eq!(counter, 2);
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04, 0x02, 0x02]);
    }

    #[test]
    fn test_empty_buffer_draws_nothing() {
        let mut calls = 0;
        fill_from_words(&mut [], || {
            calls += 1;
            0
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_word_count_per_length() {
        for (len, words) in [(1usize, 1u32), (4, 1), (5, 2), (8, 2), (13, 4), (32, 8)] {
            let mut calls = 0u32;
            let mut buf = vec![0u8; len];
            fill_from_words(&mut buf, || {
                calls += 1;
                u32::MAX
            });
            assert_eq!(calls, words, "length {}", len);
            assert!(buf.iter().all(|&b| b == 0xff));
        }
    }

    #[test]
    fn test_os_entropy_varies() {
        let source = OsEntropy;
        let a: Vec<u32> = (0..4).map(|_| source.next_word()).collect();
        let b: Vec<u32> = (0..4).map(|_| source.next_word()).collect();
        assert_ne!(a, b);
    }
}
