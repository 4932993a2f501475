//! Bit Counting
//!
//! Population count over a single byte, backed by a 256-entry table built at
//! compile time. Status markers in the spare area are tested with a bit count
//! threshold rather than exact equality, since programmed bits can decay back
//! toward the erased state.

/// Number of set bits for every byte value.
static COUNT_BITS_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        // popcount(i) = popcount(i / 2) + lowest bit
        table[i] = table[i >> 1] + (i & 1) as u8;
        i += 1;
    }
    table
}

/// Returns the number of set bits in `x` (0..=8).
#[inline]
pub fn count_bits(x: u8) -> u8 {
    COUNT_BITS_TABLE[x as usize]
}

/// Marker threshold: a status byte with fewer set bits than this is treated
/// as programmed.
pub const MARKER_THRESHOLD: u8 = 7;

/// True when `x` has decayed far enough from 0xFF to count as programmed.
#[inline]
pub fn is_programmed(x: u8) -> bool {
    count_bits(x) < MARKER_THRESHOLD
}
