//! Internet checksum (RFC 1071).
//!
//! Words are summed in little-endian order with the odd trailing byte in the
//! low position, then the complemented result is byte-swapped. The returned
//! value is therefore the checksum as a big-endian number: write it into a
//! header with `to_be_bytes()`.

/// Sum 16-bit words with end-around carry, folded to 16 bits (not complemented).
fn folded_le_sum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_le_bytes([word[0], word[1]]) as u32;
        // Fold early so long buffers never overflow the accumulator
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    // Odd trailing byte, zero padded on the high side
    if let [last] = words.remainder() {
        sum += *last as u32;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum as u16
}

/// Compute the Internet checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    (!folded_le_sum(data)).swap_bytes()
}

/// Ones'-complement sum of `data` as a big-endian number.
///
/// A buffer that carries a correct checksum sums to `0xFFFF`.
pub fn ones_complement_sum(data: &[u8]) -> u16 {
    folded_le_sum(data).swap_bytes()
}

/// True if `data` (checksum field included) verifies.
pub fn is_valid(data: &[u8]) -> bool {
    ones_complement_sum(data) == 0xFFFF
}
