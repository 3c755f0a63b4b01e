//! Index metadata parity
//!
//! 128 bits stored at the start of packet 0: a 64-bit fold of the table of
//! contents followed by a 64-bit fold of the packet table, both little-endian.
//! Each value is rotated left by `value mod 5` before being XORed in.
//!
//! Only the index metadata is covered. Record payloads carry no checksum.

/// Bytes occupied by the parity at offset 0.
pub const PARITY_SIZE: usize = 16;

fn fold(values: impl Iterator<Item = i32>) -> u64 {
    values.fold(0u64, |acc, value| {
        let value = i64::from(value);
        acc ^ (value as u64).rotate_left(value.rem_euclid(5) as u32)
    })
}

pub(crate) fn compute(
    toc_heads: impl Iterator<Item = i32>,
    packet_links: impl Iterator<Item = i32>,
) -> [u8; PARITY_SIZE] {
    let mut parity = [0u8; PARITY_SIZE];
    parity[..8].copy_from_slice(&fold(toc_heads).to_le_bytes());
    parity[8..].copy_from_slice(&fold(packet_links).to_le_bytes());
    parity
}
