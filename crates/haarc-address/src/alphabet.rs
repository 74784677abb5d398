//! 96-symbol alphabet and fixed-width segment encoding
//!
//! Symbols: `0-9`, `A-Z`, `a-z`, the 32 printable ASCII punctuation marks,
//! then `§` and `¤`. The last two are not ASCII, so widths are counted in
//! chars, not bytes.

use crate::murmur::fmix32;

pub const BASE: u32 = 96;

pub const ALPHABET: [char; BASE as usize] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', //
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', //
    'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', //
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', //
    'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', //
    '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    ':', ';', '<', '=', '>', '?', '@', //
    '[', '\\', ']', '^', '_', '`', //
    '{', '|', '}', '~', //
    '§', '¤',
];

/// Base-96 digits needed to hold any u32 (96^5 > 2^32).
pub const DIGITS: usize = 5;

const GOLDEN: u32 = 0x9e37_79b9;

pub fn is_symbol(c: char) -> bool {
    index_of(c).is_some()
}

pub fn index_of(c: char) -> Option<usize> {
    match c {
        '0'..='9' => Some(c as usize - '0' as usize),
        'A'..='Z' => Some(10 + c as usize - 'A' as usize),
        'a'..='z' => Some(36 + c as usize - 'a' as usize),
        '§' => Some(94),
        '¤' => Some(95),
        _ => ALPHABET[62..94].iter().position(|&s| s == c).map(|p| p + 62),
    }
}

/// Expand a 32-bit hash into exactly `width` symbols.
///
/// The first [`DIGITS`] symbols are the big-endian base-96 digits of `hash`,
/// so distinct hashes always give distinct prefixes. The rest come from an
/// fmix32 chain seeded by `hash`.
pub fn expand(hash: u32, width: usize, out: &mut String) {
    let mut digits = [0usize; DIGITS];
    let mut v = hash;
    for d in digits.iter_mut().rev() {
        *d = (v % BASE) as usize;
        v /= BASE;
    }
    for &d in digits.iter().take(width) {
        out.push(ALPHABET[d]);
    }

    let mut state = hash;
    for i in DIGITS..width {
        state = fmix32(state.wrapping_add(GOLDEN).wrapping_add(i as u32));
        out.push(ALPHABET[(state % BASE) as usize]);
    }
}

/// Recover the hash from the fixed base-96 prefix of a segment.
pub fn decode_prefix(segment: &str) -> Option<u32> {
    let mut value: u64 = 0;
    let mut taken = 0;
    for c in segment.chars().take(DIGITS) {
        value = value * BASE as u64 + index_of(c)? as u64;
        taken += 1;
    }
    if taken < DIGITS {
        return None;
    }
    u32::try_from(value).ok()
}
