//! Pure signing and obfuscation helpers shared by provider adapters.
//!
//! Every function here is a wire-format contract: the checksum polynomial,
//! radix alphabet, substitution table, and cipher parameters must match what
//! the provider's own client computes, byte for byte. Treat changes as
//! protocol changes, not refactors.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use chrono::{DateTime, Duration, Timelike};

/// CRC32 polynomial used by the provider's signature JS (reflected IEEE).
const CRC_POLY: u32 = 0xEDB8_8320;

/// Digit set for radix conversion, matching `Number.prototype.toString(radix)`.
const RADIX_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Substitution table indexed by decimal digit when deriving the time secret.
const TIME_KEY_TABLE: [&str; 10] = ["a", "d", "e", "f", "g", "h", "l", "m", "y", "i"];

/// Platform constant embedded in the signed message.
const SIGN_PLATFORM: &str = "web";
const SIGN_CONSTANT: u32 = 3;

/// Fixed slot permutation applied to the anti-bot challenge token.
const CHALLENGE_POSITIONS: [usize; 40] = [
    15, 35, 29, 24, 33, 16, 1, 38, 10, 9, 19, 31, 40, 27, 22, 23, 25, 13, 6, 11, 39, 18, 20, 8,
    14, 21, 32, 26, 2, 30, 7, 4, 17, 5, 3, 28, 34, 37, 12, 36,
];

/// XOR mask applied after unscrambling the challenge token.
const CHALLENGE_MASK: &str = "3000176000856006061501533003690027800375";

/// AES-128-ECB key for the family's timestamp/id obfuscation.
const OBFUSCATION_KEY: &[u8; 16] = b"lanZouY-disk-app";

const AES_BLOCK: usize = 16;

/// A computed request signature: the derived time secret plus the
/// `timestamp-nonce-checksum` header value the provider expects verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// First-stage checksum over the substituted time string.
    pub secret: String,
    /// `"{ts}-{nonce}-{checksum}"` header/query value.
    pub header: String,
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = CRC_POLY ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// CRC32 of `input`, rendered in the given radix (2..=36) with lowercase
/// digits. Out-of-range radixes fall back to 10, mirroring the provider JS.
#[must_use]
pub fn crc32_radix(input: &str, radix: u32) -> String {
    let radix = if (2..=36).contains(&radix) { radix } else { 10 };
    let mut value = u64::from(crc32(input.as_bytes()));
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value != 0 {
        let digit = usize::try_from(value % u64::from(radix)).unwrap_or(0);
        out.push(RADIX_DIGITS[digit]);
        value /= u64::from(radix);
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Derives the substituted time string for a unix timestamp in seconds.
///
/// The provider shifts the clock by minus eight hours before splitting it
/// into `YYYYMMDDHHmm` and mapping each digit through the key table. The
/// shift direction looks inverted but matches the deployed JS.
#[must_use]
pub fn time_chars(timestamp_secs: i64) -> String {
    let shifted = DateTime::from_timestamp(timestamp_secs, 0)
        .unwrap_or_default()
        .checked_sub_signed(Duration::hours(8))
        .unwrap_or_default();
    let date = shifted.date_naive();
    let digits = format!(
        "{:04}{:02}{:02}{:02}{:02}",
        chrono::Datelike::year(&date),
        chrono::Datelike::month(&date),
        chrono::Datelike::day(&date),
        shifted.hour(),
        shifted.minute()
    );
    digits
        .bytes()
        .map(|b| {
            let idx = usize::from(b.wrapping_sub(b'0'));
            TIME_KEY_TABLE.get(idx).copied().unwrap_or("_")
        })
        .collect()
}

/// Computes the time-window-bound request signature for an API path.
///
/// Deterministic given `(timestamp_secs, nonce)`; callers sample both per
/// request because the server rejects stale windows.
#[must_use]
pub fn sign_path(path: &str, timestamp_secs: i64, nonce: u32) -> Signature {
    let secret = crc32_radix(&time_chars(timestamp_secs), 10);
    let message = format!(
        "{timestamp_secs}|{nonce}|{path}|{SIGN_PLATFORM}|{SIGN_CONSTANT}|{secret}"
    );
    let checksum = crc32_radix(&message, 10);
    Signature {
        header: format!("{timestamp_secs}-{nonce}-{checksum}"),
        secret,
    }
}

/// Samples the current clock and a fresh nonce and signs `path`.
#[must_use]
pub fn sign_path_now(path: &str) -> Signature {
    let timestamp_secs = chrono::Utc::now().timestamp();
    let nonce = rand::Rng::gen_range(&mut rand::thread_rng(), 0..10_000_000);
    sign_path(path, timestamp_secs, nonce)
}

fn unscramble_challenge(token: &str) -> Option<String> {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() != CHALLENGE_POSITIONS.len() {
        return None;
    }
    Some(
        CHALLENGE_POSITIONS
            .iter()
            .map(|&pos| chars[pos - 1])
            .collect(),
    )
}

fn hex_xor(a: &str, b: &str) -> Option<String> {
    if a.len() != b.len() || a.len() % 2 != 0 {
        return None;
    }
    let mut out = String::with_capacity(a.len());
    for (ca, cb) in a.as_bytes().chunks(2).zip(b.as_bytes().chunks(2)) {
        let xa = u8::from_str_radix(std::str::from_utf8(ca).ok()?, 16).ok()?;
        let xb = u8::from_str_radix(std::str::from_utf8(cb).ok()?, 16).ok()?;
        out.push_str(&format!("{:02x}", xa ^ xb));
    }
    Some(out)
}

/// Computes the anti-bot cookie value from the server-supplied challenge
/// token (the `arg1` variable embedded in the challenge HTML).
///
/// Returns `None` when the token is not the expected 40-character hex form;
/// callers treat that the same as a persistent challenge.
#[must_use]
pub fn challenge_response(token: &str) -> Option<String> {
    hex_xor(&unscramble_challenge(token)?, CHALLENGE_MASK)
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = AES_BLOCK - data.len() % AES_BLOCK;
    let mut out = data.to_vec();
    out.extend(std::iter::repeat_n(u8::try_from(pad).unwrap_or(0), pad));
    out
}

/// Encrypts `plain` with the family obfuscation key (AES-128-ECB, PKCS#7)
/// and renders lowercase hex, the form embedded in request query strings.
#[must_use]
pub fn encrypt_hex(plain: &str) -> String {
    let cipher = Aes128::new(GenericArray::from_slice(OBFUSCATION_KEY));
    let mut padded = pkcs7_pad(plain.as_bytes());
    for block in padded.chunks_mut(AES_BLOCK) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    hex::encode(padded)
}

/// Inverse of [`encrypt_hex`]; `None` on malformed input or bad padding.
#[must_use]
pub fn decrypt_hex(encoded: &str) -> Option<String> {
    let mut data = hex::decode(encoded).ok()?;
    if data.is_empty() || data.len() % AES_BLOCK != 0 {
        return None;
    }
    let cipher = Aes128::new(GenericArray::from_slice(OBFUSCATION_KEY));
    for block in data.chunks_mut(AES_BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    let pad = usize::from(*data.last()?);
    if pad == 0 || pad > AES_BLOCK || pad > data.len() {
        return None;
    }
    data.truncate(data.len() - pad);
    String::from_utf8(data).ok()
}
