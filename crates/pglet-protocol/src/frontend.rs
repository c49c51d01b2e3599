//! Builders for the outbound byte stream.
//!
//! Framing is type byte + big-endian u32 length (the length counts
//! itself but not the type byte), per the PostgreSQL v3 protocol.

/// Build a simple query message (`Q`).
#[must_use]
pub fn query(sql: &str) -> Vec<u8> {
    let body_len = sql.len() + 1 + 4;
    let mut buf = Vec::with_capacity(body_len + 1);
    buf.push(b'Q');
    buf.extend_from_slice(&u32::try_from(body_len).unwrap_or(u32::MAX).to_be_bytes());
    buf.extend_from_slice(sql.as_bytes());
    buf.push(0);
    buf
}

/// Build a terminate message (`X`).
#[must_use]
pub fn terminate() -> Vec<u8> {
    vec![b'X', 0, 0, 0, 4]
}
