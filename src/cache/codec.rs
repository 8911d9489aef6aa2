//! On-disk frame for a single cache entry.
//!
//! ```text
//! [magic "SSVC": 4][version: 1][len: 4 LE][CacheEntry JSON: len][crc32: 4 LE]
//! ```
//!
//! The checksum covers everything before it, so a flipped version or length
//! byte is caught the same way as a damaged payload.

use crc32fast::Hasher;

use crate::error::CacheError;

use super::CacheEntry;

/// Magic bytes identifying semstep cache files.
pub const MAGIC: [u8; 4] = *b"SSVC";

/// Frame layout version.
const VERSION: u8 = 1;

const PREFIX_LEN: usize = MAGIC.len() + 1 + 4;
const CRC_LEN: usize = 4;

/// Verdict entries are small; anything larger than this is not ours.
const MAX_PAYLOAD: usize = 64 * 1024;

/// Frames `entry` for writing to its cache file.
///
/// # Errors
///
/// Returns `CacheError::Backend` if the entry cannot be serialized or is too
/// large to frame.
pub fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
    let payload = serde_json::to_vec(entry).map_err(|e| CacheError::Backend {
        message: format!("cannot serialize cache entry: {e}"),
    })?;
    if payload.len() > MAX_PAYLOAD {
        return Err(CacheError::Backend {
            message: format!("cache entry of {} bytes exceeds {MAX_PAYLOAD}", payload.len()),
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| CacheError::Backend {
        message: "cache entry length does not fit the frame".to_string(),
    })?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len() + CRC_LEN);
    frame.extend_from_slice(&MAGIC);
    frame.push(VERSION);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Reads back a frame written by [`encode_entry`].
///
/// # Errors
///
/// Returns `CacheError::Corrupt` for a foreign or truncated file, an unknown
/// version, a checksum mismatch, trailing bytes or an unreadable payload.
pub fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    if bytes.len() < PREFIX_LEN + CRC_LEN {
        return Err(corrupt(format!("{} bytes is shorter than any frame", bytes.len())));
    }
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not a semstep cache file"));
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(corrupt(format!("unsupported frame version {version}")));
    }

    let len = read_u32(&bytes[MAGIC.len() + 1..PREFIX_LEN]) as usize;
    if len > MAX_PAYLOAD {
        return Err(corrupt(format!("payload length {len} exceeds {MAX_PAYLOAD}")));
    }
    let body_end = PREFIX_LEN + len;
    let expected = body_end + CRC_LEN;
    if bytes.len() != expected {
        return Err(corrupt(format!(
            "frame is {} bytes, header says {expected}",
            bytes.len()
        )));
    }

    let stored = read_u32(&bytes[body_end..]);
    let computed = checksum(&bytes[..body_end]);
    if stored != computed {
        return Err(corrupt(format!(
            "checksum mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&bytes[PREFIX_LEN..body_end])
        .map_err(|e| corrupt(format!("unreadable entry: {e}")))
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

fn corrupt(message: impl Into<String>) -> CacheError {
    CacheError::Corrupt {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cache::CacheKey;
    use crate::confidence::Confidence;
    use crate::verdict::OracleVerdict;

    fn entry() -> CacheEntry {
        let verdict = OracleVerdict {
            match_found: true,
            chosen_pattern_text: r#"/^they click the "([^"]*)" button$/"#.to_string(),
            confidence: Confidence::new(0.88).unwrap(),
            parameter_values: vec!["Buy Now".to_string()],
        };
        let key = CacheKey::compute(r#"they press the "Buy Now" button"#, &[&verdict.chosen_pattern_text]);
        CacheEntry::new(key, verdict)
    }

    fn message(err: CacheError) -> String {
        match err {
            CacheError::Corrupt { message } => message,
            other => panic!("expected a corrupt-entry error, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_survives_framing() {
        let original = entry();
        let frame = encode_entry(&original).unwrap();

        assert_eq!(&frame[..4], b"SSVC");
        assert_eq!(frame[4], VERSION);
        let len = read_u32(&frame[5..9]) as usize;
        assert_eq!(frame.len(), PREFIX_LEN + len + CRC_LEN);

        assert_eq!(decode_entry(&frame).unwrap(), original);
    }

    #[test]
    fn test_damaged_payload_fails_checksum() {
        let mut frame = encode_entry(&entry()).unwrap();
        let last_payload_byte = frame.len() - CRC_LEN - 1;
        frame[last_payload_byte] ^= 0x20;
        assert!(message(decode_entry(&frame).unwrap_err()).contains("checksum"));
    }

    #[test]
    fn test_version_byte_is_checked() {
        let mut frame = encode_entry(&entry()).unwrap();
        frame[4] = VERSION + 1;
        assert!(message(decode_entry(&frame).unwrap_err()).contains("version"));
    }

    #[test]
    fn test_length_must_agree_with_file_size() {
        let frame = encode_entry(&entry()).unwrap();

        let mut truncated = frame.clone();
        truncated.truncate(frame.len() - 1);
        assert!(message(decode_entry(&truncated).unwrap_err()).contains("header says"));

        let mut padded = frame;
        padded.push(0);
        assert!(message(decode_entry(&padded).unwrap_err()).contains("header says"));
    }

    #[test]
    fn test_oversized_length_is_rejected_before_reading() {
        let mut frame = encode_entry(&entry()).unwrap();
        frame[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(message(decode_entry(&frame).unwrap_err()).contains("exceeds"));
    }

    #[test]
    fn test_foreign_files_are_rejected() {
        let json = serde_json::to_vec(&entry()).unwrap();
        assert!(message(decode_entry(&json).unwrap_err()).contains("not a semstep"));
        assert!(message(decode_entry(b"SSVC").unwrap_err()).contains("shorter"));
        assert!(decode_entry(&[]).is_err());
    }
}
