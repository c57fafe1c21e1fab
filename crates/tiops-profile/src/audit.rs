//! The audit log.
//!
//! Each invocation of a mutating command leaves one file in the audit
//! directory. The filename is the invocation's epoch seconds encoded in
//! base 52, so names sort chronologically and decode back to their
//! timestamp. The first line holds the verbatim command line, the rest
//! is the captured session log.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::error::{ProfileError, Result};

/// Digits in ASCII order so equal-length ids sort by time.
const ALPHABET: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encodes epoch seconds as a base-52 audit id. `encode(0)` is `"A"`.
pub fn encode(mut seconds: u64) -> String {
    if seconds == 0 {
        return "A".to_string();
    }
    let mut digits = Vec::new();
    while seconds > 0 {
        digits.push(ALPHABET[(seconds % 52) as usize]);
        seconds /= 52;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Decodes a base-52 audit id back to epoch seconds.
pub fn decode(id: &str) -> Result<u64> {
    if id.is_empty() {
        return Err(ProfileError::InvalidAuditId(id.to_string()));
    }
    let mut value: u64 = 0;
    for b in id.bytes() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == b)
            .ok_or_else(|| ProfileError::InvalidAuditId(id.to_string()))?;
        value = value
            .checked_mul(52)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| ProfileError::InvalidAuditId(id.to_string()))?;
    }
    Ok(value)
}

/// One entry of the audit listing.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// The audit id (the filename).
    pub id: String,
    /// When the command ran.
    pub time: DateTime<Utc>,
    /// The command line as invoked.
    pub command: String,
}

/// Writes an audit entry and returns its id.
///
/// `args` is the full argv; `log` is the captured session output.
pub fn write(dir: &Path, args: &[String], log: &str) -> Result<String> {
    std::fs::create_dir_all(dir)?;
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let id = encode(seconds);

    let mut content = args.join(" ");
    content.push('\n');
    content.push_str(log);
    std::fs::write(dir.join(&id), content)?;
    Ok(id)
}

/// Lists all audit entries, oldest first.
pub fn list(dir: &Path) -> Result<Vec<AuditEntry>> {
    let mut entries = Vec::new();
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };
    for entry in read {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        // Skip files that are not audit ids.
        let Ok(seconds) = decode(&id) else { continue };
        let Some(time) = DateTime::from_timestamp(seconds as i64, 0) else {
            continue;
        };
        let content = std::fs::read_to_string(entry.path())?;
        let command = content.lines().next().unwrap_or_default().to_string();
        entries.push(AuditEntry { id, time, command });
    }
    entries.sort_by(|a, b| a.time.cmp(&b.time));
    Ok(entries)
}

/// Reads the full content of one audit entry.
pub fn read(dir: &Path, id: &str) -> Result<String> {
    let path = dir.join(id);
    if !path.exists() {
        return Err(ProfileError::InvalidAuditId(id.to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zero() {
        assert_eq!(encode(0), "A");
        assert_eq!(decode("A").unwrap(), 0);
    }

    #[test]
    fn test_round_trip() {
        for seconds in [1u64, 51, 52, 2704, 1_586_000_000, u32::MAX as u64] {
            assert_eq!(decode(&encode(seconds)).unwrap(), seconds, "{seconds}");
        }
    }

    #[test]
    fn test_ids_sort_chronologically() {
        // Same-length ids compare lexicographically in time order.
        let a = encode(1_586_000_000);
        let b = encode(1_586_000_001);
        assert!(a < b);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("no+pe").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_write_then_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["tiops".to_string(), "deploy".to_string(), "foo".to_string()];
        let id = write(dir.path(), &args, "line one\nline two\n").unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].command, "tiops deploy foo");

        let content = read(dir.path(), &id).unwrap();
        assert!(content.starts_with("tiops deploy foo\n"));
        assert!(content.ends_with("line two\n"));
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("not-an-id!"), "junk").unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
    }
}
