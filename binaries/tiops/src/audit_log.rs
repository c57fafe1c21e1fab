//! In-memory capture of the session log for the audit file.
//!
//! A `tracing-subscriber` layer writes formatted log lines into a
//! shared buffer; after the command finishes the buffer becomes the
//! body of the audit entry.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Shared buffer collecting everything the fmt layer writes.
#[derive(Clone, Default)]
pub struct AuditBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl AuditBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured log as a string.
    pub fn contents(&self) -> String {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&inner).into_owned()
    }
}

/// Writer handle the fmt layer uses per event.
pub struct AuditWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Write for AuditWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for AuditBuffer {
    type Writer = AuditWriter;

    fn make_writer(&'a self) -> Self::Writer {
        AuditWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_accumulates_writes() {
        let buffer = AuditBuffer::new();
        let mut writer = buffer.make_writer();
        writer.write_all(b"line one\n").unwrap();
        writer.write_all(b"line two\n").unwrap();
        assert_eq!(buffer.contents(), "line one\nline two\n");
    }
}
