//! Tracing subscriber setup
//!
//! Interactive runs log to stderr. `--headless` sends each event to the
//! system log instead, one record per event.

use std::ffi::CString;
use std::io;

use libc::c_int;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const SYSLOG_IDENT: &[u8] = b"modswap\0";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr
pub fn init_console() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Log to the system log, for running without a terminal
pub fn init_syslog() {
    unsafe {
        libc::openlog(SYSLOG_IDENT.as_ptr().cast(), libc::LOG_PID, libc::LOG_USER);
    }

    // The system log stamps records itself.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .without_time()
        .with_writer(Syslog)
        .init();
}

fn priority(level: &Level) -> c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        // LOG_INFO records are dropped by default on macOS.
        Level::INFO => libc::LOG_NOTICE,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// One formatted event as a C string: trailing newline removed, interior
/// NULs dropped. `None` for blank output.
fn record(bytes: &[u8]) -> Option<CString> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim_end();
    if line.is_empty() {
        return None;
    }
    CString::new(line.replace('\0', "")).ok()
}

struct Syslog;

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter::new(libc::LOG_NOTICE)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter::new(priority(meta.level()))
    }
}

/// Buffers one event and submits it when dropped
struct SyslogWriter {
    priority: c_int,
    buf: Vec<u8>,
}

impl SyslogWriter {
    fn new(priority: c_int) -> Self {
        Self {
            priority,
            buf: Vec::new(),
        }
    }
}

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        if let Some(message) = record(&self.buf) {
            unsafe {
                libc::syslog(self.priority, b"%s\0".as_ptr().cast(), message.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_follow_levels() {
        assert_eq!(priority(&Level::ERROR), libc::LOG_ERR);
        assert_eq!(priority(&Level::WARN), libc::LOG_WARNING);
        assert_eq!(priority(&Level::INFO), libc::LOG_NOTICE);
        assert_eq!(priority(&Level::TRACE), libc::LOG_DEBUG);
    }

    #[test]
    fn test_record_strips_newline() {
        let message = record(b" INFO modswap: monitoring apps\n").unwrap();
        assert_eq!(message.to_str().unwrap(), " INFO modswap: monitoring apps");
    }

    #[test]
    fn test_record_drops_nul_and_blank() {
        assert_eq!(record(b"a\0b\n").unwrap().to_str().unwrap(), "ab");
        assert!(record(b"\n").is_none());
        assert!(record(b"").is_none());
    }

    #[test]
    fn test_default_writer_priority() {
        let writer = Syslog.make_writer();
        assert_eq!(writer.priority, libc::LOG_NOTICE);
        assert!(writer.buf.is_empty());
    }

    #[test]
    fn test_writer_buffers_until_drop() {
        use std::io::Write;

        let mut writer = SyslogWriter::new(libc::LOG_DEBUG);
        write!(writer, "reconciled ").unwrap();
        writeln!(writer, "event taps").unwrap();

        assert_eq!(writer.buf, b"reconciled event taps\n");
    }
}
