//! Output handling for `echo` and the `std.io` functions.

use std::io::Write as _;

/// Receives everything a script writes to standard output.
///
/// Implement this to capture or redirect script output; the VM is generic
/// over the writer so the choice costs nothing at runtime.
pub trait EchoWriter {
    /// Writes a fragment without a trailing newline.
    fn write_str(&mut self, s: &str);

    /// Writes a full line followed by a newline.
    fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\n");
    }
}

/// Default writer backed by process stdout.
#[derive(Debug, Default)]
pub struct StdEcho;

impl EchoWriter for StdEcho {
    fn write_str(&mut self, s: &str) {
        let mut stdout = std::io::stdout().lock();
        // A broken pipe while echoing is not a script error.
        let _ = stdout.write_all(s.as_bytes());
    }
}

/// Writer that collects output into a string, for tests and embedding.
#[derive(Debug, Default)]
pub struct CollectStringEcho {
    buffer: String,
}

impl CollectStringEcho {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns everything written so far.
    #[must_use]
    pub fn into_string(self) -> String {
        self.buffer
    }

    /// Returns the output collected so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl EchoWriter for CollectStringEcho {
    fn write_str(&mut self, s: &str) {
        self.buffer.push_str(s);
    }
}
