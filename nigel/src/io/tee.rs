//! Fan-out writer for streamed assistant output.

use std::io::{self, Write};

use tracing::warn;

/// Writes to a primary sink and a best-effort log sink.
///
/// Errors from the primary sink propagate. Errors from the log sink are
/// logged at `warn` and dropped so a broken transcript never stops a run.
pub struct Tee<P, L> {
    primary: P,
    log: L,
}

impl<P: Write, L: Write> Tee<P, L> {
    pub fn new(primary: P, log: L) -> Self {
        Self { primary, log }
    }

    pub fn parts_mut(&mut self) -> (&mut P, &mut L) {
        (&mut self.primary, &mut self.log)
    }

    /// Write `text` to both sinks and flush them.
    pub fn emit(&mut self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes())?;
        self.flush()
    }
}

impl<P: Write, L: Write> Write for Tee<P, L> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.primary.write(buf)?;
        if let Err(e) = self.log.write_all(&buf[..n]) {
            warn!(err = %e, "failed to write log sink");
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Err(e) = self.log.flush() {
            warn!(err = %e, "failed to flush log sink");
        }
        self.primary.flush()
    }
}
