//! Log capture for tests asserting on emitted events.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing::Level;

/// Buffer filled by the subscriber installed in [`capture_logs`].
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route every event on the current thread into a buffer until the guard
/// drops. Use with the default current-thread `#[tokio::test]` runtime.
pub(crate) fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let buf = Arc::clone(&capture.0);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || CaptureWriter(Arc::clone(&buf)))
        .with_ansi(false)
        .with_max_level(Level::TRACE)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
