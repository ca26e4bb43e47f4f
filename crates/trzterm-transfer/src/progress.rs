//! Progress callback contract.
//!
//! The session reports; rendering is somebody else's business.

/// Receives transfer progress in order, one call per event.
pub trait ProgressSink: Send {
    /// Number of entries in this transfer.
    fn on_count(&mut self, count: usize);

    /// Entry now being transferred.
    fn on_name(&mut self, name: &str);

    /// Size of the current file in bytes.
    fn on_size(&mut self, size: u64);

    /// Bytes of the current file done so far.
    fn on_step(&mut self, step: u64);

    /// Transfer finished or aborted; hide whatever is shown.
    fn on_done(&mut self);

    /// Width of the remote terminal, when it announced one.
    fn on_width_hint(&mut self, _columns: u32) {}
}

/// Creates a fresh sink for each session.
pub trait ProgressFactory: Send + Sync {
    fn create(&self) -> Box<dyn ProgressSink>;
}

/// Optional sink held by a session; silent when the transfer is quiet.
pub(crate) struct Progress {
    sink: Option<Box<dyn ProgressSink>>,
    done: bool,
}

impl Progress {
    pub(crate) fn silent() -> Self {
        Self {
            sink: None,
            done: false,
        }
    }

    pub(crate) fn attach(&mut self, sink: Box<dyn ProgressSink>) {
        self.sink = Some(sink);
    }

    pub(crate) fn count(&mut self, count: usize) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_count(count);
        }
    }

    pub(crate) fn name(&mut self, name: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_name(name);
        }
    }

    pub(crate) fn size(&mut self, size: u64) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_size(size);
        }
    }

    pub(crate) fn step(&mut self, step: u64) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_step(step);
        }
    }

    pub(crate) fn width_hint(&mut self, columns: u32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_width_hint(columns);
        }
    }

    /// Idempotent; the sink sees `on_done` at most once.
    pub(crate) fn done(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Some(sink) = self.sink.as_mut() {
            sink.on_done();
        }
    }
}
