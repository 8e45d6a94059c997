use super::{Record, Recorder};

/// A recorder that ignores any record.
///
/// Used when no statistics backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder {}

impl NullRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self {}
    }
}

impl Recorder for NullRecorder {
    /// Discard the given record.
    fn write(&mut self, _step: usize, _record: Record) {}
}
