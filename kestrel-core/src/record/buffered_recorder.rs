use super::{Record, Recorder};

/// Keeps every written record in memory together with its step index.
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    buf: Vec<(usize, Record)>,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<(usize, Record)> {
        self.buf.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Scalar values of `key` with their step indices, in writing order.
    pub fn scalars(&self, key: &str) -> Vec<(usize, f32)> {
        self.buf
            .iter()
            .filter_map(|(step, r)| r.get_scalar(key).ok().map(|v| (*step, v)))
            .collect()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, step: usize, record: Record) {
        self.buf.push((step, record));
    }
}
