use super::Record;

/// Destination of records.
///
/// Implementations must not fail or block the training loop; a record that
/// cannot be delivered is dropped.
pub trait Recorder {
    /// Writes a record at the given step index.
    fn write(&mut self, step: usize, record: Record);
}
