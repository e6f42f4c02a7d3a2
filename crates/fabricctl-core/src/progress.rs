// Progress callback for long-running pipeline stages.

/// Receives stage changes and periodic ticks from the pipeline.
///
/// Called inline from the pipeline's own task; implementations must not
/// block. `()` discards everything.
pub trait ProgressSink: Send {
    fn stage(&mut self, _name: &str) {}

    fn tick(&mut self, _message: &str) {}

    fn finish(&mut self) {}
}

impl ProgressSink for () {}
