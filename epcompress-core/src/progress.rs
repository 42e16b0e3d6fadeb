//! Cooperative progress reporting and cancellation.

/// Receives progress updates from a running compressor.
///
/// Returning `false` from [`report`](Self::report) asks the compressor to
/// stop; it unwinds at the next iteration boundary without producing output.
pub trait Progress {
    /// Report completion in percent (0..=100). Return `false` to cancel.
    fn report(&mut self, percent: u8) -> bool;

    /// Report a status message. An empty message clears the status.
    fn message(&mut self, _message: &str) {}
}

/// A progress sink that ignores everything and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u8) -> bool {
        true
    }
}

impl<F> Progress for F
where
    F: FnMut(u8) -> bool,
{
    fn report(&mut self, percent: u8) -> bool {
        self(percent)
    }
}

/// Converts a step counter into deduplicated percentage reports.
pub struct ProgressTracker<'a> {
    sink: &'a mut dyn Progress,
    count: usize,
    max: usize,
    last: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    /// Create a tracker expecting `max` steps.
    pub fn new(sink: &'a mut dyn Progress, max: usize) -> Self {
        Self {
            sink,
            count: 0,
            max: max.max(1),
            last: None,
        }
    }

    /// Report a percentage directly. Only changes are forwarded.
    pub fn set_percent(&mut self, percent: usize) -> bool {
        let percent = percent.min(100) as u8;
        if self.last == Some(percent) {
            return true;
        }
        self.last = Some(percent);
        self.sink.report(percent)
    }

    /// Report the current position, then advance by one step.
    ///
    /// Returns `false` if the sink asked to cancel.
    pub fn step(&mut self) -> bool {
        let percent = self.count * 100 / self.max;
        self.count += 1;
        self.set_percent(percent)
    }

    /// Report the current position, then advance by `amount` steps.
    pub fn step_by(&mut self, amount: usize) -> bool {
        let percent = self.count * 100 / self.max;
        self.count += amount;
        self.set_percent(percent)
    }

    /// Make room for at least `amount` more steps.
    pub fn reserve(&mut self, amount: usize) {
        self.max = self.max.max(self.count + amount);
    }

    /// Steps taken so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Expected number of steps.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Re-scale the tracker: keep the displayed percentage (capped at 85)
    /// and spread the remaining range over `remaining` new steps.
    pub fn rescale(&mut self, remaining: usize) {
        let percent = (self.count * 100 / self.max).min(85);
        self.count = remaining * percent / (100 - percent);
        self.max = (self.count + remaining).max(1);
    }

    /// Forward a status message.
    pub fn message(&mut self, message: &str) {
        self.sink.message(message);
    }
}
