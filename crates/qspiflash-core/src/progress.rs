//! Progress reporting for long flash operations

/// Phase of a flash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Erasing sectors; units are sectors
    Erase,
    /// Programming pages; units are bytes
    Program,
    /// Reading back and comparing; units are bytes
    Verify,
    /// Reading flash contents out; units are bytes
    Read,
}

impl Phase {
    /// Human-readable name of the phase
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Erase => "Erasing",
            Self::Program => "Programming",
            Self::Verify => "Verifying",
            Self::Read => "Reading",
        }
    }
}

/// Progress callback trait
///
/// The upgrade orchestrator calls `start` once per phase, `advance` with the
/// running total of completed units, and `finish` when the phase ends.
pub trait UpgradeProgress {
    /// A phase begins with `total` units of work
    fn start(&mut self, phase: Phase, total: usize);

    /// `done` units of the current phase are complete
    fn advance(&mut self, done: usize);

    /// The current phase finished successfully
    fn finish(&mut self, phase: Phase);
}

/// A no-op progress reporter
pub struct NoProgress;

impl UpgradeProgress for NoProgress {
    fn start(&mut self, _phase: Phase, _total: usize) {}
    fn advance(&mut self, _done: usize) {}
    fn finish(&mut self, _phase: Phase) {}
}
