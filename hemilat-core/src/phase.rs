/// Sub-states of the response window.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseStage {
    /// Target visible and shrinking.
    ActiveShrink,
    /// Target hidden; a key press still counts as a late hit.
    Grace,
}

/// Lifecycle of a single trial. Keys are polled in `Delay` and
/// `ResponseWindow`; probes only play during `Delay`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrialPhase {
    Delay,
    ExtraWait,
    ResponseWindow(ResponseStage),
    Finalize,
    Done,
}
