use crate::config::TimeoutType;
use crate::types::SequenceNumber;
use core::time::Duration;

/// Opaque identifier chosen by the higher procedures to correlate a directive
/// with its notifications.
pub type DirectiveTag = u32;

/// Directives accepted from the higher procedures (CCSDS 232.1-B, Section 5.3).
///
/// Qualifier values are carried in the variants that take one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FopDirective {
    /// Start the AD service immediately, without waiting for receiver feedback.
    InitAdWithoutClcw,
    /// Start the AD service once a clean CLCW confirms the receiver state.
    InitAdWithClcw,
    /// Start the AD service by first clearing a receiver Lockout with a BC
    /// Unlock frame.
    InitAdWithUnlock,
    /// Start the AD service by first aligning the receiver with a BC Set V(R)
    /// frame carrying the given value.
    InitAdWithSetVr(SequenceNumber),
    /// Stop the AD service and discard all queued frames.
    Terminate,
    /// Restore a suspended service to the state it suspended from.
    Resume,
    /// Set V(S) (legal only while the service is not operating).
    SetVs(SequenceNumber),
    /// Set the FOP sliding window width (1..=255).
    SetFopSlidingWindow(u8),
    /// Set the T1 timer initial value.
    SetT1Initial(Duration),
    /// Set the transmission limit (at least 1).
    SetTransmissionLimit(u32),
    /// Set the timeout type.
    SetTimeoutType(TimeoutType),
}
