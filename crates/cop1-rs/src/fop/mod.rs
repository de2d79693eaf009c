pub mod directives;
pub mod events;
pub mod machine;
pub mod queues;
pub mod states;

pub use directives::{DirectiveTag, FopDirective};
pub use events::FopEvent;
pub use machine::FopMachine;
pub use states::FopState;

use crate::frame::TcTransferFrame;
use crate::types::SequenceNumber;
use core::time::Duration;

/// Observer-visible disposition of a transfer request or directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The request was taken on for processing.
    Accept,
    /// The request was refused and will not be processed.
    Reject,
    /// The request completed: the AD frame was acknowledged, or the directive
    /// took effect.
    PositiveConfirm,
    /// The request was abandoned before completion.
    NegativeConfirm,
}

/// Reasons for which FOP-1 abandons the service and returns to the Initial
/// state (CCSDS 232.1-B, Section 6.1.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCode {
    /// The CLCW reported an N(R) outside the expected window.
    Synch,
    /// The CLCW carried a contradictory flag combination.
    Clcw,
    /// The transmission limit for the head of the sent queue was reached.
    Limit,
    /// The receiving end reported the Lockout state.
    Lockout,
    /// The report value did not match V(S) while initialising.
    NnR,
    /// The lower layer rejected a frame it was expected to accept.
    Llif,
    /// The higher procedures terminated the service.
    Term,
    /// The timer expired with no retransmission allowance left.
    T1,
}

/// One effect produced by an engine transition.
///
/// The machine mutates its own scalars and queues in place and returns the
/// externally visible effects as an ordered list; the runtime performs them
/// in order (timer control, then notifications, then emissions, per
/// transition tie-break rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FopOutput {
    /// Hand a frame to the lower-layer shim.
    Forward(TcTransferFrame),
    /// Ask the framer to build the Type-BC Unlock frame.
    DispatchUnlock,
    /// Ask the framer to record `vr` and build the Type-BC Set V(R) frame.
    DispatchSetVr(SequenceNumber),
    /// (Re)arm the one-shot retransmission timer to the given duration.
    RestartTimer(Duration),
    /// Disarm the retransmission timer.
    CancelTimer,
    /// Notify observers of a transfer request disposition.
    Transfer(TransferStatus, TcTransferFrame),
    /// Notify observers of a directive disposition.
    Directive(TransferStatus, DirectiveTag, FopDirective),
    /// Notify observers of a protocol alert.
    Alert(AlertCode),
    /// Notify observers of a state transition.
    StateChange(FopState, FopState),
}
