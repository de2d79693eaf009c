use crate::fop::directives::{DirectiveTag, FopDirective};
use crate::fop::states::FopState;
use crate::fop::{AlertCode, TransferStatus};
use crate::frame::TcTransferFrame;
use crate::types::{SequenceNumber, VcIdError};
use core::fmt;

/// Defines a portable, descriptive Error type for the COP-1 stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cop1Error {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// A value in a control word is not a valid enum variant (e.g. COP in effect).
    InvalidEnumValue,
    /// A virtual channel identifier is outside 0..=63.
    InvalidVcId(u8),
    /// Type-BC frames are generated by the engine itself; offering one through
    /// the transfer-request interface is a caller error.
    UnsupportedFrameType,
    /// A configuration parameter was outside its legal range.
    ValidationError(&'static str),
    /// The engine has been aborted or disposed and accepts no further stimuli.
    EngineShutDown,
    /// Internal logic error.
    InternalError(&'static str),
}

impl fmt::Display for Cop1Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer is too short"),
            Self::InvalidEnumValue => write!(f, "Invalid enum value in control word"),
            Self::InvalidVcId(v) => write!(f, "Invalid virtual channel identifier: {}", v),
            Self::UnsupportedFrameType => {
                write!(f, "Frame type not accepted on the transfer-request interface")
            }
            Self::ValidationError(s) => write!(f, "Validation error: {}", s),
            Self::EngineShutDown => write!(f, "Engine has been shut down"),
            Self::InternalError(s) => write!(f, "Internal error: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Cop1Error {}

impl From<VcIdError> for Cop1Error {
    fn from(err: VcIdError) -> Self {
        match err {
            VcIdError::InvalidRange(val) => Cop1Error::InvalidVcId(val),
        }
    }
}

/// Downstream interface to the layer that ships frames towards the physical
/// channel.
///
/// The engine offers one frame at a time and interprets the returned flag as
/// accepted-for-transmission (`true`) or rejected (`false`). The call is made
/// from a dedicated worker and may block on I/O.
pub trait FrameSink: Send {
    fn offer(&mut self, frame: &TcTransferFrame) -> bool;
}

/// Upstream back-channel into the virtual-channel framer.
///
/// FOP-1 does not build transfer frames itself: when a directive requires a
/// Type-BC control frame, the engine asks the framer to construct it. The
/// returned frame re-enters the engine through its normal BC transmission
/// path.
pub trait FramerBackchannel: Send {
    /// Builds the Type-BC Unlock frame for this virtual channel.
    fn dispatch_unlock(&mut self) -> TcTransferFrame;

    /// Records `vr` as the receiver sequence number the next Set V(R) control
    /// command carries, and builds the Type-BC Set V(R) frame for it.
    fn dispatch_set_vr(&mut self, vr: SequenceNumber) -> TcTransferFrame;
}

/// Callback set through which the engine reports back to the higher
/// procedures.
///
/// Callbacks are invoked on the engine worker and must not block.
pub trait FopObserver {
    /// Disposition of a transfer request (AD or BD frame).
    fn transfer_notification(&self, status: TransferStatus, frame: &TcTransferFrame);

    /// Disposition of a directive.
    fn directive_notification(
        &self,
        status: TransferStatus,
        tag: DirectiveTag,
        directive: &FopDirective,
    );

    /// A protocol alert was raised; the engine has returned to the Initial state.
    fn alert(&self, code: AlertCode);

    /// The machine moved between FOP-1 states.
    fn state_changed(&self, previous: FopState, current: FopState);
}
