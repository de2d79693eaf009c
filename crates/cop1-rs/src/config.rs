use crate::hal::Cop1Error;
use core::convert::TryFrom;
use core::time::Duration;

/// Selects the action taken when the timer expires (CCSDS 232.1-B, Section 6.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimeoutType {
    /// Timeout type 0: raise an alert when the transmission limit is reached.
    #[default]
    Alert = 0,
    /// Timeout type 1: suspend the service so it can be resumed later.
    Suspend = 1,
}

impl TryFrom<u8> for TimeoutType {
    type Error = Cop1Error;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Alert),
            1 => Ok(Self::Suspend),
            _ => Err(Cop1Error::InvalidEnumValue),
        }
    }
}

/// Managed parameters of one FOP-1 instance.
///
/// Every field is also mutable at runtime through the corresponding SET_*
/// directive; this struct only provides the values the engine starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FopConfig {
    /// Initial value of the retransmission timer (T1).
    pub t1_initial: Duration,
    /// Maximum number of transmissions of the frame at the head of the sent
    /// queue before the limit action is taken. Must be at least 1.
    pub transmission_limit: u32,
    pub timeout_type: TimeoutType,
    /// FOP sliding window width (K), 1..=255: bound on the number of
    /// unacknowledged Type-AD frames in flight.
    pub sliding_window: u8,
}

impl Default for FopConfig {
    fn default() -> Self {
        Self {
            t1_initial: Duration::from_secs(10),
            transmission_limit: 1,
            timeout_type: TimeoutType::Alert,
            sliding_window: 1,
        }
    }
}

impl FopConfig {
    /// Checks the parameter ranges required by the standard.
    pub fn validate(&self) -> Result<(), Cop1Error> {
        if self.transmission_limit == 0 {
            return Err(Cop1Error::ValidationError(
                "transmission limit must be at least 1",
            ));
        }
        if self.sliding_window == 0 {
            return Err(Cop1Error::ValidationError(
                "FOP sliding window must be in 1..=255",
            ));
        }
        if self.t1_initial.is_zero() {
            return Err(Cop1Error::ValidationError(
                "T1 initial value must be non-zero",
            ));
        }
        Ok(())
    }
}
