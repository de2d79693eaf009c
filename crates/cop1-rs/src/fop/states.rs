/// States of the FOP-1 state machine (CCSDS 232.1-B, Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FopState {
    /// S1: the sequence-controlled service is running nominally.
    Active,
    /// S2: frames are marked for retransmission and FARM-1 can accept them.
    RetransmitWithoutWait,
    /// S3: frames are marked for retransmission but FARM-1 reported Wait.
    RetransmitWithWait,
    /// S4: initialising, waiting for a clean CLCW; no BC frame outstanding.
    InitialisingWithoutBc,
    /// S5: initialising with an Unlock or Set V(R) BC frame outstanding.
    InitialisingWithBc,
    /// S6: the service is not operating; only directives are accepted.
    #[default]
    Initial,
}

impl FopState {
    /// The standard's state number, S1..=S6.
    pub fn number(self) -> u8 {
        match self {
            FopState::Active => 1,
            FopState::RetransmitWithoutWait => 2,
            FopState::RetransmitWithWait => 3,
            FopState::InitialisingWithoutBc => 4,
            FopState::InitialisingWithBc => 5,
            FopState::Initial => 6,
        }
    }

    /// Maps a non-zero suspend state value back to the state the service
    /// suspended from. S5 cannot be suspended, so values are 1..=4.
    pub fn from_suspend_state(ss: u8) -> Option<FopState> {
        match ss {
            1 => Some(FopState::Active),
            2 => Some(FopState::RetransmitWithoutWait),
            3 => Some(FopState::RetransmitWithWait),
            4 => Some(FopState::InitialisingWithoutBc),
            _ => None,
        }
    }
}
