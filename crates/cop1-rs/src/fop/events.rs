use crate::clcw::Clcw;
use crate::config::TimeoutType;
use crate::fop::directives::FopDirective;
use crate::types::{seq_in_window, FrameType, SequenceNumber};

/// The closed FOP-1 event alphabet.
///
/// Numbering follows CCSDS 232.1-B, Section 5.4: E1..E14 classify CLCW
/// arrivals, E16..E18 the timer, E19..E22 transfer requests, E23..E39
/// directives, E41..E46 lower-layer responses. E101..E104 are the additional
/// discriminations for a transmission limit of one and for suspension on
/// timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FopEvent {
    /// CLCW: all acknowledged, clean flags, nothing newly acknowledged.
    E1,
    /// CLCW: all acknowledged, clean flags, N(R) advanced past NN(R).
    E2,
    /// CLCW: all acknowledged but Wait is set (contradiction).
    E3,
    /// CLCW: all acknowledged but Retransmit still set.
    E4,
    /// CLCW: frames outstanding, clean flags, no progress.
    E5,
    /// CLCW: frames outstanding, clean flags, N(R) advanced.
    E6,
    /// CLCW: frames outstanding, Wait set without Retransmit (contradiction).
    E7,
    /// CLCW: retransmission requested, N(R) advanced, no Wait (limit > 1).
    E8,
    /// CLCW: retransmission requested, N(R) advanced, Wait set (limit > 1).
    E9,
    /// CLCW: retransmission requested, no progress, limit not reached, no Wait.
    E10,
    /// CLCW: retransmission requested, no progress, limit not reached, Wait set.
    E11,
    /// CLCW: retransmission requested, no progress, limit reached, no Wait.
    E12,
    /// CLCW: N(R) outside the window bounded by NN(R) and V(S).
    E13,
    /// CLCW: Lockout reported.
    E14,
    /// Timer expired, transmissions remain, timeout type 0.
    E16,
    /// Timer expired, limit reached, timeout type 0.
    E17,
    /// Timer expired, limit reached, timeout type 1.
    E18,
    /// Request to transmit an AD frame, wait queue empty.
    E19,
    /// Request to transmit an AD frame, wait queue occupied.
    E20,
    /// Request to transmit a BD frame, none outstanding.
    E21,
    /// Request to transmit a BD frame while one is outstanding.
    E22,
    /// Directive: Initiate AD service (without CLCW check).
    E23,
    /// Directive: Initiate AD service (with CLCW check).
    E24,
    /// Directive: Initiate AD service with Unlock, BC channel free.
    E25,
    /// Directive: Initiate AD service with Unlock, BC frame outstanding.
    E26,
    /// Directive: Initiate AD service with Set V(R), BC channel free.
    E27,
    /// Directive: Initiate AD service with Set V(R), BC frame outstanding.
    E28,
    /// Directive: Terminate AD service.
    E29,
    /// Directive: Resume while not suspended.
    E30,
    /// Directive: Resume a service suspended from S1.
    E31,
    /// Directive: Resume a service suspended from S2.
    E32,
    /// Directive: Resume a service suspended from S3.
    E33,
    /// Directive: Resume a service suspended from S4.
    E34,
    /// Directive: Set V(S).
    E35,
    /// Directive: Set FOP sliding window.
    E36,
    /// Directive: Set T1 initial value.
    E37,
    /// Directive: Set transmission limit.
    E38,
    /// Directive: Set timeout type.
    E39,
    /// Lower layer accepted an AD frame.
    E41,
    /// Lower layer rejected an AD frame.
    E42,
    /// Lower layer accepted a BC frame.
    E43,
    /// Lower layer rejected a BC frame.
    E44,
    /// Lower layer accepted a BD frame.
    E45,
    /// Lower layer rejected a BD frame.
    E46,
    /// CLCW: retransmission requested with a limit of one, N(R) advanced.
    E101,
    /// CLCW: retransmission requested with a limit of one, no progress.
    E102,
    /// CLCW: retransmission requested, no progress, limit reached, Wait set.
    E103,
    /// Timer expired, transmissions remain, timeout type 1.
    E104,
}

/// Classifies an accepted CLCW against the engine scalars.
///
/// The decision tree follows CCSDS 232.1-B, Section 5.4: lockout first, then
/// the all-acknowledged branches, then the in-window branches discriminated
/// by the retransmit/wait flags and the transmission limit, and finally the
/// invalid-N(R) case.
pub(crate) fn classify_clcw(
    clcw: &Clcw,
    v_s: SequenceNumber,
    nn_r: SequenceNumber,
    transmission_count: u32,
    transmission_limit: u32,
) -> FopEvent {
    let n_r = clcw.report_value;

    if clcw.lockout {
        return FopEvent::E14;
    }

    if n_r == v_s {
        // Everything transmitted has been acknowledged.
        return if clcw.retransmit {
            FopEvent::E4
        } else if clcw.wait {
            FopEvent::E3
        } else if n_r == nn_r {
            FopEvent::E1
        } else {
            FopEvent::E2
        };
    }

    if seq_in_window(n_r, nn_r, v_s) {
        // A prefix of the outstanding frames has been acknowledged.
        if !clcw.retransmit {
            return if clcw.wait {
                FopEvent::E7
            } else if n_r == nn_r {
                FopEvent::E5
            } else {
                FopEvent::E6
            };
        }
        if transmission_limit == 1 {
            // Retransmission is never allowed with a limit of one.
            return if n_r != nn_r {
                FopEvent::E101
            } else {
                FopEvent::E102
            };
        }
        return if n_r != nn_r {
            if clcw.wait { FopEvent::E9 } else { FopEvent::E8 }
        } else if transmission_count < transmission_limit {
            if clcw.wait { FopEvent::E11 } else { FopEvent::E10 }
        } else if clcw.wait {
            FopEvent::E103
        } else {
            FopEvent::E12
        };
    }

    FopEvent::E13
}

/// Classifies a timer expiry.
pub(crate) fn classify_timer(
    transmission_count: u32,
    transmission_limit: u32,
    timeout_type: TimeoutType,
) -> FopEvent {
    if transmission_count < transmission_limit {
        match timeout_type {
            TimeoutType::Alert => FopEvent::E16,
            TimeoutType::Suspend => FopEvent::E104,
        }
    } else {
        match timeout_type {
            TimeoutType::Alert => FopEvent::E17,
            TimeoutType::Suspend => FopEvent::E18,
        }
    }
}

/// Classifies a request to transmit an AD frame.
pub(crate) fn classify_ad_request(wait_queue_occupied: bool) -> FopEvent {
    if wait_queue_occupied {
        FopEvent::E20
    } else {
        FopEvent::E19
    }
}

/// Classifies a request to transmit a BD frame.
pub(crate) fn classify_bd_request(bd_out_ready: bool) -> FopEvent {
    if bd_out_ready {
        FopEvent::E21
    } else {
        FopEvent::E22
    }
}

/// Classifies a lower-layer accept/reject response.
pub(crate) fn classify_lower_layer(frame_type: FrameType, accepted: bool) -> FopEvent {
    match (frame_type, accepted) {
        (FrameType::Ad, true) => FopEvent::E41,
        (FrameType::Ad, false) => FopEvent::E42,
        (FrameType::Bc, true) => FopEvent::E43,
        (FrameType::Bc, false) => FopEvent::E44,
        (FrameType::Bd, true) => FopEvent::E45,
        (FrameType::Bd, false) => FopEvent::E46,
    }
}

/// Classifies a directive against the BC channel state and the suspend state.
pub(crate) fn classify_directive(
    directive: &FopDirective,
    bc_out_ready: bool,
    suspend_state: u8,
) -> FopEvent {
    match directive {
        FopDirective::InitAdWithoutClcw => FopEvent::E23,
        FopDirective::InitAdWithClcw => FopEvent::E24,
        FopDirective::InitAdWithUnlock => {
            if bc_out_ready {
                FopEvent::E25
            } else {
                FopEvent::E26
            }
        }
        FopDirective::InitAdWithSetVr(_) => {
            if bc_out_ready {
                FopEvent::E27
            } else {
                FopEvent::E28
            }
        }
        FopDirective::Terminate => FopEvent::E29,
        FopDirective::Resume => match suspend_state {
            1 => FopEvent::E31,
            2 => FopEvent::E32,
            3 => FopEvent::E33,
            4 => FopEvent::E34,
            _ => FopEvent::E30,
        },
        FopDirective::SetVs(_) => FopEvent::E35,
        FopDirective::SetFopSlidingWindow(_) => FopEvent::E36,
        FopDirective::SetT1Initial(_) => FopEvent::E37,
        FopDirective::SetTransmissionLimit(_) => FopEvent::E38,
        FopDirective::SetTimeoutType(_) => FopEvent::E39,
    }
}
