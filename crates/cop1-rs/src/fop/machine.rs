use crate::clcw::{Clcw, CopInEffect};
use crate::config::{FopConfig, TimeoutType};
use crate::fop::directives::{DirectiveTag, FopDirective};
use crate::fop::events::{
    classify_ad_request, classify_bd_request, classify_clcw, classify_directive,
    classify_lower_layer, classify_timer, FopEvent,
};
use crate::fop::queues::{SentQueue, WaitQueue};
use crate::fop::states::FopState;
use crate::fop::{AlertCode, FopOutput, TransferStatus};
use crate::frame::TcTransferFrame;
use crate::hal::Cop1Error;
use crate::types::{seq_increment, FrameType, SequenceNumber, VcId};
use alloc::vec::Vec;
use core::time::Duration;
use log::{debug, error, info, trace, warn};

/// The FOP-1 engine for one TC virtual channel.
///
/// The machine owns the protocol scalars, the wait and sent queues and the
/// current state. It is driven by one `handle_*` call per stimulus class;
/// each call classifies the stimulus into the event alphabet, runs the
/// transition for `(state, event)` per CCSDS 232.1-B Table 5-1, and returns
/// the externally visible effects in order. The machine performs no I/O and
/// keeps no clock; timer arming and frame forwarding are delegated to the
/// caller through the returned [`FopOutput`] list.
///
/// All methods take `&mut self`: the caller serializes stimuli. A transition
/// runs to completion before the next stimulus is classified, so no stimulus
/// ever observes a half-updated state.
#[derive(Debug)]
pub struct FopMachine {
    vc_id: VcId,
    state: FopState,
    /// V(S): N(S) expected in the next first-transmission AD frame.
    v_s: SequenceNumber,
    /// NN(R): N(S) of the oldest unacknowledged AD frame, or V(S) when the
    /// sent queue holds none.
    nn_r: SequenceNumber,
    /// Transmissions of the frame at the head of the sent queue.
    transmission_count: u32,
    transmission_limit: u32,
    t1_initial: Duration,
    timeout_type: TimeoutType,
    sliding_window: u8,
    /// 0 while not suspended; otherwise the number of the state to restore.
    suspend_state: u8,
    /// True iff no transmit request of the given type is outstanding with
    /// the lower layer.
    ad_out_ready: bool,
    bc_out_ready: bool,
    bd_out_ready: bool,
    sent_queue: SentQueue,
    wait_queue: WaitQueue,
    /// The Initiate directive whose completion is still pending (S4/S5).
    pending_directive: Option<(DirectiveTag, FopDirective)>,
}

impl FopMachine {
    /// Creates a machine in the Initial state with unconfigured parameters.
    /// An Initiate directive is rejected until the SET_* directives (or
    /// [`FopMachine::with_config`]) have established legal values.
    pub fn new(vc_id: VcId) -> Self {
        Self {
            vc_id,
            state: FopState::Initial,
            v_s: 0,
            nn_r: 0,
            transmission_count: 0,
            transmission_limit: 0,
            t1_initial: Duration::ZERO,
            timeout_type: TimeoutType::Alert,
            sliding_window: 0,
            suspend_state: 0,
            // No transmit request is outstanding with the lower layer yet.
            ad_out_ready: true,
            bc_out_ready: true,
            bd_out_ready: true,
            sent_queue: SentQueue::new(),
            wait_queue: WaitQueue::default(),
            pending_directive: None,
        }
    }

    /// Creates a machine with validated managed parameters applied.
    pub fn with_config(vc_id: VcId, config: FopConfig) -> Result<Self, Cop1Error> {
        config.validate()?;
        let mut machine = Self::new(vc_id);
        machine.t1_initial = config.t1_initial;
        machine.transmission_limit = config.transmission_limit;
        machine.timeout_type = config.timeout_type;
        machine.sliding_window = config.sliding_window;
        Ok(machine)
    }

    pub fn vc_id(&self) -> VcId {
        self.vc_id
    }

    pub fn state(&self) -> FopState {
        self.state
    }

    pub fn suspend_state(&self) -> u8 {
        self.suspend_state
    }

    /// V(S): the sequence number the next fresh AD transmission must carry.
    pub fn next_sequence(&self) -> SequenceNumber {
        self.v_s
    }

    /// NN(R): the oldest sequence number still awaiting acknowledgement.
    pub fn expected_acknowledgement(&self) -> SequenceNumber {
        self.nn_r
    }

    pub fn transmission_count(&self) -> u32 {
        self.transmission_count
    }

    /// Number of AD frames on the sent queue.
    pub fn outstanding_frames(&self) -> usize {
        self.sent_queue.ad_count()
    }

    pub fn is_wait_queue_occupied(&self) -> bool {
        self.wait_queue.is_occupied()
    }

    // --- Stimulus entry points -------------------------------------------

    /// Processes a request from the framer to transmit an AD or BD frame.
    ///
    /// BC frames are generated by the machine itself through directive
    /// processing; offering one here is a caller error reported
    /// synchronously.
    pub fn handle_transfer_request(
        &mut self,
        frame: TcTransferFrame,
    ) -> Result<Vec<FopOutput>, Cop1Error> {
        let mut out = Vec::new();
        match frame.frame_type {
            FrameType::Bc => return Err(Cop1Error::UnsupportedFrameType),
            FrameType::Ad => {
                let event = classify_ad_request(self.wait_queue.is_occupied());
                trace!(
                    "[VC{}] AD transfer request N(S)={} -> {:?}",
                    self.vc_id.value(),
                    frame.sequence_number,
                    event
                );
                let next = match (self.state, event) {
                    // The wait queue takes the frame; look_for_frame moves it
                    // on when the window and the lower layer allow.
                    (FopState::Active | FopState::RetransmitWithoutWait, FopEvent::E19) => {
                        self.wait_queue.place(frame);
                        self.look_for_frame(&mut out);
                        self.state
                    }
                    // With FARM-1 in Wait, the frame is parked but nothing
                    // new is offered to the lower layer.
                    (FopState::RetransmitWithWait, FopEvent::E19) => {
                        self.wait_queue.place(frame);
                        self.state
                    }
                    // AD transfer is not available while initialising or in
                    // the Initial state.
                    (_, FopEvent::E19) => {
                        out.push(FopOutput::Transfer(TransferStatus::Reject, frame));
                        self.state
                    }
                    // E20: the single wait-queue slot is already taken.
                    (_, _) => {
                        out.push(FopOutput::Transfer(TransferStatus::Reject, frame));
                        self.state
                    }
                };
                self.enter(next, &mut out);
            }
            FrameType::Bd => {
                let event = classify_bd_request(self.bd_out_ready);
                trace!("[VC{}] BD transfer request -> {:?}", self.vc_id.value(), event);
                match event {
                    // BD frames bypass the sequence-controlled service and
                    // may be sent in any state, one at a time.
                    FopEvent::E21 => {
                        self.bd_out_ready = false;
                        out.push(FopOutput::Transfer(TransferStatus::Accept, frame.clone()));
                        out.push(FopOutput::Forward(frame));
                    }
                    _ => {
                        out.push(FopOutput::Transfer(TransferStatus::Reject, frame));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Accepts a BC frame built by the framer in response to a dispatched
    /// Unlock or Set V(R) control command.
    pub fn handle_bc_generated(&mut self, frame: TcTransferFrame) -> Vec<FopOutput> {
        let mut out = Vec::new();
        if frame.frame_type != FrameType::Bc {
            warn!(
                "[VC{}] framer returned a non-BC frame on the BC path; dropping",
                self.vc_id.value()
            );
            return out;
        }
        if self.state == FopState::InitialisingWithBc && !self.sent_queue.has_bc() {
            self.transmit_bc(frame, &mut out);
        } else {
            // A Set V(R) dispatched by the SET_V_S directive records the
            // value upstream without a BC transmission.
            trace!(
                "[VC{}] no BC transmission pending in S{}; dropping generated frame",
                self.vc_id.value(),
                self.state.number()
            );
        }
        out
    }

    /// Processes a CLCW already filtered for COP-in-effect and virtual
    /// channel.
    pub fn handle_clcw(&mut self, clcw: &Clcw) -> Vec<FopOutput> {
        let mut out = Vec::new();
        if clcw.cop_in_effect != CopInEffect::Cop1 || clcw.vc_id != self.vc_id {
            trace!(
                "[VC{}] CLCW for another channel or COP discarded",
                self.vc_id.value()
            );
            return out;
        }
        // S6 consumes no receiver feedback: the report is noted, never acted on.
        if self.state == FopState::Initial {
            trace!(
                "[VC{}] CLCW ignored in the Initial state (N(R)={})",
                self.vc_id.value(),
                clcw.report_value
            );
            return out;
        }

        let event = classify_clcw(
            clcw,
            self.v_s,
            self.nn_r,
            self.transmission_count,
            self.transmission_limit,
        );
        let n_r = clcw.report_value;
        debug!(
            "[VC{}] CLCW N(R)={} lockout={} wait={} retransmit={} -> {:?} in S{}",
            self.vc_id.value(),
            n_r,
            clcw.lockout,
            clcw.wait,
            clcw.retransmit,
            event,
            self.state.number()
        );

        let next = match (self.state, event) {
            // E1: clean equilibrium, nothing outstanding.
            (FopState::Active, FopEvent::E1) => FopState::Active,
            // E1 while initialising: the CLCW check succeeded.
            (FopState::InitialisingWithoutBc, FopEvent::E1) => {
                out.push(FopOutput::CancelTimer);
                self.confirm_pending_directive(TransferStatus::PositiveConfirm, &mut out);
                FopState::Active
            }
            // E1 with a BC frame pending: the Unlock / Set V(R) took effect;
            // release the BC frame and complete the directive.
            (FopState::InitialisingWithBc, FopEvent::E1) => {
                self.sent_queue.take_bc();
                out.push(FopOutput::CancelTimer);
                self.confirm_pending_directive(TransferStatus::PositiveConfirm, &mut out);
                FopState::Active
            }

            // E2: the last outstanding frames were acknowledged.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E2,
            ) => {
                let acknowledged = self.remove_acknowledged(n_r);
                out.push(FopOutput::CancelTimer);
                self.push_confirms(acknowledged, &mut out);
                self.look_for_frame(&mut out);
                FopState::Active
            }

            // E3: Wait set with everything acknowledged is a contradiction.
            (_, FopEvent::E3) => {
                self.alert(AlertCode::Clcw, &mut out);
                FopState::Initial
            }

            // E4: retransmission requested although N(R) = V(S). The frames
            // FARM-1 asks for are still on the sent queue until an E2-class
            // report removes them, so they are marked and offered again.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E4,
            ) => {
                self.initiate_retransmission(&mut out);
                self.look_for_frame(&mut out);
                FopState::RetransmitWithoutWait
            }
            // While initialising nothing has been transmitted; the report is
            // adverse.
            (
                FopState::InitialisingWithoutBc | FopState::InitialisingWithBc,
                FopEvent::E4,
            ) => {
                self.alert(AlertCode::Clcw, &mut out);
                FopState::Initial
            }

            // E5: no progress, clean flags; a stale or repeated report.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E5,
            ) => self.state,

            // E6: some frames acknowledged, more still outstanding.
            (FopState::Active | FopState::RetransmitWithoutWait, FopEvent::E6) => {
                let acknowledged = self.remove_acknowledged(n_r);
                out.push(FopOutput::RestartTimer(self.t1_initial));
                self.push_confirms(acknowledged, &mut out);
                self.look_for_frame(&mut out);
                self.state
            }
            // In S3 FARM-1 is still buffering; acknowledge but offer nothing.
            (FopState::RetransmitWithWait, FopEvent::E6) => {
                let acknowledged = self.remove_acknowledged(n_r);
                out.push(FopOutput::RestartTimer(self.t1_initial));
                self.push_confirms(acknowledged, &mut out);
                self.state
            }

            // E7: Wait without Retransmit is a contradiction.
            (_, FopEvent::E7) => {
                self.alert(AlertCode::Clcw, &mut out);
                FopState::Initial
            }

            // E8: retransmission requested and N(R) advanced.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E8,
            ) => {
                let acknowledged = self.remove_acknowledged(n_r);
                self.initiate_retransmission(&mut out);
                self.push_confirms(acknowledged, &mut out);
                self.look_for_frame(&mut out);
                FopState::RetransmitWithoutWait
            }
            // E9: as E8 but FARM-1 is in Wait; no frame is offered.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E9,
            ) => {
                let acknowledged = self.remove_acknowledged(n_r);
                self.initiate_retransmission(&mut out);
                self.push_confirms(acknowledged, &mut out);
                FopState::RetransmitWithWait
            }

            // E10: retransmission requested, transmissions remain.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E10,
            ) => {
                self.initiate_retransmission(&mut out);
                self.look_for_frame(&mut out);
                FopState::RetransmitWithoutWait
            }
            // E11: as E10 under Wait.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E11,
            ) => {
                self.initiate_retransmission(&mut out);
                FopState::RetransmitWithWait
            }

            // E12/E103: the transmission limit is exhausted.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E12 | FopEvent::E103,
            ) => {
                self.alert(AlertCode::Limit, &mut out);
                FopState::Initial
            }

            // E101/E102: retransmission requested with a limit of one.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E101,
            ) => {
                let acknowledged = self.remove_acknowledged(n_r);
                self.push_confirms(acknowledged, &mut out);
                self.alert(AlertCode::Limit, &mut out);
                FopState::Initial
            }
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E102,
            ) => {
                self.alert(AlertCode::Limit, &mut out);
                FopState::Initial
            }

            // E13: N(R) outside the window.
            (
                FopState::Active | FopState::RetransmitWithoutWait | FopState::RetransmitWithWait,
                FopEvent::E13,
            ) => {
                self.alert(AlertCode::Synch, &mut out);
                FopState::Initial
            }
            // While initialising, a mismatched N(R) means the receiver is not
            // where the directive assumed it to be.
            (
                FopState::InitialisingWithoutBc | FopState::InitialisingWithBc,
                FopEvent::E13,
            ) => {
                self.alert(AlertCode::NnR, &mut out);
                FopState::Initial
            }

            // E14: Lockout reported.
            (_, FopEvent::E14) => {
                self.alert(AlertCode::Lockout, &mut out);
                FopState::Initial
            }

            // Combinations the scalars make unreachable (e.g. in-window
            // events while the sent queue is empty). Noted, never acted on.
            (state, event) => {
                warn!(
                    "[VC{}] CLCW event {:?} unexpected in S{}; ignored",
                    self.vc_id.value(),
                    event,
                    state.number()
                );
                state
            }
        };
        self.enter(next, &mut out);
        out
    }

    /// Processes an expiry of the retransmission timer. The runtime discards
    /// stale expiries (cancelled or re-armed epochs) before calling this.
    pub fn handle_timer_expired(&mut self) -> Vec<FopOutput> {
        let mut out = Vec::new();
        if self.state == FopState::Initial {
            warn!(
                "[VC{}] timer expiry in the Initial state; ignored",
                self.vc_id.value()
            );
            return out;
        }

        let event = classify_timer(
            self.transmission_count,
            self.transmission_limit,
            self.timeout_type,
        );
        debug!(
            "[VC{}] timer expired -> {:?} in S{} (count {}/{})",
            self.vc_id.value(),
            event,
            self.state.number(),
            self.transmission_count,
            self.transmission_limit
        );

        let next = match (self.state, event) {
            // E16: transmissions remain; retransmit the unacknowledged frames.
            (FopState::Active | FopState::RetransmitWithoutWait, FopEvent::E16) => {
                self.initiate_retransmission(&mut out);
                self.look_for_frame(&mut out);
                FopState::RetransmitWithoutWait
            }
            (FopState::RetransmitWithWait, FopEvent::E16) => {
                self.initiate_retransmission(&mut out);
                FopState::RetransmitWithWait
            }
            // No CLCW arrived within T1 while waiting for the check.
            (FopState::InitialisingWithoutBc, FopEvent::E16 | FopEvent::E17) => {
                self.alert(AlertCode::T1, &mut out);
                FopState::Initial
            }
            // E16 with a BC frame pending: retransmit the control frame.
            (FopState::InitialisingWithBc, FopEvent::E16) => {
                self.initiate_bc_retransmission(&mut out);
                self.look_for_directive(&mut out);
                FopState::InitialisingWithBc
            }
            // E17: the limit is exhausted and timeout type 0 demands an alert.
            (
                FopState::Active
                | FopState::RetransmitWithoutWait
                | FopState::RetransmitWithWait
                | FopState::InitialisingWithBc,
                FopEvent::E17,
            ) => {
                self.alert(AlertCode::T1, &mut out);
                FopState::Initial
            }
            // E18/E104: timeout type 1 suspends the service for a later
            // RESUME. The queues are retained.
            (
                FopState::Active
                | FopState::RetransmitWithoutWait
                | FopState::RetransmitWithWait
                | FopState::InitialisingWithoutBc,
                FopEvent::E18 | FopEvent::E104,
            ) => {
                self.suspend(&mut out);
                FopState::Initial
            }
            // S5 has no suspend state value; fall back to the alert.
            (FopState::InitialisingWithBc, FopEvent::E18 | FopEvent::E104) => {
                self.alert(AlertCode::T1, &mut out);
                FopState::Initial
            }
            (state, event) => {
                warn!(
                    "[VC{}] timer event {:?} unexpected in S{}; ignored",
                    self.vc_id.value(),
                    event,
                    state.number()
                );
                state
            }
        };
        self.enter(next, &mut out);
        out
    }

    /// Processes the lower layer's accept/reject response for a forwarded
    /// frame.
    pub fn handle_lower_layer(&mut self, frame: &TcTransferFrame, accepted: bool) -> Vec<FopOutput> {
        let mut out = Vec::new();
        let event = classify_lower_layer(frame.frame_type, accepted);
        trace!(
            "[VC{}] lower layer {:?} for {:?} in S{}",
            self.vc_id.value(),
            event,
            frame.frame_type,
            self.state.number()
        );

        let next = match (self.state, event) {
            // E41: the AD transmission is under way; offer the next frame.
            (FopState::Active | FopState::RetransmitWithoutWait, FopEvent::E41) => {
                self.ad_out_ready = true;
                self.look_for_frame(&mut out);
                self.state
            }
            (_, FopEvent::E41) => {
                self.ad_out_ready = true;
                self.state
            }
            // E43: the BC transmission is under way.
            (FopState::InitialisingWithBc, FopEvent::E43) => {
                self.bc_out_ready = true;
                self.look_for_directive(&mut out);
                self.state
            }
            (_, FopEvent::E43) => {
                self.bc_out_ready = true;
                self.state
            }
            (_, FopEvent::E45) => {
                self.bd_out_ready = true;
                self.state
            }
            // Rejections: the interface contract with the lower layer is
            // broken; abandon the service.
            (FopState::Initial, FopEvent::E42 | FopEvent::E44 | FopEvent::E46) => {
                self.restore_out_ready(frame.frame_type);
                warn!(
                    "[VC{}] lower-layer rejection in the Initial state; ignored",
                    self.vc_id.value()
                );
                self.state
            }
            (_, FopEvent::E42 | FopEvent::E44 | FopEvent::E46) => {
                self.restore_out_ready(frame.frame_type);
                self.alert(AlertCode::Llif, &mut out);
                FopState::Initial
            }
            (state, event) => {
                warn!(
                    "[VC{}] lower-layer event {:?} unexpected in S{}; ignored",
                    self.vc_id.value(),
                    event,
                    state.number()
                );
                state
            }
        };
        self.enter(next, &mut out);
        out
    }

    /// Processes a directive from the higher procedures.
    pub fn handle_directive(&mut self, tag: DirectiveTag, directive: FopDirective) -> Vec<FopOutput> {
        let mut out = Vec::new();

        // Qualifier range checks are independent of the state table.
        let qualifier_error = match directive {
            FopDirective::SetFopSlidingWindow(0) => true,
            FopDirective::SetTransmissionLimit(0) => true,
            FopDirective::SetT1Initial(d) if d.is_zero() => true,
            _ => false,
        };
        if qualifier_error {
            warn!(
                "[VC{}] directive {:?} rejected: qualifier out of range",
                self.vc_id.value(),
                directive
            );
            out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
            return out;
        }

        let event = classify_directive(&directive, self.bc_out_ready, self.suspend_state);
        debug!(
            "[VC{}] directive {:?} -> {:?} in S{}",
            self.vc_id.value(),
            directive,
            event,
            self.state.number()
        );

        let next = match (self.state, event) {
            // E23: Initiate without CLCW check starts the service at once.
            (FopState::Initial, FopEvent::E23) => {
                self.initialise(&mut out);
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                FopState::Active
            }
            // E24: Initiate with CLCW check waits in S4 for a clean report.
            (FopState::Initial, FopEvent::E24) => {
                self.initialise(&mut out);
                self.pending_directive = Some((tag, directive));
                out.push(FopOutput::RestartTimer(self.t1_initial));
                out.push(FopOutput::Directive(TransferStatus::Accept, tag, directive));
                FopState::InitialisingWithoutBc
            }
            // E25: Initiate with Unlock; the framer builds the BC frame.
            (FopState::Initial, FopEvent::E25) => {
                self.initialise(&mut out);
                self.pending_directive = Some((tag, directive));
                out.push(FopOutput::Directive(TransferStatus::Accept, tag, directive));
                out.push(FopOutput::DispatchUnlock);
                FopState::InitialisingWithBc
            }
            // E27: Initiate with Set V(R); V(S) and NN(R) adopt the value.
            (FopState::Initial, FopEvent::E27) => {
                self.initialise(&mut out);
                if let FopDirective::InitAdWithSetVr(vr) = directive {
                    self.v_s = vr;
                    self.nn_r = vr;
                    self.pending_directive = Some((tag, directive));
                    out.push(FopOutput::Directive(TransferStatus::Accept, tag, directive));
                    out.push(FopOutput::DispatchSetVr(vr));
                }
                FopState::InitialisingWithBc
            }
            // E26/E28: a BC frame is still outstanding.
            (_, FopEvent::E26 | FopEvent::E28) => {
                out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
                self.state
            }
            // Initiate directives outside the Initial state.
            (_, FopEvent::E23 | FopEvent::E24 | FopEvent::E25 | FopEvent::E27) => {
                out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
                self.state
            }

            // E29: Terminate from any state. The alert purges whatever the
            // service still holds, including a suspended session's queues.
            (state, FopEvent::E29) => {
                if state != FopState::Initial
                    || self.suspend_state != 0
                    || !self.sent_queue.is_empty()
                    || self.wait_queue.is_occupied()
                {
                    self.alert(AlertCode::Term, &mut out);
                }
                self.suspend_state = 0;
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                FopState::Initial
            }

            // E31..E34: Resume to the state the service suspended from.
            (FopState::Initial, FopEvent::E31) => {
                self.resume(&mut out, tag, directive);
                FopState::Active
            }
            (FopState::Initial, FopEvent::E32) => {
                self.resume(&mut out, tag, directive);
                FopState::RetransmitWithoutWait
            }
            (FopState::Initial, FopEvent::E33) => {
                self.resume(&mut out, tag, directive);
                FopState::RetransmitWithWait
            }
            (FopState::Initial, FopEvent::E34) => {
                self.resume(&mut out, tag, directive);
                FopState::InitialisingWithoutBc
            }
            // E30: Resume with nothing suspended.
            (_, FopEvent::E30 | FopEvent::E31 | FopEvent::E32 | FopEvent::E33 | FopEvent::E34) => {
                out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
                self.state
            }

            // E35: Set V(S); only legal while the service is not operating
            // and not suspended (queued frames pin the sequence numbers).
            (FopState::Initial, FopEvent::E35) if self.suspend_state == 0 => {
                if let FopDirective::SetVs(value) = directive {
                    self.v_s = value;
                    self.nn_r = value;
                    out.push(FopOutput::DispatchSetVr(value));
                }
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                FopState::Initial
            }
            (_, FopEvent::E35) => {
                out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
                self.state
            }

            // E36..E39: parameter updates, legal in every state.
            (state, FopEvent::E36) => {
                if let FopDirective::SetFopSlidingWindow(window) = directive {
                    self.sliding_window = window;
                }
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                state
            }
            (state, FopEvent::E37) => {
                if let FopDirective::SetT1Initial(value) = directive {
                    // Takes effect at the next timer restart.
                    self.t1_initial = value;
                }
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                state
            }
            (state, FopEvent::E38) => {
                if let FopDirective::SetTransmissionLimit(limit) = directive {
                    self.transmission_limit = limit;
                }
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                state
            }
            (state, FopEvent::E39) => {
                if let FopDirective::SetTimeoutType(timeout_type) = directive {
                    self.timeout_type = timeout_type;
                }
                out.push(FopOutput::Directive(
                    TransferStatus::PositiveConfirm,
                    tag,
                    directive,
                ));
                state
            }

            (state, event) => {
                warn!(
                    "[VC{}] directive event {:?} unexpected in S{}; rejected",
                    self.vc_id.value(),
                    event,
                    state.number()
                );
                out.push(FopOutput::Directive(TransferStatus::Reject, tag, directive));
                state
            }
        };
        self.enter(next, &mut out);
        out
    }

    /// Orderly-shutdown purge: rejects the waiting frame, negatively confirms
    /// everything outstanding and returns the machine to the Initial state.
    pub fn purge_for_shutdown(&mut self) -> Vec<FopOutput> {
        let mut out = Vec::new();
        out.push(FopOutput::CancelTimer);
        self.purge_sent_queue(&mut out);
        self.purge_wait_queue(&mut out);
        self.confirm_pending_directive(TransferStatus::NegativeConfirm, &mut out);
        self.suspend_state = 0;
        self.enter(FopState::Initial, &mut out);
        out
    }

    // --- Elementary actions ----------------------------------------------

    /// Installs `next`, notifying observers when the state actually changes.
    fn enter(&mut self, next: FopState, out: &mut Vec<FopOutput>) {
        if next != self.state {
            info!(
                "[VC{}] FOP-1 state S{} -> S{}",
                self.vc_id.value(),
                self.state.number(),
                next.number()
            );
            out.push(FopOutput::StateChange(self.state, next));
            self.state = next;
        }
    }

    /// The Initialise action: purge both queues, reset the sequence scalars
    /// and the transmission count, clear the out-ready flags to "nothing
    /// outstanding" and cancel the timer.
    fn initialise(&mut self, out: &mut Vec<FopOutput>) {
        out.push(FopOutput::CancelTimer);
        self.purge_sent_queue(out);
        self.purge_wait_queue(out);
        self.v_s = 0;
        self.nn_r = 0;
        self.transmission_count = 0;
        self.suspend_state = 0;
        self.ad_out_ready = true;
        self.bc_out_ready = true;
        self.bd_out_ready = true;
    }

    /// Negatively confirms and drops every frame on the sent queue.
    fn purge_sent_queue(&mut self, out: &mut Vec<FopOutput>) {
        for frame in self.sent_queue.drain_all() {
            out.push(FopOutput::Transfer(TransferStatus::NegativeConfirm, frame));
        }
        self.nn_r = self.v_s;
    }

    /// Rejects and drops the frame parked on the wait queue, if any.
    fn purge_wait_queue(&mut self, out: &mut Vec<FopOutput>) {
        if let Some(frame) = self.wait_queue.take() {
            out.push(FopOutput::Transfer(TransferStatus::Reject, frame));
        }
    }

    /// Emits the terminal notification for the pending Initiate directive.
    fn confirm_pending_directive(&mut self, status: TransferStatus, out: &mut Vec<FopOutput>) {
        if let Some((tag, directive)) = self.pending_directive.take() {
            out.push(FopOutput::Directive(status, tag, directive));
        }
    }

    fn push_confirms(&mut self, acknowledged: Vec<TcTransferFrame>, out: &mut Vec<FopOutput>) {
        for frame in acknowledged {
            out.push(FopOutput::Transfer(TransferStatus::PositiveConfirm, frame));
        }
    }

    /// Removes the acknowledged prefix of the sent queue and adopts `n_r` as
    /// the new NN(R). Returns the acknowledged frames for confirmation.
    fn remove_acknowledged(&mut self, n_r: SequenceNumber) -> Vec<TcTransferFrame> {
        let acknowledged = self.sent_queue.remove_acknowledged(n_r);
        self.nn_r = n_r;
        acknowledged
    }

    /// The Transmit-Type-AD action for a frame leaving the wait queue.
    fn transmit_fresh_ad(&mut self, frame: TcTransferFrame, out: &mut Vec<FopOutput>) {
        let was_empty = self.sent_queue.is_empty();
        if was_empty {
            self.transmission_count = 1;
            // Re-anchor NN(R) on the framer's N(S) stream: the invariant is
            // that NN(R) equals the head frame's sequence number.
            self.nn_r = frame.sequence_number;
        } else {
            debug_assert_eq!(
                frame.sequence_number, self.v_s,
                "framer must stamp contiguous N(S) values"
            );
        }
        self.v_s = seq_increment(frame.sequence_number);
        self.sent_queue.push(frame.clone());
        self.ad_out_ready = false;
        out.push(FopOutput::RestartTimer(self.t1_initial));
        out.push(FopOutput::Transfer(TransferStatus::Accept, frame.clone()));
        out.push(FopOutput::Forward(frame));
    }

    /// The Transmit-Type-BC action for a framer-generated control frame.
    fn transmit_bc(&mut self, frame: TcTransferFrame, out: &mut Vec<FopOutput>) {
        self.transmission_count = 1;
        self.sent_queue.push(frame.clone());
        self.bc_out_ready = false;
        out.push(FopOutput::RestartTimer(self.t1_initial));
        out.push(FopOutput::Forward(frame));
    }

    /// The Initiate-Retransmission action: bump the transmission count,
    /// restart the timer and mark every sent-queue entry.
    fn initiate_retransmission(&mut self, out: &mut Vec<FopOutput>) {
        self.transmission_count = self.transmission_count.saturating_add(1);
        let marked = self.sent_queue.mark_all_for_retransmission();
        debug!(
            "[VC{}] retransmission initiated: {} frame(s) marked, transmission {} of {}",
            self.vc_id.value(),
            marked,
            self.transmission_count,
            self.transmission_limit
        );
        out.push(FopOutput::RestartTimer(self.t1_initial));
    }

    fn initiate_bc_retransmission(&mut self, out: &mut Vec<FopOutput>) {
        self.transmission_count = self.transmission_count.saturating_add(1);
        self.sent_queue.mark_all_for_retransmission();
        out.push(FopOutput::RestartTimer(self.t1_initial));
        debug!(
            "[VC{}] BC retransmission initiated, transmission {} of {}",
            self.vc_id.value(),
            self.transmission_count,
            self.transmission_limit
        );
    }

    /// The Look-for-FDU action.
    ///
    /// At most one frame is in flight to the lower layer at a time. Marked
    /// retransmissions take precedence over the wait queue; a waiting frame
    /// moves to the sent queue only while the sliding window has room.
    fn look_for_frame(&mut self, out: &mut Vec<FopOutput>) {
        if !self.ad_out_ready {
            return;
        }
        if let Some(frame) = self.sent_queue.next_ad_retransmission() {
            self.ad_out_ready = false;
            out.push(FopOutput::Forward(frame));
            return;
        }
        if self.sent_queue.ad_count() < usize::from(self.sliding_window)
            && self.wait_queue.is_occupied()
        {
            if let Some(frame) = self.wait_queue.take() {
                self.transmit_fresh_ad(frame, out);
            }
        }
    }

    /// The Look-for-Directive action: re-offers the pending BC frame.
    fn look_for_directive(&mut self, out: &mut Vec<FopOutput>) {
        if !self.bc_out_ready {
            return;
        }
        if let Some(frame) = self.sent_queue.next_bc_retransmission() {
            self.bc_out_ready = false;
            out.push(FopOutput::Forward(frame));
        }
    }

    /// The Alert action: cancel the timer, notify the code, then empty both
    /// queues with negative confirmations and fail the pending directive.
    fn alert(&mut self, code: AlertCode, out: &mut Vec<FopOutput>) {
        error!(
            "[VC{}] alert {:?} in S{}; abandoning the AD service",
            self.vc_id.value(),
            code,
            self.state.number()
        );
        out.push(FopOutput::CancelTimer);
        out.push(FopOutput::Alert(code));
        self.purge_sent_queue(out);
        self.purge_wait_queue(out);
        self.confirm_pending_directive(TransferStatus::NegativeConfirm, out);
    }

    /// The Suspend action: remember the state to restore and stop the timer.
    /// The queues are deliberately retained for RESUME.
    fn suspend(&mut self, out: &mut Vec<FopOutput>) {
        self.suspend_state = self.state.number();
        info!(
            "[VC{}] AD service suspended from S{}",
            self.vc_id.value(),
            self.suspend_state
        );
        out.push(FopOutput::CancelTimer);
    }

    /// The Resume action: clear the suspend state and restart the timer.
    fn resume(&mut self, out: &mut Vec<FopOutput>, tag: DirectiveTag, directive: FopDirective) {
        info!(
            "[VC{}] AD service resumed to S{}",
            self.vc_id.value(),
            self.suspend_state
        );
        self.suspend_state = 0;
        out.push(FopOutput::RestartTimer(self.t1_initial));
        out.push(FopOutput::Directive(
            TransferStatus::PositiveConfirm,
            tag,
            directive,
        ));
    }

    fn restore_out_ready(&mut self, frame_type: FrameType) {
        match frame_type {
            FrameType::Ad => self.ad_out_ready = true,
            FrameType::Bc => self.bc_out_ready = true,
            FrameType::Bd => self.bd_out_ready = true,
        }
    }
}
