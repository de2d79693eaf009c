//! End-to-end scenarios driving the threaded engine through its public
//! surface: a recording observer, a scriptable output sink and a minimal
//! framer stand in for the neighbouring layers.

use cop1_rs::{
    AlertCode, Clcw, Cop1Error, DirectiveTag, FopConfig, FopDirective, FopObserver, FopState,
    FrameSink, FrameType, FramerBackchannel, TcTransferFrame, TimeoutType, TransferStatus, VcId,
};
use cop1_rs_std::Cop1Engine;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Transfer(TransferStatus, FrameType, u8),
    Directive(TransferStatus, DirectiveTag),
    Alert(AlertCode),
    State(FopState, FopState),
}

struct ChannelObserver {
    tx: Sender<Event>,
}

impl FopObserver for ChannelObserver {
    fn transfer_notification(&self, status: TransferStatus, frame: &TcTransferFrame) {
        let _ = self.tx.send(Event::Transfer(
            status,
            frame.frame_type,
            frame.sequence_number,
        ));
    }

    fn directive_notification(
        &self,
        status: TransferStatus,
        tag: DirectiveTag,
        _directive: &FopDirective,
    ) {
        let _ = self.tx.send(Event::Directive(status, tag));
    }

    fn alert(&self, code: AlertCode) {
        let _ = self.tx.send(Event::Alert(code));
    }

    fn state_changed(&self, previous: FopState, current: FopState) {
        let _ = self.tx.send(Event::State(previous, current));
    }
}

/// Records every forwarded frame and answers with a scriptable verdict.
struct ScriptedSink {
    forwarded: Sender<TcTransferFrame>,
    accept: Arc<AtomicBool>,
}

impl FrameSink for ScriptedSink {
    fn offer(&mut self, frame: &TcTransferFrame) -> bool {
        let _ = self.forwarded.send(frame.clone());
        self.accept.load(Ordering::SeqCst)
    }
}

/// Builds BC control frames with the standard control command payloads.
struct TestFramer {
    vc_id: VcId,
}

impl FramerBackchannel for TestFramer {
    fn dispatch_unlock(&mut self) -> TcTransferFrame {
        TcTransferFrame::new_bc(self.vc_id, vec![0x00])
    }

    fn dispatch_set_vr(&mut self, vr: u8) -> TcTransferFrame {
        TcTransferFrame::new_bc(self.vc_id, vec![0x82, 0x00, vr])
    }
}

struct Harness {
    engine: Cop1Engine,
    events: Receiver<Event>,
    frames: Receiver<TcTransferFrame>,
    accept: Arc<AtomicBool>,
    vc_id: VcId,
}

fn harness(config: FopConfig) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let vc_id = VcId::try_from(1).unwrap();
    let engine = Cop1Engine::new(vc_id, config, Box::new(TestFramer { vc_id })).unwrap();

    let (event_tx, events) = unbounded();
    engine.register_observer(Arc::new(ChannelObserver { tx: event_tx }));

    let (frame_tx, frames) = unbounded();
    let accept = Arc::new(AtomicBool::new(true));
    engine
        .set_output(Box::new(ScriptedSink {
            forwarded: frame_tx,
            accept: accept.clone(),
        }))
        .unwrap();

    Harness {
        engine,
        events,
        frames,
        accept,
        vc_id,
    }
}

fn config(t1: Duration, limit: u32, timeout_type: TimeoutType, window: u8) -> FopConfig {
    FopConfig {
        t1_initial: t1,
        transmission_limit: limit,
        timeout_type,
        sliding_window: window,
    }
}

fn wait_for<F>(rx: &Receiver<Event>, description: &str, pred: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => {
                if pred(&event) {
                    return event;
                }
            }
            Err(_) => panic!("timed out waiting for {}", description),
        }
    }
}

fn wait_for_frame<F>(rx: &Receiver<TcTransferFrame>, description: &str, pred: F) -> TcTransferFrame
where
    F: Fn(&TcTransferFrame) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(frame) => {
                if pred(&frame) {
                    return frame;
                }
            }
            Err(_) => panic!("timed out waiting for {}", description),
        }
    }
}

fn ad(harness: &Harness, n_s: u8) -> TcTransferFrame {
    TcTransferFrame::new_ad(harness.vc_id, n_s, vec![0xAA, n_s])
}

#[test]
fn happy_path_single_ad_frame() {
    let h = harness(config(Duration::from_secs(1), 3, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    wait_for(&h.events, "initiate confirmation", |e| {
        matches!(e, Event::Directive(TransferStatus::PositiveConfirm, 1))
    });
    wait_for(&h.events, "transition to S1", |e| {
        matches!(e, Event::State(FopState::Initial, FopState::Active))
    });

    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for(&h.events, "frame acceptance", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Ad, 0))
    });
    let frame = wait_for_frame(&h.frames, "forwarded AD frame", |f| {
        f.frame_type == FrameType::Ad
    });
    assert_eq!(frame.sequence_number, 0);

    // FARM-1 acknowledges: N(R) = 1, clean flags.
    h.engine.clcw(&Clcw::report(h.vc_id, 1)).unwrap();
    wait_for(&h.events, "positive confirmation", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::PositiveConfirm, FrameType::Ad, 0)
        )
    });

    h.engine.abort();
}

#[test]
fn retransmission_limit_reached() {
    let h = harness(config(Duration::from_secs(5), 2, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 5)).unwrap();
    wait_for_frame(&h.frames, "first transmission", |f| f.sequence_number == 5);

    // Retransmission requested while the oldest frame is still N(S)=5.
    let mut retransmit = Clcw::report(h.vc_id, 5);
    retransmit.retransmit = true;
    h.engine.clcw(&retransmit).unwrap();
    wait_for(&h.events, "move to retransmit-without-wait", |e| {
        matches!(
            e,
            Event::State(FopState::Active, FopState::RetransmitWithoutWait)
        )
    });
    wait_for_frame(&h.frames, "retransmission", |f| f.sequence_number == 5);

    // The second request exhausts the limit of two transmissions.
    h.engine.clcw(&retransmit).unwrap();
    wait_for(&h.events, "limit alert", |e| {
        matches!(e, Event::Alert(AlertCode::Limit))
    });
    wait_for(&h.events, "negative confirmation", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::NegativeConfirm, FrameType::Ad, 5)
        )
    });
    wait_for(&h.events, "return to the Initial state", |e| {
        matches!(e, Event::State(_, FopState::Initial))
    });

    h.engine.abort();
}

#[test]
fn lockout_purges_the_service() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for_frame(&h.frames, "forwarded frame", |f| f.sequence_number == 0);

    let mut lockout = Clcw::report(h.vc_id, 0);
    lockout.lockout = true;
    h.engine.clcw(&lockout).unwrap();

    wait_for(&h.events, "lockout alert", |e| {
        matches!(e, Event::Alert(AlertCode::Lockout))
    });
    wait_for(&h.events, "negative confirmation", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::NegativeConfirm, FrameType::Ad, 0)
        )
    });

    h.engine.abort();
}

#[test]
fn wait_queue_backpressure() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 1));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();

    // First frame fills the window of one.
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for(&h.events, "acceptance of frame 0", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Ad, 0))
    });

    // Second frame parks on the wait queue, third is rejected outright.
    h.engine.transmit(ad(&h, 1)).unwrap();
    h.engine.transmit(ad(&h, 2)).unwrap();
    wait_for(&h.events, "rejection of frame 2", |e| {
        matches!(e, Event::Transfer(TransferStatus::Reject, FrameType::Ad, 2))
    });

    // Acknowledging frame 0 releases the parked frame.
    h.engine.clcw(&Clcw::report(h.vc_id, 1)).unwrap();
    wait_for(&h.events, "confirmation of frame 0", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::PositiveConfirm, FrameType::Ad, 0)
        )
    });
    wait_for(&h.events, "acceptance of frame 1", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Ad, 1))
    });
    wait_for_frame(&h.frames, "transmission of frame 1", |f| {
        f.sequence_number == 1
    });

    h.engine.abort();
}

#[test]
fn unlock_directive_initialises_the_service() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    h.engine.directive(7, FopDirective::InitAdWithUnlock).unwrap();
    wait_for(&h.events, "directive acceptance", |e| {
        matches!(e, Event::Directive(TransferStatus::Accept, 7))
    });
    wait_for(&h.events, "transition to S5", |e| {
        matches!(e, Event::State(FopState::Initial, FopState::InitialisingWithBc))
    });

    // The framer-built Unlock control frame reaches the lower layer.
    let frame = wait_for_frame(&h.frames, "BC Unlock frame", |f| {
        f.frame_type == FrameType::Bc
    });
    assert_eq!(frame.payload, vec![0x00]);

    // A clean CLCW with N(R) = V(S) = 0 completes the initialisation.
    h.engine.clcw(&Clcw::report(h.vc_id, 0)).unwrap();
    wait_for(&h.events, "directive confirmation", |e| {
        matches!(e, Event::Directive(TransferStatus::PositiveConfirm, 7))
    });
    wait_for(&h.events, "transition to S1", |e| {
        matches!(
            e,
            Event::State(FopState::InitialisingWithBc, FopState::Active)
        )
    });

    h.engine.abort();
}

#[test]
fn timeout_type_one_suspends_and_resumes() {
    let h = harness(config(
        Duration::from_millis(100),
        3,
        TimeoutType::Suspend,
        4,
    ));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for_frame(&h.frames, "forwarded frame", |f| f.sequence_number == 0);

    // T1 expires: the service suspends instead of retransmitting.
    wait_for(&h.events, "suspension", |e| {
        matches!(e, Event::State(FopState::Active, FopState::Initial))
    });

    h.engine.directive(2, FopDirective::Resume).unwrap();
    wait_for(&h.events, "resume confirmation", |e| {
        matches!(e, Event::Directive(TransferStatus::PositiveConfirm, 2))
    });
    wait_for(&h.events, "restoration to S1", |e| {
        matches!(e, Event::State(FopState::Initial, FopState::Active))
    });

    h.engine.abort();
}

#[test]
fn timer_expiry_drives_retransmission() {
    // A generous limit keeps the T1 alert out of reach on slow machines.
    let h = harness(config(Duration::from_millis(100), 100, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for_frame(&h.frames, "first transmission", |f| f.sequence_number == 0);

    // No CLCW arrives within T1: the frame goes out again.
    wait_for_frame(&h.frames, "timer-driven retransmission", |f| {
        f.sequence_number == 0
    });
    wait_for(&h.events, "move to retransmit-without-wait", |e| {
        matches!(
            e,
            Event::State(FopState::Active, FopState::RetransmitWithoutWait)
        )
    });

    // Acknowledge to stop the retransmission cycle.
    h.engine.clcw(&Clcw::report(h.vc_id, 1)).unwrap();
    wait_for(&h.events, "positive confirmation", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::PositiveConfirm, FrameType::Ad, 0)
        )
    });

    h.engine.abort();
}

#[test]
fn bd_frames_are_expedited() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    // BD transfer needs no initialisation.
    h.engine
        .transmit(TcTransferFrame::new_bd(h.vc_id, vec![0xEE]))
        .unwrap();
    wait_for(&h.events, "BD acceptance", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Bd, 0))
    });
    let frame = wait_for_frame(&h.frames, "forwarded BD frame", |f| {
        f.frame_type == FrameType::Bd
    });
    assert_eq!(frame.payload, vec![0xEE]);

    h.engine.abort();
}

#[test]
fn lower_layer_rejection_raises_llif() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));
    h.accept.store(false, Ordering::SeqCst);

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();

    wait_for(&h.events, "lower-layer interface alert", |e| {
        matches!(e, Event::Alert(AlertCode::Llif))
    });
    wait_for(&h.events, "return to the Initial state", |e| {
        matches!(e, Event::State(_, FopState::Initial))
    });

    h.engine.abort();
}

#[test]
fn abort_purges_with_notifications() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for(&h.events, "acceptance", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Ad, 0))
    });

    h.engine.abort();
    wait_for(&h.events, "negative confirmation on abort", |e| {
        matches!(
            e,
            Event::Transfer(TransferStatus::NegativeConfirm, FrameType::Ad, 0)
        )
    });

    // The engine accepts nothing after the orderly shutdown.
    assert_eq!(h.engine.transmit(ad(&h, 1)), Err(Cop1Error::EngineShutDown));
    assert_eq!(
        h.engine.directive(9, FopDirective::Terminate),
        Err(Cop1Error::EngineShutDown)
    );
}

#[test]
fn bc_frames_are_refused_at_intake() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));
    assert_eq!(
        h.engine
            .transmit(TcTransferFrame::new_bc(h.vc_id, vec![0x00])),
        Err(Cop1Error::UnsupportedFrameType)
    );
    h.engine.dispose();
}

#[test]
fn clcw_intake_filters_foreign_channels() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    h.engine.transmit(ad(&h, 0)).unwrap();
    wait_for(&h.events, "acceptance", |e| {
        matches!(e, Event::Transfer(TransferStatus::Accept, FrameType::Ad, 0))
    });

    // A report for another virtual channel must not acknowledge anything.
    let foreign = Clcw::report(VcId::try_from(9).unwrap(), 1);
    h.engine.clcw(&foreign).unwrap();

    // A report with no COP in effect is equally ignored.
    let mut no_cop = Clcw::report(h.vc_id, 1);
    no_cop.cop_in_effect = cop1_rs::CopInEffect::None;
    h.engine.clcw(&no_cop).unwrap();

    // Only the genuine report completes the transfer.
    h.engine.clcw(&Clcw::report(h.vc_id, 1)).unwrap();
    let event = wait_for(&h.events, "a confirmation", |e| {
        matches!(e, Event::Transfer(TransferStatus::PositiveConfirm, _, _))
    });
    assert_eq!(
        event,
        Event::Transfer(TransferStatus::PositiveConfirm, FrameType::Ad, 0)
    );

    h.engine.abort();
}

#[test]
fn dispose_is_idempotent() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));
    h.engine.dispose();
    h.engine.dispose();
    h.engine.abort();
}

#[test]
fn observers_can_deregister() {
    let h = harness(config(Duration::from_secs(5), 3, TimeoutType::Alert, 4));

    let (tx, rx) = unbounded();
    let id = h.engine.register_observer(Arc::new(ChannelObserver { tx }));
    assert!(h.engine.deregister_observer(id));
    assert!(!h.engine.deregister_observer(id));

    h.engine.directive(1, FopDirective::InitAdWithoutClcw).unwrap();
    // The first observer still hears the confirmation.
    wait_for(&h.events, "initiate confirmation", |e| {
        matches!(e, Event::Directive(TransferStatus::PositiveConfirm, 1))
    });
    // The deregistered one hears nothing.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    h.engine.dispose();
}
