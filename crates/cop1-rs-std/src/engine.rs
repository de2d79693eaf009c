use crate::shim::{self, ShimTask};
use crate::timer::OneShotTimer;
use cop1_rs::{
    Clcw, Cop1Error, CopInEffect, DirectiveTag, FopConfig, FopDirective, FopMachine, FopObserver,
    FopOutput, FrameSink, FrameType, FramerBackchannel, TcTransferFrame, VcId,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Handle returned by [`Cop1Engine::register_observer`], used to deregister.
pub type ObserverId = u64;

/// Shared, thread-safe observer handle.
pub type SharedObserver = Arc<dyn FopObserver + Send + Sync>;

/// Stimuli serialized onto the engine worker.
enum Stimulus {
    Directive {
        tag: DirectiveTag,
        directive: FopDirective,
    },
    Transmit(TcTransferFrame),
    Clcw(Clcw),
    LowerLayer {
        frame: TcTransferFrame,
        accepted: bool,
    },
    TimerExpired {
        epoch: u64,
    },
    /// Orderly shutdown: purge with notifications, then stop.
    Abort,
    /// Immediate shutdown without purge notifications.
    Shutdown,
}

/// Observer registrations with a snapshot rebuilt on every write, so
/// notification delivery never iterates a list another thread is mutating.
struct ObserverRegistry {
    inner: Mutex<ObserverInner>,
}

struct ObserverInner {
    next_id: ObserverId,
    entries: Vec<(ObserverId, SharedObserver)>,
    snapshot: Arc<[SharedObserver]>,
}

impl ObserverRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ObserverInner {
                next_id: 1,
                entries: Vec::new(),
                snapshot: Arc::from(Vec::new().into_boxed_slice()),
            }),
        }
    }

    fn register(&self, observer: SharedObserver) -> ObserverId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, observer));
        Self::rebuild(&mut inner);
        id
    }

    fn deregister(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = inner.entries.len() != before;
        if removed {
            Self::rebuild(&mut inner);
        }
        removed
    }

    fn rebuild(inner: &mut ObserverInner) {
        let observers: Vec<SharedObserver> =
            inner.entries.iter().map(|(_, o)| o.clone()).collect();
        inner.snapshot = Arc::from(observers.into_boxed_slice());
    }

    fn snapshot(&self) -> Arc<[SharedObserver]> {
        self.inner.lock().unwrap().snapshot.clone()
    }
}

struct Workers {
    engine: JoinHandle<()>,
    shim: JoinHandle<()>,
    timer: JoinHandle<()>,
}

/// The FOP-1 engine runtime for one TC virtual channel.
///
/// Two cooperating single-threaded workers carry the engine: the engine
/// worker owns the [`FopMachine`], the classifier, the queues and the timer
/// arming; the lower-layer worker owns the (possibly blocking) call into the
/// configured output sink. Every public entry point enqueues a stimulus and
/// returns immediately; observer callbacks run on the engine worker.
pub struct Cop1Engine {
    vc_id: VcId,
    stim_tx: Sender<Stimulus>,
    shim_tx: Sender<ShimTask>,
    observers: Arc<ObserverRegistry>,
    closed: Arc<AtomicBool>,
    workers: Mutex<Option<Workers>>,
}

impl Cop1Engine {
    /// Creates the engine for `vc_id` and starts its workers.
    ///
    /// The engine keeps the owning handle to the framer back-channel; the
    /// framer reaches the engine only through the non-owning stimulus
    /// entry points, so dropping the engine severs the cycle.
    pub fn new(
        vc_id: VcId,
        config: FopConfig,
        framer: Box<dyn FramerBackchannel>,
    ) -> Result<Self, Cop1Error> {
        let machine = FopMachine::with_config(vc_id, config)?;

        let (stim_tx, stim_rx) = unbounded::<Stimulus>();
        let (shim_tx, shim_rx) = unbounded::<ShimTask>();
        let observers = Arc::new(ObserverRegistry::new());

        let expiry_tx = stim_tx.clone();
        let (timer, timer_handle) = OneShotTimer::spawn(move |epoch| {
            let _ = expiry_tx.send(Stimulus::TimerExpired { epoch });
        })
        .map_err(|_| Cop1Error::InternalError("failed to spawn timer worker"))?;

        let response_tx = stim_tx.clone();
        let shim_handle = shim::spawn(shim_rx, move |frame, accepted| {
            let _ = response_tx.send(Stimulus::LowerLayer { frame, accepted });
        })
        .map_err(|_| Cop1Error::InternalError("failed to spawn lower-layer worker"))?;

        let worker_shim_tx = shim_tx.clone();
        let worker_observers = observers.clone();
        let engine_handle = thread::Builder::new()
            .name(format!("cop1-engine-vc{}", vc_id.value()))
            .spawn(move || {
                engine_worker(
                    machine,
                    stim_rx,
                    worker_shim_tx,
                    timer,
                    framer,
                    worker_observers,
                );
            })
            .map_err(|_| Cop1Error::InternalError("failed to spawn engine worker"))?;

        info!("[VC{}] COP-1 engine started", vc_id.value());

        Ok(Self {
            vc_id,
            stim_tx,
            shim_tx,
            observers,
            closed: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Some(Workers {
                engine: engine_handle,
                shim: shim_handle,
                timer: timer_handle,
            })),
        })
    }

    pub fn vc_id(&self) -> VcId {
        self.vc_id
    }

    /// Submits a directive from the higher procedures.
    pub fn directive(&self, tag: DirectiveTag, directive: FopDirective) -> Result<(), Cop1Error> {
        self.ensure_open()?;
        self.stim_tx
            .send(Stimulus::Directive { tag, directive })
            .map_err(|_| Cop1Error::EngineShutDown)
    }

    /// Submits a request to transmit an AD or BD frame.
    ///
    /// BC frames are built by the framer on the engine's request and must
    /// not be offered here; doing so is reported synchronously.
    pub fn transmit(&self, frame: TcTransferFrame) -> Result<(), Cop1Error> {
        self.ensure_open()?;
        if frame.frame_type == FrameType::Bc {
            return Err(Cop1Error::UnsupportedFrameType);
        }
        self.stim_tx
            .send(Stimulus::Transmit(frame))
            .map_err(|_| Cop1Error::EngineShutDown)
    }

    /// Upstream entry point for the virtual-channel framer. Behaves exactly
    /// as [`Cop1Engine::transmit`] for frames on this engine's channel;
    /// frames for other channels are discarded.
    pub fn transfer_frame_generated(
        &self,
        vc_id: VcId,
        frame: TcTransferFrame,
        buffered_bytes: usize,
    ) -> Result<(), Cop1Error> {
        trace!(
            "[VC{}] frame generated ({} bytes buffered upstream)",
            vc_id.value(),
            buffered_bytes
        );
        if vc_id != self.vc_id {
            warn!(
                "[VC{}] framer offered a frame for VC{}; discarded",
                self.vc_id.value(),
                vc_id.value()
            );
            return Ok(());
        }
        self.transmit(frame)
    }

    /// Submits a CLCW extracted from telemetry. Reports whose COP-in-effect
    /// is not COP-1 or whose virtual channel differs are silently discarded.
    pub fn clcw(&self, clcw: &Clcw) -> Result<(), Cop1Error> {
        self.ensure_open()?;
        if clcw.cop_in_effect != CopInEffect::Cop1 || clcw.vc_id != self.vc_id {
            trace!(
                "[VC{}] CLCW discarded by intake filter (cop={:?}, vc={})",
                self.vc_id.value(),
                clcw.cop_in_effect,
                clcw.vc_id.value()
            );
            return Ok(());
        }
        self.stim_tx
            .send(Stimulus::Clcw(*clcw))
            .map_err(|_| Cop1Error::EngineShutDown)
    }

    /// Installs the downstream output sink. Must be called before the first
    /// frame is forwarded; the channel transfer orders the write before any
    /// subsequent forward.
    pub fn set_output(&self, sink: Box<dyn FrameSink>) -> Result<(), Cop1Error> {
        self.ensure_open()?;
        self.shim_tx
            .send(ShimTask::SetOutput(sink))
            .map_err(|_| Cop1Error::EngineShutDown)
    }

    pub fn register_observer(&self, observer: SharedObserver) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn deregister_observer(&self, id: ObserverId) -> bool {
        self.observers.deregister(id)
    }

    /// Orderly shutdown: stops accepting stimuli, purges both queues with
    /// REJECT / NEGATIVE_CONFIRM notifications, cancels the timer and joins
    /// both workers.
    pub fn abort(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stim_tx.send(Stimulus::Abort);
        }
        self.join_workers();
    }

    /// Immediate shutdown without purge notifications. Idempotent.
    pub fn dispose(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stim_tx.send(Stimulus::Shutdown);
        }
        self.join_workers();
    }

    fn ensure_open(&self) -> Result<(), Cop1Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Cop1Error::EngineShutDown)
        } else {
            Ok(())
        }
    }

    fn join_workers(&self) {
        let workers = self.workers.lock().unwrap().take();
        if let Some(workers) = workers {
            if workers.engine.join().is_err() {
                error!("[VC{}] engine worker panicked", self.vc_id.value());
            }
            let _ = workers.shim.join();
            let _ = workers.timer.join();
            info!("[VC{}] COP-1 engine stopped", self.vc_id.value());
        }
    }
}

impl Drop for Cop1Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The engine worker: owns the machine and performs the effects of every
/// transition. No panic may escape a transition; effects are plain sends,
/// arithmetic and observer callbacks.
fn engine_worker(
    mut machine: FopMachine,
    stim_rx: Receiver<Stimulus>,
    shim_tx: Sender<ShimTask>,
    mut timer: OneShotTimer,
    mut framer: Box<dyn FramerBackchannel>,
    observers: Arc<ObserverRegistry>,
) {
    while let Ok(stimulus) = stim_rx.recv() {
        match stimulus {
            Stimulus::Directive { tag, directive } => {
                let outputs = machine.handle_directive(tag, directive);
                run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                );
            }
            Stimulus::Transmit(frame) => match machine.handle_transfer_request(frame) {
                Ok(outputs) => run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                ),
                // The intake filter refuses BC frames already; this guards
                // direct misuse of the machine.
                Err(err) => error!("transfer request refused: {}", err),
            },
            Stimulus::Clcw(clcw) => {
                let outputs = machine.handle_clcw(&clcw);
                run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                );
            }
            Stimulus::LowerLayer { frame, accepted } => {
                let outputs = machine.handle_lower_layer(&frame, accepted);
                run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                );
            }
            Stimulus::TimerExpired { epoch } => {
                if epoch != timer.current_epoch() {
                    trace!("stale timer expiry (epoch {}) discarded", epoch);
                    continue;
                }
                let outputs = machine.handle_timer_expired();
                run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                );
            }
            Stimulus::Abort => {
                debug!("engine worker aborting");
                let outputs = machine.purge_for_shutdown();
                run_effects(
                    &mut machine,
                    &mut timer,
                    &shim_tx,
                    framer.as_mut(),
                    &observers,
                    outputs,
                );
                break;
            }
            Stimulus::Shutdown => {
                debug!("engine worker disposing");
                break;
            }
        }
    }
    timer.shutdown();
    let _ = shim_tx.send(ShimTask::Shutdown);
}

/// Performs the effect list of one transition, in order.
///
/// Framer dispatches cascade: the BC frame the framer builds re-enters the
/// machine immediately and its own effects are appended behind the current
/// list, so the transition that requested the frame completes first.
fn run_effects(
    machine: &mut FopMachine,
    timer: &mut OneShotTimer,
    shim_tx: &Sender<ShimTask>,
    framer: &mut dyn FramerBackchannel,
    observers: &ObserverRegistry,
    outputs: Vec<FopOutput>,
) {
    let mut queue: VecDeque<FopOutput> = outputs.into();
    while let Some(output) = queue.pop_front() {
        match output {
            FopOutput::Forward(frame) => {
                let _ = shim_tx.send(ShimTask::Forward(frame));
            }
            FopOutput::DispatchUnlock => {
                let frame = framer.dispatch_unlock();
                queue.extend(machine.handle_bc_generated(frame));
            }
            FopOutput::DispatchSetVr(vr) => {
                let frame = framer.dispatch_set_vr(vr);
                queue.extend(machine.handle_bc_generated(frame));
            }
            FopOutput::RestartTimer(after) => timer.restart(after),
            FopOutput::CancelTimer => timer.cancel(),
            FopOutput::Transfer(status, frame) => {
                for observer in observers.snapshot().iter() {
                    observer.transfer_notification(status, &frame);
                }
            }
            FopOutput::Directive(status, tag, directive) => {
                for observer in observers.snapshot().iter() {
                    observer.directive_notification(status, tag, &directive);
                }
            }
            FopOutput::Alert(code) => {
                for observer in observers.snapshot().iter() {
                    observer.alert(code);
                }
            }
            FopOutput::StateChange(previous, current) => {
                for observer in observers.snapshot().iter() {
                    observer.state_changed(previous, current);
                }
            }
        }
    }
}
