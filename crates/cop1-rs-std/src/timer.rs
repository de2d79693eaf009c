use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use log::trace;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Control messages for the timer worker.
enum TimerCtrl {
    Arm { epoch: u64, after: Duration },
    Cancel,
    Shutdown,
}

/// A single logical one-shot timer backed by a worker blocking on a control
/// channel.
///
/// Every arming carries a monotonically increasing epoch; an expiry is
/// delivered with the epoch it was armed under, so the engine worker can
/// discard firings that raced with a cancel or a re-arm.
pub(crate) struct OneShotTimer {
    ctrl_tx: Sender<TimerCtrl>,
    epoch: u64,
}

impl OneShotTimer {
    /// Spawns the timer worker. `on_expire` is called with the arming epoch
    /// when the deadline passes without an intervening control message.
    pub fn spawn<F>(on_expire: F) -> std::io::Result<(Self, JoinHandle<()>)>
    where
        F: Fn(u64) + Send + 'static,
    {
        let (ctrl_tx, ctrl_rx) = unbounded::<TimerCtrl>();
        let handle = thread::Builder::new()
            .name("cop1-timer".into())
            .spawn(move || {
                let mut armed: Option<(u64, Instant)> = None;
                loop {
                    let message = match armed {
                        Some((epoch, deadline)) => match ctrl_rx.recv_deadline(deadline) {
                            Ok(message) => message,
                            Err(RecvTimeoutError::Timeout) => {
                                trace!("timer fired (epoch {})", epoch);
                                armed = None;
                                on_expire(epoch);
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        },
                        None => match ctrl_rx.recv() {
                            Ok(message) => message,
                            Err(_) => break,
                        },
                    };
                    match message {
                        TimerCtrl::Arm { epoch, after } => {
                            armed = Some((epoch, Instant::now() + after));
                        }
                        TimerCtrl::Cancel => armed = None,
                        TimerCtrl::Shutdown => break,
                    }
                }
            })?;
        Ok((Self { ctrl_tx, epoch: 0 }, handle))
    }

    /// (Re)arms the one-shot; any firing of a previous arming becomes stale.
    pub fn restart(&mut self, after: Duration) {
        self.epoch += 1;
        let _ = self.ctrl_tx.send(TimerCtrl::Arm {
            epoch: self.epoch,
            after,
        });
    }

    /// Disarms the one-shot. Idempotent.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        let _ = self.ctrl_tx.send(TimerCtrl::Cancel);
    }

    /// Epoch of the most recent arm/cancel; expiries carrying an older epoch
    /// are stale.
    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn shutdown(&self) {
        let _ = self.ctrl_tx.send(TimerCtrl::Shutdown);
    }
}
