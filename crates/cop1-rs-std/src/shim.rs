use cop1_rs::{FrameSink, TcTransferFrame};
use crossbeam_channel::Receiver;
use log::{error, trace};
use std::thread::{self, JoinHandle};

/// Tasks handled by the lower-layer worker.
pub(crate) enum ShimTask {
    /// Installs (or replaces) the output sink.
    SetOutput(Box<dyn FrameSink>),
    /// Offers a frame to the sink and reports the verdict back to the engine.
    Forward(TcTransferFrame),
    Shutdown,
}

/// Spawns the lower-layer worker.
///
/// The worker is the only place the configured sink is called from, so a
/// blocking sink stalls frame forwarding but never the engine worker: timer
/// and CLCW processing continue while a frame is in flight. `on_response`
/// posts the accept/reject verdict back as an engine stimulus.
pub(crate) fn spawn<F>(task_rx: Receiver<ShimTask>, on_response: F) -> std::io::Result<JoinHandle<()>>
where
    F: Fn(TcTransferFrame, bool) + Send + 'static,
{
    thread::Builder::new()
        .name("cop1-lower-layer".into())
        .spawn(move || {
            let mut sink: Option<Box<dyn FrameSink>> = None;
            while let Ok(task) = task_rx.recv() {
                match task {
                    ShimTask::SetOutput(new_sink) => {
                        trace!("lower-layer output sink installed");
                        sink = Some(new_sink);
                    }
                    ShimTask::Forward(frame) => {
                        let accepted = match sink.as_mut() {
                            Some(sink) => sink.offer(&frame),
                            None => {
                                error!("no output sink configured; rejecting frame");
                                false
                            }
                        };
                        trace!(
                            "lower layer {} a {:?} frame",
                            if accepted { "accepted" } else { "rejected" },
                            frame.frame_type
                        );
                        on_response(frame, accepted);
                    }
                    ShimTask::Shutdown => break,
                }
            }
        })
}
