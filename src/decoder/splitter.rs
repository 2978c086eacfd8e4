//! Pooled background worker for de-interleaving multi-channel slices.
//!
//! One worker thread is shared by every decoder that needs channel splitting.
//! The pool is reference-counted: the thread starts on the first `acquire`
//! and is joined when the last guard drops. Communication is message passing
//! only; the worker never shares mutable memory with its callers.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use tracing::{debug, warn};

struct SplitRequest {
    // Shared with the requester so a lost reply can be split inline.
    interleaved: Arc<Vec<f32>>,
    channels: usize,
    reply: Sender<Vec<Vec<f32>>>,
}

struct SplitterWorker {
    sender: Sender<SplitRequest>,
    handle: Option<JoinHandle<()>>,
}

impl SplitterWorker {
    fn spawn() -> Self {
        let (sender, receiver) = channel::<SplitRequest>();
        let handle = std::thread::Builder::new()
            .name("channel-splitter".to_string())
            .spawn(move || worker_loop(receiver))
            .ok();
        if handle.is_none() {
            warn!("channel splitter thread failed to start; splitting inline");
        }
        Self { sender, handle }
    }
}

fn worker_loop(receiver: Receiver<SplitRequest>) {
    while let Ok(request) = receiver.recv() {
        let planes = deinterleave(&request.interleaved, request.channels);
        // The requester may have given up waiting; a dead reply channel is fine.
        let _ = request.reply.send(planes);
    }
    debug!("channel splitter worker stopped");
}

fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

struct PoolState {
    users: usize,
    worker: Option<SplitterWorker>,
}

fn pool() -> &'static Mutex<PoolState> {
    static POOL: OnceLock<Mutex<PoolState>> = OnceLock::new();
    POOL.get_or_init(|| {
        Mutex::new(PoolState {
            users: 0,
            worker: None,
        })
    })
}

/// Borrowed handle on the shared splitter worker.
///
/// Dropping the guard releases the reference; the worker is torn down when the
/// last guard drops.
pub struct SplitterGuard(());

/// Take a reference on the shared splitter, starting the worker if needed.
pub fn acquire_splitter() -> SplitterGuard {
    let mut state = pool().lock().expect("splitter pool lock");
    state.users += 1;
    if state.worker.is_none() {
        debug!("starting channel splitter worker");
        state.worker = Some(SplitterWorker::spawn());
    }
    SplitterGuard(())
}

impl SplitterGuard {
    /// De-interleave one slice on the worker thread.
    ///
    /// Falls back to splitting inline if the worker is unavailable, so decode
    /// progress never depends on the pool's health.
    pub fn split(&self, interleaved: Vec<f32>, channels: usize) -> Vec<Vec<f32>> {
        let sender = {
            let state = pool().lock().expect("splitter pool lock");
            state.worker.as_ref().map(|worker| worker.sender.clone())
        };
        let interleaved = Arc::new(interleaved);
        if let Some(sender) = sender {
            let (reply_tx, reply_rx) = channel();
            let request = SplitRequest {
                interleaved: Arc::clone(&interleaved),
                channels,
                reply: reply_tx,
            };
            match sender.send(request) {
                Ok(()) => {
                    if let Ok(planes) = reply_rx.recv() {
                        return planes;
                    }
                    warn!("splitter worker dropped a request; splitting inline");
                    return deinterleave(&interleaved, channels);
                }
                Err(err) => {
                    let request = err.0;
                    return deinterleave(&request.interleaved, request.channels);
                }
            }
        }
        deinterleave(&interleaved, channels)
    }
}

impl Drop for SplitterGuard {
    fn drop(&mut self) {
        let mut state = pool().lock().expect("splitter pool lock");
        state.users = state.users.saturating_sub(1);
        if state.users == 0 {
            if let Some(worker) = state.worker.take() {
                // Dropping the sender ends the worker loop; join off-lock is
                // unnecessary since the loop exits without further work.
                drop(worker.sender);
                if let Some(handle) = worker.handle {
                    let _ = handle.join();
                }
                debug!("channel splitter worker released");
            }
        }
    }
}

/// Current pool user count, exposed for teardown tests.
#[cfg(test)]
pub(crate) fn active_users() -> usize {
    pool().lock().expect("splitter pool lock").users
}
