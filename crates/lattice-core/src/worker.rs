//! The background worker behind the execution boundary
//!
//! One dedicated OS thread owns a [`PivotWorker`] and answers envelopes in arrival
//! order. A panic while handling a message is caught, reported as a `Faulted` response,
//! and ends the worker; the boundary then runs everything in-process.

use crate::protocol::{Envelope, WorkerRequest, WorkerResponse};
use crate::session::EngineSession;
use crossbeam::channel::{self, Receiver, Sender};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, instrument};

/// Executor living on the far side of the boundary
pub trait PivotWorker: Send + 'static {
    /// Answer one request; `BuildIndexes` replaces whatever the worker held before
    fn handle(&mut self, request: WorkerRequest) -> WorkerResponse;
}

impl PivotWorker for EngineSession<()> {
    fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        EngineSession::<()>::handle(self, request)
    }
}

/// Channels and thread handle of a running worker
pub(crate) struct WorkerThread {
    pub(crate) requests: Sender<Envelope<WorkerRequest>>,
    pub(crate) responses: Receiver<Envelope<WorkerResponse>>,
    pub(crate) handle: JoinHandle<()>,
}

/// Start `worker` on its own named thread
pub(crate) fn spawn_worker<W: PivotWorker>(
    worker: W,
    name: &str,
    capacity: Option<usize>,
) -> io::Result<WorkerThread> {
    let (request_tx, request_rx) = match capacity {
        Some(bound) => channel::bounded(bound),
        None => channel::unbounded(),
    };
    let (response_tx, response_rx) = channel::unbounded();

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_worker(worker, request_rx, response_tx))?;

    Ok(WorkerThread { requests: request_tx, responses: response_rx, handle })
}

#[instrument(skip_all)]
fn run_worker<W: PivotWorker>(
    mut worker: W,
    requests: Receiver<Envelope<WorkerRequest>>,
    responses: Sender<Envelope<WorkerResponse>>,
) {
    debug!("Pivot worker started");

    for Envelope { request_id, generation, message } in requests.iter() {
        let kind = message.kind();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.handle(message)));

        let (response, fatal) = match outcome {
            Ok(response) => (response, false),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(request_id, %kind, %message, "Pivot worker panicked");
                (WorkerResponse::Faulted { message }, true)
            }
        };

        if responses.send(Envelope::new(request_id, generation, response)).is_err() || fatal {
            break;
        }
    }

    debug!("Pivot worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
