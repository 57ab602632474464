//! The callback thread.
//!
//! Every completion callback of a client runs here, one at a time, in the
//! order outcomes were produced. Callers therefore never race with
//! themselves across callbacks, whichever runtime thread finished the
//! exchange.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{unbounded, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a client's callback thread. The thread exits once every
/// `Dispatcher` clone has been dropped and the queue is drained.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: Sender<Job>,
}

impl Dispatcher {
    pub(crate) fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in rx {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::warn!(target: "courier_core::dispatch", "Request callback panicked");
                }
            }
        })?;
        Ok(Self { tx })
    }

    /// Queue `job`. Returns false if the callback thread is gone.
    pub(crate) fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}
