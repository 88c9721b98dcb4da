//! Non-blocking request handles.
//!
//! Every fetch runs off the UI thread and hands its result back through an
//! `mpsc` channel; components keep the receiver and poll it once per frame.
//! Nothing is cancelled: a dropped `Pending` simply discards its answer.

use std::sync::mpsc;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::fetch::{FetchError, FetchResult, Transport};

/// Callback fired from the fetch thread once a response has been queued.
pub type WakeHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// One background thread per request.
    Thread,
    /// Run the request on the caller's thread; the answer is ready on the
    /// next poll. Used by tests.
    Inline,
}

/// Issues requests against a shared transport.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    dispatch: Dispatch,
    wake: Option<WakeHook>,
}

impl Fetcher {
    pub fn threaded(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            dispatch: Dispatch::Thread,
            wake: None,
        }
    }

    pub fn inline(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            dispatch: Dispatch::Inline,
            wake: None,
        }
    }

    /// Call `hook` whenever a background response lands (e.g. to request a repaint).
    pub fn with_wake(mut self, hook: WakeHook) -> Self {
        self.wake = Some(hook);
        self
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Start fetching `url` as text.
    pub fn text(&self, url: &str) -> Pending<String> {
        self.request(url, |result| Ok(result.body))
    }

    /// Start fetching `url` and decode the body as JSON.
    pub fn json<T>(&self, url: &str) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request(url, |result| {
            serde_json::from_str(&result.body)
                .map_err(|e| FetchError::new(format!("Invalid JSON: {}", e)))
        })
    }

    fn request<T, F>(&self, url: &str, decode: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(FetchResult) -> Result<T, FetchError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        let url_owned = url.to_string();
        let wake = self.wake.clone();

        let job = move || {
            let result = transport.get(&url_owned).and_then(decode);
            if let Err(ref e) = result {
                log::debug!("fetch {} failed: {}", url_owned, e);
            }
            let _ = tx.send(result);
            if let Some(wake) = wake {
                wake();
            }
        };

        match self.dispatch {
            Dispatch::Thread => {
                std::thread::spawn(job);
            }
            Dispatch::Inline => job(),
        }

        Pending {
            url: url.to_string(),
            rx,
        }
    }
}

/// Outcome of polling a [`Pending`] handle.
#[derive(Debug)]
pub enum Poll<T> {
    Waiting,
    Ready(Result<T, FetchError>),
}

/// An in-flight request.
pub struct Pending<T> {
    url: String,
    rx: mpsc::Receiver<Result<T, FetchError>>,
}

impl<T> Pending<T> {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Non-blocking check for the response. A worker that vanished without
    /// answering counts as a failure.
    pub fn poll(&self) -> Poll<T> {
        match self.rx.try_recv() {
            Ok(result) => Poll::Ready(result),
            Err(mpsc::TryRecvError::Empty) => Poll::Waiting,
            Err(mpsc::TryRecvError::Disconnected) => {
                Poll::Ready(Err(FetchError::new(format!("fetch worker for {} vanished", self.url))))
            }
        }
    }
}

/// A pending request tagged with the epoch of the slot that issued it.
///
/// Components bump a slot's epoch on every new request and drop answers whose
/// tag no longer matches, so a slow response can't overwrite a newer one.
pub struct Fenced<T> {
    pub slot: String,
    pub epoch: u64,
    pub pending: Pending<T>,
}

/// Drain the finished entries of `in_flight`, keeping the waiting ones.
pub fn drain_ready<T>(in_flight: &mut Vec<Fenced<T>>) -> Vec<(String, u64, Result<T, FetchError>)> {
    let mut ready = Vec::new();
    let mut waiting = Vec::new();
    for fenced in in_flight.drain(..) {
        match fenced.pending.poll() {
            Poll::Waiting => waiting.push(fenced),
            Poll::Ready(result) => ready.push((fenced.slot, fenced.epoch, result)),
        }
    }
    *in_flight = waiting;
    ready
}
