//! Per-key FIFO execution: one worker task per busy key, unrelated keys run concurrently.
//!
//! A worker is spawned on the first submit for an idle key and exits once its queue drains,
//! so keys for deleted or unknown threads do not accumulate.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

pub type DispatchJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct KeyQueue {
    sender: mpsc::UnboundedSender<DispatchJob>,
    pending: usize,
}

type QueueTable = Arc<Mutex<HashMap<String, KeyQueue>>>;

#[derive(Default)]
pub struct KeyedDispatcher {
    queues: QueueTable,
}

impl KeyedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind every unfinished job previously submitted under `key`.
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, key: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut job: DispatchJob = Box::pin(job);
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(queue) = queues.get_mut(key) {
            match queue.sender.send(job) {
                Ok(()) => {
                    queue.pending = queue.pending.saturating_add(1);
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    // Worker died mid-job (panic); replace it.
                    job = returned;
                    queues.remove(key);
                }
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel::<DispatchJob>();
        if sender.send(job).is_err() {
            return;
        }
        queues.insert(key.to_string(), KeyQueue { sender, pending: 1 });
        tokio::spawn(run_key_worker(
            Arc::clone(&self.queues),
            key.to_string(),
            receiver,
        ));
    }

    /// Number of keys with queued or running jobs.
    pub fn active_keys(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn run_key_worker(
    queues: QueueTable,
    key: String,
    mut receiver: mpsc::UnboundedReceiver<DispatchJob>,
) {
    while let Some(job) = receiver.recv().await {
        job.await;
        let mut table = queues.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = table.get_mut(&key) else {
            break;
        };
        queue.pending = queue.pending.saturating_sub(1);
        if queue.pending == 0 {
            table.remove(&key);
            break;
        }
    }
}
