//! # Local Transport
//!
//! In-process dispatch: requests go into a bounded task queue drained by a fixed
//! pool of tokio worker tasks, and reports come back over a single-consumer reply
//! channel.

use super::message::{CompletionReport, WorkRequest};
use super::transport::Transport;
use crate::error::{DispatchError, DispatchResult};
use crate::worker::UnitExecutor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct LocalTransport {
    request_tx: parking_lot::Mutex<Option<mpsc::Sender<WorkRequest>>>,
    reply_rx: Mutex<mpsc::Receiver<CompletionReport>>,
    workers: usize,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl LocalTransport {
    /// Spawn `workers` tasks sharing `executor`. Must be called inside a tokio runtime.
    pub fn start(executor: Arc<dyn UnitExecutor>, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (request_tx, request_rx) = mpsc::channel::<WorkRequest>(queue_capacity.max(1));
        let (reply_tx, reply_rx) = mpsc::channel::<CompletionReport>(queue_capacity.max(workers));
        let request_rx = Arc::new(Mutex::new(request_rx));

        let handles = (0..workers)
            .map(|index| {
                let request_rx = Arc::clone(&request_rx);
                let reply_tx = reply_tx.clone();
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    Self::worker_loop(index, request_rx, reply_tx, executor).await;
                })
            })
            .collect();

        info!(workers = workers, "Local transport started");

        Self {
            request_tx: parking_lot::Mutex::new(Some(request_tx)),
            reply_rx: Mutex::new(reply_rx),
            workers,
            handles: parking_lot::Mutex::new(handles),
        }
    }

    async fn worker_loop(
        index: usize,
        request_rx: Arc<Mutex<mpsc::Receiver<WorkRequest>>>,
        reply_tx: mpsc::Sender<CompletionReport>,
        executor: Arc<dyn UnitExecutor>,
    ) {
        loop {
            // Competing consumers: whoever holds the lock takes the next request
            let next = request_rx.lock().await.recv().await;
            let Some(request) = next else {
                debug!(worker = index, "Request queue closed, local worker exiting");
                return;
            };

            debug!(
                worker = index,
                unit_id = %request.unit_id,
                range = %request.range,
                "Local worker picked up unit"
            );
            let report = executor.execute(&request).await;
            if reply_tx.send(report).await.is_err() {
                warn!(worker = index, "Reply channel closed, dropping report");
                return;
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Close the request queue and wait for workers to drain it
    pub async fn shutdown(&self) {
        self.request_tx.lock().take();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(error) = result {
                warn!(error = %error, "Local worker task ended abnormally");
            }
        }
        info!("Local transport shut down");
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send_request(&self, request: WorkRequest) -> DispatchResult<()> {
        let sender = self
            .request_tx
            .lock()
            .clone()
            .ok_or_else(|| DispatchError::transport("send_request", "local transport is shut down"))?;

        sender
            .send(request)
            .await
            .map_err(|_| DispatchError::transport("send_request", "local request queue closed"))
    }

    async fn next_reply(&self, wait: Duration) -> DispatchResult<Option<CompletionReport>> {
        let mut reply_rx = self.reply_rx.lock().await;
        match tokio::time::timeout(wait, reply_rx.recv()).await {
            Ok(Some(report)) => Ok(Some(report)),
            Ok(None) => Err(DispatchError::transport(
                "next_reply",
                "all local workers have exited",
            )),
            Err(_) => Ok(None),
        }
    }

    fn max_concurrency(&self) -> Option<usize> {
        Some(self.workers)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
