//! Single-flight operation queue.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::{QueueError, QueueResult},
    traits::OperationHandler,
};

enum Message<Op> {
    Op(Op),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default, Clone, Copy)]
struct QueueStatus {
    /// Enqueued, not yet taken by the consumer.
    pending: usize,
    /// Consumer is inside validate/dispatch.
    dispatching: bool,
}

/// FIFO of operations drained by one consumer task, one operation at a time.
///
/// `enqueue()` never blocks: the operation is pushed onto an unbounded channel
/// and the consumer picks it up once the previous operation has been fully
/// dispatched. Operations enqueued from inside `dispatch` (re-entrant
/// requests) are therefore processed on a later cycle, never inline.
///
/// The handle is cheap to clone. The consumer stops when the cancellation
/// token fires or every handle has been dropped.
pub struct OperationQueue<Op> {
    tx: mpsc::UnboundedSender<Message<Op>>,
    status: Arc<Mutex<QueueStatus>>,
}

impl<Op: Send + 'static> OperationQueue<Op> {
    /// Spawn the consumer task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<H>(handler: H, cancel: &CancellationToken) -> Self
    where
        H: OperationHandler<Op = Op>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(QueueStatus::default()));

        let consumer = Consumer {
            handler,
            rx,
            status: Arc::clone(&status),
        };
        tokio::spawn(consumer.run(cancel.clone()));

        Self { tx, status }
    }

    /// Append `op` to the queue.
    pub fn enqueue(&self, op: Op) -> QueueResult<()> {
        self.status.lock().pending += 1;
        if self.tx.send(Message::Op(op)).is_err() {
            let mut status = self.status.lock();
            status.pending = status.pending.saturating_sub(1);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Resolve once every operation enqueued before this call has been
    /// dispatched or rejected.
    pub async fn flush(&self) -> QueueResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Flush(done_tx))
            .map_err(|_| QueueError::Closed)?;
        done_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Flush repeatedly until no operation is pending.
    ///
    /// Operations enqueued by the handler while dispatching land behind the
    /// first flush barrier; this waits for those too.
    pub async fn settle(&self) -> QueueResult<()> {
        loop {
            self.flush().await?;
            if self.pending() == 0 {
                return Ok(());
            }
        }
    }
}

impl<Op> OperationQueue<Op> {
    /// Number of operations waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.status.lock().pending
    }

    /// Whether the consumer is currently validating or dispatching.
    pub fn is_dispatching(&self) -> bool {
        self.status.lock().dispatching
    }

    /// Whether the consumer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<Op> Clone for OperationQueue<Op> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            status: Arc::clone(&self.status),
        }
    }
}

impl<Op> fmt::Debug for OperationQueue<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = *self.status.lock();
        f.debug_struct("OperationQueue")
            .field("pending", &status.pending)
            .field("dispatching", &status.dispatching)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

struct Consumer<H: OperationHandler> {
    handler: H,
    rx: mpsc::UnboundedReceiver<Message<H::Op>>,
    status: Arc<Mutex<QueueStatus>>,
}

impl<H: OperationHandler> Consumer<H> {
    async fn run(mut self, cancel: CancellationToken) {
        debug!("operation queue started");

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("operation queue cancelled");
                    break;
                }
                message = self.rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                Message::Op(op) => self.drain_one(op),
                Message::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        debug!("operation queue stopped");
    }

    /// One drain cycle: validate, then dispatch or report.
    fn drain_one(&mut self, op: H::Op) {
        {
            let mut status = self.status.lock();
            status.pending = status.pending.saturating_sub(1);
            status.dispatching = true;
        }

        match self.handler.validate(&op) {
            Ok(()) => {
                trace!("dispatching operation");
                if let Err(error) = self.handler.dispatch(op) {
                    debug!(%error, "operation dispatch failed");
                    self.handler.report(error);
                }
            }
            Err(error) => {
                debug!(%error, "operation rejected");
                self.handler.report(error);
            }
        }

        self.status.lock().dispatching = false;
    }
}
