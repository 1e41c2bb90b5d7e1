use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::transport::pool::BufferPool;
use crate::transport::protocol::{
    Action, Frame, QUERY, QueryReq, QueryResp, STMT_INIT, Status, StmtInitReq, StmtInitResp,
    response_req_id,
};
use crate::transport::result_set::ResultSet;
use crate::transport::stmt::Stmt;
use crate::{Error, Result};

type Waiter = oneshot::Sender<Result<Frame>>;

struct Shared {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Mutex<HashMap<u64, Waiter>>,
    next_req_id: AtomicU64,
    closed: AtomicBool,
    buffers: BufferPool,
}

impl Shared {
    fn dispatch(&self, frame: Frame) {
        let Some(req_id) = response_req_id(&frame) else {
            warn!("dropping response without request id");
            return;
        };
        let waiter = self.pending.lock().remove(&req_id);
        match waiter {
            Some(tx) => {
                // receiver may have been dropped by a cancelled caller
                let _ = tx.send(Ok(frame));
            }
            None => debug!(req_id, "no pending call for response"),
        }
    }

    fn shutdown(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Waiter> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !drained.is_empty() {
            debug!(pending = drained.len(), reason, "failing pending calls");
        }
        for tx in drained {
            let _ = tx.send(Err(Error::Connection(reason.to_string())));
        }
    }
}

// Removes the correlation entry if the caller leaves before it was fulfilled.
struct PendingGuard<'a> {
    shared: &'a Shared,
    req_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.req_id);
    }
}

/// Request/response client over one message connection.
///
/// Any number of calls may be in flight at once; responses are routed back to
/// their caller by request id, in whatever order the server sends them.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl Connection {
    /// Wraps an already established connection split into its outbound sink
    /// and inbound stream. Spawns the writer and reader tasks, so it must be
    /// called inside a tokio runtime.
    pub fn from_parts<Si, St, E>(sink: Si, stream: St, config: ClientConfig) -> Self
    where
        Si: Sink<Frame> + Send + Unpin + 'static,
        Si::Error: fmt::Display,
        St: Stream<Item = core::result::Result<Frame, E>> + Send + Unpin + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            outbound: tx,
            pending: Mutex::new(HashMap::new()),
            next_req_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            buffers: BufferPool::new(&config),
        });
        tokio::spawn(write_loop(rx, sink, Arc::downgrade(&shared)));
        tokio::spawn(read_loop(stream, Arc::downgrade(&shared)));
        Self { shared }
    }

    pub fn next_req_id(&self) -> u64 {
        self.shared.next_req_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.shared.buffers
    }

    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        let req_id = self.next_req_id();
        let resp: QueryResp = self.call_json(QUERY, req_id, &QueryReq { req_id, sql }).await?;
        ResultSet::from_response(self.clone(), resp)
    }

    pub async fn stmt_init(&self) -> Result<Stmt> {
        let req_id = self.next_req_id();
        let resp: StmtInitResp = self
            .call_json(STMT_INIT, req_id, &StmtInitReq { req_id })
            .await?;
        Ok(Stmt::new(self.clone(), resp.stmt_id))
    }

    pub(crate) fn text_frame<A: Serialize>(&self, action: &str, args: &A) -> Result<Frame> {
        let mut buf = self.shared.buffers.checkout();
        serde_json::to_writer(&mut *buf, &Action { action, args })?;
        let text = String::from_utf8(buf.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Frame::Text(text))
    }

    /// Sends `frame` and waits for the response carrying `req_id`.
    pub(crate) async fn round_trip(&self, req_id: u64, frame: Frame) -> Result<Frame> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock();
            if self.is_closed() {
                return Err(Error::Connection("connection is closed".to_string()));
            }
            pending.insert(req_id, tx);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            req_id,
        };
        self.shared
            .outbound
            .send(frame)
            .map_err(|_| Error::Connection("connection is closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Connection("connection closed before response".to_string()))?
    }

    pub(crate) async fn call_json<A, R>(&self, action: &str, req_id: u64, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let frame = self.text_frame(action, args)?;
        let resp = self.round_trip(req_id, frame).await?;
        parse_text_response(resp)
    }

    pub(crate) async fn call_binary<A: Serialize>(
        &self,
        action: &str,
        req_id: u64,
        args: &A,
    ) -> Result<Vec<u8>> {
        let frame = self.text_frame(action, args)?;
        match self.round_trip(req_id, frame).await? {
            Frame::Binary(bytes) => Ok(bytes),
            Frame::Text(text) => {
                // a text reply to a binary request is an error report
                let status: Status = serde_json::from_str(&text)?;
                status.check()?;
                Err(Error::Other(format!(
                    "expected binary response to {action}, got text"
                )))
            }
        }
    }

    /// Queues a message for which no response is awaited.
    pub(crate) fn send_without_response(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Connection("connection is closed".to_string()));
        }
        self.shared
            .outbound
            .send(frame)
            .map_err(|_| Error::Connection("connection is closed".to_string()))
    }
}

pub(crate) fn parse_text_response<R: DeserializeOwned>(frame: Frame) -> Result<R> {
    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(_) => {
            return Err(Error::Other("expected text response, got binary".to_string()));
        }
    };
    let status: Status = serde_json::from_str(&text)?;
    status.check()?;
    Ok(serde_json::from_str(&text)?)
}

async fn write_loop<Si>(mut rx: mpsc::UnboundedReceiver<Frame>, mut sink: Si, shared: Weak<Shared>)
where
    Si: Sink<Frame> + Unpin,
    Si::Error: fmt::Display,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, "connection write failed");
            if let Some(shared) = shared.upgrade() {
                shared.shutdown(&format!("write failed: {e}"));
            }
            return;
        }
    }
    debug!("connection writer finished");
    let _ = sink.close().await;
}

async fn read_loop<St, E>(mut stream: St, shared: Weak<Shared>)
where
    St: Stream<Item = core::result::Result<Frame, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(item) = stream.next().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match item {
            Ok(frame) => shared.dispatch(frame),
            Err(e) => {
                warn!(error = %e, "connection read failed");
                shared.shutdown(&format!("read failed: {e}"));
                return;
            }
        }
    }
    debug!("connection reader finished");
    if let Some(shared) = shared.upgrade() {
        shared.shutdown("connection closed by peer");
    }
}
