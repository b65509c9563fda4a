use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use exponential_backoff::Backoff;
use nimbus_wire::{framing, MessageId, Reply, Request};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::dialer::Dialer;
use crate::error::NodeClientError;

const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

type PendingReply = oneshot::Sender<Result<(Reply, Bytes), NodeClientError>>;

enum Cmd {
    Send {
        request: Request,
        payload: Bytes,
        reply_tx: PendingReply,
    },
    Cancel(MessageId),
    Close,
}

/// A long-lived, auto-reconnecting client for one storage node (spec §4.1).
///
/// Every outstanding request is tracked by [`MessageId`] in a map owned
/// exclusively by the connection actor task spawned from [`NodeClient::connect`];
/// nothing outside that task ever touches it, so no lock is needed around the
/// correlation table itself. [`NodeClient::send`] only ever talks to the actor
/// through a channel and a `oneshot` reply slot.
pub struct NodeClient {
    node_name: String,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    connected: Arc<AtomicBool>,
}

impl NodeClient {
    /// Spawns the connection actor and returns a handle immediately; the
    /// actor dials in the background and `connected()` reports `false` until
    /// the first successful handshake.
    pub fn connect<D: Dialer>(node_name: impl Into<String>, dialer: D) -> Arc<Self> {
        let node_name = node_name.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_actor(node_name.clone(), dialer, cmd_rx, connected.clone()));

        Arc::new(Self {
            node_name,
            cmd_tx,
            connected,
        })
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send one request and wait for its correlated reply, up to `deadline`.
    ///
    /// Fails immediately with [`NodeClientError::NotConnected`] if the socket
    /// is down at call time, rather than queuing behind a reconnect attempt
    /// (spec §4.1: callers are expected to fall back to handoff, not block).
    pub async fn send(
        &self,
        request: Request,
        payload: Bytes,
        deadline: Duration,
    ) -> Result<(Reply, Bytes), NodeClientError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(NodeClientError::NotConnected(self.node_name.clone()));
        }

        let message_id = request.message_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Cmd::Send {
                request,
                payload,
                reply_tx,
            })
            .map_err(|_| NodeClientError::NotConnected(self.node_name.clone()))?;

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(NodeClientError::NotConnected(self.node_name.clone())),
            Err(_elapsed) => {
                // Best-effort: ask the actor to drop the slot so a late
                // reply doesn't leak in its pending map. If the actor is
                // already gone this is a no-op.
                let _ = self.cmd_tx.send(Cmd::Cancel(message_id));
                Err(NodeClientError::Timeout {
                    node: self.node_name.clone(),
                    elapsed: deadline,
                })
            }
        }
    }

    /// Shuts the actor down, failing every in-flight request. The client is
    /// unusable afterwards; drop it.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Cmd::Close);
    }
}

async fn run_actor<D: Dialer>(
    node_name: String,
    dialer: D,
    mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    connected: Arc<AtomicBool>,
) {
    let backoff = Backoff::new(u32::MAX, DEFAULT_MIN_BACKOFF, Some(DEFAULT_MAX_BACKOFF));
    let mut attempt: u32 = 0;

    'reconnect: loop {
        let (reader, writer) = match dialer.dial().await {
            Ok(conn) => conn,
            Err(e) => {
                attempt += 1;
                let wait = backoff.next(attempt).unwrap_or(DEFAULT_MAX_BACKOFF);
                warn!(node = %node_name, error = %e, delay_ms = wait.as_millis(), "dial failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            None | Some(Cmd::Close) => return,
                            Some(Cmd::Send { reply_tx, .. }) => {
                                let _ = reply_tx.send(Err(NodeClientError::NotConnected(node_name.clone())));
                            }
                            Some(Cmd::Cancel(_)) => {}
                        }
                    }
                }
                continue 'reconnect;
            }
        };

        debug!(node = %node_name, "connected");
        attempt = 0;
        connected.store(true, Ordering::Release);

        if pump(&node_name, reader, writer, &mut cmd_rx).await.is_shutdown() {
            connected.store(false, Ordering::Release);
            return;
        }
        connected.store(false, Ordering::Release);
    }
}

enum PumpOutcome {
    Reconnect,
    Shutdown,
}

impl PumpOutcome {
    fn is_shutdown(&self) -> bool {
        matches!(self, PumpOutcome::Shutdown)
    }
}

/// Drives one live connection until it breaks or the client is closed.
async fn pump<R, W>(
    node_name: &str,
    mut reader: R,
    mut writer: W,
    cmd_rx: &mut mpsc::UnboundedReceiver<Cmd>,
) -> PumpOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut pending: HashMap<MessageId, PendingReply> = HashMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Cmd::Close) => {
                        fail_all(&mut pending, || NodeClientError::NotConnected(node_name.to_string()));
                        return PumpOutcome::Shutdown;
                    }
                    Some(Cmd::Cancel(id)) => {
                        pending.remove(&id);
                    }
                    Some(Cmd::Send { request, payload, reply_tx }) => {
                        let message_id = request.message_id();
                        if let Err(e) = framing::write_frame(&mut writer, &request, &payload).await {
                            warn!(node = %node_name, error = %e, "write failed, reconnecting");
                            let _ = reply_tx.send(Err(NodeClientError::Connection {
                                node: node_name.to_string(),
                                message: e.to_string(),
                            }));
                            fail_all(&mut pending, || NodeClientError::NotConnected(node_name.to_string()));
                            return PumpOutcome::Reconnect;
                        }
                        pending.insert(message_id, reply_tx);
                    }
                }
            }
            frame = framing::read_frame::<_, Reply>(&mut reader) => {
                match frame {
                    Ok((reply, payload)) => {
                        let message_id = reply.message_id();
                        if let Some(reply_tx) = pending.remove(&message_id) {
                            let result = match reply.result() {
                                Some(code) if !code.is_ok() => Err(NodeClientError::Remote {
                                    node: node_name.to_string(),
                                    code,
                                    message: format!("{:?}", reply),
                                }),
                                _ => Ok((reply, payload)),
                            };
                            let _ = reply_tx.send(result);
                        } else {
                            trace!(node = %node_name, ?message_id, "reply for unknown or cancelled request");
                        }
                    }
                    Err(e) => {
                        warn!(node = %node_name, error = %e, "read failed, reconnecting");
                        fail_all(&mut pending, || NodeClientError::NotConnected(node_name.to_string()));
                        return PumpOutcome::Reconnect;
                    }
                }
            }
        }
    }
}

fn fail_all(pending: &mut HashMap<MessageId, PendingReply>, err: impl Fn() -> NodeClientError) {
    for (_, reply_tx) in pending.drain() {
        let _ = reply_tx.send(Err(err()));
    }
}
