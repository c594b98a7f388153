//! Message ports.
//!
//! The server only sees the [`Port`] trait: receive the next request or
//! signal, send a reply to an endpoint. [`channel`] builds an in-process
//! switchboard on tokio mpsc queues, used by the binary and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ramdiskfs_types::{Endpoint, Message, Reply};
use thiserror::Error;
use tokio::sync::mpsc;

/// Process signals the server reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    /// Anything else; ignored.
    Other(i32),
}

/// A request and the endpoint it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: Endpoint,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Request(Envelope),
    Signal(Signal),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no route to {0}")]
    NoRoute(Endpoint),

    #[error("{0} is already connected")]
    AlreadyConnected(Endpoint),

    #[error("port closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Server side of the message transport.
#[async_trait]
pub trait Port: Send {
    /// Next request or signal; `None` once every sender is gone.
    async fn receive(&mut self) -> Option<Incoming>;

    async fn send(&mut self, dest: Endpoint, reply: Reply) -> TransportResult<()>;
}

type Routes = Arc<Mutex<HashMap<Endpoint, mpsc::Sender<Reply>>>>;

/// Build a switchboard whose server inbox holds `depth` pending messages.
pub fn channel(depth: usize) -> (ServerPort, Switchboard) {
    let (tx, rx) = mpsc::channel(depth);
    let routes = Routes::default();
    let port = ServerPort {
        inbox: rx,
        routes: routes.clone(),
    };
    let board = Switchboard {
        inbox: tx,
        routes,
        depth,
    };
    (port, board)
}

/// Receiving end held by the server loop.
#[derive(Debug)]
pub struct ServerPort {
    inbox: mpsc::Receiver<Incoming>,
    routes: Routes,
}

#[async_trait]
impl Port for ServerPort {
    async fn receive(&mut self) -> Option<Incoming> {
        self.inbox.recv().await
    }

    async fn send(&mut self, dest: Endpoint, reply: Reply) -> TransportResult<()> {
        let route = self
            .routes
            .lock()
            .get(&dest)
            .cloned()
            .ok_or(TransportError::NoRoute(dest))?;
        route.send(reply).await.map_err(|_| TransportError::Closed)
    }
}

/// Handle for attaching clients and delivering signals.
#[derive(Debug, Clone)]
pub struct Switchboard {
    inbox: mpsc::Sender<Incoming>,
    routes: Routes,
    depth: usize,
}

impl Switchboard {
    /// Register `endpoint` and return its client port.
    pub fn connect(&self, endpoint: Endpoint) -> TransportResult<ClientPort> {
        let mut routes = self.routes.lock();
        if routes.get(&endpoint).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::AlreadyConnected(endpoint));
        }
        let (tx, rx) = mpsc::channel(self.depth);
        routes.insert(endpoint, tx);
        Ok(ClientPort {
            endpoint,
            outbox: self.inbox.clone(),
            replies: rx,
            routes: self.routes.clone(),
        })
    }

    pub async fn signal(&self, signal: Signal) -> TransportResult<()> {
        self.inbox
            .send(Incoming::Signal(signal))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// One client's view of the transport: send a message, await its reply.
///
/// Dropping the port removes its route.
#[derive(Debug)]
pub struct ClientPort {
    endpoint: Endpoint,
    outbox: mpsc::Sender<Incoming>,
    replies: mpsc::Receiver<Reply>,
    routes: Routes,
}

impl ClientPort {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Send `message` and wait for the server's reply.
    pub async fn call(&mut self, message: Message) -> TransportResult<Reply> {
        let envelope = Envelope {
            source: self.endpoint,
            message,
        };
        self.outbox
            .send(Incoming::Request(envelope))
            .await
            .map_err(|_| TransportError::Closed)?;
        self.replies.recv().await.ok_or(TransportError::Closed)
    }
}

impl Drop for ClientPort {
    fn drop(&mut self) {
        self.replies.close();
        let mut routes = self.routes.lock();
        // a later connect for the same endpoint owns an open route
        if routes.get(&self.endpoint).is_some_and(mpsc::Sender::is_closed) {
            routes.remove(&self.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reply_routing() {
        let (mut server, board) = channel(4);
        let mut a = board.connect(Endpoint::new(10)).unwrap();
        let mut b = board.connect(Endpoint::new(11)).unwrap();

        let serve = tokio::spawn(async move {
            for _ in 0..2 {
                let Some(Incoming::Request(env)) = server.receive().await else {
                    panic!("expected a request");
                };
                let value = u64::from(env.message.call) * 100 + env.source.get() as u64;
                server.send(env.source, Reply::ok(value)).await.unwrap();
            }
            server
        });

        let ra = a.call(Message { call: 1, body: vec![] }).await.unwrap();
        let rb = b.call(Message { call: 2, body: vec![] }).await.unwrap();
        assert_eq!(ra, Reply::ok(110));
        assert_eq!(rb, Reply::ok(211));

        let mut server = serve.await.unwrap();
        assert_eq!(
            server.send(Endpoint::new(99), Reply::ok(0)).await,
            Err(TransportError::NoRoute(Endpoint::new(99)))
        );
    }

    #[tokio::test]
    async fn test_duplicate_connect_rejected() {
        let (_server, board) = channel(1);
        let _a = board.connect(Endpoint::new(10)).unwrap();
        assert_eq!(
            board.connect(Endpoint::new(10)).unwrap_err(),
            TransportError::AlreadyConnected(Endpoint::new(10))
        );
    }

    #[tokio::test]
    async fn test_dropped_client_loses_route() {
        let (mut server, board) = channel(2);
        let a = board.connect(Endpoint::new(10)).unwrap();
        drop(a);
        assert_eq!(
            server.send(Endpoint::new(10), Reply::ok(0)).await,
            Err(TransportError::NoRoute(Endpoint::new(10)))
        );

        // reconnecting works; dropping another port leaves the route alone
        let b = board.connect(Endpoint::new(10)).unwrap();
        let c = board.connect(Endpoint::new(11)).unwrap();
        drop(c);
        assert!(server.send(Endpoint::new(10), Reply::ok(7)).await.is_ok());
        drop(b);
        assert_eq!(
            server.send(Endpoint::new(10), Reply::ok(0)).await,
            Err(TransportError::NoRoute(Endpoint::new(10)))
        );
    }

    #[tokio::test]
    async fn test_signals_and_close() {
        let (mut server, board) = channel(2);
        board.signal(Signal::Term).await.unwrap();
        assert_eq!(server.receive().await, Some(Incoming::Signal(Signal::Term)));

        drop(board);
        assert_eq!(server.receive().await, None);
    }
}
