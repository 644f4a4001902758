//! Connection-accepting server.
//!
//! This module owns the networking side of the stack:
//! - binding the listener,
//! - accepting TCP connections in a background task,
//! - running one independent task per connection.
//!
//! Protocol work is delegated: each connection task parses exactly one
//! request with [`read_request`](crate::http::parser::read_request), binds a
//! [`ResponseWriter`] to the stream and hands both to the injected
//! [`Handler`]. The connection is closed when the task returns, whatever the
//! outcome.
//!
//! ## Request handling flow
//!
//! 1. Accept a TCP connection and spawn a task for it
//! 2. Read and incrementally parse one request
//! 3. Invoke the handler with the request and a writer on the stream
//! 4. Drop the stream
//!
//! A malformed request closes the connection without a response. Only a
//! failure to bind is reported to the caller; an accept failure stops the
//! accept loop.

use async_std::channel::{self, Receiver, Sender};
use async_std::net::{TcpListener, TcpStream};
use async_std::task::{self, JoinHandle};
use futures::future::{Either, select};
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::http::parser::read_request;
use crate::http::response::ResponseWriter;

/// State shared by the accept loop with every connection task.
struct ConnectionContext {
    config: ServerConfig,
    handler: Box<dyn Handler>,
}

pub struct Server {
    local_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    shutdown: Sender<()>,
    accept_loop: JoinHandle<()>,
}

impl Server {
    /// Binds the configured address and starts accepting connections in the
    /// background. Returns as soon as the listener is bound.
    pub async fn serve<H: Handler>(config: ServerConfig, handler: H) -> std::io::Result<Server> {
        let listener = TcpListener::bind((config.address, config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "listening");

        let closed = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = channel::bounded(1);
        let ctx = Arc::new(ConnectionContext {
            config,
            handler: Box::new(handler),
        });

        let accept_loop = task::spawn(Self::accept_loop(
            listener,
            Arc::clone(&closed),
            shutdown_rx,
            ctx,
        ));

        Ok(Server {
            local_addr,
            closed,
            shutdown,
            accept_loop,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting connections. Connections already being handled run
    /// to completion.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.close();
        info!(address = %self.local_addr, "server closed");
    }

    /// Waits for the accept loop to exit.
    pub async fn join(self) {
        self.accept_loop.await
    }

    async fn accept_loop(
        listener: TcpListener,
        closed: Arc<AtomicBool>,
        shutdown: Receiver<()>,
        ctx: Arc<ConnectionContext>,
    ) {
        loop {
            if closed.load(Ordering::Acquire) {
                break;
            }

            let accept = pin!(listener.accept());
            let stop = pin!(shutdown.recv());

            let (stream, peer) = match select(accept, stop).await {
                Either::Left((Ok(conn), _)) => conn,
                Either::Left((Err(err), _)) => {
                    error!(error = %err, "failed to accept connection");
                    break;
                }
                Either::Right(_) => break,
            };

            debug!(%peer, "accepted connection");
            task::spawn(Self::handle_client(stream, peer, Arc::clone(&ctx)));
        }

        debug!("accept loop stopped");
    }

    /// Handles a single client connection: one request, one response.
    async fn handle_client(mut stream: TcpStream, peer: SocketAddr, ctx: Arc<ConnectionContext>) {
        let request = match read_request(&mut stream, ctx.config.buffer_size).await {
            Ok(request) => request,
            Err(err) => {
                warn!(%peer, error = %err, "failed to read request");
                return;
            }
        };
        info!(
            %peer,
            method = %request.method(),
            path = request.target(),
            body_len = request.body.len(),
            "request received"
        );

        let mut writer = ResponseWriter::new(&mut stream);
        if let Err(err) = ctx.handler.call(&mut writer, &request).await {
            warn!(%peer, error = %err, "handler failed");
        }

        debug!(%peer, "closing connection");
    }
}
