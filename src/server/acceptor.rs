use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tracing::{debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::common::{
    Result, ServerConfig, ACCEPT_BATCH, EVENT_CAPACITY, IDLE_SWEEP_INTERVAL, IDLE_TIMEOUT,
    KEEPALIVE_IDLE, KEEPALIVE_INTERVAL, KEEPALIVE_RETRIES, LISTEN_BACKLOG, SOCKET_BUFFER_BYTES,
};

use super::conn::{Connection, HandlerContext};
use super::origin::Origin;
use super::stats::ServerStats;
use super::worker_pool::WorkerPool;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// Snapshot of one readiness notification
struct Readiness {
    token: Token,
    readable: bool,
    closed: bool,
    error: bool,
}

/// The acceptor and event loop. Owns the listening socket, the poll
/// instance, the worker pool and the cache; the only thread that touches
/// the readiness registry is the one inside [`run`](Self::run).
///
/// Ready connections are deregistered and moved into worker tasks, so a
/// client socket always has exactly one owner. Workers send keep-alive
/// connections back over a channel and wake the poll to have them
/// re-registered.
pub struct Server {
    config: ServerConfig,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    pool: WorkerPool,
    ctx: Arc<HandlerContext>,
    rearm_receiver: Receiver<Connection>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Server {
    /// Binds the listening socket and builds the cache, origin and worker
    /// pool from `config`.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let mut listener = make_listener(config.port)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let (rearm_sender, rearm_receiver) = unbounded();
        let ctx = Arc::new(HandlerContext {
            cache: ResponseCache::new(config.frame_count, config.k),
            origin: Origin::new(config.doc_root.clone()),
            stats: Arc::new(ServerStats::default()),
            rearm_sender,
            waker,
        });

        let pool = WorkerPool::new(config.workers);

        Ok(Self {
            config,
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            pool,
            ctx,
            rearm_receiver,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
        })
    }

    /// Returns the bound address (useful when the port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a handle to the server's counters.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.ctx.stats)
    }

    /// Runs the event loop. Only per-connection errors occur inside; the
    /// loop itself never exits on them.
    pub fn run(&mut self) -> Result<()> {
        info!(
            port = self.config.port,
            workers = self.config.workers,
            frames = self.config.frame_count,
            k = self.config.k,
            doc_root = %self.config.doc_root.display(),
            "server running"
        );

        loop {
            self.poll_once()?;
        }
    }

    fn poll_once(&mut self) -> Result<()> {
        if let Err(e) = self.poll.poll(&mut self.events, Some(IDLE_SWEEP_INTERVAL)) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e.into());
        }

        let ready: Vec<Readiness> = self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable() || event.is_read_closed(),
                closed: event.is_read_closed() && event.is_write_closed(),
                error: event.is_error(),
            })
            .collect();

        for readiness in ready {
            match readiness.token {
                LISTENER => self.accept_batch(),
                WAKER => self.rearm_parked(),
                token if readiness.error || readiness.closed => self.close(token),
                token if readiness.readable => self.dispatch(token),
                _ => {}
            }
        }

        // Waker notifications can coalesce; drain whatever is queued.
        self.rearm_parked();

        self.reap_idle();

        Ok(())
    }

    /// Accepts pending connections in batches. Readiness is edge-triggered,
    /// so the backlog must be drained before returning to the poll.
    fn accept_batch(&mut self) {
        loop {
            let mut accepted = 0;
            for _ in 0..ACCEPT_BATCH {
                match self.listener.accept() {
                    Ok((stream, peer)) => {
                        accepted += 1;
                        if let Err(e) = configure_stream(&stream) {
                            warn!(client = %peer, error = %e, "failed to configure accepted socket");
                        }

                        let token = Token(self.next_token);
                        self.next_token += 1;

                        let mut conn = Connection::new(token, stream);
                        if let Err(e) =
                            self.poll
                                .registry()
                                .register(&mut conn.stream, token, Interest::READABLE)
                        {
                            error!(client = %peer, error = %e, "failed to register client");
                            continue;
                        }

                        debug!(client = %peer, "accepted connection");
                        self.connections.insert(token, conn);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        return;
                    }
                }
            }
            if accepted < ACCEPT_BATCH {
                return;
            }
        }
    }

    /// Hands a readable connection to the worker pool. The stream is
    /// deregistered first, so no further notifications race the handler.
    fn dispatch(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            error!(error = %e, "failed to deregister client");
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        if let Err(e) = self.pool.submit(move || conn.handle(&ctx)) {
            error!(error = %e, "worker pool rejected task");
        }
    }

    /// Closes a connection the kernel reported dead.
    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(?token, "closed connection on error/hangup");
        }
    }

    /// Re-registers keep-alive connections returned by workers.
    fn rearm_parked(&mut self) {
        while let Ok(mut conn) = self.rearm_receiver.try_recv() {
            let token = conn.token;
            conn.idle_since = Instant::now();
            if let Err(e) =
                self.poll
                    .registry()
                    .register(&mut conn.stream, token, Interest::READABLE)
            {
                error!(error = %e, "failed to re-arm connection");
                continue;
            }
            self.connections.insert(token, conn);
        }
    }

    /// Closes registered connections that have sat idle past the
    /// keep-alive limit, including ones stalled mid-request. Socket-level
    /// recv/send timeouts cannot do this: the sockets are non-blocking.
    fn reap_idle(&mut self) {
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.idle_since.elapsed() >= IDLE_TIMEOUT)
            .map(|(&token, _)| token)
            .collect();

        for token in expired {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = self.poll.registry().deregister(&mut conn.stream);
                debug!(?token, "reaped idle connection");
            }
        }
    }
}

/// Builds the non-blocking listening socket with the reuse flags and
/// buffer sizes set before bind.
fn make_listener(port: u16) -> Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    Ok(TcpListener::from_std(socket.into()))
}

/// Applies per-connection socket options: no Nagle, kernel keepalive.
fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL)
        .with_retries(KEEPALIVE_RETRIES);
    sock.set_tcp_keepalive(&keepalive)?;

    Ok(())
}
