use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use mio::net::TcpStream;
use mio::{Token, Waker};
use tracing::{debug, error};

use crate::cache::ResponseCache;
use crate::common::{EAGAIN_BACKOFF, FRAME_SIZE, MAX_REQUEST_BYTES};
use crate::http::{
    build_response, error_response, mime_of, ParsePhase, ParsedRequest, RequestParser, StatusCode,
};

use super::origin::{FetchOutcome, Origin};
use super::stats::ServerStats;

/// Everything a connection handler needs from the server, shared across
/// workers.
pub(crate) struct HandlerContext {
    pub cache: ResponseCache,
    pub origin: Origin,
    pub stats: Arc<ServerStats>,
    /// Keep-alive connections travel back to the acceptor through here
    pub rearm_sender: Sender<Connection>,
    /// Wakes the acceptor out of its readiness wait after a re-arm send
    pub waker: Waker,
}

/// Result of driving the parser against the socket
enum ReadOutcome {
    Complete,
    NeedMoreData,
    PeerClosed,
    TooLarge,
    Malformed,
    Failed,
}

/// A client connection and its parse state. Exactly one thread owns a
/// Connection at a time: the acceptor while it is registered for
/// readiness, a worker while a handler runs. Dropping it closes the
/// socket.
pub(crate) struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    /// When the acceptor last registered this connection; connections idle
    /// past the keep-alive limit are reaped
    pub idle_since: Instant,
    parser: RequestParser,
    buf: Box<[u8; MAX_REQUEST_BYTES]>,
    /// Bytes read into `buf`
    filled: usize,
    /// Bytes already fed to the parser
    consumed: usize,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream) -> Self {
        Self {
            token,
            stream,
            idle_since: Instant::now(),
            parser: RequestParser::new(),
            buf: Box::new([0u8; MAX_REQUEST_BYTES]),
            filled: 0,
            consumed: 0,
        }
    }

    /// Runs on a worker thread. Serves as many buffered requests as are
    /// complete, then either parks the connection back with the acceptor
    /// (keep-alive) or drops it (close).
    pub fn handle(mut self, ctx: &HandlerContext) {
        loop {
            match self.fill_and_parse() {
                ReadOutcome::NeedMoreData => return self.park(ctx),
                ReadOutcome::PeerClosed | ReadOutcome::Failed => return,
                ReadOutcome::TooLarge => {
                    ctx.stats.record_error();
                    let _ = self.write_all(&error_response(StatusCode::PayloadTooLarge));
                    return;
                }
                ReadOutcome::Malformed => {
                    ctx.stats.record_error();
                    let _ = self.write_all(&error_response(StatusCode::BadRequest));
                    return;
                }
                ReadOutcome::Complete => {
                    let request = self.parser.take_request();
                    ctx.stats.record_request();
                    let keep_alive = request.wants_keep_alive();

                    let reusable = self.serve(&request, ctx);
                    if !(reusable && keep_alive) {
                        return;
                    }

                    self.next_request();
                    if self.filled == 0 {
                        return self.park(ctx);
                    }
                    // Pipelined bytes are already buffered; serve them now
                    // rather than waiting for a readiness round-trip.
                }
            }
        }
    }

    /// Serves one parsed request. Returns true when the response was
    /// written in full and the connection may be reused.
    fn serve(&mut self, request: &ParsedRequest, ctx: &HandlerContext) -> bool {
        if request.method != "GET" {
            ctx.stats.record_error();
            let _ = self.write_all(&error_response(StatusCode::NotImplemented));
            return false;
        }

        if !request.path.starts_with('/') {
            ctx.stats.record_error();
            let _ = self.write_all(&error_response(StatusCode::BadRequest));
            return false;
        }

        let Some(key) = ctx.origin.normalise(&request.path) else {
            ctx.stats.record_error();
            let _ = self.write_all(&error_response(StatusCode::NotFound));
            return false;
        };

        if let Some(view) = ctx.cache.lookup(&key) {
            ctx.stats.record_hit();
            return self.write_all(view.bytes());
        }
        ctx.stats.record_miss();

        match ctx.origin.fetch(&key) {
            Ok(FetchOutcome::File(body)) => {
                let response = build_response(StatusCode::Ok, mime_of(key.as_str()), &body, true);
                if response.len() <= FRAME_SIZE {
                    if let Err(e) = ctx.cache.install(&key, &response) {
                        debug!(key = %key, error = %e, "install failed, serving uncached");
                    }
                }
                self.write_all(&response)
            }
            Ok(FetchOutcome::NotFound) => {
                ctx.stats.record_error();
                let _ = self.write_all(&error_response(StatusCode::NotFound));
                false
            }
            Err(e) => {
                error!(key = %key, error = %e, "origin read failed");
                ctx.stats.record_error();
                let _ = self.write_all(&error_response(StatusCode::InternalServerError));
                false
            }
        }
    }

    /// Reads from the socket and feeds the parser until a request is
    /// complete, the input is malformed or over-length, or the socket has
    /// nothing more to give.
    fn fill_and_parse(&mut self) -> ReadOutcome {
        let mut idle_spins = 0;
        loop {
            if self.consumed < self.filled {
                self.consumed += self.parser.feed(&self.buf[self.consumed..self.filled]);
                match self.parser.phase() {
                    ParsePhase::Finished => return ReadOutcome::Complete,
                    ParsePhase::Error => return ReadOutcome::Malformed,
                    _ => {}
                }
            }

            if self.filled == MAX_REQUEST_BYTES {
                return ReadOutcome::TooLarge;
            }

            match self.stream.read(&mut self.buf[self.filled..]) {
                Ok(0) => return ReadOutcome::PeerClosed,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.filled > 0 {
                        // Partial request buffered: wait for the next
                        // readiness notification.
                        return ReadOutcome::NeedMoreData;
                    }
                    if idle_spins < 3 {
                        idle_spins += 1;
                        thread::sleep(EAGAIN_BACKOFF);
                        continue;
                    }
                    return ReadOutcome::NeedMoreData;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "recv failed");
                    return ReadOutcome::Failed;
                }
            }
        }
    }

    /// Writes the full byte sequence, backing off briefly on EAGAIN.
    fn write_all(&mut self, bytes: &[u8]) -> bool {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    error!("send wrote zero bytes");
                    return false;
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(EAGAIN_BACKOFF);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "send failed");
                    return false;
                }
            }
        }
        true
    }

    /// Discards the served request's bytes and resets the parser for the
    /// next one; pipelined bytes move to the front of the buffer.
    fn next_request(&mut self) {
        self.buf.copy_within(self.consumed..self.filled, 0);
        self.filled -= self.consumed;
        self.consumed = 0;
        self.parser = RequestParser::new();
    }

    /// Hands the connection back to the acceptor for re-arming.
    fn park(self, ctx: &HandlerContext) {
        let waker_needed = ctx.rearm_sender.send(self).is_ok();
        if waker_needed {
            if let Err(e) = ctx.waker.wake() {
                error!(error = %e, "failed to wake acceptor");
            }
        }
    }
}
