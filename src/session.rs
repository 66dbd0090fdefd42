// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use bytes::Bytes;

use std::io;

use crate::{
    constants::{CapabilityFlags, StatusFlags},
    error::{Error, Result},
    framer::PacketFramer,
    ops::{
        CloseStatement, Completion, Execute, Handshake, Operation, Prepare, Query, Quit,
        SendLongData,
    },
    opts::Opts,
    pipeline::{ConnState, Context, Pipeline, Wire},
    resultset::Response,
    statement::{Statement, StatementRegistry},
    transport::{EventReceiver, Transport, TransportEvent},
    value::Value,
};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SessionState {
    /// Handshake is in progress.
    Connecting,
    Ready,
    /// COM_QUIT is queued; new commands are rejected.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CloseMode {
    /// Close the transport now and fail every queued operation.
    Immediate,
    /// Queue COM_QUIT behind pending work.
    Graceful,
}

/// Client session over a single transport connection.
///
/// The session never reads by itself: inbound bytes and transport failures are fed
/// through `on_bytes`, `on_transport_error`, `on_timeout` (or `run` over an event
/// channel), outbound bytes are handed to the transport as soon as an operation writes
/// them. Commands run one at a time in submission order and report through their
/// callbacks.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    opts: Opts,
    framer: PacketFramer,
    wire: Wire,
    conn: ConnState,
    pipeline: Pipeline,
    statements: StatementRegistry,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    /// Starts the connection phase. `callback` gets the handshake outcome.
    pub fn connect(opts: Opts, transport: T, callback: impl FnOnce(Result<()>) + 'static) -> Self {
        let mut session = Self {
            transport,
            framer: PacketFramer::new(),
            wire: Wire::new(opts.max_allowed_packet()),
            opts,
            conn: ConnState::default(),
            pipeline: Pipeline::new(),
            statements: StatementRegistry::default(),
            state: SessionState::Connecting,
        };
        session.enqueue(Box::new(Handshake::new(Completion::new(callback))));
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Negotiated capabilities (empty before the server greeting).
    pub fn capabilities(&self) -> CapabilityFlags {
        self.conn.capabilities
    }

    pub fn connection_id(&self) -> u32 {
        self.conn.connection_id
    }

    pub fn server_version(&self) -> Option<(u16, u16, u16)> {
        self.conn.server_version
    }

    /// Status flags of the last completed command.
    pub fn status_flags(&self) -> StatusFlags {
        self.conn.status_flags
    }

    /// Number of queued operations (including the running one).
    pub fn pending(&self) -> usize {
        self.pipeline.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs a text protocol query.
    pub fn query(
        &mut self,
        sql: impl Into<String>,
        callback: impl FnOnce(Result<Response>) + 'static,
    ) {
        let mut completion = Completion::new(callback);
        if self.accepts_commands() {
            self.enqueue(Box::new(Query::new(sql, completion)));
        } else {
            completion.complete(Err(Error::ConnectionClosed));
        }
    }

    /// Prepares a statement.
    ///
    /// The returned handle is populated once the server confirms the statement; the same
    /// handle is passed to `callback`.
    pub fn prepare(
        &mut self,
        sql: impl Into<String>,
        callback: impl FnOnce(Result<Statement>) + 'static,
    ) -> Statement {
        let statement = Statement::pending();
        let mut completion = Completion::new(callback);
        if self.accepts_commands() {
            self.statements.register(&statement);
            self.enqueue(Box::new(Prepare::new(sql, statement.clone(), completion)));
        } else {
            statement.mark_stale();
            completion.complete(Err(Error::ConnectionClosed));
        }
        statement
    }

    /// Executes a prepared statement.
    ///
    /// Fails with `Error::Usage` right away if the statement isn't prepared, is stale, or
    /// `params` doesn't match its parameter count. Oversized byte values go as long data.
    pub fn execute(
        &mut self,
        statement: &Statement,
        params: Vec<Value>,
        callback: impl FnOnce(Result<Response>) + 'static,
    ) {
        let mut completion = Completion::new(callback);
        if !self.accepts_commands() {
            return completion.complete(Err(Error::ConnectionClosed));
        }
        if let Err(err) = statement.check_execute(params.len()) {
            return completion.complete(Err(err.into()));
        }
        self.enqueue(Box::new(Execute::new(
            statement.clone(),
            params,
            completion,
        )));
    }

    /// Sends `data` for parameter `param_index` in chunks of `opts.long_data_chunk_size()`.
    pub fn send_long_data(
        &mut self,
        statement: &Statement,
        param_index: u16,
        data: impl Into<Bytes>,
        opts: &Opts,
        callback: impl FnOnce(Result<()>) + 'static,
    ) {
        let mut completion = Completion::new(callback);
        if !self.accepts_commands() {
            return completion.complete(Err(Error::ConnectionClosed));
        }
        if let Err(err) = statement.check_param(param_index) {
            return completion.complete(Err(err.into()));
        }
        self.enqueue(Box::new(SendLongData::new(
            statement.clone(),
            param_index,
            data.into(),
            opts.long_data_chunk_size(),
            completion,
        )));
    }

    /// Deallocates a statement on the server. The handle goes stale.
    pub fn close_statement(&mut self, statement: &Statement) {
        if self.accepts_commands() {
            self.enqueue(Box::new(CloseStatement::new(statement.clone())));
        } else {
            statement.mark_stale();
        }
    }

    pub fn close(&mut self, mode: CloseMode) {
        match (mode, self.state) {
            (_, SessionState::Closed) => (),
            (CloseMode::Immediate, _) => self.shutdown(None),
            (CloseMode::Graceful, SessionState::Closing) => (),
            (CloseMode::Graceful, _) => {
                log::debug!("closing session gracefully");
                self.state = SessionState::Closing;
                self.enqueue(Box::new(Quit));
            }
        }
    }

    /// Feeds an inbound chunk.
    pub fn on_bytes(&mut self, chunk: &[u8]) {
        if self.state == SessionState::Closed {
            log::warn!("dropping {} bytes received after close", chunk.len());
            return;
        }

        if let Some(packets) = self.framer.push(chunk) {
            for packet in packets {
                let mut ctx = Context {
                    wire: &mut self.wire,
                    conn: &mut self.conn,
                    opts: &self.opts,
                };
                self.pipeline.on_packet(packet, &mut ctx);
            }
            self.after_step();
        }
    }

    /// Stream failed: the running operation gets `err`, the rest `Error::ConnectionClosed`.
    pub fn on_transport_error(&mut self, err: io::Error) {
        if self.state == SessionState::Closed {
            return;
        }
        log::warn!("transport failed: {}", err);
        self.shutdown(Some(Error::Transport(err)));
    }

    pub fn on_timeout(&mut self) {
        self.on_transport_error(io::Error::new(io::ErrorKind::TimedOut, "idle timeout"));
    }

    /// Peer closed the stream.
    pub fn on_closed(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.pipeline.is_empty() {
            log::debug!("connection closed by peer");
            self.shutdown(None);
        } else {
            self.on_transport_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ));
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Bytes(bytes) => self.on_bytes(&bytes),
            TransportEvent::Error(err) => self.on_transport_error(err),
            TransportEvent::Timeout => self.on_timeout(),
            TransportEvent::Closed => self.on_closed(),
        }
    }

    /// Handles events until the session is closed or every sender is gone.
    pub fn run(&mut self, events: &EventReceiver) {
        while self.state != SessionState::Closed {
            match events.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => {
                    log::debug!("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn accepts_commands(&self) -> bool {
        matches!(self.state, SessionState::Connecting | SessionState::Ready)
    }

    fn enqueue(&mut self, op: Box<dyn Operation>) {
        let mut ctx = Context {
            wire: &mut self.wire,
            conn: &mut self.conn,
            opts: &self.opts,
        };
        self.pipeline.push(op, &mut ctx);
        self.after_step();
    }

    /// Flushes output and moves the session state forward.
    fn after_step(&mut self) {
        if let Some(output) = self.wire.take_output() {
            if let Err(err) = self.transport.write(&output) {
                log::warn!("transport write failed: {}", err);
                return self.shutdown(Some(Error::Transport(err)));
            }
        }

        match self.state {
            SessionState::Connecting if self.conn.authenticated => {
                log::debug!("session {} is ready", self.conn.connection_id);
                self.state = SessionState::Ready;
            }
            // handshake failed
            SessionState::Connecting if self.pipeline.is_empty() => self.shutdown(None),
            SessionState::Closing if self.conn.quit_sent || self.pipeline.is_empty() => {
                self.shutdown(None)
            }
            _ => (),
        }
    }

    fn shutdown(&mut self, err: Option<Error>) {
        match err {
            Some(err) => self.pipeline.fail_all(err),
            None => self.pipeline.abort(|| Error::ConnectionClosed),
        }
        self.transport.close();
        self.statements.invalidate();
        self.framer.reset();
        self.state = SessionState::Closed;
        log::debug!("session {} is closed", self.conn.connection_id);
    }
}
