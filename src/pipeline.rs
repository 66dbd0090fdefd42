// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Ordered command queue.

use bytes::{Bytes, BytesMut};

use std::collections::VecDeque;

use crate::{
    constants::{CapabilityFlags, StatusFlags},
    error::{Error, ProtocolError, Result},
    framer::{encode_packet, Packet},
    ops::{Operation, Step},
    opts::Opts,
};

/// Outbound side of the connection: sequence ids and pending bytes.
#[derive(Debug)]
pub struct Wire {
    sequence_id: u8,
    output: BytesMut,
    max_allowed_packet: usize,
}

impl Wire {
    pub fn new(max_allowed_packet: usize) -> Self {
        Self {
            sequence_id: 0,
            output: BytesMut::new(),
            max_allowed_packet,
        }
    }

    /// Sequence id of the next packet (either direction).
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Every command starts a new sequence.
    pub fn start_command(&mut self) {
        self.sequence_id = 0;
    }

    /// Frames `payload` with the next sequence id(s).
    pub fn send(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() > self.max_allowed_packet {
            return Err(ProtocolError::BufferOverrun {
                needed: payload.len(),
                limit: self.max_allowed_packet,
            });
        }
        log::trace!(
            "sending packet: len={}, seq={}",
            payload.len(),
            self.sequence_id
        );
        self.sequence_id = encode_packet(payload, self.sequence_id, &mut self.output);
        Ok(())
    }

    /// Checks the sequence id of an inbound packet.
    pub fn accept(&mut self, packet: &Packet) -> Result<(), ProtocolError> {
        if packet.sequence_id() != self.sequence_id {
            return Err(ProtocolError::OutOfOrder {
                expected: self.sequence_id,
                got: packet.sequence_id(),
            });
        }
        self.sequence_id = packet.last_sequence_id().wrapping_add(1);
        Ok(())
    }

    /// Takes bytes written so far.
    pub fn take_output(&mut self) -> Option<Bytes> {
        if self.output.is_empty() {
            None
        } else {
            Some(self.output.split().freeze())
        }
    }
}

/// Connection level state shared by operations.
#[derive(Debug, Clone, Default)]
pub struct ConnState {
    /// Negotiated capabilities (empty until the handshake response is written).
    pub capabilities: CapabilityFlags,
    pub connection_id: u32,
    pub server_version: Option<(u16, u16, u16)>,
    /// Status flags of the last OK/EOF packet.
    pub status_flags: StatusFlags,
    pub authenticated: bool,
    pub quit_sent: bool,
}

/// What an operation may touch.
#[derive(Debug)]
pub struct Context<'a> {
    pub wire: &'a mut Wire,
    pub conn: &'a mut ConnState,
    pub opts: &'a Opts,
}

/// Operations in submission order. Only the head sends and consumes packets.
#[derive(Debug, Default)]
pub struct Pipeline {
    queue: VecDeque<Box<dyn Operation>>,
    head_started: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues an operation; starts it if the queue was idle.
    pub fn push(&mut self, op: Box<dyn Operation>, ctx: &mut Context<'_>) {
        log::debug!("queued {:?} operation", op.kind());
        self.queue.push_back(op);
        self.start(ctx);
    }

    /// Feeds an inbound packet to the head operation.
    pub fn on_packet(&mut self, packet: Packet, ctx: &mut Context<'_>) {
        let head = match self.queue.front_mut() {
            Some(head) if self.head_started => head,
            _ => {
                log::warn!(
                    "dropping stray packet: seq={}, len={}",
                    packet.sequence_id(),
                    packet.payload().len()
                );
                return;
            }
        };

        let result = match ctx.wire.accept(&packet) {
            Ok(()) => head.collect(packet, ctx),
            Err(err) => Err(err.into()),
        };
        self.settle(result);
        self.start(ctx);
    }

    /// Fails every queued operation with the error produced by `make_err`.
    pub fn abort(&mut self, make_err: impl Fn() -> Error) {
        if !self.queue.is_empty() {
            log::warn!("aborting {} queued operations", self.queue.len());
        }
        self.head_started = false;
        for op in self.queue.drain(..) {
            op.fail(make_err());
        }
    }

    /// Fails a running head with `err` and every other operation with
    /// `Error::ConnectionClosed`.
    pub fn fail_all(&mut self, err: Error) {
        if self.head_started {
            self.head_started = false;
            if let Some(head) = self.queue.pop_front() {
                head.fail(err);
            }
        }
        self.abort(|| Error::ConnectionClosed);
    }

    fn start(&mut self, ctx: &mut Context<'_>) {
        while !self.head_started {
            let head = match self.queue.front_mut() {
                Some(head) => head,
                None => break,
            };
            log::debug!("starting {:?} operation", head.kind());
            self.head_started = true;
            let result = head.init(ctx);
            self.settle(result);
        }
    }

    fn settle(&mut self, result: Result<Step>) {
        match result {
            Ok(Step::Pending) => (),
            Ok(Step::Done) => {
                self.head_started = false;
                if let Some(op) = self.queue.pop_front() {
                    log::debug!("{:?} operation succeeded", op.kind());
                }
            }
            Err(err) => {
                self.head_started = false;
                if let Some(op) = self.queue.pop_front() {
                    let ignore_errors = op.ignore_errors();
                    log::debug!("{:?} operation failed: {}", op.kind(), err);
                    op.fail(err);
                    if !ignore_errors {
                        self.abort(|| Error::Aborted);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::OpKind;

    use std::{cell::RefCell, rc::Rc};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Sends its name on init, succeeds on `0x00`, fails on anything else.
    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        log: Log,
        ignore_errors: bool,
    }

    impl Operation for Probe {
        fn kind(&self) -> OpKind {
            OpKind::Query
        }

        fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
            ctx.wire.start_command();
            ctx.wire.send(self.name.as_bytes())?;
            self.log.borrow_mut().push(format!("{} init", self.name));
            Ok(Step::Pending)
        }

        fn collect(&mut self, packet: Packet, _ctx: &mut Context<'_>) -> Result<Step> {
            match packet.header() {
                Some(0x00) => {
                    self.log.borrow_mut().push(format!("{} ok", self.name));
                    Ok(Step::Done)
                }
                _ => Err(Error::ConnectionClosed),
            }
        }

        fn fail(self: Box<Self>, err: Error) {
            self.log
                .borrow_mut()
                .push(format!("{} failed: {}", self.name, err));
        }

        fn ignore_errors(&self) -> bool {
            self.ignore_errors
        }
    }

    struct Harness {
        wire: Wire,
        conn: ConnState,
        opts: Opts,
        pipeline: Pipeline,
        log: Log,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                wire: Wire::new(1024),
                conn: ConnState::default(),
                opts: Opts::default(),
                pipeline: Pipeline::new(),
                log: Log::default(),
            }
        }

        fn push(&mut self, name: &'static str, ignore_errors: bool) {
            let op = Box::new(Probe {
                name,
                log: self.log.clone(),
                ignore_errors,
            });
            let mut ctx = Context {
                wire: &mut self.wire,
                conn: &mut self.conn,
                opts: &self.opts,
            };
            self.pipeline.push(op, &mut ctx);
        }

        fn packet(&mut self, seq: u8, payload: &'static [u8]) {
            let mut ctx = Context {
                wire: &mut self.wire,
                conn: &mut self.conn,
                opts: &self.opts,
            };
            self.pipeline.on_packet(Packet::new(seq, payload), &mut ctx);
        }

        fn log(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    #[test]
    fn should_run_operations_in_order() {
        let mut harness = Harness::new();
        harness.push("a", false);
        harness.push("b", false);

        // only the head has written its request
        assert_eq!(harness.wire.take_output().unwrap(), &b"\x01\x00\x00\x00a"[..]);
        assert_eq!(harness.pipeline.len(), 2);

        harness.packet(1, b"\x00");
        assert_eq!(harness.wire.take_output().unwrap(), &b"\x01\x00\x00\x00b"[..]);
        harness.packet(1, b"\x00");

        assert_eq!(harness.log(), ["a init", "a ok", "b init", "b ok"]);
        assert!(harness.pipeline.is_empty());
    }

    #[test]
    fn should_abort_queue_on_error() {
        let mut harness = Harness::new();
        harness.push("a", false);
        harness.push("b", false);
        harness.push("c", false);

        harness.packet(1, b"\xff");
        assert_eq!(
            harness.log(),
            [
                "a init",
                "a failed: connection closed",
                "b failed: operation aborted by a previous error",
                "c failed: operation aborted by a previous error",
            ]
        );
        assert!(harness.pipeline.is_empty());
    }

    #[test]
    fn should_not_abort_after_ignored_error() {
        let mut harness = Harness::new();
        harness.push("a", true);
        harness.push("b", false);

        harness.packet(1, b"\xff");
        harness.packet(1, b"\x00");
        assert_eq!(
            harness.log(),
            ["a init", "a failed: connection closed", "b init", "b ok"]
        );
    }

    #[test]
    fn should_fail_on_out_of_order_packet() {
        let mut harness = Harness::new();
        harness.push("a", false);
        harness.packet(2, b"\x00");
        assert_eq!(
            harness.log(),
            [
                "a init",
                "a failed: protocol error: packets out of order: expected sequence id 1, got 2"
            ]
        );
    }

    #[test]
    fn should_drop_stray_packets() {
        let mut harness = Harness::new();
        harness.packet(0, b"\x00");
        assert!(harness.log().is_empty());
    }

    #[test]
    fn should_fail_head_and_close_the_rest() {
        let mut harness = Harness::new();
        harness.push("a", false);
        harness.push("b", false);
        harness.pipeline.fail_all(Error::Transport(std::io::ErrorKind::TimedOut.into()));

        let log = harness.log();
        assert_eq!(log.len(), 3);
        assert!(log[1].starts_with("a failed: transport error"));
        assert_eq!(log[2], "b failed: connection closed");
    }

    #[test]
    fn should_bound_outbound_payloads() {
        let mut wire = Wire::new(4);
        assert!(wire.send(b"abcd").is_ok());
        assert_eq!(
            wire.send(b"abcde"),
            Err(ProtocolError::BufferOverrun {
                needed: 5,
                limit: 4
            })
        );
        assert_eq!(wire.sequence_id(), 1);
    }
}
