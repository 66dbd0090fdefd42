// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Operations: one state machine per command.

use std::fmt;

use crate::{
    error::{Error, ProtocolError, Result},
    framer::Packet,
    pipeline::Context,
};

pub use self::{
    close::{CloseStatement, Quit},
    execute::Execute,
    handshake::Handshake,
    long_data::SendLongData,
    prepare::Prepare,
    query::Query,
};

mod close;
mod execute;
mod handshake;
mod long_data;
mod prepare;
mod query;

/// Operation kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OpKind {
    Handshake,
    Query,
    Prepare,
    Execute,
    SendLongData,
    CloseStatement,
    Quit,
}

/// Result of feeding an operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Step {
    /// Operation waits for more packets.
    Pending,
    /// Operation delivered its result.
    Done,
}

/// A queued command.
///
/// `init` runs once the operation reaches the head of the queue, `collect` gets every
/// inbound packet while it is there. An operation that returns `Step::Done` has already
/// invoked its callback; an operation that returns an error gets it back via `fail`.
pub trait Operation: fmt::Debug {
    fn kind(&self) -> OpKind;

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step>;

    fn collect(&mut self, packet: Packet, _ctx: &mut Context<'_>) -> Result<Step> {
        Err(ProtocolError::UnexpectedPacket {
            header: packet.header().unwrap_or_default(),
            phase: "awaiting no reply",
        }
        .into())
    }

    fn fail(self: Box<Self>, err: Error);

    /// A failure of this operation doesn't abort the rest of the queue.
    fn ignore_errors(&self) -> bool {
        false
    }
}

/// Completion callback of an operation.
pub type Callback<T> = Box<dyn FnOnce(Result<T>)>;

/// Invokes the callback at most once.
pub struct Completion<T> {
    callback: Option<Callback<T>>,
}

impl<T> Completion<T> {
    pub fn new(callback: impl FnOnce(Result<T>) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn complete(&mut self, result: Result<T>) {
        match self.callback.take() {
            Some(callback) => callback(result),
            None => log::warn!("operation completed twice"),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
