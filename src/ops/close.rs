// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::{
    constants::Command,
    error::{Error, Result},
    ops::{OpKind, Operation, Step},
    packets::{com_stmt_close, ComPacket},
    pipeline::Context,
    statement::Statement,
};

/// COM_STMT_CLOSE. The server doesn't reply.
#[derive(Debug)]
pub struct CloseStatement {
    statement: Statement,
}

impl CloseStatement {
    pub fn new(statement: Statement) -> Self {
        Self { statement }
    }
}

impl Operation for CloseStatement {
    fn kind(&self) -> OpKind {
        OpKind::CloseStatement
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        // nothing to close if the prepare failed
        let stmt_id = self.statement.id().filter(|_| !self.statement.is_stale());
        self.statement.mark_stale();
        if let Some(stmt_id) = stmt_id {
            ctx.wire.start_command();
            ctx.wire.send(&com_stmt_close(stmt_id))?;
        }
        Ok(Step::Done)
    }

    fn fail(self: Box<Self>, err: Error) {
        self.statement.mark_stale();
        log::warn!("failed to close statement {:?}: {}", self.statement.id(), err);
    }
}

/// COM_QUIT. Errors don't abort the queue; the session closes the transport once it's
/// written.
#[derive(Debug, Default)]
pub struct Quit;

impl Operation for Quit {
    fn kind(&self) -> OpKind {
        OpKind::Quit
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let packet = ComPacket::new(Command::COM_QUIT, &[], ctx.opts.max_allowed_packet())?;
        ctx.wire.start_command();
        ctx.wire.send(packet.as_ref())?;
        ctx.conn.quit_sent = true;
        Ok(Step::Done)
    }

    fn fail(self: Box<Self>, err: Error) {
        log::debug!("COM_QUIT failed: {}", err);
    }

    fn ignore_errors(&self) -> bool {
        true
    }
}
