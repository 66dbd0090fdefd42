// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::{
    constants::Command,
    error::{Error, ProtocolError, Result},
    framer::Packet,
    ops::{Completion, OpKind, Operation, Step},
    packets::ComPacket,
    pipeline::Context,
    resultset::{Progress, Response, ResponseCollector, RowFormat},
};

/// COM_QUERY.
#[derive(Debug)]
pub struct Query {
    sql: String,
    collector: Option<ResponseCollector>,
    completion: Completion<Response>,
}

impl Query {
    pub fn new(sql: impl Into<String>, completion: Completion<Response>) -> Self {
        Self {
            sql: sql.into(),
            collector: None,
            completion,
        }
    }
}

impl Operation for Query {
    fn kind(&self) -> OpKind {
        OpKind::Query
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let packet = ComPacket::new(
            Command::COM_QUERY,
            self.sql.as_bytes(),
            ctx.opts.max_allowed_packet(),
        )?;
        ctx.wire.start_command();
        ctx.wire.send(packet.as_ref())?;
        self.collector = Some(ResponseCollector::new(
            RowFormat::Text,
            ctx.conn.capabilities,
        ));
        Ok(Step::Pending)
    }

    fn collect(&mut self, packet: Packet, ctx: &mut Context<'_>) -> Result<Step> {
        collect_response(&mut self.collector, &mut self.completion, packet, ctx)
    }

    fn fail(mut self: Box<Self>, err: Error) {
        self.completion.complete(Err(err));
    }
}

/// Feeds a packet of a text or binary protocol response.
pub(super) fn collect_response(
    collector: &mut Option<ResponseCollector>,
    completion: &mut Completion<Response>,
    packet: Packet,
    ctx: &mut Context<'_>,
) -> Result<Step> {
    let collector = collector.as_mut().ok_or(ProtocolError::UnexpectedPacket {
        header: packet.header().unwrap_or_default(),
        phase: "awaiting request",
    })?;

    match collector.feed(packet)? {
        Progress::Pending => Ok(Step::Pending),
        Progress::SendEmpty => {
            ctx.wire.send(&[])?;
            Ok(Step::Pending)
        }
        Progress::Complete(response) => {
            if let Some(status) = response.last().map(|x| x.status().status_flags()) {
                ctx.conn.status_flags = status;
            }
            completion.complete(Ok(response));
            Ok(Step::Done)
        }
    }
}
