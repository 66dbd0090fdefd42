// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::{
    error::{Error, Result},
    framer::Packet,
    ops::{long_data::write_long_data, query::collect_response, Completion, OpKind, Operation, Step},
    packets::ComStmtExecuteRequestBuilder,
    pipeline::Context,
    resultset::{Response, ResponseCollector, RowFormat},
    statement::Statement,
    value::Value,
};

/// COM_STMT_EXECUTE, preceded by long data for oversized parameters.
#[derive(Debug)]
pub struct Execute {
    statement: Statement,
    params: Vec<Value>,
    collector: Option<ResponseCollector>,
    completion: Completion<Response>,
}

impl Execute {
    pub fn new(statement: Statement, params: Vec<Value>, completion: Completion<Response>) -> Self {
        Self {
            statement,
            params,
            collector: None,
            completion,
        }
    }
}

impl Operation for Execute {
    fn kind(&self) -> OpKind {
        OpKind::Execute
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        // the statement may have been closed while this operation was queued
        let stmt_id = self.statement.check_execute(self.params.len())?;

        let request = ComStmtExecuteRequestBuilder::new(stmt_id)
            .with_long_data_threshold(ctx.opts.long_data_threshold())
            .with_limit(ctx.opts.max_allowed_packet())
            .build(&self.params)?;

        for &index in &request.long_data {
            let data = self.params[index].as_bytes().unwrap_or_default();
            log::debug!(
                "sending parameter {} of statement {} as long data ({} bytes)",
                index,
                stmt_id,
                data.len()
            );
            write_long_data(
                ctx.wire,
                stmt_id,
                index as u16,
                data,
                ctx.opts.long_data_chunk_size(),
            )?;
        }

        ctx.wire.start_command();
        ctx.wire.send(&request.body)?;
        self.collector = Some(ResponseCollector::new(
            RowFormat::Binary,
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
