// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::{
    capabilities::CapabilitiesExt,
    constants::{Command, EOF_HEADER, ERR_HEADER, OK_HEADER},
    error::{Error, ProtocolError, Result},
    framer::Packet,
    ops::{Completion, OpKind, Operation, Step},
    packets::{parse_err_packet, parse_prepare_ok, Column, ComPacket, PrepareOk},
    pipeline::Context,
    statement::{Statement, StatementModel},
};

#[derive(Debug)]
enum Phase {
    Idle,
    /// Waiting for COM_STMT_PREPARE_OK.
    Header,
    /// Parameter and column definitions.
    Definitions {
        ok: PrepareOk,
        params: Vec<Column>,
        columns: Vec<Column>,
        awaiting_eof: bool,
    },
}

/// COM_STMT_PREPARE.
#[derive(Debug)]
pub struct Prepare {
    sql: String,
    statement: Statement,
    phase: Phase,
    completion: Completion<Statement>,
}

impl Prepare {
    pub fn new(sql: impl Into<String>, statement: Statement, completion: Completion<Statement>) -> Self {
        Self {
            sql: sql.into(),
            statement,
            phase: Phase::Idle,
            completion,
        }
    }

    fn finish(&mut self, model: StatementModel) -> Result<Step> {
        log::debug!(
            "prepared statement {}: {} params, {} columns",
            model.id(),
            model.params().len(),
            model.columns().len()
        );
        self.statement.set_model(model);
        self.completion.complete(Ok(self.statement.clone()));
        Ok(Step::Done)
    }
}

fn is_eof(payload: &[u8]) -> bool {
    payload.first() == Some(&EOF_HEADER) && payload.len() < 9
}

impl Operation for Prepare {
    fn kind(&self) -> OpKind {
        OpKind::Prepare
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let packet = ComPacket::new(
            Command::COM_STMT_PREPARE,
            self.sql.as_bytes(),
            ctx.opts.max_allowed_packet(),
        )?;
        ctx.wire.start_command();
        ctx.wire.send(packet.as_ref())?;
        self.phase = Phase::Header;
        Ok(Step::Pending)
    }

    fn collect(&mut self, packet: Packet, ctx: &mut Context<'_>) -> Result<Step> {
        let capabilities = ctx.conn.capabilities;
        let payload = packet.payload();

        match self.phase {
            Phase::Idle => Err(ProtocolError::UnexpectedPacket {
                header: packet.header().unwrap_or_default(),
                phase: "awaiting request",
            }
            .into()),
            Phase::Header => match packet.header() {
                Some(OK_HEADER) => {
                    let ok = parse_prepare_ok(payload)?;
                    if ok.num_params == 0 && ok.num_columns == 0 {
                        return self.finish(StatementModel::new(
                            ok.statement_id,
                            vec![],
                            vec![],
                            ok.warnings,
                        ));
                    }
                    self.phase = Phase::Definitions {
                        params: Vec::with_capacity(ok.num_params as usize),
                        columns: Vec::with_capacity(ok.num_columns as usize),
                        ok,
                        awaiting_eof: false,
                    };
                    Ok(Step::Pending)
                }
                Some(ERR_HEADER) => Err(parse_err_packet(payload, capabilities)?.into()),
                header => Err(ProtocolError::UnexpectedPacket {
                    header: header.unwrap_or_default(),
                    phase: "preparing statement",
                }
                .into()),
            },
            Phase::Definitions {
                ref ok,
                ref mut params,
                ref mut columns,
                ref mut awaiting_eof,
            } => {
                if is_eof(payload) {
                    // an EOF after a block of definitions, skipped if present
                    *awaiting_eof = false;
                } else if params.len() < ok.num_params as usize {
                    params.push(Column::read(payload, capabilities)?);
                    *awaiting_eof =
                        params.len() == ok.num_params as usize && !capabilities.deprecate_eof();
                } else if columns.len() < ok.num_columns as usize {
                    columns.push(Column::read(payload, capabilities)?);
                    *awaiting_eof =
                        columns.len() == ok.num_columns as usize && !capabilities.deprecate_eof();
                } else {
                    return Err(ProtocolError::UnexpectedPacket {
                        header: packet.header().unwrap_or_default(),
                        phase: "reading statement definitions",
                    }
                    .into());
                }

                let complete = params.len() == ok.num_params as usize
                    && columns.len() == ok.num_columns as usize
                    && !*awaiting_eof;
                if !complete {
                    return Ok(Step::Pending);
                }

                let model = StatementModel::new(
                    ok.statement_id,
                    std::mem::take(params),
                    std::mem::take(columns),
                    ok.warnings,
                );
                self.phase = Phase::Idle;
                self.finish(model)
            }
        }
    }

    fn fail(mut self: Box<Self>, err: Error) {
        self.completion.complete(Err(err));
    }
}
