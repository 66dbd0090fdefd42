// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use bytes::Bytes;

use crate::{
    error::{Error, ProtocolError, Result},
    ops::{Completion, OpKind, Operation, Step},
    packets::com_stmt_send_long_data,
    pipeline::{Context, Wire},
    statement::Statement,
};

/// Writes `data` as a series of COM_STMT_SEND_LONG_DATA commands.
///
/// Every chunk is a separate command (sequence id 0). Empty data is sent as a single
/// empty chunk.
pub(super) fn write_long_data(
    wire: &mut Wire,
    stmt_id: u32,
    param_index: u16,
    data: &[u8],
    chunk_size: usize,
) -> Result<(), ProtocolError> {
    let mut chunks = data.chunks(chunk_size.max(1)).peekable();
    if chunks.peek().is_none() {
        wire.start_command();
        return wire.send(&com_stmt_send_long_data(stmt_id, param_index, &[]));
    }

    for chunk in chunks {
        wire.start_command();
        wire.send(&com_stmt_send_long_data(stmt_id, param_index, chunk))?;
    }
    Ok(())
}

/// COM_STMT_SEND_LONG_DATA for a single parameter. The server doesn't reply.
#[derive(Debug)]
pub struct SendLongData {
    statement: Statement,
    param_index: u16,
    data: Bytes,
    chunk_size: usize,
    completion: Completion<()>,
}

impl SendLongData {
    pub fn new(
        statement: Statement,
        param_index: u16,
        data: Bytes,
        chunk_size: usize,
        completion: Completion<()>,
    ) -> Self {
        Self {
            statement,
            param_index,
            data,
            chunk_size,
            completion,
        }
    }
}

impl Operation for SendLongData {
    fn kind(&self) -> OpKind {
        OpKind::SendLongData
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let stmt_id = self.statement.check_param(self.param_index)?;
        write_long_data(
            ctx.wire,
            stmt_id,
            self.param_index,
            &self.data,
            self.chunk_size,
        )?;
        self.completion.complete(Ok(()));
        Ok(Step::Done)
    }

    fn fail(mut self: Box<Self>, err: Error) {
        self.completion.complete(Err(err));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_split_long_data_into_commands() {
        let mut wire = Wire::new(1024);
        write_long_data(&mut wire, 1, 0, b"abcde", 2).unwrap();

        let output = wire.take_output().unwrap();
        assert_eq!(
            &output[..],
            &b"\x09\x00\x00\x00\x18\x01\x00\x00\x00\x00\x00ab\
               \x09\x00\x00\x00\x18\x01\x00\x00\x00\x00\x00cd\
               \x08\x00\x00\x00\x18\x01\x00\x00\x00\x00\x00e"[..]
        );

        write_long_data(&mut wire, 1, 3, b"", 2).unwrap();
        assert_eq!(
            &wire.take_output().unwrap()[..],
            &b"\x07\x00\x00\x00\x18\x01\x00\x00\x00\x03\x00"[..]
        );
    }
}
