// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Resultsets, rows and the incremental response collector shared by text queries and
//! prepared statement executions.

use bytes::Bytes;
use smallvec::SmallVec;

use std::{convert::TryFrom, mem, sync::Arc};

use crate::{
    capabilities::CapabilitiesExt,
    coercion::Coercion,
    constants::{
        CapabilityFlags, ERR_HEADER, LOCAL_INFILE_HEADER, MAX_COLUMNS, NULL_MARKER, OK_HEADER,
    },
    error::{Error, ProtocolError, Result},
    framer::Packet,
    io::ParseBuf,
    packets::{
        is_rows_terminator, parse_eof_packet, parse_err_packet, parse_local_infile_packet,
        parse_ok_packet, parse_rows_terminator, Column, NullBitmap, OkPacket, OkPacketKind,
    },
    value::{ServerSide, Value},
};

/// Row protocol of a resultset.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RowFormat {
    /// COM_QUERY rows: length-encoded strings.
    Text,
    /// COM_STMT_EXECUTE rows: null-bitmap and binary values.
    Binary,
}

/// Decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<[Column]>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns_ref(&self) -> &[Column] {
        &*self.columns
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the first column named `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|column| column.name() == name.as_bytes())
            .and_then(|index| self.values.get(index))
    }

    pub fn unwrap(self) -> Vec<Value> {
        self.values
    }
}

/// Rows of a single result, kept as raw payloads and decoded on access.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    coercions: Arc<[Coercion]>,
    rows: Vec<Bytes>,
    format: RowFormat,
    status: OkPacket,
    cursor: usize,
}

impl ResultSet {
    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    /// Status of the packet that terminated the rows.
    pub fn status(&self) -> &OkPacket {
        &self.status
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decodes the row at `index`. Doesn't move the cursor.
    pub fn row(&self, index: usize) -> Option<Result<Row, ProtocolError>> {
        self.rows.get(index).map(|payload| self.decode(payload))
    }

    /// Decodes the row under the cursor and advances it.
    pub fn next_row(&mut self) -> Option<Result<Row, ProtocolError>> {
        let row = self.row(self.cursor)?;
        self.cursor += 1;
        Some(row)
    }

    /// Moves the cursor back to the first row.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn decode(&self, payload: &[u8]) -> Result<Row, ProtocolError> {
        let mut buf = ParseBuf::new(payload);
        let mut values = Vec::with_capacity(self.coercions.len());

        match self.format {
            RowFormat::Text => {
                for coercion in self.coercions.iter() {
                    let cell = if buf.peek() == Some(NULL_MARKER) {
                        buf.skip(1)?;
                        None
                    } else {
                        Some(buf.read_lenenc_bytes()?)
                    };
                    values.push(coercion.decode_text(cell)?);
                }
            }
            RowFormat::Binary => {
                if buf.read_u8()? != OK_HEADER {
                    return Err(ProtocolError::Malformed("invalid binary row header"));
                }
                let bitmap = NullBitmap::<ServerSide>::read(&mut buf, self.coercions.len())?;
                for (i, coercion) in self.coercions.iter().enumerate() {
                    if bitmap.is_null(i) {
                        values.push(Value::NULL);
                    } else {
                        values.push(coercion.decode_binary(&mut buf)?);
                    }
                }
            }
        }

        Ok(Row {
            values,
            columns: self.columns.clone(),
        })
    }
}

/// One result of a response.
#[derive(Debug, Clone)]
pub enum QueryResult {
    /// Statement without rows.
    Ok(OkPacket),
    ResultSet(ResultSet),
}

impl QueryResult {
    pub fn status(&self) -> &OkPacket {
        match self {
            QueryResult::Ok(ok) => ok,
            QueryResult::ResultSet(result_set) => result_set.status(),
        }
    }

    pub fn as_result_set_mut(&mut self) -> Option<&mut ResultSet> {
        match self {
            QueryResult::ResultSet(result_set) => Some(result_set),
            QueryResult::Ok(_) => None,
        }
    }

    pub fn into_result_set(self) -> Option<ResultSet> {
        match self {
            QueryResult::ResultSet(result_set) => Some(result_set),
            QueryResult::Ok(_) => None,
        }
    }
}

/// Results of a single command, in the order the server sent them.
pub type Response = SmallVec<[QueryResult; 1]>;

/// What the collector needs next.
#[derive(Debug)]
pub enum Progress {
    /// Waiting for more packets.
    Pending,
    /// Server asked for a local file; an empty packet must be sent back.
    SendEmpty,
    Complete(Response),
}

#[derive(Debug)]
enum Phase {
    Header,
    Columns(usize, Vec<Column>),
    ColumnsEof(Vec<Column>),
    Rows(Arc<[Column]>, Vec<Bytes>),
}

/// Accumulates packets of a text or binary protocol response.
#[derive(Debug)]
pub struct ResponseCollector {
    format: RowFormat,
    capabilities: CapabilityFlags,
    phase: Phase,
    results: Response,
}

impl ResponseCollector {
    pub fn new(format: RowFormat, capabilities: CapabilityFlags) -> Self {
        Self {
            format,
            capabilities,
            phase: Phase::Header,
            results: Response::new(),
        }
    }

    pub fn feed(&mut self, packet: Packet) -> Result<Progress> {
        let payload = packet.into_payload();

        match mem::replace(&mut self.phase, Phase::Header) {
            Phase::Header => self.header(&payload),
            Phase::Columns(expected, mut columns) => {
                columns.push(Column::read(&payload, self.capabilities)?);
                self.phase = if columns.len() < expected {
                    Phase::Columns(expected, columns)
                } else if self.capabilities.deprecate_eof() {
                    Phase::Rows(columns.into(), Vec::new())
                } else {
                    Phase::ColumnsEof(columns)
                };
                Ok(Progress::Pending)
            }
            Phase::ColumnsEof(columns) => {
                parse_eof_packet(&payload, self.capabilities)?;
                self.phase = Phase::Rows(columns.into(), Vec::new());
                Ok(Progress::Pending)
            }
            Phase::Rows(columns, mut rows) => {
                if payload.first() == Some(&ERR_HEADER) {
                    return Err(parse_err_packet(&payload, self.capabilities)?.into());
                }
                if !is_rows_terminator(&payload, self.capabilities) {
                    rows.push(payload);
                    self.phase = Phase::Rows(columns, rows);
                    return Ok(Progress::Pending);
                }

                let status = parse_rows_terminator(&payload, self.capabilities)?;
                let more_results = status.more_results_exist();
                let coercions = columns.iter().map(Coercion::of).collect();
                self.results.push(QueryResult::ResultSet(ResultSet {
                    columns,
                    coercions,
                    rows,
                    format: self.format,
                    status,
                    cursor: 0,
                }));
                Ok(self.next_result(more_results))
            }
        }
    }

    fn header(&mut self, payload: &[u8]) -> Result<Progress> {
        match payload.first() {
            Some(&OK_HEADER) => {
                let ok = parse_ok_packet(payload, self.capabilities, OkPacketKind::Other)?;
                let more_results = ok.more_results_exist();
                self.results.push(QueryResult::Ok(ok));
                Ok(self.next_result(more_results))
            }
            Some(&ERR_HEADER) => Err(parse_err_packet(payload, self.capabilities)?.into()),
            Some(&LOCAL_INFILE_HEADER) => {
                let file_name = parse_local_infile_packet(payload)?;
                log::warn!("declining LOCAL INFILE request for `{}`", file_name);
                Ok(Progress::SendEmpty)
            }
            Some(_) => {
                let column_count = ParseBuf::new(payload).read_lenenc_int()?;
                let column_count = match usize::try_from(column_count) {
                    Ok(0) => {
                        return Err(Error::Protocol(ProtocolError::Malformed(
                            "resultset without columns",
                        )))
                    }
                    Ok(count) if count <= MAX_COLUMNS => count,
                    _ => {
                        return Err(Error::Protocol(ProtocolError::Malformed(
                            "column count out of range",
                        )))
                    }
                };
                self.phase = Phase::Columns(column_count, Vec::with_capacity(column_count));
                Ok(Progress::Pending)
            }
            None => Err(Error::Protocol(ProtocolError::Malformed("empty packet"))),
        }
    }

    fn next_result(&mut self, more_results: bool) -> Progress {
        if more_results {
            self.phase = Phase::Header;
            Progress::Pending
        } else {
            Progress::Complete(mem::take(&mut self.results))
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        constants::{ColumnFlags, ColumnType, StatusFlags},
        io::PacketWriter,
    };

    pub(crate) fn column_payload(name: &str, column_type: ColumnType) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        Column::new(column_type)
            .with_name(name)
            .write(&mut writer)
            .unwrap();
        writer.into_inner()
    }

    pub(crate) fn text_row(cells: &[Option<&str>]) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        for cell in cells {
            match cell {
                Some(cell) => writer.write_lenenc_bytes(cell.as_bytes()).unwrap(),
                None => writer.write_u8(NULL_MARKER).unwrap(),
            }
        }
        writer.into_inner()
    }

    const CAPS: CapabilityFlags = CapabilityFlags::CLIENT_PROTOCOL_41;
    const EOF: &[u8] = b"\xfe\x00\x00\x02\x00";

    fn feed_all(collector: &mut ResponseCollector, payloads: &[Vec<u8>]) -> Option<Response> {
        let mut response = None;
        for (i, payload) in payloads.iter().enumerate() {
            match collector.feed(Packet::new(i as u8 + 1, payload.clone())).unwrap() {
                Progress::Complete(results) => response = Some(results),
                Progress::Pending => (),
                Progress::SendEmpty => panic!("unexpected local infile"),
            }
        }
        response
    }

    #[test]
    fn should_collect_text_resultset() {
        let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
        let mut response = feed_all(
            &mut collector,
            &[
                vec![0x02],
                column_payload("id", ColumnType::MYSQL_TYPE_LONGLONG),
                column_payload("name", ColumnType::MYSQL_TYPE_VAR_STRING),
                EOF.to_vec(),
                text_row(&[Some("1"), Some("alice")]),
                text_row(&[Some("2"), None]),
                EOF.to_vec(),
            ],
        )
        .unwrap();

        assert_eq!(response.len(), 1);
        let result_set = response[0].as_result_set_mut().unwrap();
        assert_eq!(result_set.len(), 2);
        assert_eq!(result_set.columns()[1].name_str(), "name");

        let row = result_set.next_row().unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("alice".into())));
        let row = result_set.next_row().unwrap().unwrap();
        assert_eq!(row.get_by_name("name"), Some(&Value::NULL));
        assert!(result_set.next_row().is_none());

        // random access is a pure function of stored rows
        assert_eq!(
            result_set.row(0).unwrap().unwrap(),
            result_set.row(0).unwrap().unwrap()
        );
        result_set.rewind();
        assert!(result_set.next_row().is_some());
    }

    #[test]
    fn should_collect_binary_resultset_without_eof() {
        let caps = CAPS | CapabilityFlags::CLIENT_DEPRECATE_EOF;
        let mut collector = ResponseCollector::new(RowFormat::Binary, caps);

        let mut unsigned = PacketWriter::new();
        Column::new(ColumnType::MYSQL_TYPE_LONG)
            .with_name(&b"n"[..])
            .with_flags(ColumnFlags::UNSIGNED_FLAG)
            .write(&mut unsigned)
            .unwrap();

        let mut response = feed_all(
            &mut collector,
            &[
                vec![0x03],
                unsigned.into_inner(),
                column_payload("d", ColumnType::MYSQL_TYPE_DOUBLE),
                column_payload("s", ColumnType::MYSQL_TYPE_VAR_STRING),
                // header, bitmap (d is NULL), n, s
                b"\x00\x08\x07\x00\x00\x00\x02hi".to_vec(),
                b"\xfe\x00\x00\x02\x00\x00\x00".to_vec(),
            ],
        )
        .unwrap();

        let result_set = response.remove(0).into_result_set().unwrap();
        assert_eq!(result_set.format(), RowFormat::Binary);
        assert_eq!(
            result_set.row(0).unwrap().unwrap().unwrap(),
            vec![Value::UInt(7), Value::NULL, Value::Text("hi".into())]
        );
        assert_eq!(
            result_set.status().status_flags(),
            StatusFlags::SERVER_STATUS_AUTOCOMMIT
        );
    }

    #[test]
    fn should_collect_multiple_results() {
        let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
        let more = b"\xfe\x00\x00\x0a\x00".to_vec();
        let response = feed_all(
            &mut collector,
            &[
                vec![0x01],
                column_payload("a", ColumnType::MYSQL_TYPE_LONG),
                EOF.to_vec(),
                text_row(&[Some("1")]),
                more,
                b"\x00\x01\x00\x02\x00\x00\x00".to_vec(),
            ],
        )
        .unwrap();

        assert_eq!(response.len(), 2);
        assert!(response[0].status().more_results_exist());
        match &response[1] {
            QueryResult::Ok(ok) => assert_eq!(ok.affected_rows(), 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn should_fail_on_error_among_rows() {
        let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
        feed_all(
            &mut collector,
            &[
                vec![0x01],
                column_payload("a", ColumnType::MYSQL_TYPE_LONG),
                EOF.to_vec(),
                text_row(&[Some("1")]),
            ],
        );

        let err = collector
            .feed(Packet::new(5, &b"\xff\x15\x04#HY000killed"[..]))
            .unwrap_err();
        match err {
            Error::Server(err) => {
                assert_eq!(err.code, 1045);
                assert_eq!(err.message, "killed");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn should_decline_local_infile() {
        let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
        assert!(matches!(
            collector.feed(Packet::new(1, &b"\xfb/etc/passwd"[..])).unwrap(),
            Progress::SendEmpty
        ));
        let err = collector
            .feed(Packet::new(3, &b"\xff\x00\x04#HY000denied"[..]))
            .unwrap_err();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn should_reject_column_count_out_of_range() {
        for header in [
            &b"\xfe\xff\xff\xff\xff\xff\xff\xff\x0f"[..],
            &b"\xfe\x00\x00\x00\x00\x00\x01\x00\x00"[..],
            &b"\xfc\x01\x10"[..],
        ] {
            let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
            match collector.feed(Packet::new(1, header)) {
                Err(Error::Protocol(ProtocolError::Malformed(_))) => (),
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        let mut collector = ResponseCollector::new(RowFormat::Text, CAPS);
        assert!(matches!(
            collector.feed(Packet::new(1, &b"\xfc\x00\x10"[..])).unwrap(),
            Progress::Pending
        ));
    }
}
