// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Server packets and command payloads.
//!
//! Every parser takes a complete payload (header byte included) and the negotiated
//! capabilities where the layout depends on them.

use bytes::Bytes;
use lexical::parse;
use regex::bytes::Regex;
use smallvec::SmallVec;

use std::{borrow::Cow, cmp::max, convert::TryFrom, marker::PhantomData};

use crate::{
    auth::AuthPlugin,
    capabilities::CapabilitiesExt,
    constants::{
        CapabilityFlags, ColumnFlags, ColumnType, Command, StatusFlags, AUTH_MORE_DATA_HEADER,
        AUTH_SWITCH_HEADER, EOF_HEADER, ERR_HEADER, LOCAL_INFILE_HEADER, MAX_PAYLOAD_LEN,
        OK_HEADER, PROTOCOL_VERSION_10,
    },
    error::{ProtocolError, ServerError},
    io::{ParseBuf, PacketWriter},
    value::{ClientSide, SerializationSide, Value},
};

type ParseResult<T> = std::result::Result<T, ProtocolError>;

lazy_static::lazy_static! {
    // MariaDB 10+ reports itself as `5.5.5-10.x.y-MariaDB` for compatibility
    static ref VERSION_RE: Regex =
        Regex::new(r"^(?:5\.5\.5-)?(\d{1,2})\.(\d{1,2})\.(\d{1,3})").unwrap();
}

/// Integer field that must fit into `T`.
fn narrow<T: TryFrom<u64>>(value: u64, field: &'static str) -> ParseResult<T> {
    T::try_from(value).map_err(|_| ProtocolError::Malformed(field))
}

/// Column definition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Column {
    schema: Bytes,
    table: Bytes,
    org_table: Bytes,
    name: Bytes,
    org_name: Bytes,
    character_set: u16,
    column_length: u32,
    column_type: ColumnType,
    flags: ColumnFlags,
    decimals: u8,
}

impl Column {
    /// Unnamed column of the given type.
    pub fn new(column_type: ColumnType) -> Self {
        Column {
            schema: Bytes::new(),
            table: Bytes::new(),
            org_table: Bytes::new(),
            name: Bytes::new(),
            org_name: Bytes::new(),
            character_set: 0,
            column_length: 0,
            column_type,
            flags: ColumnFlags::empty(),
            decimals: 0,
        }
    }

    /// Sets both `name` and `org_name`.
    pub fn with_name(mut self, name: impl AsRef<[u8]>) -> Self {
        self.name = Bytes::copy_from_slice(name.as_ref());
        self.org_name = self.name.clone();
        self
    }

    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Parses a column definition packet.
    ///
    /// Layout is `ColumnDefinition41` under `CLIENT_PROTOCOL_41`, `ColumnDefinition320`
    /// otherwise (flags are two bytes wide only under `CLIENT_LONG_FLAG`).
    pub fn read(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<Column> {
        let mut buf = ParseBuf::new(payload);
        let mut text = || -> ParseResult<Bytes> {
            Ok(Bytes::copy_from_slice(buf.read_lenenc_bytes()?))
        };

        if capabilities.protocol_41() {
            text()?; // catalog, always "def"
            let schema = text()?;
            let table = text()?;
            let org_table = text()?;
            let name = text()?;
            let org_name = text()?;

            // length of the fixed part, always 0x0c
            buf.read_lenenc_int()?;
            let character_set = buf.read_u16()?;
            let column_length = buf.read_u32()?;
            let column_type = ColumnType::try_from(buf.read_u8()?)?;
            let flags = ColumnFlags::from_bits_truncate(buf.read_u16()?);
            let decimals = buf.read_u8()?;

            return Ok(Column {
                schema,
                table,
                org_table,
                name,
                org_name,
                character_set,
                column_length,
                column_type,
                flags,
                decimals,
            });
        }

        let table = text()?;
        let name = text()?;
        let length_len = narrow(buf.read_lenenc_int()?, "column length width")?;
        let column_length = narrow(buf.read_uint(length_len)?, "column length")?;
        let type_len = narrow(buf.read_lenenc_int()?, "column type width")?;
        let column_type = narrow::<u8>(buf.read_uint(type_len)?, "column type")?;
        let column_type = ColumnType::try_from(column_type)?;
        buf.read_lenenc_int()?;
        let flags = if capabilities.contains(CapabilityFlags::CLIENT_LONG_FLAG) {
            buf.read_u16()?
        } else {
            u16::from(buf.read_u8()?)
        };
        let decimals = buf.read_u8()?;

        Ok(Column {
            org_table: table.clone(),
            table,
            org_name: name.clone(),
            name,
            column_length,
            flags: ColumnFlags::from_bits_truncate(flags),
            decimals,
            ..Column::new(column_type)
        })
    }

    /// Writes the `ColumnDefinition41` layout.
    pub fn write(&self, writer: &mut PacketWriter) -> ParseResult<()> {
        writer.write_lenenc_bytes(b"def")?;
        for text in &[
            &self.schema,
            &self.table,
            &self.org_table,
            &self.name,
            &self.org_name,
        ] {
            writer.write_lenenc_bytes(text)?;
        }
        writer.write_lenenc_int(0x0c)?;
        writer.write_u16(self.character_set)?;
        writer.write_u32(self.column_length)?;
        writer.write_u8(self.column_type as u8)?;
        writer.write_u16(self.flags.bits())?;
        writer.write_u8(self.decimals)?;
        writer.fill(0, 2)
    }

    pub fn schema(&self) -> &[u8] {
        &self.schema
    }

    pub fn table(&self) -> &[u8] {
        &self.table
    }

    pub fn org_table(&self) -> &[u8] {
        &self.org_table
    }

    /// Column name (alias) as sent by the server.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Column name, lossy converted.
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn org_name(&self) -> &[u8] {
        &self.org_name
    }

    pub fn character_set(&self) -> u16 {
        self.character_set
    }

    /// Maximum display length.
    pub fn column_length(&self) -> u32 {
        self.column_length
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// What an OK-like packet is expected to be.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OkPacketKind {
    /// End of rows: EOF, or OK with the `0xfe` header under `CLIENT_DEPRECATE_EOF`.
    ResultSetTerminator,
    /// Plain OK with the `0x00` header.
    Other,
}

/// OK packet. EOF packets are represented by it too (with zero affected rows).
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OkPacket {
    affected_rows: u64,
    last_insert_id: Option<u64>,
    status_flags: StatusFlags,
    warnings: u16,
    info: Option<Bytes>,
    session_state_info: Option<Bytes>,
}

fn non_empty(bytes: &[u8]) -> Option<Bytes> {
    if bytes.is_empty() {
        None
    } else {
        Some(Bytes::copy_from_slice(bytes))
    }
}

/// Parses an OK packet (or an EOF, for `ResultSetTerminator`).
///
/// `status_flags` and `warnings` are present under `CLIENT_PROTOCOL_41`, status flags
/// alone under `CLIENT_TRANSACTIONS`. Under `CLIENT_SESSION_TRACK` the info is
/// length-encoded and followed by session state changes, otherwise the rest of the
/// payload is info.
pub fn parse_ok_packet(
    payload: &[u8],
    capabilities: CapabilityFlags,
    kind: OkPacketKind,
) -> ParseResult<OkPacket> {
    match (kind, payload.first().copied()) {
        (OkPacketKind::Other, Some(OK_HEADER)) => OkPacket::parse(payload, capabilities),
        (OkPacketKind::ResultSetTerminator, Some(EOF_HEADER)) if capabilities.deprecate_eof() => {
            OkPacket::parse(payload, capabilities)
        }
        (OkPacketKind::ResultSetTerminator, Some(EOF_HEADER)) => {
            OkPacket::parse_eof(payload, capabilities)
        }
        _ => Err(ProtocolError::Malformed("invalid OK_Packet header")),
    }
}

impl OkPacket {
    fn parse(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<Self> {
        let mut buf = ParseBuf::new(payload);
        buf.skip(1)?;
        let affected_rows = buf.read_lenenc_int()?;
        let last_insert_id = buf.read_lenenc_int()?;

        let mut ok = OkPacket {
            affected_rows,
            last_insert_id: Some(last_insert_id).filter(|&id| id != 0),
            ..OkPacket::default()
        };

        if capabilities.protocol_41() {
            ok.status_flags = StatusFlags::from_bits_truncate(buf.read_u16()?);
            ok.warnings = buf.read_u16()?;
        } else if capabilities.contains(CapabilityFlags::CLIENT_TRANSACTIONS) {
            ok.status_flags = StatusFlags::from_bits_truncate(buf.read_u16()?);
        }

        if !capabilities.session_track() {
            ok.info = non_empty(buf.read_remaining());
            return Ok(ok);
        }

        if !buf.at_end() {
            ok.info = non_empty(buf.read_lenenc_bytes()?);
        }
        if ok
            .status_flags
            .contains(StatusFlags::SERVER_SESSION_STATE_CHANGED)
        {
            ok.session_state_info = non_empty(buf.read_lenenc_bytes()?);
        }
        Ok(ok)
    }

    fn parse_eof(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<Self> {
        let mut buf = ParseBuf::new(payload);
        buf.skip(1)?;
        let mut eof = OkPacket::default();
        if capabilities.protocol_41() {
            eof.warnings = buf.read_u16()?;
            eof.status_flags = StatusFlags::from_bits_truncate(buf.read_u16()?);
        }
        Ok(eof)
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// `None` if the server reported zero.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    pub fn status_flags(&self) -> StatusFlags {
        self.status_flags
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// `true` if another result of the same response follows.
    pub fn more_results_exist(&self) -> bool {
        self.status_flags
            .contains(StatusFlags::SERVER_MORE_RESULTS_EXISTS)
    }

    /// Human readable status information.
    pub fn info(&self) -> Option<&[u8]> {
        self.info.as_deref()
    }

    /// Raw session state change data (`CLIENT_SESSION_TRACK` only).
    pub fn session_state_info(&self) -> Option<&[u8]> {
        self.session_state_info.as_deref()
    }
}

/// Returns `true` if `payload` terminates a list of rows.
///
/// That is either an EOF packet (`0xfe` header, shorter than 9 bytes) or, under
/// `CLIENT_DEPRECATE_EOF`, an OK packet with the `0xfe` header.
pub fn is_rows_terminator(payload: &[u8], capabilities: CapabilityFlags) -> bool {
    match payload.first() {
        Some(&EOF_HEADER) if capabilities.deprecate_eof() => payload.len() < MAX_PAYLOAD_LEN,
        Some(&EOF_HEADER) => payload.len() < 9,
        _ => false,
    }
}

pub fn parse_rows_terminator(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<OkPacket> {
    parse_ok_packet(payload, capabilities, OkPacketKind::ResultSetTerminator)
}

/// Parses the EOF that follows column definitions (absent under `CLIENT_DEPRECATE_EOF`).
pub fn parse_eof_packet(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<OkPacket> {
    match payload.first() {
        Some(&EOF_HEADER) if payload.len() < 9 => OkPacket::parse_eof(payload, capabilities),
        _ => Err(ProtocolError::Malformed("invalid EOF_Packet header or length")),
    }
}

/// Parses an ERR packet.
///
/// SQL state is read only under `CLIENT_PROTOCOL_41`, and only if the `#` marker is
/// present.
pub fn parse_err_packet(payload: &[u8], capabilities: CapabilityFlags) -> ParseResult<ServerError> {
    let mut buf = ParseBuf::new(payload);
    if buf.read_u8()? != ERR_HEADER {
        return Err(ProtocolError::Malformed("invalid ERR_Packet header"));
    }

    let code = buf.read_u16()?;
    let state = if capabilities.protocol_41() && buf.peek() == Some(b'#') {
        buf.skip(1)?;
        Some(String::from_utf8_lossy(buf.read_bytes(5)?).into_owned())
    } else {
        None
    };
    let message = String::from_utf8_lossy(buf.read_remaining()).into_owned();

    Ok(ServerError {
        code,
        state,
        message,
    })
}

/// Returns the file name of a LOCAL INFILE request.
pub fn parse_local_infile_packet(payload: &[u8]) -> ParseResult<String> {
    match payload.split_first() {
        Some((&LOCAL_INFILE_HEADER, file_name)) => {
            Ok(String::from_utf8_lossy(file_name).into_owned())
        }
        _ => Err(ProtocolError::Malformed("invalid LOCAL_INFILE packet header")),
    }
}

/// Returns the data of an AuthMoreData packet.
pub fn parse_auth_more_data(payload: &[u8]) -> ParseResult<&[u8]> {
    match payload.split_first() {
        Some((&AUTH_MORE_DATA_HEADER, data)) => Ok(data),
        _ => Err(ProtocolError::Malformed("invalid AuthMoreData header")),
    }
}

/// Server asks the client to authenticate with another plugin.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthSwitchRequest {
    auth_plugin: AuthPlugin<'static>,
    plugin_data: Vec<u8>,
}

impl AuthSwitchRequest {
    pub fn auth_plugin(&self) -> &AuthPlugin<'static> {
        &self.auth_plugin
    }

    /// New challenge, without the trailing NUL.
    pub fn plugin_data(&self) -> &[u8] {
        &self.plugin_data
    }

    pub fn into_parts(self) -> (AuthPlugin<'static>, Vec<u8>) {
        (self.auth_plugin, self.plugin_data)
    }
}

pub fn parse_auth_switch_request(payload: &[u8]) -> ParseResult<AuthSwitchRequest> {
    let mut buf = ParseBuf::new(payload);
    if buf.read_u8()? != AUTH_SWITCH_HEADER {
        return Err(ProtocolError::Malformed("invalid AuthSwitchRequest header"));
    }

    let auth_plugin = AuthPlugin::from_bytes(buf.read_null_terminated()?).into_owned();
    let mut plugin_data = buf.read_remaining();
    if let Some((0x00, rest)) = plugin_data.split_last() {
        plugin_data = rest;
    }

    Ok(AuthSwitchRequest {
        auth_plugin,
        plugin_data: plugin_data.to_vec(),
    })
}

/// Initial handshake packet (`HandshakeV10`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HandshakePacket {
    server_version: String,
    connection_id: u32,
    nonce: Vec<u8>,
    capabilities: CapabilityFlags,
    collation: u8,
    status_flags: StatusFlags,
    auth_plugin: Option<AuthPlugin<'static>>,
}

/// Parses the server greeting. Only protocol version 10 is supported.
pub fn parse_handshake_packet(payload: &[u8]) -> ParseResult<HandshakePacket> {
    let mut buf = ParseBuf::new(payload);

    let protocol_version = buf.read_u8()?;
    if protocol_version != PROTOCOL_VERSION_10 {
        return Err(ProtocolError::UnsupportedProtocolVersion(protocol_version));
    }

    let server_version = String::from_utf8_lossy(buf.read_null_terminated()?).into_owned();
    let connection_id = buf.read_u32()?;
    let mut nonce = buf.read_bytes(8)?.to_vec();
    buf.skip(1)?;
    let mut capability_bits = u32::from(buf.read_u16()?);

    let mut greeting = HandshakePacket {
        server_version,
        connection_id,
        nonce: Vec::new(),
        capabilities: CapabilityFlags::from_bits_truncate(capability_bits),
        collation: 0,
        status_flags: StatusFlags::empty(),
        auth_plugin: None,
    };

    // pre-4.1 servers may stop after the lower capability flags
    if buf.at_end() {
        greeting.nonce = nonce;
        return Ok(greeting);
    }

    greeting.collation = buf.read_u8()?;
    greeting.status_flags = StatusFlags::from_bits_truncate(buf.read_u16()?);
    capability_bits |= u32::from(buf.read_u16()?) << 16;
    greeting.capabilities = CapabilityFlags::from_bits_truncate(capability_bits);
    let auth_data_len = buf.read_u8()?;
    buf.skip(10)?;

    if greeting
        .capabilities
        .contains(CapabilityFlags::CLIENT_SECURE_CONNECTION)
        && !buf.at_end()
    {
        // the second part is at least 12 bytes, followed by a NUL
        let len = max(12, i16::from(auth_data_len) - 9) as usize;
        nonce.extend_from_slice(buf.read_bytes(len.min(buf.remaining()))?);
        if buf.peek() == Some(0x00) {
            buf.skip(1)?;
        }
    }
    greeting.nonce = nonce;

    if greeting
        .capabilities
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH)
        && !buf.at_end()
    {
        let rest = buf.read_remaining();
        let name = rest.split(|&x| x == 0x00).next().unwrap_or(rest);
        greeting.auth_plugin = Some(AuthPlugin::from_bytes(name).into_owned());
    }

    Ok(greeting)
}

impl HandshakePacket {
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Server version as `(major, minor, patch)`, with the MariaDB compatibility prefix
    /// skipped.
    pub fn version(&self) -> Option<(u16, u16, u16)> {
        let captures = VERSION_RE.captures(self.server_version.as_bytes())?;
        let part = |i| {
            captures
                .get(i)
                .and_then(|x| parse::<u16, _>(x.as_bytes()).ok())
        };
        Some((part(1)?, part(2)?, part(3)?))
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Both parts of the auth plugin data, concatenated.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    /// Server default collation (lower byte).
    pub fn collation(&self) -> u8 {
        self.collation
    }

    pub fn status_flags(&self) -> StatusFlags {
        self.status_flags
    }

    /// `None` if the server doesn't advertise `CLIENT_PLUGIN_AUTH`.
    pub fn auth_plugin(&self) -> Option<&AuthPlugin<'static>> {
        self.auth_plugin.as_ref()
    }
}

/// `HandshakeResponse41` payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HandshakeResponse {
    data: Vec<u8>,
}

impl HandshakeResponse {
    /// Builds the response for the negotiated `capabilities`.
    ///
    /// Auth response length is length-encoded under
    /// `CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA`, a single byte under
    /// `CLIENT_SECURE_CONNECTION` and NUL-terminated otherwise. Schema is written only
    /// under `CLIENT_CONNECT_WITH_DB`, plugin name only under `CLIENT_PLUGIN_AUTH`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth_response: &[u8],
        user: Option<&str>,
        db_name: Option<&str>,
        auth_plugin: &AuthPlugin<'_>,
        collation: u8,
        max_packet_size: u32,
        capabilities: CapabilityFlags,
        limit: usize,
    ) -> ParseResult<HandshakeResponse> {
        let mut writer = PacketWriter::with_limit(limit);
        writer.write_u32(capabilities.bits())?;
        writer.write_u32(max_packet_size)?;
        writer.write_u8(collation)?;
        writer.fill(0, 23)?;
        writer.write_null_terminated(user.unwrap_or("").as_bytes())?;

        if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            writer.write_lenenc_bytes(auth_response)?;
        } else if capabilities.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
            if auth_response.len() > 0xff {
                return Err(ProtocolError::Malformed("auth response is too long"));
            }
            writer.write_u8(auth_response.len() as u8)?;
            writer.write_bytes(auth_response)?;
        } else {
            writer.write_null_terminated(auth_response)?;
        }

        if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB) {
            writer.write_null_terminated(db_name.unwrap_or("").as_bytes())?;
        }
        if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
            writer.write_null_terminated(auth_plugin.as_bytes())?;
        }

        Ok(HandshakeResponse {
            data: writer.into_inner(),
        })
    }
}

impl AsRef<[u8]> for HandshakeResponse {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// COM_STMT_PREPARE_OK.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

pub fn parse_prepare_ok(payload: &[u8]) -> ParseResult<PrepareOk> {
    let mut buf = ParseBuf::new(payload);
    if buf.read_u8()? != OK_HEADER {
        return Err(ProtocolError::Malformed("invalid COM_STMT_PREPARE_OK status"));
    }

    let statement_id = buf.read_u32()?;
    let num_columns = buf.read_u16()?;
    let num_params = buf.read_u16()?;
    buf.skip(1)?; // filler
    let warnings = if buf.at_end() { 0 } else { buf.read_u16()? };

    Ok(PrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Null bitmap of a binary row (`ServerSide`) or of execute parameters (`ClientSide`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NullBitmap<T> {
    bits: SmallVec<[u8; 8]>,
    side: PhantomData<T>,
}

impl<T: SerializationSide> NullBitmap<T> {
    /// Bitmap length in bytes for `num_columns` columns.
    pub fn bitmap_len(num_columns: usize) -> usize {
        (num_columns + 7 + T::BIT_OFFSET) / 8
    }

    /// All-clear bitmap.
    pub fn new(num_columns: usize) -> Self {
        NullBitmap {
            bits: SmallVec::from_elem(0, Self::bitmap_len(num_columns)),
            side: PhantomData,
        }
    }

    pub fn read(buf: &mut ParseBuf<'_>, num_columns: usize) -> ParseResult<Self> {
        let bits = buf.read_bytes(Self::bitmap_len(num_columns))?;
        Ok(NullBitmap {
            bits: SmallVec::from_slice(bits),
            side: PhantomData,
        })
    }

    fn locate(column_index: usize) -> (usize, u8) {
        let bit = column_index + T::BIT_OFFSET;
        (bit / 8, 1 << (bit % 8))
    }

    pub fn is_null(&self, column_index: usize) -> bool {
        let (byte, mask) = Self::locate(column_index);
        self.bits.get(byte).map_or(false, |x| x & mask != 0)
    }

    pub fn set(&mut self, column_index: usize, is_null: bool) {
        let (byte, mask) = Self::locate(column_index);
        if let Some(byte) = self.bits.get_mut(byte) {
            if is_null {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

/// Payload of a command followed by a single EOF-terminated argument
/// (COM_QUERY, COM_STMT_PREPARE, COM_QUIT).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ComPacket {
    body: Vec<u8>,
}

impl ComPacket {
    pub fn new(command: Command, arg: &[u8], limit: usize) -> ParseResult<Self> {
        let mut writer = PacketWriter::with_limit(limit);
        writer.write_u8(command as u8)?;
        writer.write_bytes(arg)?;
        Ok(ComPacket {
            body: writer.into_inner(),
        })
    }
}

impl AsRef<[u8]> for ComPacket {
    fn as_ref(&self) -> &[u8] {
        &self.body
    }
}

/// Builds COM_STMT_EXECUTE payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ComStmtExecuteRequestBuilder {
    stmt_id: u32,
    long_data_threshold: usize,
    limit: usize,
}

/// COM_STMT_EXECUTE payload plus the indices of the parameters that were left out
/// and have to be sent as long data beforehand.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ComStmtExecuteRequest {
    pub body: Vec<u8>,
    pub long_data: Vec<usize>,
}

impl ComStmtExecuteRequestBuilder {
    pub fn new(stmt_id: u32) -> Self {
        ComStmtExecuteRequestBuilder {
            stmt_id,
            long_data_threshold: usize::MAX,
            limit: MAX_PAYLOAD_LEN,
        }
    }

    /// Byte values longer than `threshold` are omitted from the payload.
    pub fn with_long_data_threshold(mut self, threshold: usize) -> Self {
        self.long_data_threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn is_long_data(&self, value: &Value) -> bool {
        value
            .as_bytes()
            .map_or(false, |x| x.len() > self.long_data_threshold)
    }

    pub fn build(&self, params: &[Value]) -> ParseResult<ComStmtExecuteRequest> {
        let mut writer = PacketWriter::with_limit(self.limit);
        writer.write_u8(Command::COM_STMT_EXECUTE as u8)?;
        writer.write_u32(self.stmt_id)?;
        writer.write_u8(0)?; // CURSOR_TYPE_NO_CURSOR
        writer.write_u32(1)?; // iteration count

        let mut long_data = Vec::new();
        if params.is_empty() {
            return Ok(ComStmtExecuteRequest {
                body: writer.into_inner(),
                long_data,
            });
        }

        let mut bitmap = NullBitmap::<ClientSide>::new(params.len());
        for (i, value) in params.iter().enumerate() {
            bitmap.set(i, value.is_null());
        }
        writer.write_bytes(bitmap.as_bytes())?;
        writer.write_u8(1)?; // new-params-bound

        for value in params {
            let (param_type, unsigned) = value.param_type();
            writer.write_u8(param_type as u8)?;
            writer.write_u8(if unsigned { 0x80 } else { 0x00 })?;
        }

        for (i, value) in params.iter().enumerate() {
            if self.is_long_data(value) {
                long_data.push(i);
            } else {
                value.write_bin(&mut writer)?;
            }
        }

        Ok(ComStmtExecuteRequest {
            body: writer.into_inner(),
            long_data,
        })
    }
}

/// COM_STMT_SEND_LONG_DATA payload carrying one chunk.
pub fn com_stmt_send_long_data(stmt_id: u32, param_index: u16, chunk: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(7 + chunk.len());
    body.push(Command::COM_STMT_SEND_LONG_DATA as u8);
    body.extend_from_slice(&stmt_id.to_le_bytes());
    body.extend_from_slice(&param_index.to_le_bytes());
    body.extend_from_slice(chunk);
    body
}

/// COM_STMT_CLOSE payload.
pub fn com_stmt_close(stmt_id: u32) -> [u8; 5] {
    let id = stmt_id.to_le_bytes();
    [Command::COM_STMT_CLOSE as u8, id[0], id[1], id[2], id[3]]
}
