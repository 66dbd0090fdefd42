// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::convert::TryFrom;

/// Maximum payload length of a single physical packet.
pub const MAX_PAYLOAD_LEN: usize = 16_777_215;

/// Server limit on the number of columns in a table or resultset.
pub const MAX_COLUMNS: usize = 4096;

/// Default value of the `max_allowed_packet` client option.
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 16 * 1024 * 1024;

pub const UTF8_GENERAL_CI: u16 = 0x21;
pub const UTF8MB4_GENERAL_CI: u16 = 0x2d;

/// First payload byte of an OK packet.
pub const OK_HEADER: u8 = 0x00;
/// First payload byte of an AuthMoreData packet.
pub const AUTH_MORE_DATA_HEADER: u8 = 0x01;
/// First payload byte of a LOCAL INFILE request (and a NULL cell in a text row).
pub const LOCAL_INFILE_HEADER: u8 = 0xfb;
pub const NULL_MARKER: u8 = 0xfb;
/// First payload byte of an EOF packet (or of an AuthSwitchRequest during a handshake).
pub const EOF_HEADER: u8 = 0xfe;
pub const AUTH_SWITCH_HEADER: u8 = 0xfe;
/// First payload byte of an ERR packet.
pub const ERR_HEADER: u8 = 0xff;

/// Protocol version of the only supported initial handshake layout.
pub const PROTOCOL_VERSION_10: u8 = 10;

bitflags::bitflags! {
    /// Client and server capability flags.
    #[derive(Default)]
    pub struct CapabilityFlags: u32 {
        /// Use the improved version of Old Password Authentication.
        const CLIENT_LONG_PASSWORD = 0x0000_0001;
        /// Send found rows instead of affected rows in EOF_Packet.
        const CLIENT_FOUND_ROWS = 0x0000_0002;
        /// Get all column flags (longer flags in Protocol::ColumnDefinition320).
        const CLIENT_LONG_FLAG = 0x0000_0004;
        /// Database (schema) name can be specified on connect in Handshake Response Packet.
        const CLIENT_CONNECT_WITH_DB = 0x0000_0008;
        /// Don't allow database.table.column.
        const CLIENT_NO_SCHEMA = 0x0000_0010;
        /// Compression protocol supported.
        const CLIENT_COMPRESS = 0x0000_0020;
        /// Special handling of ODBC behavior.
        const CLIENT_ODBC = 0x0000_0040;
        /// Can use LOAD DATA LOCAL.
        const CLIENT_LOCAL_FILES = 0x0000_0080;
        /// Ignore spaces before '('.
        const CLIENT_IGNORE_SPACE = 0x0000_0100;
        /// New 4.1 protocol.
        const CLIENT_PROTOCOL_41 = 0x0000_0200;
        /// This is an interactive client.
        const CLIENT_INTERACTIVE = 0x0000_0400;
        /// Use SSL encryption for the session.
        const CLIENT_SSL = 0x0000_0800;
        /// Client only flag.
        const CLIENT_IGNORE_SIGPIPE = 0x0000_1000;
        /// Client knows about transactions (status flags in EOF_Packet).
        const CLIENT_TRANSACTIONS = 0x0000_2000;
        /// Old flag for 4.1 protocol.
        const CLIENT_RESERVED = 0x0000_4000;
        /// Old flag for 4.1 authentication (Authentication::Native41).
        const CLIENT_SECURE_CONNECTION = 0x0000_8000;
        /// Enable/disable multi-stmt support.
        const CLIENT_MULTI_STATEMENTS = 0x0001_0000;
        /// Enable/disable multi-results.
        const CLIENT_MULTI_RESULTS = 0x0002_0000;
        /// Multi-results and OUT parameters in PS-protocol.
        const CLIENT_PS_MULTI_RESULTS = 0x0004_0000;
        /// Client supports plugin authentication.
        const CLIENT_PLUGIN_AUTH = 0x0008_0000;
        /// Client supports connection attributes.
        const CLIENT_CONNECT_ATTRS = 0x0010_0000;
        /// Length of auth response data in Protocol::HandshakeResponse41
        /// is a length-encoded integer.
        const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
        /// Client can handle expired passwords.
        const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS = 0x0040_0000;
        /// Server may send session-state change data after an OK_Packet.
        const CLIENT_SESSION_TRACK = 0x0080_0000;
        /// Client expects an OK_Packet (instead of EOF_Packet) after a resultset.
        const CLIENT_DEPRECATE_EOF = 0x0100_0000;
    }
}

bitflags::bitflags! {
    /// Server status flags carried by OK and EOF packets.
    #[derive(Default)]
    pub struct StatusFlags: u16 {
        /// Is raised when a multi-statement transaction has been started.
        const SERVER_STATUS_IN_TRANS = 0x0001;
        /// Status flag indicating that autocommit is enabled.
        const SERVER_STATUS_AUTOCOMMIT = 0x0002;
        /// Multi query - next query exists.
        const SERVER_MORE_RESULTS_EXISTS = 0x0008;
        const SERVER_STATUS_NO_GOOD_INDEX_USED = 0x0010;
        const SERVER_STATUS_NO_INDEX_USED = 0x0020;
        /// The server was able to fulfill the client's request and opened a read-only
        /// non-scrollable cursor for a query.
        const SERVER_STATUS_CURSOR_EXISTS = 0x0040;
        /// The last row of a cursor-backed result set has been sent.
        const SERVER_STATUS_LAST_ROW_SENT = 0x0080;
        const SERVER_STATUS_DB_DROPPED = 0x0100;
        const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
        /// Sent to the client if after a prepared statement reprepare we discovered that
        /// the new statement returns a different number of result set columns.
        const SERVER_STATUS_METADATA_CHANGED = 0x0400;
        const SERVER_QUERY_WAS_SLOW = 0x0800;
        /// To mark ResultSet containing output parameter values.
        const SERVER_PS_OUT_PARAMS = 0x1000;
        /// Set at the same time as SERVER_STATUS_IN_TRANS if the started
        /// multi-statement transaction is a read-only transaction.
        const SERVER_STATUS_IN_TRANS_READONLY = 0x2000;
        /// Session state has changed on the server because of the execution
        /// of the last statement.
        const SERVER_SESSION_STATE_CHANGED = 0x4000;
    }
}

bitflags::bitflags! {
    /// Column definition flags.
    pub struct ColumnFlags: u16 {
        /// Field can't be NULL.
        const NOT_NULL_FLAG = 0x0001;
        /// Field is part of a primary key.
        const PRI_KEY_FLAG = 0x0002;
        /// Field is part of a unique key.
        const UNIQUE_KEY_FLAG = 0x0004;
        /// Field is part of a key.
        const MULTIPLE_KEY_FLAG = 0x0008;
        /// Field is a blob.
        const BLOB_FLAG = 0x0010;
        /// Field is unsigned.
        const UNSIGNED_FLAG = 0x0020;
        /// Field is zerofill.
        const ZEROFILL_FLAG = 0x0040;
        /// Field is binary.
        const BINARY_FLAG = 0x0080;
        /// Field is an enum.
        const ENUM_FLAG = 0x0100;
        /// Field is a autoincrement field.
        const AUTO_INCREMENT_FLAG = 0x0200;
        /// Field is a timestamp.
        const TIMESTAMP_FLAG = 0x0400;
        /// Field is a set.
        const SET_FLAG = 0x0800;
        /// Field doesn't have default value.
        const NO_DEFAULT_VALUE_FLAG = 0x1000;
        /// Field is set to NOW on UPDATE.
        const ON_UPDATE_NOW_FLAG = 0x2000;
        /// Intern; Part of some key.
        const PART_KEY_FLAG = 0x4000;
        /// Field is num (for clients).
        const NUM_FLAG = 0x8000;
    }
}

/// MySql command codes (first payload byte of a client request).
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum Command {
    COM_SLEEP = 0x00,
    COM_QUIT = 0x01,
    COM_INIT_DB = 0x02,
    COM_QUERY = 0x03,
    COM_FIELD_LIST = 0x04,
    COM_PING = 0x0e,
    COM_CHANGE_USER = 0x11,
    COM_STMT_PREPARE = 0x16,
    COM_STMT_EXECUTE = 0x17,
    COM_STMT_SEND_LONG_DATA = 0x18,
    COM_STMT_CLOSE = 0x19,
    COM_STMT_RESET = 0x1a,
    COM_SET_OPTION = 0x1b,
    COM_STMT_FETCH = 0x1c,
    COM_RESET_CONNECTION = 0x1f,
}

/// Type of a column or of a prepared statement parameter.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0,
    MYSQL_TYPE_TINY,
    MYSQL_TYPE_SHORT,
    MYSQL_TYPE_LONG,
    MYSQL_TYPE_FLOAT,
    MYSQL_TYPE_DOUBLE,
    MYSQL_TYPE_NULL,
    MYSQL_TYPE_TIMESTAMP,
    MYSQL_TYPE_LONGLONG,
    MYSQL_TYPE_INT24,
    MYSQL_TYPE_DATE,
    MYSQL_TYPE_TIME,
    MYSQL_TYPE_DATETIME,
    MYSQL_TYPE_YEAR,
    MYSQL_TYPE_NEWDATE,
    MYSQL_TYPE_VARCHAR,
    MYSQL_TYPE_BIT,
    MYSQL_TYPE_TIMESTAMP2,
    MYSQL_TYPE_DATETIME2,
    MYSQL_TYPE_TIME2,
    MYSQL_TYPE_JSON = 245,
    MYSQL_TYPE_NEWDECIMAL = 246,
    MYSQL_TYPE_ENUM = 247,
    MYSQL_TYPE_SET = 248,
    MYSQL_TYPE_TINY_BLOB = 249,
    MYSQL_TYPE_MEDIUM_BLOB = 250,
    MYSQL_TYPE_LONG_BLOB = 251,
    MYSQL_TYPE_BLOB = 252,
    MYSQL_TYPE_VAR_STRING = 253,
    MYSQL_TYPE_STRING = 254,
    MYSQL_TYPE_GEOMETRY = 255,
}

impl TryFrom<u8> for ColumnType {
    type Error = UnknownColumnType;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use ColumnType::*;

        let column_type = match byte {
            0x00 => MYSQL_TYPE_DECIMAL,
            0x01 => MYSQL_TYPE_TINY,
            0x02 => MYSQL_TYPE_SHORT,
            0x03 => MYSQL_TYPE_LONG,
            0x04 => MYSQL_TYPE_FLOAT,
            0x05 => MYSQL_TYPE_DOUBLE,
            0x06 => MYSQL_TYPE_NULL,
            0x07 => MYSQL_TYPE_TIMESTAMP,
            0x08 => MYSQL_TYPE_LONGLONG,
            0x09 => MYSQL_TYPE_INT24,
            0x0a => MYSQL_TYPE_DATE,
            0x0b => MYSQL_TYPE_TIME,
            0x0c => MYSQL_TYPE_DATETIME,
            0x0d => MYSQL_TYPE_YEAR,
            0x0e => MYSQL_TYPE_NEWDATE,
            0x0f => MYSQL_TYPE_VARCHAR,
            0x10 => MYSQL_TYPE_BIT,
            0x11 => MYSQL_TYPE_TIMESTAMP2,
            0x12 => MYSQL_TYPE_DATETIME2,
            0x13 => MYSQL_TYPE_TIME2,
            0xf5 => MYSQL_TYPE_JSON,
            0xf6 => MYSQL_TYPE_NEWDECIMAL,
            0xf7 => MYSQL_TYPE_ENUM,
            0xf8 => MYSQL_TYPE_SET,
            0xf9 => MYSQL_TYPE_TINY_BLOB,
            0xfa => MYSQL_TYPE_MEDIUM_BLOB,
            0xfb => MYSQL_TYPE_LONG_BLOB,
            0xfc => MYSQL_TYPE_BLOB,
            0xfd => MYSQL_TYPE_VAR_STRING,
            0xfe => MYSQL_TYPE_STRING,
            0xff => MYSQL_TYPE_GEOMETRY,
            other => return Err(UnknownColumnType(other)),
        };

        Ok(column_type)
    }
}

/// Returned by `ColumnType::try_from` for a byte that names no column type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("unknown column type 0x{0:02x}")]
pub struct UnknownColumnType(pub u8);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_convert_column_type() {
        assert_eq!(ColumnType::try_from(0x03), Ok(ColumnType::MYSQL_TYPE_LONG));
        assert_eq!(
            ColumnType::try_from(0xfd),
            Ok(ColumnType::MYSQL_TYPE_VAR_STRING)
        );
        assert_eq!(ColumnType::try_from(0x42), Err(UnknownColumnType(0x42)));
        assert_eq!(ColumnType::MYSQL_TYPE_NEWDECIMAL as u8, 0xf6);
    }

    #[test]
    fn should_match_wire_capability_bits() {
        assert_eq!(CapabilityFlags::CLIENT_PROTOCOL_41.bits(), 0x200);
        assert_eq!(CapabilityFlags::CLIENT_SECURE_CONNECTION.bits(), 0x8000);
        assert_eq!(CapabilityFlags::CLIENT_PLUGIN_AUTH.bits(), 0x80000);
        assert_eq!(
            CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA.bits(),
            0x200000
        );
        assert_eq!(CapabilityFlags::CLIENT_DEPRECATE_EOF.bits(), 0x1000000);
        assert_eq!(CapabilityFlags::CLIENT_CONNECT_WITH_DB.bits(), 0x8);
        assert_eq!(CapabilityFlags::CLIENT_SESSION_TRACK.bits(), 0x800000);
        assert_eq!(CapabilityFlags::CLIENT_TRANSACTIONS.bits(), 0x2000);
    }
}
