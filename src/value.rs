// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use std::borrow::Cow;

use crate::{
    constants::ColumnType,
    error::ProtocolError,
    io::{lenenc_str_len, PacketWriter},
};

/// Side of a null-bitmap (client parameters or server rows).
pub trait SerializationSide {
    const BIT_OFFSET: usize;
}

/// Null-bitmap of COM_STMT_EXECUTE parameters.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ClientSide;

impl SerializationSide for ClientSide {
    const BIT_OFFSET: usize = 0;
}

/// Null-bitmap of a binary protocol row (two reserved bits).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ServerSide;

impl SerializationSide for ServerSide {
    const BIT_OFFSET: usize = 2;
}

/// Decoded cell or statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    NULL,
    /// Raw bytes (BLOB family or non UTF-8 text).
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// DATE, DATETIME or TIMESTAMP.
    Date(NaiveDateTime),
    /// TIME as a sign flag (`true` if negative) followed by days, hours, minutes,
    /// seconds and microseconds.
    Time(bool, u32, u8, u8, u8, u32),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::NULL)
    }

    /// Text or bytes payload, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(text) => Some(Cow::Borrowed(text)),
            Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }

    /// Parameter type tag and unsigned flag used in COM_STMT_EXECUTE.
    pub fn param_type(&self) -> (ColumnType, bool) {
        match self {
            Value::NULL => (ColumnType::MYSQL_TYPE_NULL, false),
            Value::Bytes(_) | Value::Text(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, false),
            Value::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, false),
            Value::UInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, true),
            Value::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, false),
            Value::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, false),
            Value::Date(_) => (ColumnType::MYSQL_TYPE_DATETIME, false),
            Value::Time(..) => (ColumnType::MYSQL_TYPE_TIME, false),
        }
    }

    /// Length of the binary protocol representation.
    pub fn bin_len(&self) -> usize {
        match self {
            Value::NULL => 0,
            Value::Bytes(bytes) => lenenc_str_len(bytes),
            Value::Text(text) => lenenc_str_len(text.as_bytes()),
            Value::Int(_) | Value::UInt(_) | Value::Double(_) => 8,
            Value::Float(_) => 4,
            Value::Date(date) => 1 + date_len(date),
            Value::Time(.., micros) => 1 + time_len(self, *micros),
        }
    }

    /// Writes the binary protocol representation (nothing for `NULL`).
    pub fn write_bin(&self, writer: &mut PacketWriter) -> Result<(), ProtocolError> {
        match self {
            Value::NULL => Ok(()),
            Value::Bytes(bytes) => writer.write_lenenc_bytes(bytes),
            Value::Text(text) => writer.write_lenenc_bytes(text.as_bytes()),
            Value::Int(x) => writer.write_int(*x, 8),
            Value::UInt(x) => writer.write_u64(*x),
            Value::Float(x) => writer.write_f32(*x),
            Value::Double(x) => writer.write_f64(*x),
            Value::Date(date) => {
                let len = date_len(date);
                writer.write_u8(len as u8)?;
                if len >= 4 {
                    writer.write_u16(date.year() as u16)?;
                    writer.write_u8(date.month() as u8)?;
                    writer.write_u8(date.day() as u8)?;
                }
                if len >= 7 {
                    writer.write_u8(date.hour() as u8)?;
                    writer.write_u8(date.minute() as u8)?;
                    writer.write_u8(date.second() as u8)?;
                }
                if len == 11 {
                    writer.write_u32(micros_of(date))?;
                }
                Ok(())
            }
            Value::Time(is_neg, days, hours, minutes, seconds, micros) => {
                let len = time_len(self, *micros);
                writer.write_u8(len as u8)?;
                if len >= 8 {
                    writer.write_u8(*is_neg as u8)?;
                    writer.write_u32(*days)?;
                    writer.write_u8(*hours)?;
                    writer.write_u8(*minutes)?;
                    writer.write_u8(*seconds)?;
                }
                if len == 12 {
                    writer.write_u32(*micros)?;
                }
                Ok(())
            }
        }
    }
}

fn micros_of(date: &NaiveDateTime) -> u32 {
    (date.nanosecond() % 1_000_000_000) / 1000
}

fn date_len(date: &NaiveDateTime) -> usize {
    if micros_of(date) != 0 {
        11
    } else if date.hour() != 0 || date.minute() != 0 || date.second() != 0 {
        7
    } else {
        4
    }
}

fn time_len(value: &Value, micros: u32) -> usize {
    match value {
        Value::Time(_, 0, 0, 0, 0, 0) => 0,
        _ if micros != 0 => 12,
        _ => 8,
    }
}

macro_rules! impl_from_int {
    ($variant:ident: $cast:ty => $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(x: $t) -> Value {
                    Value::$variant(x as $cast)
                }
            }
        )*
    };
}

impl_from_int!(Int: i64 => i8, i16, i32, i64, isize);
impl_from_int!(UInt: u64 => u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(x: f32) -> Value {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Double(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Value {
        Value::Int(x as i64)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(x: &'a str) -> Value {
        Value::Text(x.into())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Value {
        Value::Text(x)
    }
}

impl<'a> From<&'a [u8]> for Value {
    fn from(x: &'a [u8]) -> Value {
        Value::Bytes(x.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(x: Vec<u8>) -> Value {
        Value::Bytes(x)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(x: NaiveDateTime) -> Value {
        Value::Date(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(x: NaiveDate) -> Value {
        Value::Date(x.and_time(NaiveTime::MIN))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(x: Option<T>) -> Value {
        x.map(Into::into).unwrap_or(Value::NULL)
    }
}
