// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Column type to `Value` mapping shared by the text and the binary row decoders.

use chrono::NaiveDate;
use lexical::parse;
use regex::bytes::{Captures, Regex};

use crate::{
    constants::ColumnType::{self, *},
    error::ProtocolError,
    io::ParseBuf,
    packets::Column,
    value::Value,
};

type DecodeResult = std::result::Result<Value, ProtocolError>;

lazy_static::lazy_static! {
    static ref DATE_RE: Regex = {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?: (\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,6}))?)?$").unwrap()
    };
    static ref TIME_RE: Regex = { Regex::new(r"^(-)?(\d+):(\d{2}):(\d{2})(?:\.(\d{1,6}))?$").unwrap() };
}

/// How cells of a column are turned into values.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Coercion {
    /// Integer family. `width` is the binary protocol width in bytes.
    Integer { width: usize, unsigned: bool },
    /// DECIMAL and NEWDECIMAL (sent as strings by both protocols).
    Decimal,
    Float,
    Double,
    Null,
    /// BLOB family, kept as raw bytes.
    Bytes,
    Date,
    Time,
    /// Anything else. Not UTF-8 data falls back to `Value::Bytes`.
    Text,
}

impl Coercion {
    pub fn of(column: &Column) -> Coercion {
        Coercion::of_type(column.column_type(), column.is_unsigned())
    }

    pub fn of_type(column_type: ColumnType, unsigned: bool) -> Coercion {
        match column_type {
            MYSQL_TYPE_TINY => Coercion::Integer { width: 1, unsigned },
            MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => Coercion::Integer { width: 2, unsigned },
            MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG => Coercion::Integer { width: 4, unsigned },
            MYSQL_TYPE_LONGLONG => Coercion::Integer { width: 8, unsigned },
            MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => Coercion::Decimal,
            MYSQL_TYPE_FLOAT => Coercion::Float,
            MYSQL_TYPE_DOUBLE => Coercion::Double,
            MYSQL_TYPE_NULL => Coercion::Null,
            MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB
            | MYSQL_TYPE_BLOB => Coercion::Bytes,
            MYSQL_TYPE_DATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP => Coercion::Date,
            MYSQL_TYPE_TIME => Coercion::Time,
            _ => Coercion::Text,
        }
    }

    /// Decodes a text protocol cell (`None` is the `0xfb` NULL marker).
    pub fn decode_text(&self, cell: Option<&[u8]>) -> DecodeResult {
        let cell = match cell {
            Some(cell) => cell,
            None => return Ok(Value::NULL),
        };

        match *self {
            Coercion::Integer { unsigned: true, .. } => parse::<u64, _>(cell)
                .map(Value::UInt)
                .map_err(|_| ProtocolError::Malformed("invalid integer value")),
            Coercion::Integer { unsigned: false, .. } => parse::<i64, _>(cell)
                .map(Value::Int)
                .map_err(|_| ProtocolError::Malformed("invalid integer value")),
            Coercion::Decimal | Coercion::Float | Coercion::Double => parse_double(cell),
            Coercion::Null => Ok(Value::NULL),
            Coercion::Bytes => Ok(Value::Bytes(cell.into())),
            Coercion::Date => Ok(DATE_RE
                .captures(cell)
                .and_then(|captures| date_from_captures(&captures))
                .unwrap_or(Value::NULL)),
            Coercion::Time => Ok(TIME_RE
                .captures(cell)
                .and_then(|captures| time_from_captures(&captures))
                .unwrap_or(Value::NULL)),
            Coercion::Text => Ok(text_or_bytes(cell)),
        }
    }

    /// Decodes a non-NULL binary protocol value at the cursor.
    pub fn decode_binary(&self, buf: &mut ParseBuf<'_>) -> DecodeResult {
        match *self {
            Coercion::Integer { width, unsigned } => {
                if unsigned {
                    buf.read_uint(width).map(Value::UInt)
                } else {
                    buf.read_int(width).map(Value::Int)
                }
            }
            Coercion::Float => buf.read_f32().map(Value::Float),
            Coercion::Double => buf.read_f64().map(Value::Double),
            Coercion::Decimal => parse_double(buf.read_lenenc_bytes()?),
            Coercion::Null => Ok(Value::NULL),
            Coercion::Bytes => Ok(Value::Bytes(buf.read_lenenc_bytes()?.into())),
            Coercion::Date => binary_date(buf.read_lenenc_bytes()?),
            Coercion::Time => binary_time(buf.read_lenenc_bytes()?),
            Coercion::Text => Ok(text_or_bytes(buf.read_lenenc_bytes()?)),
        }
    }
}

fn parse_double(cell: &[u8]) -> DecodeResult {
    parse::<f64, _>(cell)
        .map(Value::Double)
        .map_err(|_| ProtocolError::Malformed("invalid floating point value"))
}

fn text_or_bytes(cell: &[u8]) -> Value {
    match std::str::from_utf8(cell) {
        Ok(text) => Value::Text(text.into()),
        Err(_) => Value::Bytes(cell.into()),
    }
}

/// `.5` means 500000 microseconds.
fn parse_micros(digits: &[u8]) -> Option<u32> {
    let micros = parse::<u32, _>(digits).ok()?;
    Some(micros * 10_u32.pow(6 - digits.len() as u32))
}

fn date_value(year: u16, month: u8, day: u8, h: u8, m: u8, s: u8, micros: u32) -> Value {
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .and_then(|date| date.and_hms_micro_opt(u32::from(h), u32::from(m), u32::from(s), micros))
        .map(Value::Date)
        .unwrap_or(Value::NULL)
}

fn date_from_captures(captures: &Captures<'_>) -> Option<Value> {
    let part = |i| match captures.get(i) {
        Some(x) => parse::<u16, _>(x.as_bytes()).ok(),
        None => Some(0),
    };
    let micros = match captures.get(7) {
        Some(x) => parse_micros(x.as_bytes())?,
        None => 0,
    };

    Some(date_value(
        part(1)?,
        part(2)? as u8,
        part(3)? as u8,
        part(4)? as u8,
        part(5)? as u8,
        part(6)? as u8,
        micros,
    ))
}

fn time_from_captures(captures: &Captures<'_>) -> Option<Value> {
    let part = |i| captures.get(i).and_then(|x| parse::<u32, _>(x.as_bytes()).ok());
    let is_neg = captures.get(1).is_some();
    let hours = part(2)?;
    let micros = match captures.get(5) {
        Some(x) => parse_micros(x.as_bytes())?,
        None => 0,
    };

    Some(Value::Time(
        is_neg,
        hours / 24,
        (hours % 24) as u8,
        part(3)? as u8,
        part(4)? as u8,
        micros,
    ))
}

fn binary_date(bytes: &[u8]) -> DecodeResult {
    let mut buf = ParseBuf::new(bytes);
    match bytes.len() {
        // zero date
        0 => Ok(Value::NULL),
        4 | 7 | 11 => {
            let year = buf.read_u16()?;
            let month = buf.read_u8()?;
            let day = buf.read_u8()?;
            let (h, m, s) = if bytes.len() >= 7 {
                (buf.read_u8()?, buf.read_u8()?, buf.read_u8()?)
            } else {
                (0, 0, 0)
            };
            let micros = if bytes.len() == 11 { buf.read_u32()? } else { 0 };
            Ok(date_value(year, month, day, h, m, s, micros))
        }
        _ => Err(ProtocolError::Malformed("invalid binary date length")),
    }
}

fn binary_time(bytes: &[u8]) -> DecodeResult {
    let mut buf = ParseBuf::new(bytes);
    match bytes.len() {
        0 => Ok(Value::Time(false, 0, 0, 0, 0, 0)),
        8 | 12 => {
            let is_neg = buf.read_u8()? == 1;
            let days = buf.read_u32()?;
            let (h, m, s) = (buf.read_u8()?, buf.read_u8()?, buf.read_u8()?);
            let micros = if bytes.len() == 12 { buf.read_u32()? } else { 0 };
            Ok(Value::Time(is_neg, days, h, m, s, micros))
        }
        _ => Err(ProtocolError::Malformed("invalid binary time length")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::ColumnFlags;

    fn text(column_type: ColumnType, cell: &[u8]) -> Value {
        Coercion::of_type(column_type, false)
            .decode_text(Some(cell))
            .unwrap()
    }

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, us: u32) -> Value {
        Value::Date(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_micro_opt(h, mi, s, us)
                .unwrap(),
        )
    }

    #[test]
    fn should_pick_coercion_by_type_and_flags() {
        let column = Column::new(MYSQL_TYPE_LONG).with_flags(ColumnFlags::UNSIGNED_FLAG);
        assert_eq!(
            Coercion::of(&column),
            Coercion::Integer {
                width: 4,
                unsigned: true
            }
        );
        assert_eq!(
            Coercion::of(&Column::new(MYSQL_TYPE_YEAR)),
            Coercion::Integer {
                width: 2,
                unsigned: false
            }
        );
        assert_eq!(Coercion::of(&Column::new(MYSQL_TYPE_BLOB)), Coercion::Bytes);
        assert_eq!(
            Coercion::of(&Column::new(MYSQL_TYPE_VAR_STRING)),
            Coercion::Text
        );
        assert_eq!(
            Coercion::of(&Column::new(MYSQL_TYPE_NEWDECIMAL)),
            Coercion::Decimal
        );
    }

    #[test]
    fn should_decode_text_cells() {
        assert_eq!(text(MYSQL_TYPE_LONG, b"-42"), Value::Int(-42));
        assert_eq!(
            Coercion::of_type(MYSQL_TYPE_LONGLONG, true)
                .decode_text(Some(b"18446744073709551615"))
                .unwrap(),
            Value::UInt(u64::MAX)
        );
        assert_eq!(text(MYSQL_TYPE_NEWDECIMAL, b"1.50"), Value::Double(1.5));
        assert_eq!(text(MYSQL_TYPE_FLOAT, b"0.25"), Value::Double(0.25));
        assert_eq!(text(MYSQL_TYPE_BLOB, b"\xff\x00"), Value::Bytes(vec![0xff, 0]));
        assert_eq!(text(MYSQL_TYPE_VAR_STRING, b"alice"), Value::Text("alice".into()));
        assert_eq!(text(MYSQL_TYPE_STRING, b"\xff"), Value::Bytes(vec![0xff]));
        assert_eq!(text(MYSQL_TYPE_NULL, b"x"), Value::NULL);
        assert_eq!(
            Coercion::Text.decode_text(None).unwrap(),
            Value::NULL
        );
        assert!(Coercion::of_type(MYSQL_TYPE_LONG, false)
            .decode_text(Some(b"abc"))
            .is_err());
    }

    #[test]
    fn should_decode_text_dates() {
        assert_eq!(
            text(MYSQL_TYPE_DATE, b"2010-10-17"),
            datetime(2010, 10, 17, 0, 0, 0, 0)
        );
        assert_eq!(
            text(MYSQL_TYPE_DATETIME, b"2010-10-17 19:27:30.5"),
            datetime(2010, 10, 17, 19, 27, 30, 500_000)
        );
        assert_eq!(text(MYSQL_TYPE_TIMESTAMP, b"0000-00-00 00:00:00"), Value::NULL);
        assert_eq!(text(MYSQL_TYPE_DATE, b"2010-02-30"), Value::NULL);
        assert_eq!(text(MYSQL_TYPE_DATE, b"yesterday"), Value::NULL);
    }

    #[test]
    fn should_decode_text_times() {
        assert_eq!(
            text(MYSQL_TYPE_TIME, b"-838:59:59"),
            Value::Time(true, 34, 22, 59, 59, 0)
        );
        assert_eq!(
            text(MYSQL_TYPE_TIME, b"12:00:01.000002"),
            Value::Time(false, 0, 12, 0, 1, 2)
        );
    }

    #[test]
    fn should_decode_binary_values() {
        let decode = |coercion: Coercion, bytes: &[u8]| {
            let mut buf = ParseBuf::new(bytes);
            let value = coercion.decode_binary(&mut buf).unwrap();
            assert!(buf.at_end());
            value
        };

        assert_eq!(
            decode(Coercion::of_type(MYSQL_TYPE_TINY, false), b"\xff"),
            Value::Int(-1)
        );
        assert_eq!(
            decode(Coercion::of_type(MYSQL_TYPE_TINY, true), b"\xff"),
            Value::UInt(255)
        );
        assert_eq!(
            decode(Coercion::of_type(MYSQL_TYPE_INT24, false), b"\x01\x00\x00\x00"),
            Value::Int(1)
        );
        assert_eq!(
            decode(Coercion::Float, &1.5_f32.to_le_bytes()),
            Value::Float(1.5)
        );
        assert_eq!(
            decode(Coercion::Double, &1.5_f64.to_le_bytes()),
            Value::Double(1.5)
        );
        assert_eq!(decode(Coercion::Decimal, b"\x0410.5"), Value::Double(10.5));
        assert_eq!(
            decode(Coercion::Date, b"\x0b\xda\x07\x0a\x11\x13\x1b\x1e\x01\x00\x00\x00"),
            datetime(2010, 10, 17, 19, 27, 30, 1)
        );
        assert_eq!(
            decode(Coercion::Date, b"\x04\xda\x07\x0a\x11"),
            datetime(2010, 10, 17, 0, 0, 0, 0)
        );
        assert_eq!(decode(Coercion::Date, b"\x00"), Value::NULL);
        assert_eq!(
            decode(Coercion::Time, b"\x08\x01\x01\x00\x00\x00\x02\x03\x04"),
            Value::Time(true, 1, 2, 3, 4, 0)
        );
        assert_eq!(decode(Coercion::Text, b"\x02hi"), Value::Text("hi".into()));

        let mut buf = ParseBuf::new(b"\x03\x00\x00\x00");
        assert!(Coercion::Date.decode_binary(&mut buf).is_err());
    }
}
