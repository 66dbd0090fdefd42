// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Sans-IO MySql client protocol.
//!
//! A [`Session`] turns inbound byte chunks into callbacks and writes outbound packets to a
//! [`Transport`]. It performs the connection phase (`mysql_native_password` and
//! `caching_sha2_password`, including auth switches), then runs text queries, prepared
//! statements, long data and statement deallocation one at a time in submission order.
//!
//! ```
//! use mysql_wire::{Opts, Session, SessionState, Transport};
//!
//! struct Sink(Vec<u8>);
//!
//! impl Transport for Sink {
//!     fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
//!         self.0.extend_from_slice(bytes);
//!         Ok(())
//!     }
//!
//!     fn close(&mut self) {}
//! }
//!
//! let opts = Opts::default().with_user(Some("root"));
//! let mut session = Session::connect(opts, Sink(Vec::new()), |result| {
//!     println!("connected: {:?}", result);
//! });
//! session.query("SELECT 1", |result| println!("{:?}", result));
//!
//! // nothing is written until the server greets us
//! assert!(session.transport().0.is_empty());
//! assert_eq!(session.state(), SessionState::Connecting);
//! ```

pub mod auth;
pub mod capabilities;
pub mod coercion;
pub mod constants;
pub mod error;
pub mod framer;
pub mod io;
pub mod ops;
pub mod opts;
pub mod packets;
pub mod pipeline;
pub mod resultset;
pub mod scramble;
pub mod session;
pub mod statement;
pub mod transport;
pub mod value;

pub use crate::{
    error::{Error, Result},
    opts::Opts,
    resultset::{QueryResult, Response, ResultSet, Row},
    session::{CloseMode, Session, SessionState},
    statement::Statement,
    transport::{channel, Transport, TransportEvent},
    value::Value,
};
