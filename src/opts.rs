// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_ALLOWED_PACKET, MAX_PAYLOAD_LEN, UTF8MB4_GENERAL_CI};

/// Values longer than this are sent as long data (bytes).
pub const DEFAULT_LONG_DATA_THRESHOLD: usize = 1024;
/// Size of a single COM_STMT_SEND_LONG_DATA chunk (bytes).
pub const DEFAULT_LONG_DATA_CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Session options.
///
/// ```
/// # use mysql_wire::Opts;
/// let opts = Opts::default().with_user(Some("root")).with_db_name(Some("test"));
/// assert_eq!(opts.user(), Some("root"));
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Opts {
    user: Option<String>,
    pass: Option<String>,
    db_name: Option<String>,
    max_allowed_packet: usize,
    collation: u8,
    long_data_threshold: usize,
    long_data_chunk_size: usize,
    multi_statements: bool,
    secure_transport: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            user: None,
            pass: None,
            db_name: None,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            collation: UTF8MB4_GENERAL_CI as u8,
            long_data_threshold: DEFAULT_LONG_DATA_THRESHOLD,
            long_data_chunk_size: DEFAULT_LONG_DATA_CHUNK_SIZE,
            multi_statements: false,
            secure_transport: false,
        }
    }
}

impl Opts {
    pub fn with_user<T: Into<String>>(mut self, user: Option<T>) -> Self {
        self.user = user.map(Into::into);
        self
    }

    pub fn with_pass<T: Into<String>>(mut self, pass: Option<T>) -> Self {
        self.pass = pass.map(Into::into);
        self
    }

    pub fn with_db_name<T: Into<String>>(mut self, db_name: Option<T>) -> Self {
        self.db_name = db_name.map(Into::into);
        self
    }

    pub fn with_max_allowed_packet(mut self, max_allowed_packet: usize) -> Self {
        self.max_allowed_packet = max_allowed_packet;
        self
    }

    pub fn with_collation(mut self, collation: u8) -> Self {
        self.collation = collation;
        self
    }

    pub fn with_long_data_threshold(mut self, long_data_threshold: usize) -> Self {
        self.long_data_threshold = long_data_threshold;
        self
    }

    /// Chunk size is clamped to `1..=MAX_PAYLOAD_LEN - 7` (7 bytes of command header).
    pub fn with_long_data_chunk_size(mut self, long_data_chunk_size: usize) -> Self {
        self.long_data_chunk_size = long_data_chunk_size;
        self
    }

    pub fn with_multi_statements(mut self, multi_statements: bool) -> Self {
        self.multi_statements = multi_statements;
        self
    }

    /// Marks the transport as secure (TLS or a local socket).
    ///
    /// caching_sha2 full authentication then sends the password in clear text
    /// instead of requesting the server's RSA key.
    pub fn with_secure_transport(mut self, secure_transport: bool) -> Self {
        self.secure_transport = secure_transport;
        self
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn pass(&self) -> Option<&str> {
        self.pass.as_deref()
    }

    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn max_allowed_packet(&self) -> usize {
        self.max_allowed_packet
    }

    pub fn collation(&self) -> u8 {
        self.collation
    }

    pub fn long_data_threshold(&self) -> usize {
        self.long_data_threshold
    }

    pub fn long_data_chunk_size(&self) -> usize {
        self.long_data_chunk_size.max(1).min(MAX_PAYLOAD_LEN - 7)
    }

    pub fn multi_statements(&self) -> bool {
        self.multi_statements
    }

    pub fn secure_transport(&self) -> bool {
        self.secure_transport
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_have_defaults() {
        let opts = Opts::default();
        assert_eq!(opts.user(), None);
        assert_eq!(opts.max_allowed_packet(), 16 * 1024 * 1024);
        assert_eq!(opts.collation(), 45);
        assert_eq!(opts.long_data_threshold(), 1024);
        assert_eq!(opts.long_data_chunk_size(), 3 * 1024 * 1024);
        assert!(!opts.multi_statements());
        assert!(!opts.secure_transport());
    }

    #[test]
    fn should_clamp_chunk_size() {
        assert_eq!(Opts::default().with_long_data_chunk_size(0).long_data_chunk_size(), 1);
        assert_eq!(
            Opts::default()
                .with_long_data_chunk_size(usize::MAX)
                .long_data_chunk_size(),
            MAX_PAYLOAD_LEN - 7
        );
    }

    #[test]
    fn should_deserialize_partial_opts() {
        let opts: Opts =
            serde_json::from_str(r#"{"user":"root","db_name":"test","long_data_threshold":16}"#)
                .unwrap();
        assert_eq!(
            opts,
            Opts::default()
                .with_user(Some("root"))
                .with_db_name(Some("test"))
                .with_long_data_threshold(16)
        );
    }
}
