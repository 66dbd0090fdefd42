// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Client capability set and negotiation.

use crate::{constants::CapabilityFlags, opts::Opts};

/// Capabilities this client always advertises.
pub const BASE_CLIENT_FLAGS: CapabilityFlags = CapabilityFlags::from_bits_truncate(
    CapabilityFlags::CLIENT_LONG_PASSWORD.bits()
        | CapabilityFlags::CLIENT_LONG_FLAG.bits()
        | CapabilityFlags::CLIENT_PROTOCOL_41.bits()
        | CapabilityFlags::CLIENT_TRANSACTIONS.bits()
        | CapabilityFlags::CLIENT_SECURE_CONNECTION.bits()
        | CapabilityFlags::CLIENT_MULTI_RESULTS.bits()
        | CapabilityFlags::CLIENT_PS_MULTI_RESULTS.bits()
        | CapabilityFlags::CLIENT_PLUGIN_AUTH.bits()
        | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA.bits()
        | CapabilityFlags::CLIENT_DEPRECATE_EOF.bits(),
);

/// Capabilities requested for the given options.
///
/// `CLIENT_CONNECT_WITH_DB` is requested only if a schema is given.
pub fn client_flags(opts: &Opts) -> CapabilityFlags {
    let mut flags = BASE_CLIENT_FLAGS;
    if opts.db_name().is_some() {
        flags.insert(CapabilityFlags::CLIENT_CONNECT_WITH_DB);
    }
    if opts.multi_statements() {
        flags.insert(CapabilityFlags::CLIENT_MULTI_STATEMENTS);
    }
    flags
}

/// Negotiated capabilities: the intersection of both sides.
pub fn negotiate(server: CapabilityFlags, client: CapabilityFlags) -> CapabilityFlags {
    server & client
}

/// Field-presence queries over a negotiated capability set.
pub trait CapabilitiesExt {
    /// OK/EOF packets carry status flags and warnings, ERR packets a SQL state.
    fn protocol_41(&self) -> bool;
    /// Resultsets end with an OK packet instead of an EOF packet.
    fn deprecate_eof(&self) -> bool;
    /// OK packets carry length-encoded info and session state.
    fn session_track(&self) -> bool;
}

impl CapabilitiesExt for CapabilityFlags {
    fn protocol_41(&self) -> bool {
        self.contains(CapabilityFlags::CLIENT_PROTOCOL_41)
    }

    fn deprecate_eof(&self) -> bool {
        self.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn session_track(&self) -> bool {
        self.contains(CapabilityFlags::CLIENT_SESSION_TRACK)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_request_connect_with_db_only_with_schema() {
        let flags = client_flags(&Opts::default());
        assert!(!flags.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
        assert!(!flags.contains(CapabilityFlags::CLIENT_MULTI_STATEMENTS));
        assert_eq!(flags, BASE_CLIENT_FLAGS);

        let opts = Opts::default()
            .with_db_name(Some("test"))
            .with_multi_statements(true);
        let flags = client_flags(&opts);
        assert!(flags.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
        assert!(flags.contains(CapabilityFlags::CLIENT_MULTI_STATEMENTS));
    }

    #[test]
    fn should_negotiate_intersection() {
        let server = CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_SSL
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_SESSION_TRACK;
        let negotiated = negotiate(server, BASE_CLIENT_FLAGS);

        assert_eq!(
            negotiated,
            CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_SECURE_CONNECTION
        );
        assert!(negotiated.protocol_41());
        assert!(!negotiated.deprecate_eof());
        assert!(!negotiated.session_track());

        // requested schema does not survive a server without CONNECT_WITH_DB
        let client = client_flags(&Opts::default().with_db_name(Some("test")));
        assert!(!negotiate(server, client).contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
    }
}
