// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Authentication plugins.

use std::{borrow::Cow, fmt};

use crate::{
    error::AuthError,
    scramble::{scramble_native, scramble_sha256},
};

/// Client asks for the server public key during caching_sha2 full authentication.
pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
/// Server has the password hash cached, OK packet follows.
pub const FAST_AUTH_SUCCESS: u8 = 0x03;
/// Server needs the clear text (or RSA encrypted) password.
pub const PERFORM_FULL_AUTH: u8 = 0x04;

/// Plugins this crate can answer, keyed by their wire name.
const KNOWN_PLUGINS: [(&[u8], AuthPlugin<'static>); 2] = [
    (b"mysql_native_password", AuthPlugin::MysqlNativePassword),
    (b"caching_sha2_password", AuthPlugin::CachingSha2Password),
];

/// Authentication plugin named by the server.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum AuthPlugin<'a> {
    /// SHA1 based scramble.
    MysqlNativePassword,
    /// SHA256 based scramble with fast and full authentication.
    CachingSha2Password,
    /// Anything else; can't be answered.
    Other(Cow<'a, [u8]>),
}

impl<'a> AuthPlugin<'a> {
    pub fn from_bytes(name: &'a [u8]) -> AuthPlugin<'a> {
        KNOWN_PLUGINS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, plugin)| plugin.clone())
            .unwrap_or_else(|| AuthPlugin::Other(Cow::Borrowed(name)))
    }

    /// Wire name, as sent in the handshake response.
    pub fn as_bytes(&self) -> &[u8] {
        if let AuthPlugin::Other(name) = self {
            return name;
        }
        KNOWN_PLUGINS
            .iter()
            .find(|(_, plugin)| plugin == self)
            .map(|(known, _)| *known)
            .unwrap_or_default()
    }

    pub fn into_owned(self) -> AuthPlugin<'static> {
        match self {
            AuthPlugin::Other(name) => AuthPlugin::Other(Cow::Owned(name.into_owned())),
            AuthPlugin::MysqlNativePassword => AuthPlugin::MysqlNativePassword,
            AuthPlugin::CachingSha2Password => AuthPlugin::CachingSha2Password,
        }
    }
}

impl fmt::Display for AuthPlugin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Produces the auth response for `plugin`.
///
/// An empty credential yields an empty response. Returns `None` if the plugin
/// is not supported.
pub fn authenticate(plugin: &AuthPlugin<'_>, challenge: &[u8], credential: &[u8]) -> Option<Vec<u8>> {
    let response = match plugin {
        AuthPlugin::MysqlNativePassword => scramble_native(challenge, credential),
        AuthPlugin::CachingSha2Password => scramble_sha256(challenge, credential),
        AuthPlugin::Other(_) => return None,
    };
    Some(response.unwrap_or_default())
}

/// Plugin and challenge of the current authentication round.
///
/// Replaced as a whole on an auth switch.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthContext<'a> {
    plugin: AuthPlugin<'a>,
    challenge: Cow<'a, [u8]>,
}

impl<'a> AuthContext<'a> {
    pub fn new(plugin: AuthPlugin<'a>, challenge: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            plugin,
            challenge: challenge.into(),
        }
    }

    pub fn plugin(&self) -> &AuthPlugin<'a> {
        &self.plugin
    }

    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    /// Scrambles `credential` against the challenge.
    pub fn respond(&self, credential: &[u8]) -> Result<Vec<u8>, AuthError> {
        authenticate(&self.plugin, &self.challenge, credential)
            .ok_or_else(|| AuthError::UnsupportedPlugin(self.plugin.to_string()))
    }

    pub fn into_owned(self) -> AuthContext<'static> {
        AuthContext {
            plugin: self.plugin.into_owned(),
            challenge: self.challenge.into_owned().into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CHALLENGE: &[u8] = b"zQg4i6oNy6=rHN/>-b)A";

    #[test]
    fn should_parse_plugin_names() {
        assert_eq!(
            AuthPlugin::from_bytes(b"mysql_native_password"),
            AuthPlugin::MysqlNativePassword
        );
        assert_eq!(
            AuthPlugin::from_bytes(b"caching_sha2_password"),
            AuthPlugin::CachingSha2Password
        );
        let other = AuthPlugin::from_bytes(b"auth_gssapi_client");
        assert_eq!(other.as_bytes(), b"auth_gssapi_client");
        assert_eq!(other.to_string(), "auth_gssapi_client");
    }

    #[test]
    fn should_authenticate() {
        let native = authenticate(&AuthPlugin::MysqlNativePassword, CHALLENGE, b"password");
        assert_eq!(native.map(|x| x.len()), Some(20));

        let sha2 = authenticate(&AuthPlugin::CachingSha2Password, CHALLENGE, b"password");
        assert_eq!(sha2.map(|x| x.len()), Some(32));

        assert_eq!(
            authenticate(&AuthPlugin::MysqlNativePassword, CHALLENGE, b""),
            Some(vec![])
        );
        assert_eq!(
            authenticate(&AuthPlugin::Other((&b"dialog"[..]).into()), CHALLENGE, b"password"),
            None
        );
    }

    #[test]
    fn should_reject_unsupported_plugin() {
        let context = AuthContext::new(AuthPlugin::from_bytes(b"sha256_password"), CHALLENGE);
        assert_eq!(
            context.respond(b"password"),
            Err(AuthError::UnsupportedPlugin("sha256_password".into()))
        );

        let context = AuthContext::new(AuthPlugin::MysqlNativePassword, CHALLENGE).into_owned();
        assert_eq!(context.challenge(), CHALLENGE);
        assert_eq!(
            context.respond(b"password").unwrap(),
            crate::scramble::scramble_native(CHALLENGE, b"password").unwrap()
        );
    }
}
