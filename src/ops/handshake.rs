// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::cmp::min;

use crate::{
    auth::{AuthContext, AuthPlugin, FAST_AUTH_SUCCESS, PERFORM_FULL_AUTH, REQUEST_PUBLIC_KEY},
    capabilities::{client_flags, negotiate},
    constants::{AUTH_MORE_DATA_HEADER, AUTH_SWITCH_HEADER, ERR_HEADER, OK_HEADER},
    error::{AuthError, Error, ProtocolError, Result},
    framer::Packet,
    ops::{Completion, OpKind, Operation, Step},
    packets::{
        parse_auth_more_data, parse_auth_switch_request, parse_err_packet,
        parse_handshake_packet, parse_ok_packet, HandshakeResponse, OkPacketKind,
    },
    pipeline::Context,
    scramble::encrypt_password,
};

#[derive(Debug)]
enum Phase {
    /// Waiting for the server greeting.
    Init,
    /// Handshake response is sent; waiting for the verdict.
    Check {
        auth: AuthContext<'static>,
        /// caching_sha2 full authentication asked for the server's RSA key.
        awaiting_public_key: bool,
    },
}

/// Connection phase: greeting, handshake response, auth switches and caching_sha2
/// continuation.
#[derive(Debug)]
pub struct Handshake {
    phase: Phase,
    completion: Completion<()>,
}

impl Handshake {
    pub fn new(completion: Completion<()>) -> Self {
        Self {
            phase: Phase::Init,
            completion,
        }
    }

    fn greeting(&mut self, packet: &Packet, ctx: &mut Context<'_>) -> Result<Step> {
        if packet.header() == Some(ERR_HEADER) {
            return Err(parse_err_packet(packet.payload(), ctx.conn.capabilities)?.into());
        }

        let greeting = parse_handshake_packet(packet.payload())?;
        let capabilities = negotiate(greeting.capabilities(), client_flags(ctx.opts));
        log::debug!(
            "connected to {} (connection id {}), negotiated capabilities: {:?}",
            greeting.server_version(),
            greeting.connection_id(),
            capabilities
        );

        ctx.conn.capabilities = capabilities;
        ctx.conn.connection_id = greeting.connection_id();
        ctx.conn.server_version = greeting.version();
        ctx.conn.status_flags = greeting.status_flags();

        let plugin = greeting
            .auth_plugin()
            .cloned()
            .unwrap_or(AuthPlugin::MysqlNativePassword);
        let auth = AuthContext::new(plugin, greeting.nonce().to_vec());
        let auth_response = auth.respond(password(ctx))?;

        let response = HandshakeResponse::new(
            &auth_response,
            ctx.opts.user(),
            ctx.opts.db_name(),
            auth.plugin(),
            ctx.opts.collation(),
            min(ctx.opts.max_allowed_packet(), u32::MAX as usize) as u32,
            capabilities,
            ctx.opts.max_allowed_packet(),
        )?;
        ctx.wire.send(response.as_ref())?;

        self.phase = Phase::Check {
            auth,
            awaiting_public_key: false,
        };
        Ok(Step::Pending)
    }

    fn check(&mut self, packet: &Packet, ctx: &mut Context<'_>) -> Result<Step> {
        let capabilities = ctx.conn.capabilities;
        let (auth, awaiting_public_key) = match self.phase {
            Phase::Check {
                ref mut auth,
                ref mut awaiting_public_key,
            } => (auth, awaiting_public_key),
            Phase::Init => return Err(unexpected(packet)),
        };

        match packet.header() {
            Some(OK_HEADER) => {
                let ok = parse_ok_packet(packet.payload(), capabilities, OkPacketKind::Other)?;
                ctx.conn.status_flags = ok.status_flags();
                ctx.conn.authenticated = true;
                log::debug!(
                    "authenticated as {:?} using {}",
                    ctx.opts.user(),
                    auth.plugin()
                );
                self.completion.complete(Ok(()));
                Ok(Step::Done)
            }
            Some(ERR_HEADER) => {
                let err = parse_err_packet(packet.payload(), capabilities)?;
                Err(AuthError::Rejected(err).into())
            }
            Some(AUTH_SWITCH_HEADER) => {
                let (plugin, challenge) = parse_auth_switch_request(packet.payload())?.into_parts();
                log::debug!("server asked to switch to {}", plugin);
                *auth = AuthContext::new(plugin, challenge);
                *awaiting_public_key = false;
                let auth_response = auth.respond(password(ctx))?;
                ctx.wire.send(&auth_response)?;
                Ok(Step::Pending)
            }
            Some(AUTH_MORE_DATA_HEADER) if *auth.plugin() == AuthPlugin::CachingSha2Password => {
                let data = parse_auth_more_data(packet.payload())?;

                if *awaiting_public_key {
                    let encrypted = encrypt_password(password(ctx), auth.challenge(), data)
                        .map_err(AuthError::PublicKey)?;
                    *awaiting_public_key = false;
                    ctx.wire.send(&encrypted)?;
                    return Ok(Step::Pending);
                }

                match data.first() {
                    // OK packet follows
                    Some(&FAST_AUTH_SUCCESS) => Ok(Step::Pending),
                    Some(&PERFORM_FULL_AUTH) if ctx.opts.secure_transport() => {
                        let mut clear = password(ctx).to_vec();
                        clear.push(0x00);
                        ctx.wire.send(&clear)?;
                        Ok(Step::Pending)
                    }
                    Some(&PERFORM_FULL_AUTH) => {
                        log::debug!("requesting server public key");
                        *awaiting_public_key = true;
                        ctx.wire.send(&[REQUEST_PUBLIC_KEY])?;
                        Ok(Step::Pending)
                    }
                    _ => Err(ProtocolError::Malformed("unknown caching_sha2_password state").into()),
                }
            }
            _ => Err(unexpected(packet)),
        }
    }
}

fn password<'a>(ctx: &Context<'a>) -> &'a [u8] {
    ctx.opts.pass().unwrap_or_default().as_bytes()
}

fn unexpected(packet: &Packet) -> Error {
    ProtocolError::UnexpectedPacket {
        header: packet.header().unwrap_or_default(),
        phase: "authenticating",
    }
    .into()
}

impl Operation for Handshake {
    fn kind(&self) -> OpKind {
        OpKind::Handshake
    }

    fn init(&mut self, _ctx: &mut Context<'_>) -> Result<Step> {
        // the server speaks first
        Ok(Step::Pending)
    }

    fn collect(&mut self, packet: Packet, ctx: &mut Context<'_>) -> Result<Step> {
        match self.phase {
            Phase::Init => self.greeting(&packet, ctx),
            Phase::Check { .. } => self.check(&packet, ctx),
        }
    }

    fn fail(mut self: Box<Self>, err: Error) {
        self.completion.complete(Err(err));
    }
}
