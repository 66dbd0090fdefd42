// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Splits inbound byte chunks into packets and wraps outbound payloads into packets.

use byteorder::{ByteOrder, LittleEndian as LE};
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use std::{cmp::min, mem};

use crate::constants::MAX_PAYLOAD_LEN;

/// Length of a packet header (`u24` length + `u8` sequence id).
pub const HEADER_LEN: usize = 4;

/// A complete logical packet.
///
/// Payloads longer than `MAX_PAYLOAD_LEN` travel as several physical packets; they are
/// joined here, so `sequence_id` is the id of the first physical packet and
/// `last_sequence_id` the id of the last one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    sequence_id: u8,
    last_sequence_id: u8,
    payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            last_sequence_id: sequence_id,
            payload: payload.into(),
        }
    }

    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    pub fn last_sequence_id(&self) -> u8 {
        self.last_sequence_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// First payload byte, if any.
    pub fn header(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[derive(Debug)]
struct Incomplete {
    sequence_id: u8,
    declared_len: usize,
    payload: BytesMut,
}

impl Incomplete {
    fn rest(&self) -> usize {
        self.declared_len - self.payload.len()
    }
}

/// Reassembles packets from arbitrarily split chunks.
///
/// At most one packet is incomplete at a time. Completed packets are held back until
/// nothing is incomplete, then handed over all at once.
#[derive(Debug, Default)]
pub struct PacketFramer {
    header: SmallVec<[u8; HEADER_LEN]>,
    incomplete: Option<Incomplete>,
    joined: Option<Packet>,
    joined_buf: BytesMut,
    ready: Vec<Packet>,
}

impl PacketFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if some bytes of a not yet complete packet are buffered.
    pub fn has_incomplete(&self) -> bool {
        !self.header.is_empty() || self.incomplete.is_some() || self.joined.is_some()
    }

    /// Feeds a chunk.
    ///
    /// Returns complete packets (in arrival order) only if no packet is left incomplete
    /// after this chunk, otherwise returns `None` and waits for more input.
    pub fn push(&mut self, mut chunk: &[u8]) -> Option<Vec<Packet>> {
        while !chunk.is_empty() {
            if let Some(mut incomplete) = self.incomplete.take() {
                let take = min(incomplete.rest(), chunk.len());
                incomplete.payload.extend_from_slice(&chunk[..take]);
                chunk = &chunk[take..];
                if incomplete.rest() == 0 {
                    self.complete(incomplete);
                } else {
                    self.incomplete = Some(incomplete);
                }
                continue;
            }

            let take = min(HEADER_LEN - self.header.len(), chunk.len());
            self.header.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
            if self.header.len() < HEADER_LEN {
                break;
            }

            let declared_len = LE::read_u24(&self.header[..3]) as usize;
            let sequence_id = self.header[3];
            self.header.clear();

            let incomplete = Incomplete {
                sequence_id,
                declared_len,
                payload: BytesMut::with_capacity(min(declared_len, chunk.len())),
            };
            if declared_len == 0 {
                self.complete(incomplete);
            } else {
                self.incomplete = Some(incomplete);
            }
        }

        if self.has_incomplete() || self.ready.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.ready))
        }
    }

    /// Drops any buffered state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn complete(&mut self, incomplete: Incomplete) {
        let Incomplete {
            sequence_id,
            declared_len,
            payload,
        } = incomplete;

        log::trace!("framed packet: len={}, seq={}", declared_len, sequence_id);

        let continues = declared_len == MAX_PAYLOAD_LEN;
        match self.joined.take() {
            Some(mut joined) => {
                self.joined_buf.extend_from_slice(&payload);
                joined.last_sequence_id = sequence_id;
                if continues {
                    self.joined = Some(joined);
                } else {
                    joined.payload = mem::take(&mut self.joined_buf).freeze();
                    self.ready.push(joined);
                }
            }
            None if continues => {
                self.joined_buf = payload;
                self.joined = Some(Packet::new(sequence_id, Bytes::new()));
            }
            None => self.ready.push(Packet::new(sequence_id, payload.freeze())),
        }
    }
}

/// Wraps `payload` into physical packets appended to `out`.
///
/// Sequence ids start at `sequence_id` and increment (mod 256) per physical packet.
/// Returns the sequence id to use for the next packet.
pub fn encode_packet(payload: &[u8], mut sequence_id: u8, out: &mut BytesMut) -> u8 {
    out.reserve(payload.len() + HEADER_LEN * (payload.len() / MAX_PAYLOAD_LEN + 1));

    for chunk in payload.chunks(MAX_PAYLOAD_LEN) {
        out.put_uint_le(chunk.len() as u64, 3);
        out.put_u8(sequence_id);
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
    }

    // A payload of zero length or of a multiple of the max length is terminated
    // by an empty packet.
    if payload.len() % MAX_PAYLOAD_LEN == 0 {
        out.put_uint_le(0, 3);
        out.put_u8(sequence_id);
        sequence_id = sequence_id.wrapping_add(1);
    }

    sequence_id
}
