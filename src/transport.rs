// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Byte stream collaborator of a session.

use bytes::Bytes;

use std::{
    io,
    sync::mpsc::{sync_channel, Receiver, SyncSender},
};

/// Writes bytes verbatim to the underlying stream.
///
/// Connecting, reading, TLS and timeouts are up to the implementation; inbound data and
/// failures are reported back as `TransportEvent`s.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// What happened on the stream.
#[derive(Debug)]
pub enum TransportEvent {
    /// An inbound chunk (arbitrary boundaries).
    Bytes(Bytes),
    Error(io::Error),
    /// Idle timeout elapsed.
    Timeout,
    /// Peer closed the stream.
    Closed,
}

/// Sending half handed to the transport.
pub type EventSender = SyncSender<TransportEvent>;
/// Receiving half drained by `Session::run`.
pub type EventReceiver = Receiver<TransportEvent>;

/// Bounded event channel. The transport blocks once `bound` events are pending.
pub fn channel(bound: usize) -> (EventSender, EventReceiver) {
    sync_channel(bound)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug, Default)]
    pub(crate) struct Recorded {
        pub(crate) written: Vec<u8>,
        pub(crate) closed: bool,
        pub(crate) fail_writes: bool,
    }

    /// Records writes; clones share the record.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockTransport {
        pub(crate) record: Rc<RefCell<Recorded>>,
    }

    impl MockTransport {
        /// Takes everything written so far.
        pub(crate) fn take_written(&self) -> Vec<u8> {
            std::mem::take(&mut self.record.borrow_mut().written)
        }

        pub(crate) fn is_closed(&self) -> bool {
            self.record.borrow().closed
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            let mut record = self.record.borrow_mut();
            if record.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
            }
            record.written.extend_from_slice(bytes);
            Ok(())
        }

        fn close(&mut self) {
            self.record.borrow_mut().closed = true;
        }
    }

    #[test]
    fn should_deliver_events_in_order() {
        let (tx, rx) = channel(2);
        tx.send(TransportEvent::Bytes(Bytes::from_static(b"\x01"))).unwrap();
        tx.send(TransportEvent::Timeout).unwrap();
        assert!(matches!(rx.recv().unwrap(), TransportEvent::Bytes(_)));
        assert!(matches!(rx.recv().unwrap(), TransportEvent::Timeout));
    }

    #[test]
    fn should_forward_through_box() {
        let mock = MockTransport::default();
        let mut boxed: Box<dyn Transport> = Box::new(mock.clone());
        boxed.write(b"abc").unwrap();
        boxed.close();
        assert_eq!(mock.take_written(), b"abc");
        assert!(mock.is_closed());
    }
}
