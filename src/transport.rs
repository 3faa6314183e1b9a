use embedded_can::{ExtendedId, Frame, Id};

use crate::WireFrame;

/// The bus as seen by this crate: a way to push one frame out and to pull
/// the next received frame in, without blocking.
pub trait Transport {
    /// Queues a data frame with an extended identifier. Returns `false` if
    /// the frame could not be sent.
    fn send(&mut self, id: u32, payload: &[u8]) -> bool;

    /// Next received frame, or `None` when nothing is pending
    fn poll(&mut self) -> Option<WireFrame>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, id: u32, payload: &[u8]) -> bool {
        (**self).send(id, payload)
    }

    fn poll(&mut self) -> Option<WireFrame> {
        (**self).poll()
    }
}

/// Adapts any non-blocking [`embedded_can`] driver into a [`Transport`].
///
/// Outgoing frames always use extended identifiers. Received remote frames
/// are skipped, and a full transmit mailbox counts as a failed send.
pub struct NbCan<C> {
    can: C,
}

impl<C: embedded_can::nb::Can> NbCan<C> {
    pub fn new(can: C) -> Self {
        Self { can }
    }

    pub fn inner(&mut self) -> &mut C {
        &mut self.can
    }

    pub fn into_inner(self) -> C {
        self.can
    }
}

impl<C: embedded_can::nb::Can> Transport for NbCan<C> {
    fn send(&mut self, id: u32, payload: &[u8]) -> bool {
        let Some(frame) = ExtendedId::new(id).and_then(|id| C::Frame::new(id, payload)) else {
            warn!("Cannot build a CAN frame for id {:x}", id);
            return false;
        };

        match self.can.transmit(&frame) {
            Ok(_) => true,
            Err(nb::Error::WouldBlock) => {
                debug!("Transmit mailbox full, dropping frame {:x}", id);
                false
            }
            Err(nb::Error::Other(_)) => {
                warn!("CAN driver failed to transmit frame {:x}", id);
                false
            }
        }
    }

    fn poll(&mut self) -> Option<WireFrame> {
        loop {
            let frame = match self.can.receive() {
                Ok(frame) => frame,
                Err(nb::Error::WouldBlock) => return None,
                Err(nb::Error::Other(_)) => {
                    warn!("CAN driver failed to receive");
                    return None;
                }
            };

            if frame.is_remote_frame() {
                continue;
            }

            let id = match frame.id() {
                Id::Standard(id) => id.as_raw() as u32,
                Id::Extended(id) => id.as_raw(),
            };

            return WireFrame::new(id, frame.data());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use embedded_can::{ErrorKind, ExtendedId, Frame, Id, StandardId};

    use crate::{NbCan, Transport};

    #[derive(Debug, Clone, PartialEq)]
    struct TestFrame {
        id: Id,
        data: Vec<u8>,
        remote: bool,
    }

    impl Frame for TestFrame {
        fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
            if data.len() > 8 {
                return None;
            }

            Some(Self {
                id: id.into(),
                data: data.to_vec(),
                remote: false,
            })
        }

        fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
            Some(Self {
                id: id.into(),
                data: std::vec![0; dlc],
                remote: true,
            })
        }

        fn is_extended(&self) -> bool {
            matches!(self.id, Id::Extended(_))
        }

        fn is_remote_frame(&self) -> bool {
            self.remote
        }

        fn id(&self) -> Id {
            self.id
        }

        fn dlc(&self) -> usize {
            self.data.len()
        }

        fn data(&self) -> &[u8] {
            if self.remote {
                &[]
            } else {
                &self.data
            }
        }
    }

    #[derive(Default)]
    struct TestCan {
        transmitted: Vec<TestFrame>,
        received: VecDeque<TestFrame>,
        mailbox_full: bool,
    }

    impl embedded_can::nb::Can for TestCan {
        type Frame = TestFrame;
        type Error = ErrorKind;

        fn transmit(&mut self, frame: &TestFrame) -> nb::Result<Option<TestFrame>, ErrorKind> {
            if self.mailbox_full {
                return Err(nb::Error::WouldBlock);
            }

            self.transmitted.push(frame.clone());
            Ok(None)
        }

        fn receive(&mut self) -> nb::Result<TestFrame, ErrorKind> {
            self.received.pop_front().ok_or(nb::Error::WouldBlock)
        }
    }

    #[test]
    fn sends_extended_frames() {
        let mut bus = NbCan::new(TestCan::default());

        assert!(bus.send(0x0103_004A, &[1, 2, 3, 4, 0, 0, 0, 0]));

        let sent = &bus.inner().transmitted[0];
        assert_eq!(sent.id, Id::Extended(ExtendedId::new(0x0103_004A).unwrap()));
        assert_eq!(sent.data, [1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn refuses_unsendable_frames() {
        let mut bus = NbCan::new(TestCan::default());

        assert!(!bus.send(0x2000_0000, &[]));
        assert!(!bus.send(0x094A, &[0; 9]));

        bus.inner().mailbox_full = true;
        assert!(!bus.send(0x094A, &[0; 8]));
        assert!(bus.into_inner().transmitted.is_empty());
    }

    #[test]
    fn polls_data_frames_and_skips_remote_ones() {
        let mut can = TestCan::default();
        can.received
            .push_back(TestFrame::new_remote(StandardId::new(0x123).unwrap(), 2).unwrap());
        can.received
            .push_back(TestFrame::new(ExtendedId::new(0x094A).unwrap(), &[9; 8]).unwrap());
        can.received
            .push_back(TestFrame::new(StandardId::new(0x7FF).unwrap(), &[1]).unwrap());
        let mut bus = NbCan::new(can);

        let first = bus.poll().unwrap();
        assert_eq!(first.id(), 0x094A);
        assert_eq!(first.data(), &[9; 8]);

        let second = bus.poll().unwrap();
        assert_eq!(second.id(), 0x7FF);
        assert_eq!(second.data(), &[1]);

        assert!(bus.poll().is_none());
    }
}
