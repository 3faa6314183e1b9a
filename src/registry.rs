//! Bookkeeping for commands that are waiting on a reply.
//!
//! Each submitted command occupies one slot of a fixed-size table until a
//! response carrying its correlation tag arrives, or until it has timed out
//! twice. The first timeout only extends the deadline (nothing is resent); the
//! second frees the slot and drops its continuation without running it.

use core::array;

use crate::{
    codec::{compose_request_id, tag_of, with_tag},
    CommandType, Millis, Transport, CLASSIC_PAYLOAD_LEN,
};

/// Number of slots used when no capacity is given
pub const DEFAULT_CAPACITY: usize = 10;

/// Timeout applied to commands when no other is configured
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Correlation tag matching a request to its response. Tags are never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tag(u8);

impl Tag {
    pub const fn new(value: u8) -> Option<Self> {
        match value {
            0 => None,
            _ => Some(Self(value)),
        }
    }

    pub const fn value(&self) -> u8 {
        self.0
    }
}

/// Something to run once the reply to a command arrives.
///
/// Implemented for every `FnOnce(&[u8])`, so closures and `fn` pointers can be
/// used directly (and `Box<dyn FnOnce(&[u8])>` where an allocator exists).
pub trait Continuation {
    fn complete(self, payload: &[u8]);
}

impl<F: FnOnce(&[u8])> Continuation for F {
    fn complete(self, payload: &[u8]) {
        self(payload)
    }
}

/// Errors which can arise while submitting a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubmitError {
    #[error("Every slot already holds a pending command")]
    RegistryFull,
    #[error("The transport failed to send the command")]
    TransportError,
    #[error("Payload of {0} bytes does not fit in a command frame")]
    PayloadTooLong(usize),
}

/// Where a pending request stands in its timeout cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestState {
    /// Waiting within its first timeout window
    Active,
    /// Timed out once; the next timeout evicts it
    Retried,
}

struct PendingRequest<C> {
    tag: Tag,
    command_type: CommandType,
    sent_at: Millis,
    timeout_ms: u32,
    retried: bool,
    continuation: C,
}

impl<C> PendingRequest<C> {
    fn state(&self) -> RequestState {
        if self.retried {
            RequestState::Retried
        } else {
            RequestState::Active
        }
    }
}

/// A fixed table of `N` in-flight requests addressed to one controller.
///
/// `N` must be in `1..=254` so that a free tag always exists while a free slot
/// does.
pub struct CommandRegistry<C, const N: usize = DEFAULT_CAPACITY> {
    node_address: u8,
    slots: [Option<PendingRequest<C>>; N],
    next_tag: u8,
}

impl<C, const N: usize> CommandRegistry<C, N> {
    const VALID_CAPACITY: () = assert!(N > 0 && N < u8::MAX as usize);

    pub fn new(node_address: u8) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;

        Self {
            node_address,
            slots: array::from_fn(|_| None),
            next_tag: 1,
        }
    }

    pub fn node_address(&self) -> u8 {
        self.node_address
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of requests currently in flight
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// The state of the request holding `tag`, or `None` if no slot does
    pub fn state(&self, tag: Tag) -> Option<RequestState> {
        self.pending(tag).map(PendingRequest::state)
    }

    /// The command type of the request holding `tag`
    pub fn command_type(&self, tag: Tag) -> Option<CommandType> {
        self.pending(tag).map(|pending| pending.command_type)
    }

    /// Sends a command and records it as pending.
    ///
    /// Fails with [`SubmitError::RegistryFull`] before touching the transport
    /// when no slot is free. If the transport refuses the frame, the slot is
    /// left free and [`SubmitError::TransportError`] is returned.
    pub fn submit<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        command_type: CommandType,
        payload: &[u8],
        continuation: C,
        timeout_ms: u32,
        now: Millis,
    ) -> Result<Tag, SubmitError> {
        if payload.len() > CLASSIC_PAYLOAD_LEN {
            return Err(SubmitError::PayloadTooLong(payload.len()));
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SubmitError::RegistryFull)?;

        let tag = self.allocate_tag();
        let id = with_tag(compose_request_id(command_type, self.node_address), tag);

        let mut frame = [0u8; CLASSIC_PAYLOAD_LEN];
        frame[..payload.len()].copy_from_slice(payload);

        if !transport.send(id, &frame) {
            warn!("Failed to send {:?} (tag {})", command_type, tag.value());
            return Err(SubmitError::TransportError);
        }

        trace!("Sent {:?} with tag {}", command_type, tag.value());

        self.slots[index] = Some(PendingRequest {
            tag,
            command_type,
            sent_at: now,
            timeout_ms,
            retried: false,
            continuation,
        });

        Ok(tag)
    }

    /// Frees the slot matching the tag carried by `id` and hands back its
    /// continuation. Returns `None` for unsolicited, duplicate or expired
    /// responses.
    pub fn take_response(&mut self, id: u32) -> Option<C> {
        self.take_matching(id).map(|(_, continuation)| continuation)
    }

    /// Like [`take_response`](Self::take_response), also returning the type
    /// of the command that was pending.
    pub fn take_matching(&mut self, id: u32) -> Option<(CommandType, C)> {
        let index = self.find(tag_of(id))?;

        self.slots[index]
            .take()
            .map(|pending| (pending.command_type, pending.continuation))
    }

    /// Handles the periodic timeout sweep and returns how many requests were
    /// evicted.
    pub fn tick(&mut self, now: Millis) -> usize {
        let mut evicted = 0;

        for slot in self.slots.iter_mut() {
            let Some(pending) = slot else {
                continue;
            };

            if now.wrapping_sub(pending.sent_at) < pending.timeout_ms {
                continue;
            }

            if pending.retried {
                warn!(
                    "{:?} with tag {} expired without a response",
                    pending.command_type,
                    pending.tag.value()
                );
                *slot = None;
                evicted += 1;
            } else {
                debug!(
                    "{:?} with tag {} timed out once, extending its deadline",
                    pending.command_type,
                    pending.tag.value()
                );
                pending.retried = true;
                pending.sent_at = now;
            }
        }

        evicted
    }

    /// Drops every pending request without running its continuation
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    fn find(&self, tag: u8) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|pending| pending.tag.value() == tag)
        })
    }

    fn pending(&self, tag: Tag) -> Option<&PendingRequest<C>> {
        self.slots.iter().flatten().find(|pending| pending.tag == tag)
    }

    /// Next tag in `1..=255` that no active slot holds. There are fewer slots
    /// than tags, so this always terminates.
    fn allocate_tag(&mut self) -> Tag {
        loop {
            let candidate = self.next_tag;
            self.next_tag = candidate.checked_add(1).unwrap_or(1);

            if self.find(candidate).is_none() {
                if let Some(tag) = Tag::new(candidate) {
                    return tag;
                }
            }
        }
    }
}

impl<C: Continuation, const N: usize> CommandRegistry<C, N> {
    /// Runs the continuation of the request matching `id`, exactly once, and
    /// frees its slot. Returns `false` when nothing matches.
    pub fn on_response(&mut self, id: u32, payload: &[u8]) -> bool {
        match self.take_response(id) {
            Some(continuation) => {
                continuation.complete(payload);
                true
            }
            None => {
                debug!("Ignoring response {:x} with no pending request", id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::codec::{is_command_response, node_of, packet_of};

    const NODE: u8 = 74;

    #[derive(Default)]
    struct MockBus {
        sent: Vec<(u32, Vec<u8>)>,
        fail: bool,
    }

    impl Transport for MockBus {
        fn send(&mut self, id: u32, payload: &[u8]) -> bool {
            if self.fail {
                return false;
            }

            self.sent.push((id, payload.to_vec()));
            true
        }

        fn poll(&mut self) -> Option<crate::WireFrame> {
            None
        }
    }

    fn counter(calls: &Cell<u32>) -> impl FnOnce(&[u8]) + '_ {
        move |_| calls.set(calls.get() + 1)
    }

    #[test]
    fn submit_sends_tagged_padded_frame() {
        let mut bus = MockBus::default();
        let mut registry: CommandRegistry<fn(&[u8])> = CommandRegistry::new(NODE);

        let tag = registry
            .submit(
                &mut bus,
                CommandType::SetCurrent,
                &crate::encode_set_current(2.5),
                |_| {},
                100,
                0,
            )
            .unwrap();

        assert_eq!(bus.sent.len(), 1);
        let (id, payload) = &bus.sent[0];
        assert!(is_command_response(*id, NODE));
        assert_eq!(node_of(*id), NODE);
        assert_eq!(packet_of(*id), u8::from(CommandType::SetCurrent));
        assert_eq!(tag_of(*id), tag.value());
        assert_eq!(payload.as_slice(), &[0x00, 0x00, 0x09, 0xC4, 0, 0, 0, 0]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(tag), Some(RequestState::Active));
        assert_eq!(registry.command_type(tag), Some(CommandType::SetCurrent));
    }

    #[test]
    fn registry_full_sends_nothing() {
        let mut bus = MockBus::default();
        let mut registry: CommandRegistry<fn(&[u8])> = CommandRegistry::new(NODE);

        for _ in 0..registry.capacity() {
            registry
                .submit(&mut bus, CommandType::SetDutyCycle, &[0; 4], |_| {}, 100, 0)
                .unwrap();
        }
        assert!(registry.is_full());

        assert_eq!(
            registry.submit(&mut bus, CommandType::SetDutyCycle, &[0; 4], |_| {}, 100, 0),
            Err(SubmitError::RegistryFull)
        );
        assert_eq!(bus.sent.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn transport_failure_releases_slot() {
        let mut bus = MockBus {
            fail: true,
            ..Default::default()
        };
        let mut registry: CommandRegistry<fn(&[u8]), 2> = CommandRegistry::new(NODE);

        assert_eq!(
            registry.submit(&mut bus, CommandType::SetRpm, &[0; 4], |_| {}, 100, 0),
            Err(SubmitError::TransportError)
        );
        assert!(registry.is_empty());

        bus.fail = false;
        assert!(registry
            .submit(&mut bus, CommandType::SetRpm, &[0; 4], |_| {}, 100, 0)
            .is_ok());
    }

    #[test]
    fn oversized_payload_is_refused() {
        let mut bus = MockBus::default();
        let mut registry: CommandRegistry<fn(&[u8])> = CommandRegistry::new(NODE);

        assert_eq!(
            registry.submit(&mut bus, CommandType::SetRpm, &[0; 9], |_| {}, 100, 0),
            Err(SubmitError::PayloadTooLong(9))
        );
        assert!(bus.sent.is_empty());
    }

    #[test]
    fn response_runs_continuation_once() {
        let calls = Cell::new(0);
        let seen = Cell::new(0u8);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        let tag = registry
            .submit(
                &mut bus,
                CommandType::SetDutyCycle,
                &[0; 4],
                |payload: &[u8]| {
                    calls.set(calls.get() + 1);
                    seen.set(payload[0]);
                },
                100,
                0,
            )
            .unwrap();
        let id = bus.sent[0].0;

        assert!(registry.on_response(id, &[0xAA]));
        assert_eq!(calls.get(), 1);
        assert_eq!(seen.get(), 0xAA);
        assert_eq!(registry.state(tag), None);
        assert!(registry.is_empty());

        assert!(!registry.on_response(id, &[0xAA]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unmatched_response_is_ignored() {
        let calls = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        let tag = registry
            .submit(&mut bus, CommandType::SetCurrent, &[0; 4], counter(&calls), 100, 0)
            .unwrap();

        let other = Tag::new(tag.value() + 1).unwrap();
        let id = with_tag(compose_request_id(CommandType::SetCurrent, NODE), other);

        assert!(!registry.on_response(id, &[]));
        assert_eq!(calls.get(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn responses_match_by_tag() {
        let first = Cell::new(0);
        let second = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        registry
            .submit(&mut bus, CommandType::SetCurrent, &[0; 4], counter(&first), 100, 0)
            .unwrap();
        registry
            .submit(&mut bus, CommandType::SetCurrent, &[0; 4], counter(&second), 100, 0)
            .unwrap();

        assert!(registry.on_response(bus.sent[1].0, &[]));
        assert_eq!((first.get(), second.get()), (0, 1));

        assert!(registry.on_response(bus.sent[0].0, &[]));
        assert_eq!((first.get(), second.get()), (1, 1));
    }

    #[test]
    fn timeout_extends_once_then_evicts() {
        let calls = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        let tag = registry
            .submit(&mut bus, CommandType::SetDutyCycle, &[0; 4], counter(&calls), 100, 0)
            .unwrap();

        assert_eq!(registry.tick(50), 0);
        assert_eq!(registry.state(tag), Some(RequestState::Active));

        assert_eq!(registry.tick(150), 0);
        assert_eq!(registry.state(tag), Some(RequestState::Retried));
        assert_eq!(bus.sent.len(), 1);

        // Deadline was reset at 150
        assert_eq!(registry.tick(200), 0);
        assert_eq!(registry.state(tag), Some(RequestState::Retried));

        assert_eq!(registry.tick(250), 1);
        assert_eq!(registry.state(tag), None);
        assert!(registry.is_empty());
        assert_eq!(calls.get(), 0);
        assert_eq!(bus.sent.len(), 1);

        assert!(!registry.on_response(bus.sent[0].0, &[]));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn late_response_after_retry_still_matches() {
        let calls = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        registry
            .submit(&mut bus, CommandType::SetDutyCycle, &[0; 4], counter(&calls), 100, 0)
            .unwrap();
        registry.tick(120);

        assert!(registry.on_response(bus.sent[0].0, &[]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn timeouts_survive_clock_wraparound() {
        let calls = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_>::new(NODE);

        let start = u32::MAX - 30;
        let tag = registry
            .submit(&mut bus, CommandType::SetDutyCycle, &[0; 4], counter(&calls), 100, start)
            .unwrap();

        assert_eq!(registry.tick(start.wrapping_add(60)), 0);
        assert_eq!(registry.state(tag), Some(RequestState::Active));

        assert_eq!(registry.tick(start.wrapping_add(100)), 0);
        assert_eq!(registry.state(tag), Some(RequestState::Retried));
    }

    #[test]
    fn reset_drops_everything() {
        let calls = Cell::new(0);
        let mut bus = MockBus::default();
        let mut registry = CommandRegistry::<_, 3>::new(NODE);

        for _ in 0..3 {
            registry
                .submit(&mut bus, CommandType::SetCurrent, &[0; 4], counter(&calls), 100, 0)
                .unwrap();
        }

        registry.reset();

        assert!(registry.is_empty());
        for (id, _) in &bus.sent {
            assert!(!registry.on_response(*id, &[]));
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn tags_skip_zero_and_active_values() {
        let mut bus = MockBus::default();
        let mut registry: CommandRegistry<fn(&[u8]), 2> = CommandRegistry::new(NODE);

        // Pin tag 1 in a slot for a full cycle of the counter
        let pinned = registry
            .submit(&mut bus, CommandType::SetCurrent, &[0; 4], |_| {}, u32::MAX, 0)
            .unwrap();
        assert_eq!(pinned.value(), 1);

        let mut issued = Vec::new();
        for _ in 0..600 {
            let tag = registry
                .submit(&mut bus, CommandType::SetCurrent, &[0; 4], |_| {}, u32::MAX, 0)
                .unwrap();
            issued.push(tag.value());

            assert!(registry.take_response(with_tag(0, tag)).is_some());
        }

        assert!(issued.iter().all(|&tag| tag != 0 && tag != pinned.value()));
        assert_eq!(issued[..3], [2, 3, 4]);
        assert_eq!(issued[253], 255);
        assert_eq!(issued[254], 2);
        assert_eq!(registry.state(pinned), Some(RequestState::Active));
    }

    #[test]
    fn take_response_frees_slot() {
        let mut bus = MockBus::default();
        let mut registry: CommandRegistry<u32> = CommandRegistry::new(NODE);

        let tag = registry
            .submit(&mut bus, CommandType::GetInertial, &[0; 8], 7, 100, 0)
            .unwrap();

        assert_eq!(registry.take_response(bus.sent[0].0), Some(7));
        assert_eq!(registry.state(tag), None);
        assert_eq!(registry.take_response(bus.sent[0].0), None);
    }
}
