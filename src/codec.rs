//! Big-endian field access and CAN identifier composition.
//!
//! Identifiers are 29-bit extended ids laid out as:
//!
//! ```text
//!  28..24  class    0 = status frame, 1 = command / command response
//!  23..16  tag      correlation tag (0 on status frames)
//!  15..8   packet   status group or command type
//!   7..0   node     controller node address
//! ```
//!
//! Each field owns its own bit range, so node address, command type and
//! correlation tag can always be recovered independently of each other.

use crate::{CommandType, DecodeError, StatusGroup, Tag};

const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

const NODE_MASK: u32 = 0xFF;
const PACKET_SHIFT: u32 = 8;
const TAG_SHIFT: u32 = 16;
const TAG_MASK: u32 = 0xFF << TAG_SHIFT;
const CLASS_SHIFT: u32 = 24;

const STATUS_CLASS: u32 = 0;
const COMMAND_CLASS: u32 = 1;

/* Identifiers */

/// Builds the identifier of a command addressed to `node_address`. The
/// correlation tag field is left at 0, see [`with_tag`].
pub fn compose_request_id(command_type: CommandType, node_address: u8) -> u32 {
    (COMMAND_CLASS << CLASS_SHIFT)
        | ((u8::from(command_type) as u32) << PACKET_SHIFT)
        | node_address as u32
}

/// Builds the identifier a controller at `node_address` uses for a status
/// frame of the given group.
pub fn status_id(group: StatusGroup, node_address: u8) -> u32 {
    ((u8::from(group) as u32) << PACKET_SHIFT) | node_address as u32
}

/// Replaces the correlation tag field of `id`
pub fn with_tag(id: u32, tag: Tag) -> u32 {
    (id & !TAG_MASK) | ((tag.value() as u32) << TAG_SHIFT)
}

pub fn tag_of(id: u32) -> u8 {
    ((id & TAG_MASK) >> TAG_SHIFT) as u8
}

pub fn node_of(id: u32) -> u8 {
    (id & NODE_MASK) as u8
}

/// The status group or command type byte of `id`
pub fn packet_of(id: u32) -> u8 {
    (id >> PACKET_SHIFT) as u8
}

fn class_of(id: u32) -> u32 {
    (id & EXTENDED_ID_MASK) >> CLASS_SHIFT
}

/// Whether `id` is one of the six status frames, from any node
pub fn is_status_frame(id: u32) -> bool {
    class_of(id) == STATUS_CLASS
        && tag_of(id) == 0
        && StatusGroup::try_from(packet_of(id)).is_ok()
}

/// Whether `id` is a reply from `node_address` to one of our commands
pub fn is_command_response(id: u32, node_address: u8) -> bool {
    class_of(id) == COMMAND_CLASS
        && node_of(id) == node_address
        && CommandType::try_from(packet_of(id)).is_ok()
}

/* Fields */

/// Cursor over a payload whose length has been checked against a fixed
/// layout up front.
pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], layout_len: usize) -> Result<Self, DecodeError> {
        if data.len() < layout_len {
            return Err(DecodeError::MalformedFrame {
                expected: layout_len,
                actual: data.len(),
            });
        }

        Ok(Self { data, index: 0 })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.index + N;
        let bytes = self
            .data
            .get(self.index..end)
            .ok_or(DecodeError::MalformedFrame {
                expected: end,
                actual: self.data.len(),
            })?;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.index = end;

        Ok(out)
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        self.take().map(i16::from_be_bytes)
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        self.take().map(i32::from_be_bytes)
    }

    /// Reads an i16 and divides it by its fixed-point scale
    pub fn scaled_i16(&mut self, divisor: f32) -> Result<f32, DecodeError> {
        self.i16().map(|raw| raw as f32 / divisor)
    }

    /// Reads an i32 and divides it by its fixed-point scale
    pub fn scaled_i32(&mut self, divisor: f32) -> Result<f32, DecodeError> {
        self.i32().map(|raw| raw as f32 / divisor)
    }
}

/// Rounds `value * scale` to the nearest integer (saturating, NaN maps to 0)
/// and returns it as a big-endian i32.
pub(crate) fn scaled_i32_bytes(value: f32, scale: f32) -> [u8; 4] {
    (libm::roundf(value * scale) as i32).to_be_bytes()
}
