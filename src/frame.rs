use heapless::Vec;

/// Payload length of a classic CAN 2.0 frame. Every command this crate sends
/// is padded to exactly this many bytes.
pub const CLASSIC_PAYLOAD_LEN: usize = 8;

/// Largest payload a [`WireFrame`] can carry (a CAN FD frame).
pub const MAX_PAYLOAD_LEN: usize = 64;

/// A frame as exchanged with the [`Transport`](crate::Transport): a raw
/// identifier and its data bytes.
///
/// The identifier is kept as a plain `u32` so that drivers which flag
/// extended identifiers in the high bits can hand them over unchanged; the
/// classifiers in [`codec`](crate::codec) only look at the low 29 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WireFrame {
    id: u32,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    data: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl WireFrame {
    /// Creates a new frame. `data` must be at most [`MAX_PAYLOAD_LEN`] bytes
    /// long or else `None` will be returned instead.
    pub fn new(id: u32, data: &[u8]) -> Option<Self> {
        Some(Self {
            id,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// Creates a new classic frame, padding `data` with 0s up to
    /// [`CLASSIC_PAYLOAD_LEN`]. Returns `None` if `data` is longer than that.
    pub fn new_padded(id: u32, data: &[u8]) -> Option<Self> {
        if data.len() > CLASSIC_PAYLOAD_LEN {
            return None;
        }

        let mut frame = Self::new(id, data)?;
        frame
            .data
            .extend((data.len()..CLASSIC_PAYLOAD_LEN).map(|_| 0));

        Some(frame)
    }

    /// Gets the raw identifier of the frame
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Gets the data carried by the frame
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the payload fits in a CAN 2.0 frame
    pub fn is_classic(&self) -> bool {
        self.data.len() <= CLASSIC_PAYLOAD_LEN
    }
}

/// Errors which can arise while decoding a frame from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    #[error("Received a frame with ({actual:?}) bytes of data but its layout requires ({expected:?})")]
    MalformedFrame { expected: usize, actual: usize },
    #[error("Tried to decode a status group but it was not recognized ({0:?})")]
    UnknownStatusGroup(u8),
    #[error("Tried to decode a command type but it was not recognized ({0:?})")]
    UnknownCommandType(u8),
}
