use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    codec::{is_status_frame, packet_of, FieldReader},
    DecodeError,
};

/// The six periodic status broadcasts of the controller. The integer value is
/// the packet byte of the frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = DecodeError, constructor = DecodeError::UnknownStatusGroup))]
#[repr(u8)]
pub enum StatusGroup {
    /// ERPM, motor current, duty cycle
    Status1 = 0x09,
    /// Amp-hours consumed and charged
    Status2 = 0x0E,
    /// Watt-hours consumed and charged
    Status3 = 0x0F,
    /// Temperatures, input current, PID position
    Status4 = 0x10,
    /// Tachometer, input voltage
    Status5 = 0x1B,
    /// ADC and PPM inputs
    Status6 = 0x1C,
}

impl StatusGroup {
    const fn layout_len(&self) -> usize {
        match self {
            Self::Status1 => 4 + 2 + 2,
            Self::Status2 => 4 + 4,
            Self::Status3 => 4 + 4,
            Self::Status4 => 2 + 2 + 2 + 2,
            Self::Status5 => 4 + 2,
            Self::Status6 => 2 + 2 + 2 + 2,
        }
    }
}

/// The fields carried by one status frame, already scaled to engineering
/// units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusUpdate {
    Status1 {
        erpm: f32,
        current: f32,
        duty: f32,
    },
    Status2 {
        amp_hours: f32,
        amp_hours_charged: f32,
    },
    Status3 {
        watt_hours: f32,
        watt_hours_charged: f32,
    },
    Status4 {
        temp_fet: f32,
        temp_motor: f32,
        current_in: f32,
        pid_pos: f32,
    },
    Status5 {
        tachometer: f32,
        voltage_in: f32,
    },
    Status6 {
        adc1: f32,
        adc2: f32,
        adc3: f32,
        ppm: f32,
    },
}

impl StatusUpdate {
    pub fn group(&self) -> StatusGroup {
        match self {
            Self::Status1 { .. } => StatusGroup::Status1,
            Self::Status2 { .. } => StatusGroup::Status2,
            Self::Status3 { .. } => StatusGroup::Status3,
            Self::Status4 { .. } => StatusGroup::Status4,
            Self::Status5 { .. } => StatusGroup::Status5,
            Self::Status6 { .. } => StatusGroup::Status6,
        }
    }

    /// Decodes the payload of a status frame of a known group
    pub fn decode(group: StatusGroup, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = FieldReader::new(payload, group.layout_len())?;

        Ok(match group {
            StatusGroup::Status1 => Self::Status1 {
                erpm: r.scaled_i32(1.0)?,
                current: r.scaled_i16(10.0)?,
                duty: r.scaled_i16(1000.0)?,
            },
            StatusGroup::Status2 => Self::Status2 {
                amp_hours: r.scaled_i32(10_000.0)?,
                amp_hours_charged: r.scaled_i32(10_000.0)?,
            },
            StatusGroup::Status3 => Self::Status3 {
                watt_hours: r.scaled_i32(10_000.0)?,
                watt_hours_charged: r.scaled_i32(10_000.0)?,
            },
            StatusGroup::Status4 => Self::Status4 {
                temp_fet: r.scaled_i16(10.0)?,
                temp_motor: r.scaled_i16(10.0)?,
                current_in: r.scaled_i16(10.0)?,
                pid_pos: r.scaled_i16(50.0)?,
            },
            StatusGroup::Status5 => Self::Status5 {
                tachometer: r.scaled_i32(1.0)?,
                voltage_in: r.scaled_i16(10.0)?,
            },
            StatusGroup::Status6 => Self::Status6 {
                adc1: r.scaled_i16(1000.0)?,
                adc2: r.scaled_i16(1000.0)?,
                adc3: r.scaled_i16(1000.0)?,
                ppm: r.scaled_i16(1000.0)?,
            },
        })
    }
}

/// Decodes a status frame. Returns `Ok(None)` when `frame_id` is not one of
/// the six status identifiers, and an error when the payload is shorter than
/// the group's layout.
pub fn decode_status(frame_id: u32, payload: &[u8]) -> Result<Option<StatusUpdate>, DecodeError> {
    if !is_status_frame(frame_id) {
        return Ok(None);
    }

    let group = StatusGroup::try_from(packet_of(frame_id))?;

    StatusUpdate::decode(group, payload).map(Some)
}

const INERTIAL_LAYOUT_LEN: usize = 6 * 2;

/// One inertial measurement: linear acceleration and angular rate on three
/// axes each.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InertialReading {
    pub acc_x: f32,
    pub acc_y: f32,
    pub acc_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
}

/// Decodes the reply to an inertial request: six i16 values scaled by 1/1000,
/// accelerometer x, y, z followed by gyroscope x, y, z.
///
/// The reply is 12 bytes long, so it only fits in a CAN FD frame; a classic
/// 8-byte frame is rejected as malformed instead of being read past its end.
pub fn decode_inertial(payload: &[u8]) -> Result<InertialReading, DecodeError> {
    let mut r = FieldReader::new(payload, INERTIAL_LAYOUT_LEN)?;

    Ok(InertialReading {
        acc_x: r.scaled_i16(1000.0)?,
        acc_y: r.scaled_i16(1000.0)?,
        acc_z: r.scaled_i16(1000.0)?,
        gyro_x: r.scaled_i16(1000.0)?,
        gyro_y: r.scaled_i16(1000.0)?,
        gyro_z: r.scaled_i16(1000.0)?,
    })
}
