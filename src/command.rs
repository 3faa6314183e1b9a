use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    codec::{scaled_i32_bytes, FieldReader},
    DecodeError, CLASSIC_PAYLOAD_LEN,
};

/// Commands understood by the controller. The integer value is the packet
/// byte of the request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = DecodeError, constructor = DecodeError::UnknownCommandType))]
#[repr(u8)]
pub enum CommandType {
    SetDutyCycle = 0x00,
    SetCurrent = 0x01,
    SetBrakeCurrent = 0x02,
    SetRpm = 0x03,
    GetInertial = 0x1F,
}

const DUTY_SCALE: f32 = 100_000.0;
const CURRENT_SCALE: f32 = 1_000.0;
const RPM_SCALE: f32 = 1.0;

/// Encodes a duty cycle setpoint. The ratio is not clamped here; callers are
/// expected to keep it within `-1.0..=1.0`.
pub fn encode_set_duty_cycle(ratio: f32) -> [u8; 4] {
    scaled_i32_bytes(ratio, DUTY_SCALE)
}

/// Encodes a motor current setpoint in amps
pub fn encode_set_current(amps: f32) -> [u8; 4] {
    scaled_i32_bytes(amps, CURRENT_SCALE)
}

/// Encodes a brake current setpoint in amps
pub fn encode_set_brake_current(amps: f32) -> [u8; 4] {
    scaled_i32_bytes(amps, CURRENT_SCALE)
}

/// Encodes an electrical RPM setpoint
pub fn encode_set_rpm(erpm: f32) -> [u8; 4] {
    scaled_i32_bytes(erpm, RPM_SCALE)
}

/// The inertial request carries no arguments, only an all-zero payload.
pub fn encode_inertial_request() -> [u8; 8] {
    [0; 8]
}

/// A request for the controller together with its argument.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetDutyCycle(f32),
    SetCurrent(f32),
    SetBrakeCurrent(f32),
    SetRpm(f32),
    RequestInertial,
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::SetDutyCycle(_) => CommandType::SetDutyCycle,
            Self::SetCurrent(_) => CommandType::SetCurrent,
            Self::SetBrakeCurrent(_) => CommandType::SetBrakeCurrent,
            Self::SetRpm(_) => CommandType::SetRpm,
            Self::RequestInertial => CommandType::GetInertial,
        }
    }

    /// The full 8-byte payload, with the argument in front and zero padding
    /// after it.
    pub fn to_payload(&self) -> [u8; CLASSIC_PAYLOAD_LEN] {
        let mut payload = [0u8; CLASSIC_PAYLOAD_LEN];

        match self {
            Self::SetDutyCycle(ratio) => payload[..4].copy_from_slice(&encode_set_duty_cycle(*ratio)),
            Self::SetCurrent(amps) => payload[..4].copy_from_slice(&encode_set_current(*amps)),
            Self::SetBrakeCurrent(amps) => {
                payload[..4].copy_from_slice(&encode_set_brake_current(*amps))
            }
            Self::SetRpm(erpm) => payload[..4].copy_from_slice(&encode_set_rpm(*erpm)),
            Self::RequestInertial => payload = encode_inertial_request(),
        }

        payload
    }

    /// Decodes a command as the controller would see it. Used on the device
    /// side of the link, e.g. by bus simulators.
    pub fn from_payload(command_type: CommandType, payload: &[u8]) -> Result<Self, DecodeError> {
        if command_type == CommandType::GetInertial {
            return Ok(Self::RequestInertial);
        }

        let mut r = FieldReader::new(payload, 4)?;

        Ok(match command_type {
            CommandType::SetDutyCycle => Self::SetDutyCycle(r.scaled_i32(DUTY_SCALE)?),
            CommandType::SetCurrent => Self::SetCurrent(r.scaled_i32(CURRENT_SCALE)?),
            CommandType::SetBrakeCurrent => Self::SetBrakeCurrent(r.scaled_i32(CURRENT_SCALE)?),
            CommandType::SetRpm => Self::SetRpm(r.scaled_i32(RPM_SCALE)?),
            CommandType::GetInertial => Self::RequestInertial,
        })
    }
}
