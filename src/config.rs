use crate::{registry::DEFAULT_TIMEOUT_MS, telemetry::INERTIAL_STALE_MS};

/// Node address VESC controllers ship with
pub const DEFAULT_NODE_ADDRESS: u8 = 74;

/// Settings of a [`Controller`](crate::Controller)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Address of the controller on the bus
    pub node_address: u8,
    /// How long a command waits for its reply before its first timeout
    pub command_timeout_ms: u32,
    /// Age after which [`Controller::inertial_sample`](crate::Controller::inertial_sample)
    /// asks for a new reading
    pub inertial_refresh_ms: u32,
    /// Duty cycle setpoints are clamped to `-max_duty..=max_duty`
    pub max_duty: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            node_address: DEFAULT_NODE_ADDRESS,
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            inertial_refresh_ms: INERTIAL_STALE_MS,
            max_duty: 1.0,
        }
    }
}

impl ControllerConfig {
    pub fn with_node_address(mut self, node_address: u8) -> Self {
        self.node_address = node_address;
        self
    }

    pub fn with_command_timeout(mut self, timeout_ms: u32) -> Self {
        self.command_timeout_ms = timeout_ms;
        self
    }

    pub fn with_inertial_refresh(mut self, refresh_ms: u32) -> Self {
        self.inertial_refresh_ms = refresh_ms;
        self
    }

    /// Sets the duty clamp. Values outside `0.0..=1.0` are pulled back into
    /// that range, and NaN disables duty output entirely.
    pub fn with_max_duty(mut self, max_duty: f32) -> Self {
        self.max_duty = max_duty;
        self.max_duty = self.duty_limit();
        self
    }

    /// `max_duty` as a usable bound in `0.0..=1.0`, whatever was written to
    /// the field. NaN maps to 0.
    pub fn duty_limit(&self) -> f32 {
        if self.max_duty.is_nan() {
            0.0
        } else {
            self.max_duty.clamp(0.0, 1.0)
        }
    }
}
