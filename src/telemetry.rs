use crate::{InertialReading, Millis, StatusUpdate};

/// Age under which telemetry counts as [`LinkHealth::Fresh`]
pub const FRESH_THRESHOLD_MS: u32 = 500;

/// Age under which telemetry counts as [`LinkHealth::Stale`] rather than gone
pub const CONNECTED_THRESHOLD_MS: u32 = 1000;

/// Age after which an inertial sample is refreshed
pub const INERTIAL_STALE_MS: u32 = 5000;

/// How recently the controller was heard from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkHealth {
    Fresh,
    Stale,
    NoData,
}

/// Latest value of every telemetry channel broadcast by the controller.
///
/// Each status frame overwrites only the fields it carries, all of them
/// together.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    erpm: f32,
    duty: f32,
    motor_current: f32,
    input_current: f32,
    input_voltage: f32,
    amp_hours: f32,
    amp_hours_charged: f32,
    watt_hours: f32,
    watt_hours_charged: f32,
    temp_fet: f32,
    temp_motor: f32,
    pid_pos: f32,
    tachometer: f32,
    adc: [f32; 3],
    ppm: f32,
    last_update: Option<Millis>,
    frame_count: u32,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a decoded status frame received at `now`
    pub fn apply(&mut self, update: StatusUpdate, now: Millis) {
        match update {
            StatusUpdate::Status1 {
                erpm,
                current,
                duty,
            } => {
                self.erpm = erpm;
                self.motor_current = current;
                self.duty = duty;
            }
            StatusUpdate::Status2 {
                amp_hours,
                amp_hours_charged,
            } => {
                self.amp_hours = amp_hours;
                self.amp_hours_charged = amp_hours_charged;
            }
            StatusUpdate::Status3 {
                watt_hours,
                watt_hours_charged,
            } => {
                self.watt_hours = watt_hours;
                self.watt_hours_charged = watt_hours_charged;
            }
            StatusUpdate::Status4 {
                temp_fet,
                temp_motor,
                current_in,
                pid_pos,
            } => {
                self.temp_fet = temp_fet;
                self.temp_motor = temp_motor;
                self.input_current = current_in;
                self.pid_pos = pid_pos;
            }
            StatusUpdate::Status5 {
                tachometer,
                voltage_in,
            } => {
                self.tachometer = tachometer;
                self.input_voltage = voltage_in;
            }
            StatusUpdate::Status6 {
                adc1,
                adc2,
                adc3,
                ppm,
            } => {
                self.adc = [adc1, adc2, adc3];
                self.ppm = ppm;
            }
        }

        self.last_update = Some(now);
        self.frame_count = self.frame_count.wrapping_add(1);
    }

    /// Electrical RPM
    pub fn rpm(&self) -> f32 {
        self.erpm
    }

    /// Duty cycle in `-1.0..=1.0`
    pub fn duty_cycle(&self) -> f32 {
        self.duty
    }

    pub fn motor_current(&self) -> f32 {
        self.motor_current
    }

    pub fn input_current(&self) -> f32 {
        self.input_current
    }

    pub fn input_voltage(&self) -> f32 {
        self.input_voltage
    }

    pub fn amp_hours(&self) -> f32 {
        self.amp_hours
    }

    pub fn amp_hours_charged(&self) -> f32 {
        self.amp_hours_charged
    }

    pub fn watt_hours(&self) -> f32 {
        self.watt_hours
    }

    pub fn watt_hours_charged(&self) -> f32 {
        self.watt_hours_charged
    }

    /// MOSFET temperature in °C
    pub fn fet_temperature(&self) -> f32 {
        self.temp_fet
    }

    /// Motor temperature in °C
    pub fn motor_temperature(&self) -> f32 {
        self.temp_motor
    }

    /// Position-control setpoint echo
    pub fn pid_position(&self) -> f32 {
        self.pid_pos
    }

    pub fn tachometer(&self) -> f32 {
        self.tachometer
    }

    pub fn adc1(&self) -> f32 {
        self.adc[0]
    }

    pub fn adc2(&self) -> f32 {
        self.adc[1]
    }

    pub fn adc3(&self) -> f32 {
        self.adc[2]
    }

    pub fn ppm(&self) -> f32 {
        self.ppm
    }

    /// Time the last status frame was stored, `None` before the first one
    pub fn last_update(&self) -> Option<Millis> {
        self.last_update
    }

    /// Number of status frames stored so far (wrapping)
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Whether a status frame was stored less than `max_age_ms` before `now`
    pub fn is_fresh(&self, now: Millis, max_age_ms: u32) -> bool {
        self.last_update
            .is_some_and(|at| now.wrapping_sub(at) < max_age_ms)
    }

    pub fn link_health(&self, now: Millis) -> LinkHealth {
        match self.last_update.map(|at| now.wrapping_sub(at)) {
            Some(age) if age <= FRESH_THRESHOLD_MS => LinkHealth::Fresh,
            Some(age) if age <= CONNECTED_THRESHOLD_MS => LinkHealth::Stale,
            _ => LinkHealth::NoData,
        }
    }
}

/// The last inertial reading received, with the time it arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InertialSample {
    reading: InertialReading,
    updated_at: Option<Millis>,
}

impl InertialSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole sample
    pub fn store(&mut self, reading: InertialReading, now: Millis) {
        self.reading = reading;
        self.updated_at = Some(now);
    }

    pub fn reading(&self) -> &InertialReading {
        &self.reading
    }

    /// Whether any reading has been received yet
    pub fn is_valid(&self) -> bool {
        self.updated_at.is_some()
    }

    pub fn updated_at(&self) -> Option<Millis> {
        self.updated_at
    }

    /// True when no reading has arrived or the last one is `threshold_ms` or
    /// more old.
    pub fn is_stale(&self, now: Millis, threshold_ms: u32) -> bool {
        match self.updated_at {
            Some(at) => now.wrapping_sub(at) >= threshold_ms,
            None => true,
        }
    }
}
