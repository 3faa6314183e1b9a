//! A single controller on the bus, as seen from the host's polling loop.
//!
//! [`Controller`] owns the transport, the telemetry snapshot, the last
//! inertial sample and the table of pending commands. The host calls
//! [`Controller::update`] regularly to pull in received frames and to drive
//! command timeouts; everything else is a plain accessor or a non-blocking
//! command submission.

use crate::{
    codec::{is_command_response, is_status_frame, node_of},
    decode_inertial, decode_status, Command, CommandRegistry, CommandType, Continuation,
    ControllerConfig, DecodeError, InertialSample, LinkHealth, Millis, RequestState, StatusGroup,
    SubmitError, Tag, Telemetry, Transport, WireFrame, DEFAULT_CAPACITY,
};

/// Upper bound on frames handled by one [`Controller::update`] call, so a
/// chatty bus cannot stall the host loop.
pub const MAX_FRAMES_PER_UPDATE: usize = 64;

/// What happens once the reply to a command arrives
enum Reply<C> {
    Discard,
    Notify(C),
    Inertial(Option<C>),
}

/// How a single received frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// A status frame was decoded into the telemetry snapshot
    Status(StatusGroup),
    /// A reply matched a pending command, which is now complete
    Response(CommandType),
    /// A reply with no pending command (late, duplicate or unsolicited)
    Unmatched,
    /// The frame was recognized but too short to decode
    Malformed(DecodeError),
    /// Not a frame for us
    Ignored,
}

/// Summary of one [`Controller::update`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Activity {
    pub status_frames: usize,
    pub responses: usize,
    pub unmatched: usize,
    pub malformed: usize,
    pub ignored: usize,
    /// Commands dropped after their second timeout
    pub expired: usize,
}

impl Activity {
    fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Status(_) => self.status_frames += 1,
            Dispatch::Response(_) => self.responses += 1,
            Dispatch::Unmatched => self.unmatched += 1,
            Dispatch::Malformed(_) => self.malformed += 1,
            Dispatch::Ignored => self.ignored += 1,
        }
    }

    /// Total number of frames handled
    pub fn frames(&self) -> usize {
        self.status_frames + self.responses + self.unmatched + self.malformed + self.ignored
    }
}

/// One motor controller reached through a [`Transport`].
///
/// `C` is the type of the callbacks passed to [`Controller::submit_with`] and
/// `N` the number of commands that may wait for a reply at once.
pub struct Controller<T, C = fn(&[u8]), const N: usize = DEFAULT_CAPACITY> {
    transport: T,
    config: ControllerConfig,
    telemetry: Telemetry,
    inertial: InertialSample,
    inertial_request: Option<Tag>,
    registry: CommandRegistry<Reply<C>, N>,
}

impl<T: Transport, C: Continuation, const N: usize> Controller<T, C, N> {
    pub fn new(transport: T, config: ControllerConfig) -> Self {
        info!("Talking to controller at node {}", config.node_address);

        Self {
            transport,
            config,
            telemetry: Telemetry::new(),
            inertial: InertialSample::new(),
            inertial_request: None,
            registry: CommandRegistry::new(config.node_address),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Gives the transport back, dropping every pending command
    pub fn release(self) -> T {
        self.transport
    }

    /* Telemetry */

    /// Whether a status frame arrived less than `max_age_ms` before `now`
    pub fn is_fresh(&self, now: Millis, max_age_ms: u32) -> bool {
        self.telemetry.is_fresh(now, max_age_ms)
    }

    pub fn link_health(&self, now: Millis) -> LinkHealth {
        self.telemetry.link_health(now)
    }

    pub fn is_connected(&self, now: Millis) -> bool {
        self.link_health(now) != LinkHealth::NoData
    }

    /// The last inertial sample as is, without asking for a new one
    pub fn last_inertial_sample(&self) -> &InertialSample {
        &self.inertial
    }

    /// Returns the last inertial sample, first asking the controller for a
    /// new one if the current sample is missing or older than the configured
    /// refresh period. The new reading shows up after a later
    /// [`update`](Self::update).
    pub fn inertial_sample(&mut self, now: Millis) -> InertialSample {
        let pending = self
            .inertial_request
            .is_some_and(|tag| self.registry.command_type(tag) == Some(CommandType::GetInertial));

        if !pending && self.inertial.is_stale(now, self.config.inertial_refresh_ms) {
            if let Err(error) = self.request_inertial_sample(now) {
                debug!("Could not refresh inertial sample: {:?}", error);
            }
        }

        self.inertial
    }

    /* Commands */

    /// Sends a duty cycle clamped to the configured limit. NaN is sent as 0.
    pub fn set_duty_cycle(&mut self, ratio: f32, now: Millis) -> Result<Tag, SubmitError> {
        let limit = self.config.duty_limit();
        let ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.max(-limit).min(limit)
        };

        self.send(Command::SetDutyCycle(ratio), now)
    }

    pub fn set_current(&mut self, amps: f32, now: Millis) -> Result<Tag, SubmitError> {
        self.send(Command::SetCurrent(amps), now)
    }

    pub fn set_brake_current(&mut self, amps: f32, now: Millis) -> Result<Tag, SubmitError> {
        self.send(Command::SetBrakeCurrent(amps), now)
    }

    pub fn set_rpm(&mut self, erpm: f32, now: Millis) -> Result<Tag, SubmitError> {
        self.send(Command::SetRpm(erpm), now)
    }

    /// Asks for an inertial reading; the reply lands in
    /// [`last_inertial_sample`](Self::last_inertial_sample).
    pub fn request_inertial_sample(&mut self, now: Millis) -> Result<Tag, SubmitError> {
        self.send(Command::RequestInertial, now)
    }

    /// Sends `command` as is. Duty cycles are not clamped on this path.
    pub fn send(&mut self, command: Command, now: Millis) -> Result<Tag, SubmitError> {
        let reply = match command {
            Command::RequestInertial => Reply::Inertial(None),
            _ => Reply::Discard,
        };

        self.submit(command, reply, now)
    }

    /// Sends `command` and runs `callback` with the raw reply payload if one
    /// arrives before the command expires. Expiry is silent: the callback is
    /// simply dropped.
    pub fn submit_with(&mut self, command: Command, callback: C, now: Millis) -> Result<Tag, SubmitError> {
        let reply = match command {
            Command::RequestInertial => Reply::Inertial(Some(callback)),
            _ => Reply::Notify(callback),
        };

        self.submit(command, reply, now)
    }

    fn submit(&mut self, command: Command, reply: Reply<C>, now: Millis) -> Result<Tag, SubmitError> {
        let tag = self.registry.submit(
            &mut self.transport,
            command.command_type(),
            &command.to_payload(),
            reply,
            self.config.command_timeout_ms,
            now,
        )?;

        if command == Command::RequestInertial {
            self.inertial_request = Some(tag);
        }

        Ok(tag)
    }

    /// State of a command still waiting for its reply
    pub fn request_state(&self, tag: Tag) -> Option<RequestState> {
        self.registry.state(tag)
    }

    /// Number of commands waiting for a reply
    pub fn pending_commands(&self) -> usize {
        self.registry.len()
    }

    /// Drops every pending command without running its callback
    pub fn reset(&mut self) {
        self.registry.reset();
        self.inertial_request = None;
    }

    /* Receiving */

    /// Handles every frame the transport has ready (up to
    /// [`MAX_FRAMES_PER_UPDATE`]), then expires commands that timed out.
    pub fn update(&mut self, now: Millis) -> Activity {
        let mut activity = Activity::default();

        for _ in 0..MAX_FRAMES_PER_UPDATE {
            let Some(frame) = self.transport.poll() else {
                break;
            };

            activity.record(self.dispatch(&frame, now));
        }

        activity.expired = self.registry.tick(now);

        activity
    }

    /// Routes one received frame to the telemetry snapshot or to the command
    /// it answers.
    pub fn dispatch(&mut self, frame: &WireFrame, now: Millis) -> Dispatch {
        let id = frame.id();
        let node_address = self.config.node_address;

        if is_status_frame(id) {
            if node_of(id) != node_address {
                return Dispatch::Ignored;
            }

            return match decode_status(id, frame.data()) {
                Ok(Some(update)) => {
                    self.telemetry.apply(update, now);
                    Dispatch::Status(update.group())
                }
                Ok(None) => Dispatch::Ignored,
                Err(error) => {
                    warn!("Dropping status frame {:x}: {:?}", id, error);
                    Dispatch::Malformed(error)
                }
            };
        }

        if is_command_response(id, node_address) {
            return self.dispatch_response(id, frame.data(), now);
        }

        trace!("Ignoring frame {:x}", id);
        Dispatch::Ignored
    }

    fn dispatch_response(&mut self, id: u32, payload: &[u8], now: Millis) -> Dispatch {
        let Some((command_type, reply)) = self.registry.take_matching(id) else {
            debug!("Unmatched response {:x}", id);
            return Dispatch::Unmatched;
        };

        match reply {
            Reply::Discard => {}
            Reply::Notify(callback) => callback.complete(payload),
            Reply::Inertial(callback) => {
                let decoded = decode_inertial(payload);

                if let Some(callback) = callback {
                    callback.complete(payload);
                }

                match decoded {
                    Ok(reading) => self.inertial.store(reading, now),
                    Err(error) => {
                        warn!("Dropping inertial reply {:x}: {:?}", id, error);
                        return Dispatch::Malformed(error);
                    }
                }
            }
        }

        Dispatch::Response(command_type)
    }
}
