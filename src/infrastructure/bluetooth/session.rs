//! Drone Session
//!
//! Owns the connection lifecycle of one drone: handshake, take off and
//! landing, the drive loop that keeps piloting frames flowing while airborne,
//! queued one-shot commands and status notifications.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──▶ Handshaking ──▶ Ready
//! Ready ──take_off──▶ Airborne ──land──▶ Landing ──▶ Ready
//! any ──emergency_cut_off──▶ Emergency ──take_off──▶ Airborne
//! Airborne ──write failure──▶ Error ──connect──▶ Ready
//! ```
//!
//! A write failure invalidates the handshake. Until `connect` runs again,
//! `take_off` is rejected even from `Emergency` or `Ready`.

use crate::domain::controller::OrientationMapper;
use crate::domain::models::{
    Axis, DroneEvent, DroneState, FlightState, LoopExit, Movement, Orientation,
};
use crate::domain::sensor::OrientationSource;
use crate::domain::settings::{DriveSettings, EmergencyPolicy, Settings};
use crate::error::{DroneError, Result, SensorError, TransportError};
use crate::infrastructure::bluetooth::protocol::{
    Command, CommandCodec, DiscoveryFilter, FlipDirection, OutgoingFrame,
    BATTERY_STATUS_CHAR_UUID, FLIGHT_STATUS_CHAR_UUID, READ_SERVICE_UUID,
};
use crate::infrastructure::bluetooth::status::{parse_battery_status, parse_flight_status};
use crate::infrastructure::bluetooth::transport::Transport;
use crate::infrastructure::scheduler::RepeatingTask;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared between the session, its drive loop and notification listeners
struct FlightDeck {
    state: DroneState,
    movement: Movement,
    // Ticks left before a discrete move returns to hover
    drive_steps_remaining: u32,
    queued: Option<Command>,
    codec: CommandCodec,
    flight_state: Option<FlightState>,
    battery: Option<u8>,
    // Cleared on Error: the drone may have dropped frames and lost sequence sync
    handshake_valid: bool,
}

impl FlightDeck {
    fn is_moving(&self) -> bool {
        !self.movement.is_zero() || self.drive_steps_remaining > 0
    }

    fn hover(&mut self) {
        self.movement = Movement::ZERO;
        self.drive_steps_remaining = 0;
    }

    /// Count down a discrete move; true when it just finished
    fn advance_drive_steps(&mut self) -> bool {
        if self.drive_steps_remaining == 0 {
            return false;
        }

        self.drive_steps_remaining -= 1;
        if self.drive_steps_remaining == 0 {
            debug!("Move complete, reset to hover state");
            self.movement = Movement::ZERO;
            true
        } else {
            debug!("Drive steps remaining: {}", self.drive_steps_remaining);
            false
        }
    }
}

#[derive(Clone)]
struct Cockpit {
    deck: Arc<Mutex<FlightDeck>>,
    events: mpsc::UnboundedSender<DroneEvent>,
}

impl Cockpit {
    fn lock(&self) -> MutexGuard<'_, FlightDeck> {
        self.deck.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DroneEvent) {
        let _ = self.events.send(event);
    }

    fn state(&self) -> DroneState {
        self.lock().state
    }

    fn set_state(&self, state: DroneState) {
        let previous = {
            let mut deck = self.lock();
            if state == DroneState::Error {
                deck.handshake_valid = false;
            }
            std::mem::replace(&mut deck.state, state)
        };
        if previous != state {
            info!("Drone state: {:?} -> {:?}", previous, state);
            self.emit(DroneEvent::StateChanged(state));
        }
    }

    /// Move to `state` only if the session is still in `expected`
    fn transition_from(&self, expected: DroneState, state: DroneState) {
        if self.state() == expected {
            self.set_state(state);
        }
    }

    fn encode(&self, command: &Command) -> OutgoingFrame {
        self.lock().codec.encode(command)
    }

    fn report(&self, error: &TransportError) {
        self.emit(DroneEvent::Error(DroneError::Transport(error.clone())));
    }

    fn handle_flight_status(&self, bytes: &[u8]) {
        let flight_state = match parse_flight_status(bytes) {
            Ok(flight_state) => flight_state,
            Err(e) => {
                warn!("Invalid flight status notification: {}", e);
                self.emit(DroneEvent::DecodeFailed {
                    characteristic: FLIGHT_STATUS_CHAR_UUID,
                    error: e,
                });
                return;
            }
        };

        self.lock().flight_state = Some(flight_state);

        match flight_state {
            FlightState::Unrecognized(index) => {
                warn!("Unrecognized flight state: {}", index);
                self.emit(DroneEvent::UnrecognizedFlightState(index));
            }
            FlightState::CutOff => {
                warn!("Drone reports motors cut off");
                self.emit(DroneEvent::FlightState(flight_state));
                let state = self.state();
                if matches!(state, DroneState::Airborne | DroneState::Landing) {
                    self.set_state(DroneState::Emergency);
                }
            }
            _ => {
                info!(
                    "Flight state: {:?} ({})",
                    flight_state,
                    if flight_state.is_flying() {
                        "flying"
                    } else {
                        "not flying"
                    }
                );
                self.emit(DroneEvent::FlightState(flight_state));
            }
        }
    }

    fn handle_battery_status(&self, bytes: &[u8], low_threshold: u8) {
        let battery = match parse_battery_status(bytes) {
            Ok(battery) => battery,
            Err(e) => {
                warn!("Invalid battery notification: {}", e);
                self.emit(DroneEvent::DecodeFailed {
                    characteristic: BATTERY_STATUS_CHAR_UUID,
                    error: e,
                });
                return;
            }
        };

        self.lock().battery = Some(battery.percent);
        info!("Battery level: {}%", battery.percent);
        self.emit(DroneEvent::Battery(battery.percent));

        if battery.is_low(low_threshold) {
            warn!("Battery level too low! ({}%)", battery.percent);
            self.emit(DroneEvent::LowBattery(battery.percent));
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusChannel {
    Flight,
    Battery,
}

impl StatusChannel {
    fn characteristic(self) -> &'static str {
        match self {
            Self::Flight => FLIGHT_STATUS_CHAR_UUID,
            Self::Battery => BATTERY_STATUS_CHAR_UUID,
        }
    }
}

async fn send<T: Transport>(
    transport: &T,
    frame: OutgoingFrame,
) -> std::result::Result<(), TransportError> {
    transport
        .write(frame.route.service, frame.route.characteristic, frame.bytes)
        .await
}

/// One drive loop cycle: the queued one-shot command if any, else a PCMD frame
async fn drive_tick<T: Transport>(transport: Arc<T>, cockpit: Cockpit) -> ControlFlow<LoopExit> {
    let (frame, piloting) = {
        let mut deck = cockpit.lock();
        if deck.state != DroneState::Airborne {
            drop(deck);
            debug!("Drive loop: no longer airborne");
            cockpit.emit(DroneEvent::DriveLoopStopped(LoopExit::Grounded));
            return ControlFlow::Break(LoopExit::Grounded);
        }

        match deck.queued.take() {
            Some(command) => {
                debug!("Drive loop: sending queued {}", command.name());
                (deck.codec.encode(&command), false)
            }
            None => {
                let command = Command::Piloting {
                    movement: deck.movement,
                    moving: deck.is_moving(),
                };
                debug!("Drive... {:?}", deck.movement);
                (deck.codec.encode(&command), true)
            }
        }
    };

    if let Err(e) = send(&*transport, frame).await {
        error!("Drive loop write failed: {}", e);
        cockpit.set_state(DroneState::Error);
        cockpit.report(&e);
        let exit = LoopExit::Failed(e);
        cockpit.emit(DroneEvent::DriveLoopStopped(exit.clone()));
        return ControlFlow::Break(exit);
    }

    if piloting && cockpit.lock().advance_drive_steps() {
        cockpit.emit(DroneEvent::Movement(Movement::ZERO));
    }
    ControlFlow::Continue(())
}

async fn listen(
    cockpit: Cockpit,
    channel: StatusChannel,
    mut notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    low_battery_threshold: u8,
) {
    while let Some(bytes) = notifications.recv().await {
        debug!(
            "Notification from {}: {:02X?}",
            channel.characteristic(),
            bytes
        );
        match channel {
            StatusChannel::Flight => cockpit.handle_flight_status(&bytes),
            StatusChannel::Battery => cockpit.handle_battery_status(&bytes, low_battery_threshold),
        }
    }
    debug!("Notifications from {} ended", channel.characteristic());
}

/// Session with one drone over a [`Transport`]
pub struct DroneSession<T: Transport> {
    transport: Arc<T>,
    drive: DriveSettings,
    cockpit: Cockpit,
    mapper: OrientationMapper,
    drive_loop: Option<RepeatingTask>,
    listeners: Vec<JoinHandle<()>>,
}

impl<T: Transport> DroneSession<T> {
    /// Create an idle session publishing its events to `events`
    pub fn new(
        transport: Arc<T>,
        settings: &Settings,
        events: mpsc::UnboundedSender<DroneEvent>,
    ) -> Self {
        let deck = FlightDeck {
            state: DroneState::Idle,
            movement: Movement::ZERO,
            drive_steps_remaining: 0,
            queued: None,
            codec: CommandCodec::new(),
            flight_state: None,
            battery: None,
            handshake_valid: false,
        };

        Self {
            transport,
            drive: settings.drive.clone(),
            cockpit: Cockpit {
                deck: Arc::new(Mutex::new(deck)),
                events,
            },
            mapper: OrientationMapper::new(settings.controller.clone()),
            drive_loop: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> DroneState {
        self.cockpit.state()
    }

    /// Movement sent with the next piloting frame
    pub fn movement(&self) -> Movement {
        self.cockpit.lock().movement
    }

    /// Last decoded flight state
    pub fn flight_state(&self) -> Option<FlightState> {
        self.cockpit.lock().flight_state
    }

    /// Last decoded battery level in percent
    pub fn battery_level(&self) -> Option<u8> {
        self.cockpit.lock().battery
    }

    /// Current deviation from the calibrated center
    pub fn orientation_diff(&self) -> Orientation {
        self.mapper.diff()
    }

    pub fn is_drive_loop_running(&self) -> bool {
        self.drive_loop
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn ensure_state(&self, operation: &'static str, allowed: &[DroneState]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            warn!("Rejected {} while {:?}", operation, state);
            Err(DroneError::InvalidState { operation, state })
        }
    }

    /// True while the sequence counters are known to match the drone's
    pub fn is_handshake_valid(&self) -> bool {
        self.cockpit.lock().handshake_valid
    }

    /// Connect, subscribe to status notifications and perform the handshake.
    ///
    /// Also used to recover from [`DroneState::Error`] and
    /// [`DroneState::Emergency`], and from `Ready` once the handshake went stale.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state() != DroneState::Ready || self.is_handshake_valid() {
            self.ensure_state(
                "connect",
                &[DroneState::Idle, DroneState::Error, DroneState::Emergency],
            )?;
        }
        self.halt_drive_loop().await;

        self.cockpit.lock().handshake_valid = false;
        self.cockpit.set_state(DroneState::Connecting);
        info!("Connecting to drone...");
        if let Err(e) = self.transport.connect(&DiscoveryFilter::minidrone()).await {
            error!("Connection failed: {}", e);
            self.cockpit.set_state(DroneState::Idle);
            self.cockpit.report(&e);
            return Err(e.into());
        }

        self.cockpit.set_state(DroneState::Handshaking);
        self.start_notifications().await;
        tokio::time::sleep(self.drive.settle_delay()).await;

        if let Err(e) = self.handshake().await {
            error!("Handshake failed: {}", e);
            self.cockpit.set_state(DroneState::Idle);
            self.cockpit.report(&e);
            return Err(e.into());
        }

        self.cockpit.lock().handshake_valid = true;
        self.cockpit.set_state(DroneState::Ready);
        Ok(())
    }

    async fn start_notifications(&mut self) {
        debug!("Start notifications...");
        for listener in self.listeners.drain(..) {
            listener.abort();
        }

        for channel in [StatusChannel::Flight, StatusChannel::Battery] {
            let characteristic = channel.characteristic();
            match self
                .transport
                .start_notifications(READ_SERVICE_UUID, characteristic)
                .await
            {
                Ok(notifications) => {
                    self.listeners.push(tokio::spawn(listen(
                        self.cockpit.clone(),
                        channel,
                        notifications,
                        self.drive.low_battery_threshold,
                    )));
                }
                Err(e) => {
                    warn!("Failed to start notifications on {}: {}", characteristic, e);
                    self.cockpit.report(&e);
                }
            }
        }
        debug!("Finished starting notifications");
    }

    async fn handshake(&mut self) -> std::result::Result<(), TransportError> {
        debug!("Handshake");
        self.cockpit.lock().codec.reset_sequences();

        if let Some(date) = self.drive.handshake_date.clone() {
            let frame = self.cockpit.encode(&Command::CurrentDate(date));
            send(&*self.transport, frame).await?;
        }

        debug!("Completed handshake");
        Ok(())
    }

    /// Flat trim, take off, then start the drive loop.
    ///
    /// Requires a valid handshake; after an error, call [`connect`](Self::connect) first.
    pub async fn take_off(&mut self) -> Result<()> {
        self.ensure_state("take off", &[DroneState::Ready, DroneState::Emergency])?;
        let origin = self.state();
        if !self.is_handshake_valid() {
            warn!("Rejected take off while {:?}: reconnect to handshake first", origin);
            return Err(DroneError::InvalidState {
                operation: "take off",
                state: origin,
            });
        }
        info!("Take off...");

        self.halt_drive_loop().await;
        self.hover();
        if self.mapper.is_enabled() {
            self.mapper.set_enabled(true);
        }

        for command in [Command::FlatTrim, Command::TakeOff] {
            let frame = self.cockpit.encode(&command);
            if let Err(e) = send(&*self.transport, frame).await {
                error!("Take off failed during {}: {}", command.name(), e);
                self.cockpit.set_state(origin);
                self.cockpit.report(&e);
                return Err(e.into());
            }
        }

        self.cockpit.set_state(DroneState::Airborne);
        self.start_drive_loop();
        Ok(())
    }

    /// Stop the drive loop, let in-flight frames settle, then land
    pub async fn land(&mut self) -> Result<()> {
        self.ensure_state("land", &[DroneState::Airborne, DroneState::Error])?;
        info!("Land...");

        self.cockpit.set_state(DroneState::Landing);
        self.halt_drive_loop().await;
        tokio::time::sleep(self.drive.interval()).await;

        {
            let mut deck = self.cockpit.lock();
            deck.queued = None;
            deck.hover();
        }

        let frame = self.cockpit.encode(&Command::Landing);
        match send(&*self.transport, frame).await {
            Ok(()) => {
                self.cockpit
                    .transition_from(DroneState::Landing, DroneState::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Landing failed: {}", e);
                self.cockpit
                    .transition_from(DroneState::Landing, DroneState::Error);
                self.cockpit.report(&e);
                Err(e.into())
            }
        }
    }

    /// Cut the motors right away, from any state
    pub async fn emergency_cut_off(&mut self) -> Result<()> {
        warn!("Emergency cut off!");

        if let Some(task) = self.drive_loop.take() {
            // A loop that ended on its own already reported why
            let running = !task.is_finished();
            task.abort();
            if running {
                self.cockpit
                    .emit(DroneEvent::DriveLoopStopped(LoopExit::Aborted));
            }
        }
        {
            let mut deck = self.cockpit.lock();
            deck.queued = None;
            deck.hover();
        }
        self.cockpit.set_state(DroneState::Emergency);

        let frame = self.cockpit.encode(&Command::Emergency);
        match self.drive.emergency_policy {
            EmergencyPolicy::FireAndForget => {
                let transport = self.transport.clone();
                let cockpit = self.cockpit.clone();
                tokio::spawn(async move {
                    if let Err(e) = send(&*transport, frame).await {
                        error!("Emergency cut off write failed: {}", e);
                        cockpit.report(&e);
                    }
                });
                Ok(())
            }
            EmergencyPolicy::AwaitWrite => {
                send(&*self.transport, frame).await.map_err(|e| {
                    error!("Emergency cut off write failed: {}", e);
                    self.cockpit.report(&e);
                    DroneError::from(e)
                })
            }
        }
    }

    /// Queue a flip for the next drive loop tick
    pub fn flip(&mut self, direction: FlipDirection) -> Result<()> {
        debug!("Flip {:?}...", direction);
        self.queue(Command::Flip(direction))
    }

    /// Queue a rotation by `degrees` for the next drive loop tick
    pub fn turn(&mut self, degrees: i16) -> Result<()> {
        debug!("Turn (cap) {}...", degrees);
        self.queue(Command::Turn(degrees))
    }

    fn queue(&mut self, command: Command) -> Result<()> {
        self.ensure_state(command.name(), &[DroneState::Airborne])?;
        if let Some(replaced) = self.cockpit.lock().queued.replace(command) {
            debug!("Replacing queued {}", replaced.name());
        }
        Ok(())
    }

    pub fn move_forwards(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Pitch, 1)
    }

    pub fn move_backwards(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Pitch, -1)
    }

    pub fn move_left(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Roll, -1)
    }

    pub fn move_right(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Roll, 1)
    }

    pub fn move_up(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Altitude, 1)
    }

    pub fn move_down(&mut self) -> Result<()> {
        self.start_discrete_movement(Axis::Altitude, -1)
    }

    /// Move along one axis at the default speed for a fixed number of ticks
    fn start_discrete_movement(&mut self, axis: Axis, direction: i32) -> Result<()> {
        self.ensure_state("move", &[DroneState::Airborne])?;

        let speed = self.drive.default_speed as i32 * direction;
        let steps = self.drive.drive_steps();
        debug!(
            "Start movement of {:?} with speed {} for {} steps",
            axis, speed, steps
        );

        let movement = Movement::along(axis, speed);
        {
            let mut deck = self.cockpit.lock();
            deck.movement = movement;
            deck.drive_steps_remaining = steps;
        }
        self.cockpit.emit(DroneEvent::Movement(movement));
        Ok(())
    }

    /// Replace the movement sent by the drive loop
    pub fn set_movement(&mut self, movement: Movement) {
        {
            let mut deck = self.cockpit.lock();
            deck.hover();
            deck.movement = movement;
        }
        self.cockpit.emit(DroneEvent::Movement(movement));
    }

    /// Stop moving and hold position
    pub fn hover(&mut self) {
        debug!("Hover");
        let was_moving = {
            let mut deck = self.cockpit.lock();
            let was_moving = !deck.movement.is_zero();
            deck.hover();
            was_moving
        };
        if was_moving {
            self.cockpit.emit(DroneEvent::Movement(Movement::ZERO));
        }
    }

    /// Hand movement control to the orientation sensor
    pub fn start_movement(&mut self) {
        info!("Start movement");
        self.mapper.set_enabled(true);
    }

    /// Take movement control away from the orientation sensor and hover
    pub fn stop_movement(&mut self) {
        info!("Stop movement");
        self.mapper.set_enabled(false);
        self.hover();
    }

    /// Use the next orientation sample as the new neutral pose
    pub fn calibrate(&mut self) {
        self.mapper.calibrate();
    }

    /// Feed one orientation sample; returns the movement if it changed
    pub fn feed_orientation(&mut self, sample: &Orientation) -> Option<Movement> {
        let movement = self.mapper.map(sample)?;
        self.set_movement(movement);
        Some(movement)
    }

    /// Separate altitude control input for orientation mode
    pub fn set_altitude(&mut self, altitude: i32) -> Option<Movement> {
        let movement = self.mapper.set_altitude(altitude)?;
        self.set_movement(movement);
        Some(movement)
    }

    /// Feed every sample of `source` until it ends
    pub async fn run_orientation<S: OrientationSource>(
        &mut self,
        source: &mut S,
    ) -> std::result::Result<(), SensorError> {
        while let Some(sample) = source.next_sample().await? {
            self.feed_orientation(&sample);
        }
        Ok(())
    }

    fn start_drive_loop(&mut self) {
        if let Some(previous) = self.drive_loop.take() {
            previous.abort();
        }

        debug!("Start drive loop ({:?})", self.drive.interval());
        let transport = self.transport.clone();
        let cockpit = self.cockpit.clone();
        self.drive_loop = Some(RepeatingTask::spawn(self.drive.interval(), move || {
            drive_tick(transport.clone(), cockpit.clone())
        }));
    }

    /// Stop the drive loop after its in-flight tick; no-op when not running
    async fn halt_drive_loop(&mut self) {
        let Some(task) = self.drive_loop.take() else {
            return;
        };

        debug!("Stop drive loop");
        let exit = task.stop().await;
        // Loops that ended on their own already reported why
        if exit == LoopExit::Cancelled {
            self.cockpit.emit(DroneEvent::DriveLoopStopped(exit));
        }
    }
}

impl<T: Transport> Drop for DroneSession<T> {
    fn drop(&mut self) {
        if let Some(task) = self.drive_loop.take() {
            task.abort();
        }
        for listener in &self.listeners {
            listener.abort();
        }
    }
}
