use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::types::{Command, CommandId, Intent};
use crate::control::events::EventBus;
use crate::control::supervisor::{Request, Supervisor, SupervisorSettings};
use crate::device::store::StateReader;
use crate::device::transport::Transport;
use crate::device::types::{DeviceEvent, DeviceState, TemperatureUnit};
use crate::error::ControlError;

/// Handle on a supervised Volcano. Cheap to clone; all clones talk to the same supervisor task.
///
/// Requests are validated here and then handed to the supervisor, which decides whether they
/// are written, retried or dropped. The outcome of every accepted request is reported as a
/// [`DeviceEvent::Command`] on the event stream, tagged with the returned [`CommandId`].
#[derive(Clone)]
pub struct VolcanoController {
    requests: UnboundedSender<Request>,
    state: StateReader,
    bus: EventBus,
    cancel: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl VolcanoController {
    /// Starts supervising the device at `address`. The returned task ends after
    /// [`VolcanoController::shutdown`] or when `cancel` fires.
    pub fn spawn<T: Transport + 'static>(
        transport: T,
        address: String,
        settings: SupervisorSettings,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let bus = EventBus::new();
        let (sender, receiver) = unbounded();
        let supervisor = Supervisor::new(transport, address, settings, bus.clone());
        let state = supervisor.state_reader();
        let cancel = cancel.child_token();
        let handle = tokio::spawn(supervisor.run(cancel.clone(), receiver));

        let controller = VolcanoController {
            requests: sender,
            state,
            bus,
            cancel,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (controller, handle)
    }

    pub fn get_state(&self) -> DeviceState {
        self.state.snapshot()
    }

    /// Every connection change, state change and command outcome from now on.
    pub fn subscribe_state_changes(&self) -> UnboundedReceiver<DeviceEvent> {
        self.bus.subscribe()
    }

    pub fn request_set_temperature(&self, celsius: f32) -> Result<CommandId, ControlError> {
        self.request(Intent::SetTemperature(celsius))
    }

    pub fn request_heater(&self, on: bool) -> Result<CommandId, ControlError> {
        self.request(Intent::Heater(on))
    }

    pub fn request_fan(&self, on: bool) -> Result<CommandId, ControlError> {
        self.request(Intent::Fan(on))
    }

    pub fn request_set_auto_off(&self, minutes: u16) -> Result<CommandId, ControlError> {
        self.request(Intent::SetAutoOff(minutes))
    }

    pub fn request_set_led(&self, percent: u8) -> Result<CommandId, ControlError> {
        self.request(Intent::SetLed(percent))
    }

    pub fn request_set_unit(&self, unit: TemperatureUnit) -> Result<CommandId, ControlError> {
        self.request(Intent::SetUnit(unit))
    }

    pub fn request_set_vibration(&self, on: bool) -> Result<CommandId, ControlError> {
        self.request(Intent::SetVibration(on))
    }

    pub fn request_set_display_on_cooling(&self, on: bool) -> Result<CommandId, ControlError> {
        self.request(Intent::SetDisplayOnCooling(on))
    }

    /// Drops the link (if any) and connects again right away.
    pub fn reconnect(&self) -> Result<(), ControlError> {
        self.send(Request::Reconnect)
    }

    /// Cancels live commands, disconnects and stops the supervisor task. A connection attempt
    /// in progress is abandoned.
    pub fn shutdown(&self) -> Result<(), ControlError> {
        let result = self.send(Request::Shutdown);
        self.cancel.cancel();
        result
    }

    fn request(&self, intent: Intent) -> Result<CommandId, ControlError> {
        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let command = Command::new(id, intent)?;
        debug!("Requesting {:?} as command {}", intent, id);
        self.send(Request::Command(command))?;
        Ok(id)
    }

    fn send(&self, request: Request) -> Result<(), ControlError> {
        self.requests.unbounded_send(request).map_err(|_| ControlError::Stopped)
    }
}
