//! Connection lifecycle and the task that owns all device state.
//!
//! The supervisor runs as a single task. Requests from the controller, notifications from the
//! device, retry deadlines of the dispatcher and reconnect/health deadlines are all handled in
//! one `select!` loop, so none of them ever observe each other half way.

use std::time::Duration;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::command::dispatcher::Dispatcher;
use crate::command::types::{CancelReason, Command};
use crate::control::backoff::Backoff;
use crate::control::events::EventBus;
use crate::device::codec::Characteristic;
use crate::device::store::{DeviceStore, StateReader};
use crate::device::transport::{Notification, NotificationStream, Transport};
use crate::device::types::{ConnectionStatus, DeviceEvent};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub health_check_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        SupervisorSettings {
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub enum Request {
    Command(Command),
    Reconnect,
    Shutdown,
}

pub struct Supervisor<T: Transport> {
    transport: T,
    address: String,
    settings: SupervisorSettings,
    store: DeviceStore,
    dispatcher: Dispatcher,
    bus: EventBus,
    status: ConnectionStatus,
    backoff: Backoff,
    available: Vec<Characteristic>,
    notifications: Option<NotificationStream>,
    next_connect_at: Option<Instant>,
    next_health_check_at: Option<Instant>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_notification(stream: &mut Option<NotificationStream>) -> Option<Notification> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl<T: Transport> Supervisor<T> {
    pub fn new(transport: T, address: String, settings: SupervisorSettings, bus: EventBus) -> Self {
        let backoff = Backoff::new(settings.reconnect_initial_delay, settings.reconnect_max_delay);

        Supervisor {
            transport,
            address,
            settings,
            store: DeviceStore::new(bus.clone()),
            dispatcher: Dispatcher::new(bus.clone()),
            bus,
            status: ConnectionStatus::Disconnected,
            backoff,
            available: Vec::new(),
            notifications: None,
            next_connect_at: None,
            next_health_check_at: None,
        }
    }

    pub fn state_reader(&self) -> StateReader {
        self.store.reader()
    }

    pub async fn run(mut self, cancel: CancellationToken, mut requests: UnboundedReceiver<Request>) {
        info!("Supervising device {}", self.address);
        self.next_connect_at = Some(Instant::now());

        'mainloop: loop {
            let retry_at = self.dispatcher.next_deadline();
            let connect_at = self.next_connect_at;
            let health_at = self.next_health_check_at;

            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                request = requests.next() => match request {
                    Some(Request::Command(command)) => self.handle_command(command).await,
                    Some(Request::Reconnect) => self.handle_reconnect().await,
                    Some(Request::Shutdown) | None => break 'mainloop,
                },
                notification = next_notification(&mut self.notifications), if self.notifications.is_some() => {
                    match notification {
                        Some(notification) => self.handle_notification(notification),
                        None => self.handle_link_lost("notification stream ended").await,
                    }
                },
                _ = sleep_until_deadline(retry_at), if retry_at.is_some() => {
                    self.handle_retry_tick().await;
                },
                _ = sleep_until_deadline(connect_at), if connect_at.is_some() => {
                    self.try_connect(&cancel).await;
                    if cancel.is_cancelled() {
                        break 'mainloop;
                    }
                },
                _ = sleep_until_deadline(health_at), if health_at.is_some() => {
                    self.check_health().await;
                },
            }
        }

        self.release().await;

        // requests that were still queued never reach the device
        requests.close();
        while let Ok(Some(request)) = requests.try_next() {
            if let Request::Command(command) = request {
                self.dispatcher.reject(command, CancelReason::Shutdown);
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!("Connection {} -> {}", self.status, status);
            self.status = status;
            self.bus.publish(DeviceEvent::ConnectionChanged(status));
        }
    }

    async fn handle_command(&mut self, command: Command) {
        if self.status != ConnectionStatus::Connected {
            debug!("Not connected ({}), dropping command {}", self.status, command.id);
            self.dispatcher.reject(command, CancelReason::NotConnected);
            return;
        }

        let result = self.dispatcher.submit(command, &self.transport, &mut self.store, Instant::now()).await;
        if let Err(err) = result {
            self.verify_link(err).await;
        }
    }

    fn handle_notification(&mut self, notification: Notification) {
        match self.store.apply_notification(notification.uuid, &notification.value) {
            Ok(changed) => {
                if !changed.is_empty() {
                    let state = self.store.snapshot();
                    self.dispatcher.reconcile(&state);
                }
            },
            Err(err) => warn!("Discarding notification: {}", err),
        }
    }

    async fn handle_retry_tick(&mut self) {
        let result = self.dispatcher.tick(&self.transport, &mut self.store, Instant::now()).await;
        if let Err(err) = result {
            self.verify_link(err).await;
        }
    }

    /// A GATT operation failed; find out whether the link is gone or it was a one-off.
    async fn verify_link(&mut self, err: TransportError) {
        match self.transport.is_connected().await {
            Ok(true) => debug!("Link still up after error: {}", err),
            Ok(false) => self.handle_link_lost(&err.to_string()).await,
            Err(check_err) => {
                warn!("Error checking for connection state: {:?}", check_err);
                self.handle_link_lost(&err.to_string()).await;
            },
        }
    }

    async fn handle_reconnect(&mut self) {
        info!("Reconnect requested");
        if self.status == ConnectionStatus::Connected {
            self.dispatcher.purge(CancelReason::Reconnect);
            self.close_link().await;
            self.set_status(ConnectionStatus::Reconnecting);
        }

        self.backoff.reset();
        self.next_connect_at = Some(Instant::now());
    }

    /// Gives up as soon as `cancel` fires; the half open link is then left for `release`.
    async fn try_connect(&mut self, cancel: &CancellationToken) {
        self.next_connect_at = None;
        let failed_status = match self.status {
            ConnectionStatus::Reconnecting => ConnectionStatus::Reconnecting,
            _ => ConnectionStatus::Disconnected,
        };

        self.set_status(ConnectionStatus::Discovering);
        let opened = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Connecting to {} cancelled", self.address);
                return;
            },
            result = self.open_link() => result,
        };
        if let Err(err) = opened {
            warn!("Connecting to {} failed: {}", self.address, err);
            self.close_link().await;
            self.set_status(failed_status);
            self.schedule_reconnect();
            return;
        }

        self.set_status(ConnectionStatus::Connected);
        let seeded = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.subscribe_and_seed() => result,
        };
        if let Err(err) = seeded {
            self.handle_link_lost(&format!("seeding failed: {}", err)).await;
            return;
        }

        self.backoff.reset();
        self.store.set_connected(true);
        self.next_health_check_at = Some(Instant::now() + self.settings.health_check_interval);
        info!("Device {} ready", self.address);
    }

    async fn open_link(&mut self) -> Result<(), TransportError> {
        self.transport.find_device(&self.address).await?;

        self.set_status(ConnectionStatus::Connecting);
        self.transport.connect().await?;

        let uuids = self.transport.discover_characteristics().await?;
        let missing = Characteristic::ALL
            .into_iter()
            .find(|characteristic| characteristic.required() && !uuids.contains(&characteristic.uuid()));
        if let Some(characteristic) = missing {
            return Err(TransportError::MissingCharacteristic { uuid: characteristic.uuid() });
        }

        self.available = Characteristic::ALL
            .into_iter()
            .filter(|characteristic| uuids.contains(&characteristic.uuid()))
            .collect();
        Ok(())
    }

    /// Subscribes to everything the device notifies, then reads every readable value. The
    /// notification stream is taken first so nothing sent in between is lost.
    async fn subscribe_and_seed(&mut self) -> Result<(), TransportError> {
        self.notifications = Some(self.transport.notifications().await?);

        let available = self.available.clone();
        for characteristic in available.iter().filter(|characteristic| characteristic.notifies()) {
            debug!("Subscribing to {:?}", characteristic);
            self.transport.subscribe(characteristic.uuid()).await?;
        }

        for characteristic in available.iter().filter(|characteristic| characteristic.readable()) {
            let bytes = self.transport.read_characteristic(characteristic.uuid()).await?;
            if let Err(err) = self.store.apply_notification(characteristic.uuid(), &bytes) {
                warn!("Ignoring unexpected value while seeding: {}", err);
            }
        }

        Ok(())
    }

    async fn check_health(&mut self) {
        self.next_health_check_at = None;

        match self.transport.is_connected().await {
            Ok(true) => {
                if let Some(rssi) = self.transport.rssi().await {
                    self.store.set_rssi(rssi);
                }
                self.next_health_check_at = Some(Instant::now() + self.settings.health_check_interval);
            },
            Ok(false) => self.handle_link_lost("device reports disconnected").await,
            Err(err) => self.handle_link_lost(&err.to_string()).await,
        }
    }

    async fn handle_link_lost(&mut self, reason: &str) {
        warn!("Connection lost: {}", reason);
        self.dispatcher.purge(CancelReason::ConnectionLost);
        self.close_link().await;
        self.set_status(ConnectionStatus::Reconnecting);
        self.schedule_reconnect();
    }

    async fn close_link(&mut self) {
        self.notifications = None;
        self.next_health_check_at = None;
        self.store.set_connected(false);

        if let Err(err) = self.transport.disconnect().await {
            debug!("Disconnecting failed: {}", err);
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        info!("Next connection attempt in {}", humantime::format_duration(delay));
        self.next_connect_at = Some(Instant::now() + delay);
    }

    async fn release(&mut self) {
        info!("Stopping supervision of {}", self.address);
        self.dispatcher.purge(CancelReason::Shutdown);
        self.close_link().await;
        self.next_connect_at = None;
        self.set_status(ConnectionStatus::Disconnected);
    }
}
