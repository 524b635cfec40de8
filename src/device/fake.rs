//! In-memory stand-in for a Volcano, used by the dispatcher and supervisor tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use uuid::Uuid;

use crate::device::codec::Characteristic;
use crate::device::constants::*;
use crate::device::transport::{Notification, NotificationStream, Transport};
use crate::error::TransportError;

#[derive(Default)]
struct FakeDevice {
    values: HashMap<Uuid, Vec<u8>>,
    writes: Vec<(Characteristic, Vec<u8>)>,
    accept_writes: bool,
    fail_writes: bool,
    failing_connects: u32,
    connect_delay: Option<Duration>,
    connect_count: u32,
    connected: bool,
    subscribed: HashSet<Uuid>,
    notifier: Option<UnboundedSender<Notification>>,
}

impl FakeDevice {
    fn register(&self, characteristic: Characteristic) -> u32 {
        self.values
            .get(&characteristic.uuid())
            .map(|bytes| bytes.iter().rev().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
            .unwrap_or(0)
    }

    fn set_register_bits(&mut self, characteristic: Characteristic, mask: u32, set: bool) {
        let register = self.register(characteristic);
        let register = if set { register | mask } else { register & !mask };
        self.values.insert(characteristic.uuid(), register.to_le_bytes().to_vec());
    }

    fn apply_write(&mut self, characteristic: Characteristic, value: &[u8]) {
        match characteristic {
            Characteristic::HeaterOn => self.set_register_bits(Characteristic::StatusRegister1, MASK_HEATER_ON, true),
            Characteristic::HeaterOff => self.set_register_bits(Characteristic::StatusRegister1, MASK_HEATER_ON, false),
            Characteristic::FanOn => self.set_register_bits(Characteristic::StatusRegister1, MASK_FAN_ON, true),
            Characteristic::FanOff => self.set_register_bits(Characteristic::StatusRegister1, MASK_FAN_ON, false),
            Characteristic::StatusRegister2 | Characteristic::StatusRegister3 => {
                let mut word = [0u8; 4];
                word[..value.len().min(4)].copy_from_slice(&value[..value.len().min(4)]);
                let write = u32::from_le_bytes(word);
                self.set_register_bits(characteristic, write & !REGISTER_SET_FLAG, write & REGISTER_SET_FLAG != 0);
            },
            _ => {
                self.values.insert(characteristic.uuid(), value.to_vec());
            },
        }
    }
}

#[derive(Clone)]
pub struct FakeTransport {
    device: Arc<Mutex<FakeDevice>>,
}

impl FakeTransport {
    /// A heater that is off at 20 °C with a 180 °C set point and every characteristic present.
    pub fn new() -> Self {
        let mut device = FakeDevice::default();
        let defaults: [(Characteristic, Vec<u8>); 15] = [
            (Characteristic::StatusRegister1, 0u32.to_le_bytes().to_vec()),
            (Characteristic::StatusRegister2, 0u32.to_le_bytes().to_vec()),
            (Characteristic::StatusRegister3, 0u32.to_le_bytes().to_vec()),
            (Characteristic::CurrentTemperature, 200u16.to_le_bytes().to_vec()),
            (Characteristic::TargetTemperature, 1800u16.to_le_bytes().to_vec()),
            (Characteristic::AutoOffRemaining, 0u16.to_le_bytes().to_vec()),
            (Characteristic::ShutOffTime, 1800u16.to_le_bytes().to_vec()),
            (Characteristic::LedBrightness, 70u16.to_le_bytes().to_vec()),
            (Characteristic::HeatHours, 10u16.to_le_bytes().to_vec()),
            (Characteristic::HeatMinutes, vec![5]),
            (Characteristic::SerialNumber, b"VH000001".to_vec()),
            (Characteristic::FirmwareVersion, b"V01.2.3".to_vec()),
            (Characteristic::BleFirmwareVersion, b"V3.0.1".to_vec()),
            (Characteristic::BootloaderVersion, b"V1.0".to_vec()),
            (Characteristic::Firmware, b"VH-FW 2.1".to_vec()),
        ];
        for (characteristic, value) in defaults {
            device.values.insert(characteristic.uuid(), value);
        }

        FakeTransport { device: Arc::new(Mutex::new(device)) }
    }

    fn device(&self) -> MutexGuard<'_, FakeDevice> {
        self.device.lock().unwrap()
    }

    pub fn set_value(&self, characteristic: Characteristic, value: Vec<u8>) {
        self.device().values.insert(characteristic.uuid(), value);
    }

    pub fn set_heater(&self, on: bool) {
        self.device().set_register_bits(Characteristic::StatusRegister1, MASK_HEATER_ON, on);
    }

    pub fn set_fan(&self, on: bool) {
        self.device().set_register_bits(Characteristic::StatusRegister1, MASK_FAN_ON, on);
    }

    /// Pushes the current value of a characteristic as a notification, if subscribed.
    pub fn notify(&self, characteristic: Characteristic) {
        let device = self.device();
        let uuid = characteristic.uuid();
        if !device.connected || !device.subscribed.contains(&uuid) {
            return;
        }

        if let (Some(notifier), Some(value)) = (&device.notifier, device.values.get(&uuid)) {
            let _ = notifier.unbounded_send(Notification { uuid, value: value.clone() });
        }
    }

    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>)> {
        self.device().writes.clone()
    }

    pub fn writes_to(&self, characteristic: Characteristic) -> usize {
        self.device().writes.iter().filter(|(written, _)| *written == characteristic).count()
    }

    /// Whether written values show up in the registers, like a device that obeys.
    pub fn set_accept_writes(&self, accept: bool) {
        self.device().accept_writes = accept;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.device().fail_writes = fail;
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.device().failing_connects = count;
    }

    /// Makes every connect take this long, like a device that is slow to answer.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.device().connect_delay = Some(delay);
    }

    pub fn connect_count(&self) -> u32 {
        self.device().connect_count
    }

    pub fn is_subscribed(&self, characteristic: Characteristic) -> bool {
        self.device().subscribed.contains(&characteristic.uuid())
    }

    /// Simulates the device going out of range: the notification stream ends and the link
    /// reports disconnected.
    pub fn drop_link(&self) {
        let mut device = self.device();
        device.connected = false;
        device.notifier = None;
        device.subscribed.clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn find_device(&mut self, _address: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let delay = self.device().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut device = self.device();
        device.connect_count += 1;
        if device.failing_connects > 0 {
            device.failing_connects -= 1;
            return Err(TransportError::Timeout { operation: "connect" });
        }

        device.connected = true;
        Ok(())
    }

    async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError> {
        if !self.device().connected {
            return Err(TransportError::NotConnected);
        }

        Ok(Characteristic::ALL.iter().map(|characteristic| characteristic.uuid()).collect())
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let device = self.device();
        if !device.connected {
            return Err(TransportError::NotConnected);
        }

        device.values.get(&uuid).cloned().ok_or(TransportError::MissingCharacteristic { uuid })
    }

    async fn write_characteristic(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let mut device = self.device();
        if !device.connected {
            return Err(TransportError::NotConnected);
        }

        let characteristic = Characteristic::from_uuid(uuid)
            .ok_or(TransportError::MissingCharacteristic { uuid })?;
        device.writes.push((characteristic, value.to_vec()));

        if device.fail_writes {
            return Err(TransportError::Timeout { operation: "write" });
        }

        if device.accept_writes {
            device.apply_write(characteristic, value);
        }
        Ok(())
    }

    async fn subscribe(&mut self, uuid: Uuid) -> Result<(), TransportError> {
        self.device().subscribed.insert(uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, TransportError> {
        let (sender, receiver) = unbounded();
        self.device().notifier = Some(sender);
        Ok(receiver.boxed())
    }

    async fn is_connected(&self) -> Result<bool, TransportError> {
        Ok(self.device().connected)
    }

    async fn rssi(&self) -> Option<i16> {
        if self.device().connected { Some(-60) } else { None }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.drop_link();
        Ok(())
    }
}
