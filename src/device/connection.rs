use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::device::constants::{
    CONNECT_DEADLINE, CONTROL_SERVICE, DEVICE_NAME_FRAGMENT, IS_CONNECTED_DEADLINE, READ_DEADLINE, SCAN_DEADLINE, SCAN_POLL_DELAY,
    STATUS_SERVICE, STORZ_BICKEL_MANUFACTURER_ID, WRITE_DEADLINE,
};
use crate::device::transport::{Notification, NotificationStream, Transport};
use crate::error::TransportError;

/// A Volcano seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// [`Transport`] on top of the platform Bluetooth stack.
pub struct BtleTransport {
    manager: Manager,
    peripheral: Option<Peripheral>,
    characteristics: HashMap<Uuid, Characteristic>,
    // the peripheral handles one GATT operation at a time
    gatt: Mutex<()>,
}

async fn with_deadline<T, F>(operation: &'static str, deadline: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    tokio::select! {
        _ = sleep(deadline) => {
            warn!("{} took too long", operation);
            Err(TransportError::Timeout { operation })
        }
        result = fut => Ok(result?),
    }
}

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, TransportError> {
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(TransportError::NoAdapter);
    }

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        // not every Volcano advertises its services, so scan unfiltered and match afterwards
        if let Err(err) = adapter.start_scan(ScanFilter::default()).await {
            if let btleplug::Error::PermissionDenied = err {
                warn!("Bluetooth permission denied; grant this application access to Bluetooth");
            }
            return Err(err.into());
        }
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            debug!("Failed to stop scanning: {}", err);
        }
    }
}

async fn list_peripherals(adapters: &[Adapter]) -> Vec<(Peripheral, PeripheralProperties)> {
    let mut result = Vec::new();

    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => warn!("Could not query peripheral for properties: {:?}", err),
                Ok(None) => debug!("Peripheral has no properties"),
                Ok(Some(properties)) => result.push((peripheral, properties)),
            }
        }
    }

    result
}

fn matches_address(address: &str, peripheral: &Peripheral, properties: &PeripheralProperties) -> bool {
    // on macOS the address is hidden and the peripheral id is the only stable identifier
    properties.address.to_string().eq_ignore_ascii_case(address)
        || peripheral.id().to_string().eq_ignore_ascii_case(address)
}

fn is_volcano(properties: &PeripheralProperties) -> bool {
    properties.manufacturer_data.contains_key(&STORZ_BICKEL_MANUFACTURER_ID)
        || properties.services.contains(&CONTROL_SERVICE)
        || properties.services.contains(&STATUS_SERVICE)
        || properties
            .local_name
            .as_deref()
            .map_or(false, |name| name.to_uppercase().contains(DEVICE_NAME_FRAGMENT))
}

impl BtleTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;

        Ok(BtleTransport {
            manager,
            peripheral: None,
            characteristics: HashMap::new(),
            gatt: Mutex::new(()),
        })
    }

    /// Scans for `duration` and returns every Volcano that was seen.
    pub async fn scan_for_devices(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let adapters = start_scanning(&self.manager).await?;
        sleep(duration).await;
        let peripherals = list_peripherals(&adapters).await;
        stop_scanning(&adapters).await;

        let devices = peripherals
            .into_iter()
            .filter(|(_, properties)| is_volcano(properties))
            .map(|(peripheral, properties)| DiscoveredDevice {
                address: match properties.address.into_inner() {
                    [0, 0, 0, 0, 0, 0] => peripheral.id().to_string(),
                    _ => properties.address.to_string(),
                },
                name: properties.local_name,
                rssi: properties.rssi,
            })
            .collect();
        Ok(devices)
    }

    fn peripheral(&self) -> Result<&Peripheral, TransportError> {
        self.peripheral.as_ref().ok_or(TransportError::NotConnected)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.characteristics.get(&uuid).ok_or(TransportError::MissingCharacteristic { uuid })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn find_device(&mut self, address: &str) -> Result<(), TransportError> {
        self.peripheral = None;
        self.characteristics.clear();

        let adapters = start_scanning(&self.manager).await?;
        let deadline = Instant::now() + SCAN_DEADLINE;

        let found = loop {
            let peripherals = list_peripherals(&adapters).await;
            let found = peripherals
                .into_iter()
                .find(|(peripheral, properties)| matches_address(address, peripheral, properties));
            if found.is_some() || Instant::now() >= deadline {
                break found;
            }
            sleep(SCAN_POLL_DELAY).await;
        };
        stop_scanning(&adapters).await;

        match found {
            Some((peripheral, properties)) => {
                info!(
                    "Using peripheral {} {:?} {}",
                    properties.address,
                    properties.address_type,
                    properties.local_name.unwrap_or(String::from("NONE")),
                );
                self.peripheral = Some(peripheral);
                Ok(())
            },
            None => Err(TransportError::DeviceNotFound { address: address.to_string() }),
        }
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let _gatt = self.gatt.lock().await;
        let peripheral = self.peripheral()?;

        info!("Connecting to peripheral...");
        with_deadline("connect", CONNECT_DEADLINE, peripheral.connect()).await
    }

    async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError> {
        let characteristics = {
            let _gatt = self.gatt.lock().await;
            let peripheral = self.peripheral()?;

            info!("Connected; Discovering services...");
            with_deadline("discover services", CONNECT_DEADLINE, peripheral.discover_services()).await?;
            peripheral.characteristics()
        };

        self.characteristics = characteristics
            .into_iter()
            .map(|characteristic| (characteristic.uuid, characteristic))
            .collect();
        Ok(self.characteristics.keys().copied().collect())
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let _gatt = self.gatt.lock().await;
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(uuid)?;

        with_deadline("read", READ_DEADLINE, peripheral.read(characteristic)).await
    }

    async fn write_characteristic(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let _gatt = self.gatt.lock().await;
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(uuid)?;

        debug!("Writing {:02x?} to {}", value, uuid);
        with_deadline("write", WRITE_DEADLINE, peripheral.write(characteristic, value, WriteType::WithResponse)).await
    }

    async fn subscribe(&mut self, uuid: Uuid) -> Result<(), TransportError> {
        let _gatt = self.gatt.lock().await;
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(uuid)?;

        with_deadline("subscribe", WRITE_DEADLINE, peripheral.subscribe(characteristic)).await
    }

    async fn notifications(&self) -> Result<NotificationStream, TransportError> {
        let peripheral = self.peripheral()?;
        let stream = peripheral.notifications().await?;

        Ok(stream
            .map(|notification| Notification { uuid: notification.uuid, value: notification.value })
            .boxed())
    }

    async fn is_connected(&self) -> Result<bool, TransportError> {
        let peripheral = match &self.peripheral {
            Some(peripheral) => peripheral,
            None => return Ok(false),
        };

        // macOS sometimes never answers
        with_deadline("is_connected", IS_CONNECTED_DEADLINE, peripheral.is_connected()).await
    }

    async fn rssi(&self) -> Option<i16> {
        let peripheral = self.peripheral.as_ref()?;

        match peripheral.properties().await {
            Ok(properties) => properties.and_then(|properties| properties.rssi),
            Err(err) => {
                debug!("Could not query peripheral for properties: {:?}", err);
                None
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.characteristics.clear();
        let peripheral = match self.peripheral.take() {
            Some(peripheral) => peripheral,
            None => return Ok(()),
        };

        let _gatt = self.gatt.lock().await;
        info!("Disconnecting from peripheral");
        with_deadline("disconnect", WRITE_DEADLINE, peripheral.disconnect()).await
    }
}
