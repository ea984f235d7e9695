//! Assigned numbers for common GATT services and characteristics.

use uuid::Uuid;

pub mod services {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const GENERIC_ACCESS: Uuid = uuid_from_u16(0x1800);
    pub const GENERIC_ATTRIBUTE: Uuid = uuid_from_u16(0x1801);
    pub const DEVICE_INFORMATION: Uuid = uuid_from_u16(0x180A);
    pub const HEART_RATE: Uuid = uuid_from_u16(0x180D);
    pub const BATTERY: Uuid = uuid_from_u16(0x180F);
    pub const HUMAN_INTERFACE_DEVICE: Uuid = uuid_from_u16(0x1812);
    pub const ENVIRONMENTAL_SENSING: Uuid = uuid_from_u16(0x181A);
}

pub mod characteristics {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const DEVICE_NAME: Uuid = uuid_from_u16(0x2A00);
    pub const APPEARANCE: Uuid = uuid_from_u16(0x2A01);
    pub const SERVICE_CHANGED: Uuid = uuid_from_u16(0x2A05);
    pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2A19);
    pub const MODEL_NUMBER: Uuid = uuid_from_u16(0x2A24);
    pub const SERIAL_NUMBER: Uuid = uuid_from_u16(0x2A25);
    pub const FIRMWARE_REVISION: Uuid = uuid_from_u16(0x2A26);
    pub const MANUFACTURER_NAME: Uuid = uuid_from_u16(0x2A29);
    pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
    pub const TEMPERATURE: Uuid = uuid_from_u16(0x2A6E);
}

const SERVICE_NAMES: &[(Uuid, &str)] = &[
    (services::GENERIC_ACCESS, "Generic Access"),
    (services::GENERIC_ATTRIBUTE, "Generic Attribute"),
    (services::DEVICE_INFORMATION, "Device Information"),
    (services::HEART_RATE, "Heart Rate"),
    (services::BATTERY, "Battery Service"),
    (services::HUMAN_INTERFACE_DEVICE, "Human Interface Device"),
    (services::ENVIRONMENTAL_SENSING, "Environmental Sensing"),
];

const CHARACTERISTIC_NAMES: &[(Uuid, &str)] = &[
    (characteristics::DEVICE_NAME, "Device Name"),
    (characteristics::APPEARANCE, "Appearance"),
    (characteristics::SERVICE_CHANGED, "Service Changed"),
    (characteristics::BATTERY_LEVEL, "Battery Level"),
    (characteristics::MODEL_NUMBER, "Model Number String"),
    (characteristics::SERIAL_NUMBER, "Serial Number String"),
    (characteristics::FIRMWARE_REVISION, "Firmware Revision String"),
    (characteristics::MANUFACTURER_NAME, "Manufacturer Name String"),
    (characteristics::HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
    (characteristics::TEMPERATURE, "Temperature"),
];

fn lookup(table: &[(Uuid, &str)], uuid: Uuid) -> String {
    table
        .iter()
        .find(|(known, _)| *known == uuid)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| uuid.to_string())
}

/// Display name of a service, or its UUID if it is not an assigned number we know.
pub fn service_name(uuid: Uuid) -> String {
    lookup(SERVICE_NAMES, uuid)
}

/// Display name of a characteristic, or its UUID if it is not an assigned number we know.
pub fn characteristic_name(uuid: Uuid) -> String {
    lookup(CHARACTERISTIC_NAMES, uuid)
}
