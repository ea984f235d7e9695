use thiserror::Error;
use uuid::Uuid;

use crate::DeviceId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("registry has already been started")]
    AlreadyStarted,

    #[error("registry has not been started")]
    NotStarted,

    /// An adapter event referenced a peripheral that was never discovered.
    #[error("unknown peripheral: {0}")]
    UnknownPeripheral(DeviceId),

    #[error("peripheral {id} has no service {service}")]
    UnknownService { id: DeviceId, service: Uuid },

    #[error("unrecognized adapter state: {0}")]
    UnrecognizedAdapterState(u8),

    #[error("no bluetooth adapter at index {0}")]
    AdapterNotFound(usize),

    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),

    #[error("registry task failed: {0}")]
    TaskFailed(String),
}
