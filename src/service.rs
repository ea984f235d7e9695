use uuid::Uuid;

use crate::common::service_name;
use crate::Characteristic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub(crate) uuid: Uuid,
    pub(crate) name: String,
    pub(crate) characteristics: Vec<Characteristic>,
}

impl Service {
    pub(crate) fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: service_name(uuid),
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Characteristics in the order they were discovered
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }
}
