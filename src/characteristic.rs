use uuid::Uuid;

use crate::common::characteristic_name;

/// A characteristic discovered on a service. Never changes once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub(crate) uuid: Uuid,
    pub(crate) name: String,
}

impl Characteristic {
    pub(crate) fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: characteristic_name(uuid),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
