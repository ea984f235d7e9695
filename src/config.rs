/// What happens when the radio reports a peripheral the registry already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rediscovery {
    /// Keep the existing record as it is.
    #[default]
    Ignore,
    /// Start over at `Connecting` if the previous attempt ended
    /// (failed or disconnected), and connect again.
    Reconnect,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub(crate) rediscovery: Rediscovery,
}

impl RegistryConfig {
    pub fn rediscovery(mut self, rediscovery: Rediscovery) -> Self {
        self.rediscovery = rediscovery;
        self
    }

    /// Reconnect to known peripherals that show up again after their connection ended
    pub fn reconnect_on_rediscovery(self) -> Self {
        self.rediscovery(Rediscovery::Reconnect)
    }
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Index of the Bluetooth adapter to use. The first found adapter is used by default.
    pub(crate) adapter_index: usize,
    /// Capacity of the snapshot broadcast behind change streams.
    pub(crate) event_buffer: usize,
    pub(crate) registry: RegistryConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            event_buffer: 16,
            registry: RegistryConfig::default(),
        }
    }
}

impl ExplorerConfig {
    /// Index of bluetooth adapter to use
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// How many snapshots a slow change stream may fall behind before it skips ahead
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }
}
