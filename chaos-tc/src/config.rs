use crate::{alloc::DEFAULT_CLASS_ID_BOUND, profile::Rate};

/// Packet limit of the `pfifo` queue behind the mirror class on pod interfaces.
pub const DEFAULT_MIRROR_QUEUE_LIMIT: u32 = 1_600;

/// Tunables of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaperConfig {
    /// Rate of freshly created classes and of the mirror class on pod interfaces.
    pub safety_rate: Rate,
    /// Exclusive upper bound of class minors on a shaping device.
    pub class_id_bound: u16,
    /// Packet limit of the mirror queue on pod interfaces.
    pub mirror_queue_limit: u32,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            safety_rate: Rate::default(),
            class_id_bound: DEFAULT_CLASS_ID_BOUND,
            mirror_queue_limit: DEFAULT_MIRROR_QUEUE_LIMIT,
        }
    }
}

impl ShaperConfig {
    pub fn with_safety_rate(mut self, rate: Rate) -> Self {
        self.safety_rate = rate;
        self
    }

    pub fn with_class_id_bound(mut self, bound: u16) -> Self {
        self.class_id_bound = bound;
        self
    }

    pub fn with_mirror_queue_limit(mut self, limit: u32) -> Self {
        self.mirror_queue_limit = limit;
        self
    }
}
