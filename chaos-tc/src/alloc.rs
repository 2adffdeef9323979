use crate::{handle::ClassId, inspect::Inspector, Error, Result};

/// Exclusive upper bound of class minors handed out on a shaping device.
///
/// This caps a node at 9999 shaped CIDRs per direction.
pub const DEFAULT_CLASS_ID_BOUND: u16 = 10_000;

/// Hands out the smallest class id that is neither present on a device nor the target of one of
/// its filters.
///
/// Allocation reads the device and the caller then creates the class, so callers must hold the
/// device's lock across both steps (see
/// [`ShapingDevice::lock`](crate::device::ShapingDevice::lock)).
#[derive(Debug, Clone)]
pub struct ClassIdAllocator {
    inspector: Inspector,
    bound: u16,
}

impl ClassIdAllocator {
    pub fn new(inspector: Inspector) -> Self {
        Self { inspector, bound: DEFAULT_CLASS_ID_BOUND }
    }

    pub fn with_bound(mut self, bound: u16) -> Self {
        self.bound = bound;
        self
    }

    /// Smallest free class id on `device`.
    pub fn next_class_id(&self, device: &str) -> Result<ClassId> {
        let mut taken = self.inspector.list_classes(device)?;
        // A dangling filter still owns its class id until it is deleted.
        taken.extend(self.inspector.list_filters(device)?.into_iter().map(|f| f.class));

        (1..self.bound).map(ClassId::root_child).find(|id| !taken.contains(id)).ok_or_else(|| {
            Error::AllocationExhausted { device: device.to_string(), bound: self.bound }
        })
    }
}
