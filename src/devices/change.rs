//! Backplane wide change tracking and the change detect line.
use super::backplane::ControllerFeatures;
use bitflags::bitflags;

bitflags! {
    /// Host visible connector fields that changed in a transition.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ChangeFields: u8 {
        const OPERATIONAL_STATE = 1 << 0;
        const DRIVE_TYPE = 1 << 1;
        const PCIE_RESET = 1 << 2;
        const POWER_DISABLE = 1 << 3;
    }
}

#[cfg(target_arch = "arm")]
impl defmt::Format for ChangeFields {
    fn format(&self, f: defmt::Formatter) { defmt::write!(f, "ChangeFields({=u8:#x})", self.bits()) }
}

impl ChangeFields {
    /// Drops the fields the host asked not to be counted. Power disable
    /// has no mask.
    pub fn unmasked(self, features: &ControllerFeatures) -> Self {
        let mut fields = self;
        if features.operational_state_change_count_mask {
            fields.remove(Self::OPERATIONAL_STATE);
        }
        if features.drive_type_installed_change_count_mask {
            fields.remove(Self::DRIVE_TYPE);
        }
        if features.pcie_reset_change_count_mask {
            fields.remove(Self::PCIE_RESET);
        }
        fields
    }
}

/// Global change count, dirty field mask and the change detect latch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeAggregator {
    count: u8,
    dirty: ChangeFields,
    latched: bool,
}

impl ChangeAggregator {
    pub fn new() -> Self { Self::default() }

    /// Accounts for one connector transition. Returns whether it was
    /// counted, in which case the connector counts it too.
    pub fn register(&mut self, changed: ChangeFields, features: &ControllerFeatures) -> bool {
        let unmasked = changed.unmasked(features);
        if unmasked.is_empty() {
            return false;
        }
        self.count = self.count.wrapping_add(1);
        self.dirty |= unmasked;
        self.latched = true;
        true
    }

    pub fn count(&self) -> u8 { self.count }
    pub fn dirty(&self) -> ChangeFields { self.dirty }
    pub fn latched(&self) -> bool { self.latched }

    /// Host read of the change count. Releases the latch only.
    pub fn read(&mut self) -> (u8, ChangeFields) {
        self.latched = false;
        (self.count, self.dirty)
    }

    /// Host clear. The count, dirty mask and latch all go back to zero.
    pub fn clear(&mut self) { *self = Self::default() }

    /// Level of the change detect line. In legacy mode the line reports
    /// whether any drive is installed instead.
    pub fn change_detect_asserted(&self, any_installed: bool, features: &ControllerFeatures) -> bool {
        if features.cprsnt_legacy_mode {
            any_installed
        } else {
            self.latched
        }
    }
}
