use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Port {
    Psoc6Ubm,
}

impl Default for Port {
    fn default() -> Self { Self::Psoc6Ubm }
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Port::Psoc6Ubm => "psoc6_ubm",
        })
    }
}

impl Port {
    /// Cargo feature that must be enabled to build firmware for this port.
    pub fn feature_flag(&self) -> &'static str {
        match self {
            Port::Psoc6Ubm => "psoc6_ubm",
        }
    }
}
