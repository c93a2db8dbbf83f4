//! Complex modules with business logic related to the problem
//! domain, that lay on top of abstract drivers. Devices are
//! generic, while board specifics (pins, board config) are
//! handled in the `ports` module.

pub mod backplane;
pub mod change;
pub mod config_store;
pub mod connector;
pub mod flash_map;
pub mod protocol;
pub mod signals;
pub mod supervisor;

/// General purpose traits that summarize requirements on devices.
pub mod traits {
    use crate::{
        error,
        hal::{flash, two_wire},
    };
    use marker_blanket::marker_blanket;

    /// A supported flash must be able to read, write, and report errors
    /// to the configuration store or supervisor.
    #[marker_blanket]
    pub trait Flash: flash::ReadWrite<Error: error::Convertible> {}

    /// A supported host bus must be able to receive commands, send
    /// responses, and report errors to the protocol engine.
    #[marker_blanket]
    pub trait Bus: two_wire::Target<Error: error::Convertible> {}
}
