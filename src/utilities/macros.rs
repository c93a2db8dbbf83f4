//! Convenience macros for the backplane controller
#![macro_use]

/// Define and export a specific port module (transparently pulls
/// its namespace to the current one).
///
/// Used mostly to conveniently fit the module declaration and reexport
/// under a single configuration flag.
///
/// # Example
/// ```ignore
/// #[cfg(feature = "psoc6_ubm")]
/// port!(psoc6_ubm);
/// // Expands into:
/// pub mod psoc6_ubm;
/// pub use self::psoc6_ubm::*;
/// ```
#[macro_export]
macro_rules! port {
    ($mod:ident) => {
        pub mod $mod;
        pub use self::$mod::*;
    };
    ($mod:ident as $name:ident) => {
        pub mod $mod;
        pub use self::$mod as $name;
    };
}

/// Defines a fieldless enum with a fixed single byte encoding, along
/// with its conversions to and from that byte. Unknown bytes decode
/// into `Error::MalformedRecord`.
///
/// # Example
/// ```ignore
/// wire_enum! {
///     pub enum Domain { Primary = 0, Secondary = 1 }
/// }
/// assert_eq!(Domain::Secondary.code(), 1);
/// assert_eq!(Domain::try_from(0), Ok(Domain::Primary));
/// ```
#[macro_export]
macro_rules! wire_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        #[cfg_attr(target_arch = "arm", derive(defmt::Format))]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub const fn code(self) -> u8 { self as u8 }
        }

        impl core::convert::TryFrom<u8> for $name {
            type Error = $crate::error::Error;
            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $(v if v == $value => Ok($name::$variant),)+
                    _ => Err($crate::error::Error::MalformedRecord),
                }
            }
        }
    };
}
