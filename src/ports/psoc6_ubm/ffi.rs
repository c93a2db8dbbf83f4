//! Entry points of the vendor peripheral driver library and the board
//! support package, linked in from C.
#![allow(non_snake_case)]

/// `CY_FLASH_DRV_SUCCESS`
pub const FLASH_SUCCESS: u32 = 0x0000_0000;
/// `CY_SCB_I2C_SUCCESS`
pub const I2C_SUCCESS: u32 = 0x0000_0000;
/// Returned by the board support respond call while the previous
/// response is still being clocked out.
pub const I2C_BUSY: u32 = 0x0000_0001;

extern "C" {
    pub fn Cy_Flash_WriteRow(row_address: u32, data: *const u32) -> u32;

    pub fn Cy_WDT_ClearWatchdog();
    pub fn Cy_WDT_Unlock();
    pub fn Cy_WDT_Disable();

    /// Preloads the read buffer of the SCB block serving `hfc`.
    pub fn ubm_bsp_two_wire_respond(hfc: u8, data: *const u8, length: u32) -> u32;
    /// Disables and re-enables the SCB block serving `hfc`.
    pub fn ubm_bsp_two_wire_abort(hfc: u8);
}
