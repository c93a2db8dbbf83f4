use anyhow::{anyhow, Result};
use quote::quote;
use std::{fs::File, io::Write};

use super::variant;
use crate::{
    memory::{AreaId, FlashDevice},
    Configuration,
};

/// Generates the flash partition table shared with the boot library,
/// the primary boot descriptor and the configuration store geometry.
pub fn generate_memory_map(configuration: &Configuration, file: &mut File) -> Result<()> {
    let memory = &configuration.memory_configuration;
    let primary = memory
        .area(AreaId::Primary)
        .ok_or_else(|| anyhow!("Memory map doesn't define a primary image area."))?;

    let area_count = memory.areas.len();
    let areas = memory.areas.iter().map(|a| {
        let id = variant(&a.id);
        let device = variant(&a.device);
        let (offset, size) = (a.offset, a.size);
        quote! { FlashArea { id: AreaId::#id, device: FlashDevice::#device, offset: #offset, size: #size } }
    });

    let internal_base = memory.internal_flash_base;
    let external_base = memory.external_flash_base;
    let primary_device = variant(&primary.device);
    let primary_offset = primary.offset;
    let header_size = memory.image_header_size;
    let image_ok_address = memory
        .image_ok_address()
        .ok_or_else(|| anyhow!("Unable to compute image-ok flag address."))?;

    let store_base = memory.device_base(FlashDevice::Internal) + memory.store.offset;
    let slot_size = memory.store.slot_size;
    let slot_count = memory.store.slot_count;

    let code = quote! {
        use crate::devices::config_store::StoreGeometry;
        use crate::devices::flash_map::{AreaId, BootResponse, FlashArea, FlashDevice};

        pub const INTERNAL_FLASH_BASE: u32 = #internal_base;
        pub const EXTERNAL_FLASH_BASE: u32 = #external_base;

        pub const FLASH_AREAS: [FlashArea; #area_count] = [#(#areas),*];

        pub const PRIMARY_BOOT: BootResponse = BootResponse {
            flash_device_id: FlashDevice::#primary_device,
            image_offset: #primary_offset,
            header_size: #header_size,
        };

        pub const IMAGE_OK_ADDRESS: u32 = #image_ok_address;

        pub const STORE_GEOMETRY: StoreGeometry = StoreGeometry {
            base: #store_base,
            slot_size: #slot_size,
            slot_count: #slot_count,
        };
    };

    file.write_all(format!("{}", code).as_bytes())?;
    Ok(())
}
