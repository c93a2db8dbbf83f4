use std::{io::Write, path::Path};

use crate::{memory::AreaId, Configuration};
use anyhow::{anyhow, Result};

/// Generates the linker script `memory.x`, which places the application
/// right after the image header of the primary area.
pub fn generate_linker_script<P: AsRef<Path>>(
    out_dir: P,
    configuration: &Configuration,
) -> Result<()> {
    let memory = &configuration.memory_configuration;
    let primary = memory
        .area(AreaId::Primary)
        .ok_or_else(|| anyhow!("Memory map doesn't define a primary image area."))?;
    let origin = memory
        .application_origin()
        .ok_or_else(|| anyhow!("Unable to compute application origin."))?;
    let length = primary
        .size
        .checked_sub(memory.image_header_size + memory.image_ok_offset)
        .ok_or_else(|| anyhow!("Primary area too small for image header and trailer."))?;

    let mut file = super::create(&out_dir.as_ref().join("memory.x"))?;
    write!(
        file,
        "MEMORY\n\
         {{\n\
             FLASH : ORIGIN = 0x{:08X}, LENGTH = {}\n\
             RAM : ORIGIN = 0x{:08X}, LENGTH = {}K\n\
         }}\n",
        origin, length, memory.ram.origin, memory.ram.size_kb,
    )?;

    Ok(())
}
