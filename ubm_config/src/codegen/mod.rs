//! Generates the `backplane.rs` module the firmware includes, plus
//! the `memory.x` linker script for the application image.
use anyhow::Result;
use proc_macro2::Ident;
use quote::format_ident;
use std::{
    fmt::Debug,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::Command,
};

use crate::Configuration;

mod backplane;
mod linker_script;
mod memory_map;
mod pins;

pub use linker_script::generate_linker_script;

/// Name of the generated module, relative to the output directory.
pub const GENERATED_MODULE: &str = "backplane.rs";

pub fn generate_modules<P: AsRef<Path>>(out_dir: P, configuration: &Configuration) -> Result<()> {
    let module: PathBuf = out_dir.as_ref().join(GENERATED_MODULE);
    let mut file = create(&module)?;
    backplane::generate_backplane(configuration, &mut file)?;
    pins::generate_pins(configuration, &mut file)?;
    memory_map::generate_memory_map(configuration, &mut file)?;
    drop(file);

    // Formatting is only for readability of the generated file.
    let _ = prettify_file(&module);

    generate_linker_script(out_dir, configuration)
}

/// Identifier of a configuration enum variant, for use as `Type::#variant`
/// in generated code. Config enums mirror the firmware enums by name.
fn variant<T: Debug>(value: &T) -> Ident { format_ident!("{}", format!("{:?}", value)) }

fn create(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().write(true).create(true).truncate(true).open(path)?)
}

fn prettify_file(path: &Path) -> std::io::Result<()> {
    Command::new("rustfmt").arg(path).spawn()?.wait()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const SAMPLE: &str = include_str!("../../sample_configurations/psoc6_ubm_default.ron");

    #[test]
    fn enum_variants_become_bare_identifiers() {
        use crate::memory::{AreaId, FlashDevice};
        assert_eq!("SwapStatus", variant(&AreaId::SwapStatus).to_string());
        assert_eq!("External", variant(&FlashDevice::External).to_string());
    }

    #[test]
    fn generated_module_contains_every_route_and_pin_set() {
        // Given
        let configuration: Configuration = ron::from_str(SAMPLE).unwrap();
        let out_dir = std::env::temp_dir().join("ubm_config_codegen_test");
        fs::create_dir_all(&out_dir).unwrap();

        // When
        generate_modules(&out_dir, &configuration).unwrap();
        let module = fs::read_to_string(out_dir.join(GENERATED_MODULE)).unwrap();
        let linker_script = fs::read_to_string(out_dir.join("memory.x")).unwrap();

        // Then
        let routes = configuration.backplane.routes.len();
        assert_eq!(routes, module.matches("Route {").count());
        assert_eq!(configuration.pins.dfc.len(), module.matches("DfcPinSet {").count());
        assert!(module.contains("fn factory_backplane"));
        assert!(linker_script.contains("FLASH : ORIGIN = 0x10018400"));
    }
}
