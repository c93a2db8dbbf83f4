use anyhow::{anyhow, Result};
use std::{
    env,
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};
use ubm_config::{codegen::generate_modules, Configuration};

const DEFAULT_CONFIG_FILENAME: &str = "psoc6_ubm_default.ron";

fn main() -> Result<()> {
    let configuration = process_configuration_file()?;
    validate_feature_flags_against_configuration(&configuration);

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    generate_modules(&out_dir, &configuration)?;

    if env::var("CARGO_CFG_TARGET_ARCH").map(|a| a == "arm").unwrap_or(false) {
        println!("cargo:rustc-link-search={}", out_dir.display());
    }
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}

fn process_configuration_file() -> Result<Configuration> {
    println!("cargo:rerun-if-env-changed=UBM_CONFIG");

    let filename = env::var("UBM_CONFIG").unwrap_or_else(|_| {
        format!("./ubm_config/sample_configurations/{}", DEFAULT_CONFIG_FILENAME)
    });
    println!("cargo:rerun-if-changed={}", filename);

    let file = File::open(&filename)?;
    let mut buf_reader = BufReader::new(file);
    let mut contents = String::new();
    buf_reader.read_to_string(&mut contents)?;
    let configuration: Configuration = ron::from_str(&contents)?;

    let violations: Vec<String> = configuration.violations().map(|v| v.to_string()).collect();
    if !violations.is_empty() {
        return Err(anyhow!(
            "Configuration file {} is invalid:\n{}",
            filename,
            violations.join("\n")
        ));
    }
    Ok(configuration)
}

fn validate_feature_flags_against_configuration(configuration: &Configuration) {
    #[cfg(feature = "psoc6_ubm")]
    assert_eq!(configuration.port, ubm_config::port::Port::Psoc6Ubm,
        "Mismatching board in configuration file. Features require {}, configuration requires {}",
         ubm_config::port::Port::Psoc6Ubm.feature_flag(),
         configuration.port.feature_flag());

    #[cfg(not(feature = "psoc6_ubm"))]
    let _ = configuration;
}
