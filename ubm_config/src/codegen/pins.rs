use anyhow::Result;
use proc_macro2::TokenStream;
use quote::quote;
use std::{fs::File, io::Write};

use crate::{pins::Pin, Configuration};

/// Generates the board pin map, one pin set per connector. Unconnected
/// signals become `None` so the port can skip them.
pub fn generate_pins(configuration: &Configuration, file: &mut File) -> Result<()> {
    let pins = &configuration.pins;
    let dfc_count = pins.dfc.len();
    let hfc_count = pins.hfc.len();

    let dfc = pins.dfc.iter().map(|p| {
        let (prsnt, ifdet, ifdet2, actdetect) =
            (pin(p.prsnt), pin(p.ifdet), pin(p.ifdet2), pin(p.actdetect));
        let (persta, perstb, pwrdis) = (pin(p.persta), pin(p.perstb), pin(p.pwrdis));
        let (refclken, dualporten) = (pin(p.refclken), pin(p.dualporten));
        quote! {
            DfcPinSet {
                prsnt: #prsnt,
                ifdet: #ifdet,
                ifdet2: #ifdet2,
                actdetect: #actdetect,
                persta: #persta,
                perstb: #perstb,
                pwrdis: #pwrdis,
                refclken: #refclken,
                dualporten: #dualporten,
            }
        }
    });

    let hfc = pins.hfc.iter().map(|p| {
        let (sda, scl, i2c_reset) = (pin(p.sda), pin(p.scl), pin(p.i2c_reset));
        let (change_detect, bp_type, perst) = (pin(p.change_detect), pin(p.bp_type), pin(p.perst));
        quote! {
            HfcPinSet {
                sda: #sda,
                scl: #scl,
                i2c_reset: #i2c_reset,
                change_detect: #change_detect,
                bp_type: #bp_type,
                perst: #perst,
            }
        }
    });

    let code = quote! {
        use crate::ports::{DfcPinSet, HfcPinSet, PinId};

        pub const DFC_PINS: [DfcPinSet; #dfc_count] = [#(#dfc),*];
        pub const HFC_PINS: [HfcPinSet; #hfc_count] = [#(#hfc),*];
    };

    file.write_all(format!("{}", code).as_bytes())?;
    Ok(())
}

fn pin(pin: Pin) -> TokenStream {
    match pin {
        Pin::P(port, index) => quote! { Some(PinId::new(#port, #index)) },
        Pin::NC => quote! { None },
    }
}
