use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        // Register access through the PAC and Cortex-M core peripherals. Host builds use
        // simulated register files instead.
        hw: { all(feature = "f4", target_arch = "arm") },
    }
}
