//! `kunetik info` — registration details, control opcodes and sample layout.

use kunetik_core::control::{GET_UNIT, SET_UNIT, TRIGGER_CAPTURE};
use kunetik_core::sample::{HUMIDITY_OFFSET, MEASUREMENT_OFFSET, RESERVED_OFFSET, UNIT_OFFSET};
use kunetik_core::{SAMPLE_SIZE, Unit};

pub fn run(seed: Option<u64>, json: bool) {
    let module = super::load_module(seed);
    let device = module.device();

    if json {
        match serde_json::to_string_pretty(&device.health()) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error serializing health: {e}");
                std::process::exit(1);
            }
        }
        module.unload();
        return;
    }

    let config = module.config();
    println!("\n{}", "=".repeat(52));
    println!("KUNETIK DEVICE");
    println!("{}", "=".repeat(52));
    println!("Node:    {}", module.device_path());
    println!("Class:   {}", config.class);
    println!("Numbers: {}", module.dev_number());
    println!("Version: {}", kunetik_core::VERSION);

    println!("\n{:<16} {:>12}  {}", "Command", "Opcode", "Payload");
    println!("{}", "-".repeat(52));
    println!("{:<16} {:>#12x}  in: 1 byte unit tag", "SetUnit", SET_UNIT);
    println!("{:<16} {:>#12x}  out: 1 byte unit tag", "GetUnit", GET_UNIT);
    println!("{:<16} {:>#12x}  none", "TriggerCapture", TRIGGER_CAPTURE);

    println!("\n{:<12} {:>4} {:>8}", "Unit", "Tag", "Range");
    println!("{}", "-".repeat(26));
    for unit in Unit::ALL {
        let r = unit.range();
        println!("{:<12} {:>4} {:>4}..={}", unit.to_string(), unit.tag(), r.min, r.max);
    }

    println!("\nSample ({SAMPLE_SIZE} bytes):");
    println!("  [{UNIT_OFFSET}] unit tag");
    println!("  [{MEASUREMENT_OFFSET}] measurement");
    println!("  [{HUMIDITY_OFFSET}] humidity (0-255 of full range)");
    println!("  [{RESERVED_OFFSET}] reserved");
    module.unload();
}
