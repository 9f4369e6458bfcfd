//! `kunetik unit` — show or change the measurement unit.

use kunetik_core::Unit;

pub fn run(seed: Option<u64>, unit: Option<Unit>) {
    let module = super::load_module(seed);
    let session = super::open_session(&module);
    super::apply_unit(&session, unit);

    match session.get_unit() {
        Ok(current) => {
            let range = current.range();
            println!(
                "Unit: {current} (tag {}), range {}{sym}..={}{sym}",
                current.tag(),
                range.min,
                range.max,
                sym = current.symbol()
            );
        }
        Err(e) => eprintln!("Error reading unit: {e}"),
    }

    if let Err(e) = session.release() {
        eprintln!("Error releasing session: {e}");
    }
    module.unload();
}
