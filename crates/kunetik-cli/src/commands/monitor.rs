//! `kunetik monitor` — poll the sensor on an interval.

use std::time::{Duration, Instant};

use kunetik_core::{CancelToken, DeviceError, ReadMode, Unit};

pub fn run(seed: Option<u64>, unit: Option<Unit>, refresh: f64, count: usize) {
    let module = super::load_module(seed);
    let session = super::open_session(&module);
    super::apply_unit(&session, unit);

    let stop = CancelToken::new();
    super::cancel_on_ctrlc(&stop);

    let refresh = Duration::from_secs_f64(refresh.max(0.01));
    let range = session.device().unit().range();
    println!(
        "Monitoring {} ({}, range {}..={})",
        module.device_path(),
        session.device().unit(),
        range.min,
        range.max
    );
    println!("Press Ctrl+C to stop.");
    println!();

    let mut shown = 0usize;
    while !stop.is_cancelled() && (count == 0 || shown < count) {
        if let Err(e) = session.trigger_capture() {
            eprintln!("Error triggering capture: {e}");
            break;
        }
        match session.read_sample(ReadMode::Blocking(&stop)) {
            Ok(sample) => {
                shown += 1;
                println!(
                    "  #{shown:<5} Temperature: {:>3}{}  Humidity: {:>5.1}%",
                    sample.measurement,
                    sample.unit.symbol(),
                    sample.humidity_percent()
                );
            }
            Err(DeviceError::Interrupted) => break,
            Err(e) => {
                eprintln!("Error reading sample: {e}");
                break;
            }
        }

        let deadline = Instant::now() + refresh;
        while Instant::now() < deadline && !stop.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    println!();
    let health = session.device().health();
    println!(
        "{shown} samples, {} captures, {} failures",
        health.captures, health.failures
    );

    if let Err(e) = session.release() {
        eprintln!("Error releasing session: {e}");
    }
    module.unload();
}
