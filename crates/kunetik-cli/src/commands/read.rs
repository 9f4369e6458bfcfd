//! `kunetik read` — capture and read samples.

use std::time::Duration;

use kunetik_core::{CancelToken, DeviceError, ReadMode, SAMPLE_SIZE, Sample, Session, Unit};

pub struct ReadCommandConfig {
    pub seed: Option<u64>,
    pub unit: Option<Unit>,
    pub nonblock: bool,
    pub capture: bool,
    pub capture_delay_ms: Option<u64>,
    pub count: usize,
    pub json: bool,
}

pub fn run(config: ReadCommandConfig) {
    let module = super::load_module(config.seed);
    let session = super::open_session(&module);
    super::apply_unit(&session, config.unit);

    let token = CancelToken::new();
    super::cancel_on_ctrlc(&token);

    let mut failed = false;
    for _ in 0..config.count.max(1) {
        match read_one(&session, &config, &token) {
            Ok(bytes) => print_sample(&bytes, config.json),
            Err(DeviceError::WouldBlock) => {
                eprintln!("No sample ready (non-blocking read).");
                failed = true;
                break;
            }
            Err(DeviceError::Interrupted) => {
                eprintln!("Interrupted while waiting for a sample.");
                failed = true;
                break;
            }
            Err(e) => {
                eprintln!("Error reading {}: {e}", module.device_path());
                failed = true;
                break;
            }
        }
    }

    if let Err(e) = session.release() {
        eprintln!("Error releasing session: {e}");
    }
    module.unload();

    if failed {
        std::process::exit(1);
    }
}

/// One capture (per the config) followed by one read.
fn read_one(
    session: &Session,
    config: &ReadCommandConfig,
    token: &CancelToken,
) -> Result<[u8; SAMPLE_SIZE], DeviceError> {
    let mode = if config.nonblock {
        ReadMode::NonBlocking
    } else {
        ReadMode::Blocking(token)
    };
    let mut buf = [0u8; SAMPLE_SIZE];

    match (config.capture, config.capture_delay_ms) {
        (false, _) => {
            session.read(&mut buf, mode)?;
        }
        (true, None) => {
            session.trigger_capture()?;
            session.read(&mut buf, mode)?;
        }
        (true, Some(delay)) => {
            std::thread::scope(|s| {
                let trigger = s.spawn(|| {
                    std::thread::sleep(Duration::from_millis(delay));
                    session.trigger_capture()
                });
                let read = session.read(&mut buf, mode);
                let triggered = trigger.join().unwrap_or(Err(DeviceError::Interrupted));
                read.and(triggered)
            })?;
        }
    }
    Ok(buf)
}

fn print_sample(bytes: &[u8; SAMPLE_SIZE], json: bool) {
    match Sample::decode(bytes) {
        Ok(sample) if json => {
            let out = serde_json::json!({
                "bytes": bytes,
                "unit": sample.unit,
                "measurement": sample.measurement,
                "humidity": sample.humidity,
                "humidity_percent": sample.humidity_percent(),
            });
            println!("{out}");
        }
        Ok(sample) => println!("{sample}  {bytes:02x?}"),
        Err(e) => eprintln!("Undecodable sample {bytes:02x?}: {e}"),
    }
}
