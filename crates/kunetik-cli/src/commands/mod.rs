pub mod info;
pub mod monitor;
pub mod read;
pub mod unit;

use kunetik_core::{CancelToken, DeviceConfig, InProcessRegistry, KunetikModule, Session, Unit};

/// Parse a unit argument (`celsius|c|0`, `fahrenheit|f|1`, case-insensitive).
pub fn parse_unit(s: &str) -> Result<Unit, String> {
    s.parse::<Unit>().map_err(|e| e.to_string())
}

/// Initialise `env_logger`. `RUST_LOG` wins unless `--verbose` is given.
pub fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

/// Build the device config for a CLI invocation.
pub fn device_config(seed: Option<u64>) -> DeviceConfig {
    DeviceConfig {
        seed,
        ..Default::default()
    }
}

/// Load the module into an in-process host, exiting on failure.
pub fn load_module(seed: Option<u64>) -> KunetikModule {
    match KunetikModule::load(device_config(seed), Box::new(InProcessRegistry::new())) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error loading device: {e}");
            std::process::exit(1);
        }
    }
}

/// Open the module's device, exiting on failure.
pub fn open_session(module: &KunetikModule) -> Session {
    match module.device().open() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening {}: {e}", module.device_path());
            std::process::exit(1);
        }
    }
}

/// Apply `unit` to the session if one was requested, exiting on failure.
pub fn apply_unit(session: &Session, unit: Option<Unit>) {
    if let Some(u) = unit {
        if let Err(e) = session.set_unit(u) {
            eprintln!("Error setting unit: {e}");
            std::process::exit(1);
        }
    }
}

/// Cancel `token` on Ctrl+C.
pub fn cancel_on_ctrlc(token: &CancelToken) {
    let t = token.clone();
    if let Err(e) = ctrlc::set_handler(move || t.cancel()) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }
}
