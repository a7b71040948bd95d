#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = soc_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // Anything that validates must map onto a runnable estimator config
        let run = soc_core::RunConfig::try_from(&cfg).expect("validated config converts");
        assert_eq!(run.topology.channels(), cfg.channels());
        assert!(!run.period.is_zero());
    }
});
