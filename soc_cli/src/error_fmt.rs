//! Human-readable error descriptions and structured JSON error formatting.

use soc_core::SocError;

/// Exit code for any error without a more specific mapping.
pub const EXIT_GENERIC: i32 = 1;
/// Config file, cell-model tables or trace could not be used.
pub const EXIT_CONFIG: i32 = 2;
/// The bus failed or the slave stopped answering.
pub const EXIT_BUS: i32 = 3;

/// Typed error anywhere in the report, including `wrap_err` contexts.
fn soc_error(err: &eyre::Report) -> Option<&SocError> {
    err.downcast_ref::<SocError>()
        .or_else(|| err.chain().find_map(|e| e.downcast_ref::<SocError>()))
}

fn root_cause(err: &eyre::Report) -> String {
    err.root_cause().to_string()
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    let cause = root_cause(err);

    if let Some(se) = soc_error(err) {
        return match se {
            SocError::Config(msg) => {
                if cause.contains("trace CSV must have headers") {
                    return "Invalid headers in trace CSV. Expected 'current,voltage,temperature'."
                        .to_string();
                }
                format!(
                    "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML, or a missing or ragged CellModel*.csv table.\nHow to fix: Edit the config or tables, then rerun `soc self-check`. Cause: {cause}"
                )
            }
            SocError::Bus(msg) => format!(
                "What happened: Bus communication failed ({msg}).\nLikely causes: CAN interface down or missing, wrong bus.slave_address, or the slave stopped answering.\nHow to fix: Check `ip link show` for the interface and the slave wiring; for the sim backend check the trace file."
            ),
            SocError::Matrix(e) => format!(
                "What happened: Numerical failure in the filter ({e}).\nLikely causes: Singular innovation covariance or a table producing non-finite values.\nHow to fix: Check the cell-model tables and [filter] noise settings."
            ),
            SocError::Input(msg) | SocError::State(msg) => format!(
                "What happened: {se}.\nLikely causes: Pack topology does not match what the slave reports ({msg}).\nHow to fix: Check [pack] par/ser against the slave configuration."
            ),
        };
    }

    let msg = err.to_string();
    format!(
        "Something went wrong. Cause: {cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable process exit code for an error.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match soc_error(err) {
        Some(SocError::Config(_)) => EXIT_CONFIG,
        Some(SocError::Bus(_)) => EXIT_BUS,
        _ => EXIT_GENERIC,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match soc_error(err) {
        Some(SocError::Config(_)) => "Config",
        Some(SocError::Bus(_)) => "Bus",
        Some(SocError::Matrix(_)) => "Matrix",
        Some(SocError::Input(_)) => "Input",
        Some(SocError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn wrapped_config_context_maps_to_exit_2() {
        let res: eyre::Result<()> = Err(eyre::eyre!("table CSV \"x\" is empty"));
        let err = res
            .wrap_err(SocError::Config("loading cell-model tables".into()))
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), EXIT_CONFIG);
        let text = humanize(&err);
        assert!(text.contains("Invalid configuration"), "{text}");
        assert!(text.contains("is empty"), "{text}");
    }

    #[test]
    fn bus_error_maps_to_exit_3() {
        let err = eyre::Report::new(SocError::Bus("disconnected".into()));
        assert_eq!(exit_code_for_error(&err), EXIT_BUS);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Bus");
        assert_eq!(v["exit_code"], 3);
    }

    #[test]
    fn untyped_error_is_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), EXIT_GENERIC);
        assert!(humanize(&err).contains("boom"));
    }
}
