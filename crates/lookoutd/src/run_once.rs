//! `lookoutd check`: run checks once from the command line.

use std::io::Write;

use tracing::error;

use crate::bootstrap::Services;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILING: u8 = 1;
pub const EXIT_UNKNOWN: u8 = 2;

/// Run the selected checks one after the other, printing each description
/// and result. Returns the process exit code.
pub async fn run(
    services: &Services,
    project: Option<&str>,
    name: Option<&str>,
    force: bool,
    out: &mut impl Write,
) -> std::io::Result<u8> {
    let selected = match services.checks.lookup(project, name, None) {
        Ok(selected) => selected,
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(EXIT_UNKNOWN);
        }
    };

    let mut all_passed = true;
    for check in selected {
        writeln!(out, "{}", check.description)?;
        match services.runner.run(check.clone(), force).await {
            Ok(result) => {
                let data = serde_json::to_string_pretty(&result.data).unwrap_or_default();
                writeln!(out, "{data}")?;
                all_passed &= result.success;
            }
            Err(e) => {
                error!(check = %check.identifier(), error = %e, "check failed to run");
                writeln!(out, "{e}")?;
                all_passed = false;
            }
        }
    }
    Ok(if all_passed { EXIT_OK } else { EXIT_FAILING })
}
