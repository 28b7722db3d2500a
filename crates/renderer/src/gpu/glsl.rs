use wgpu::naga;
use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::ShaderStage;

/// Parses and validates a fragment program on the CPU.
///
/// On failure returns a driver-style log with one
/// `ERROR: <col>:<line>: <message>` line per diagnostic. Diagnostics without a
/// source position are reported at `0:0`.
pub fn validate_fragment(source: &str) -> Result<naga::Module, String> {
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(ShaderStage::Fragment), source)
        .map_err(|errors| {
            let mut log = String::new();
            for error in &errors.errors {
                let (column, line) = if error.meta.is_defined() {
                    let location = error.meta.location(source);
                    (location.line_position, location.line_number)
                } else {
                    (0, 0)
                };
                log.push_str(&format!("ERROR: {column}:{line}: {}\n", error.kind));
            }
            log
        })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator.validate(&module).map_err(|error| {
        let (column, line) = error
            .spans()
            .map(|(span, _)| *span)
            .find(|span| span.is_defined())
            .map(|span| {
                let location = span.location(source);
                (location.line_position, location.line_number)
            })
            .unwrap_or((0, 0));
        format!("ERROR: {column}:{line}: {}\n", error.as_inner())
    })?;

    Ok(module)
}
