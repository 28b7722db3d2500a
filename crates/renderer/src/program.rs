//! Compile/recompile path: parse directives, assemble, hand the text to the
//! backend, and cache where every parameter lives in the custom block.

use std::collections::HashMap;

use directives::{parse_directives, BaseType, ParamValue, ParameterValues, ParsedSource};
use tracing::{debug, warn};

use crate::compile::{assemble_program, parse_compile_log, AssembledProgram};
use crate::error::{BackendError, CompileError};
use crate::gpu::{GpuBackend, ProgramHandle};
use crate::uniforms::{
    std140_layout, CustomUniformBlock, UniformLocation, MAX_CUSTOM_BLOCK_BYTES,
};

/// Where one parameter's elements live in the custom block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub base_type: BaseType,
    /// One location per array element, or a single location for scalars.
    pub locations: Vec<UniformLocation>,
}

/// A linked program and its cached parameter locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBinding {
    pub handle: ProgramHandle,
    pub slots: HashMap<String, ParamSlot>,
    pub block_size: u32,
    pub preamble_lines: usize,
}

impl ProgramBinding {
    /// Writes every value through the typed writer for its declared type,
    /// one write per array element.
    pub fn write_values(&self, values: &ParameterValues, block: &mut CustomUniformBlock) {
        for (name, value) in values {
            let Some(slot) = self.slots.get(name) else {
                continue;
            };
            match value {
                ParamValue::Array(elements) => {
                    for (element, location) in elements.iter().zip(&slot.locations) {
                        write_element(block, *location, element);
                    }
                }
                element => {
                    if let Some(location) = slot.locations.first() {
                        write_element(block, *location, element);
                    }
                }
            }
        }
    }
}

fn write_element(block: &mut CustomUniformBlock, location: UniformLocation, value: &ParamValue) {
    match value {
        ParamValue::Int(value) => block.set_int(location, *value),
        ParamValue::Float(value) => block.set_float(location, *value),
        ParamValue::Vec2(value) => block.set_vec2(location, *value),
        ParamValue::Vec3(value) => block.set_vec3(location, *value),
        ParamValue::Vec4(value) => block.set_vec4(location, *value),
        ParamValue::Array(_) => warn!("nested array value ignored"),
    }
}

/// Output of a successful compile.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub binding: ProgramBinding,
    pub parsed: ParsedSource,
    pub assembled: AssembledProgram,
}

/// Parses, assembles and compiles `source` on `backend`.
///
/// Compiler diagnostics are remapped onto the user's lines. Nothing is
/// released here; the caller decides what to do with the previous program.
pub fn compile<B>(backend: &mut B, source: &str) -> Result<CompiledProgram, CompileError>
where
    B: GpuBackend + ?Sized,
{
    let parsed = parse_directives(source);
    let Some((locations, block_size)) = std140_layout(&parsed.params) else {
        let message =
            format!("parameters exceed the {MAX_CUSTOM_BLOCK_BYTES}-byte custom uniform block");
        return Err(CompileError {
            line: None,
            raw: message.clone(),
            message,
        });
    };
    let assembled = assemble_program(source, &parsed.params);

    let handle = match backend.compile_program(&assembled.text) {
        Ok(handle) => handle,
        Err(BackendError::ShaderCompile { log }) => {
            let error = parse_compile_log(&log, &assembled);
            debug!(line = ?error.line, message = %error.message, "program failed to compile");
            return Err(error);
        }
        Err(other) => {
            return Err(CompileError {
                line: None,
                message: other.to_string(),
                raw: other.to_string(),
            });
        }
    };

    let mut slots = HashMap::with_capacity(parsed.params.len());
    for (def, locations) in parsed.params.iter().zip(locations) {
        slots.insert(
            def.name.clone(),
            ParamSlot {
                base_type: def.base_type,
                locations,
            },
        );
    }

    debug!(
        params = parsed.params.len(),
        textures = parsed.textures.len(),
        block_size,
        preamble_lines = assembled.preamble_lines,
        "program compiled"
    );

    Ok(CompiledProgram {
        binding: ProgramBinding {
            handle,
            slots,
            block_size,
            preamble_lines: assembled.preamble_lines,
        },
        parsed,
        assembled,
    })
}

#[cfg(test)]
mod tests {
    use directives::create_default_values;

    use super::*;
    use crate::gpu::HeadlessBackend;

    const GOOD: &str = "// @param speed float 2.0\n// @param weights float[3] [[1],[2],[3]]\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = vec4(speed * weights[0], 0.0, 0.0, 1.0);\n}\n";

    #[test]
    fn caches_one_location_per_element() {
        let mut backend = HeadlessBackend::new(4, 4);
        let compiled = compile(&mut backend, GOOD).expect("compiles");
        let binding = &compiled.binding;
        assert_eq!(binding.slots["speed"].locations, vec![UniformLocation(0)]);
        assert_eq!(binding.slots["weights"].locations.len(), 3);
        assert_eq!(binding.block_size, 64);
        assert_eq!(binding.preamble_lines, compiled.assembled.preamble_lines);
        assert_eq!(backend.live_programs(), 1);
    }

    #[test]
    fn remaps_error_lines_onto_user_source() {
        let source = "void mainImage(out vec4 c, in vec2 p) {\n    float x = 1.0;\n    c = vec4(notDeclared);\n}\n";
        let mut backend = HeadlessBackend::new(4, 4);
        let error = compile(&mut backend, source).unwrap_err();
        assert_eq!(error.line, Some(3), "{}", error.raw);
        assert!(!error.message.is_empty());
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn oversized_parameter_blocks_fail_before_the_backend() {
        let mut source: String = (0..5)
            .map(|index| format!("// @param p{index} vec4[{}]\n", directives::MAX_ARRAY_SIZE))
            .collect();
        source.push_str("void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n");
        let mut backend = HeadlessBackend::new(4, 4);
        let error = compile(&mut backend, &source).unwrap_err();
        assert_eq!(error.line, None);
        assert!(error.message.contains("custom uniform block"), "{}", error.message);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn device_loss_is_reported_without_a_line() {
        let mut backend = HeadlessBackend::new(4, 4);
        backend.lose_device();
        let error = compile(&mut backend, GOOD).unwrap_err();
        assert_eq!(error.line, None);
    }

    #[test]
    fn writes_values_with_typed_writers() {
        let mut backend = HeadlessBackend::new(4, 4);
        let compiled = compile(&mut backend, GOOD).unwrap();
        let values = create_default_values(&compiled.parsed.params);
        let mut block = CustomUniformBlock::new(compiled.binding.block_size);
        compiled.binding.write_values(&values, &mut block);
        assert_eq!(block.write_count(), 4);
        assert_eq!(block.read_f32(UniformLocation(0), 0), Some(2.0));
        assert_eq!(block.read_f32(UniformLocation(48), 0), Some(3.0));
    }
}
