//! Program assembly: wraps a user fragment body with the standard inputs,
//! the custom parameter block, and an entry point that calls `mainImage`.
//!
//! ```text
//!   HEADER            standard uniform block, channel samplers, macros
//!   CustomInputs      one member per `@param` (omitted when there are none)
//!   user source       verbatim
//!   FOOTER            remaps gl_FragCoord and calls mainImage
//! ```
//!
//! Compiler diagnostics refer to lines of the assembled text; the number of
//! preamble lines is counted from what was emitted so errors can be mapped
//! back onto the user's source.

use directives::ParameterDefinition;

use crate::error::CompileError;

/// Descriptor set 0 binding holding [`crate::uniforms::StandardUniforms`].
pub const STANDARD_BINDING: u32 = 0;
/// Descriptor set 0 binding holding the custom parameter block.
pub const CUSTOM_BINDING: u32 = 1;

/// Assembled program text plus the bookkeeping needed for error remapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledProgram {
    pub text: String,
    /// Lines emitted before the first line of user source.
    pub preamble_lines: usize,
    /// Lines of user source, as counted by `str::lines`.
    pub user_lines: usize,
}

impl AssembledProgram {
    /// Maps a 1-based line of the assembled text onto the user's source.
    pub fn user_line(&self, assembled_line: usize) -> Option<usize> {
        let line = assembled_line.checked_sub(self.preamble_lines)?;
        (1..=self.user_lines).contains(&line).then_some(line)
    }
}

pub fn assemble_program(source: &str, params: &[ParameterDefinition]) -> AssembledProgram {
    let mut text = String::with_capacity(HEADER.len() + source.len() + FOOTER.len() + 256);
    text.push_str(HEADER);

    if !params.is_empty() {
        text.push_str(&format!(
            "layout(std140, set = 0, binding = {CUSTOM_BINDING}) uniform CustomInputs {{\n"
        ));
        for param in params {
            text.push_str("    ");
            text.push_str(&param.declaration_text());
            text.push('\n');
        }
        text.push_str("};\n");
    }

    let preamble_lines = text.matches('\n').count();

    text.push_str(source);
    if !source.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(FOOTER);

    AssembledProgram {
        text,
        preamble_lines,
        user_lines: source.lines().count(),
    }
}

/// Builds a [`CompileError`] from a compiler log.
///
/// Recognises `ERROR: <col>:<line>: <message>` and
/// `<file>:<line>: error: <message>`; the first such line wins.
pub fn parse_compile_log(log: &str, program: &AssembledProgram) -> CompileError {
    let located = log.lines().find_map(parse_log_line);
    match located {
        Some((assembled_line, message)) => CompileError {
            line: program.user_line(assembled_line),
            message,
            raw: log.to_string(),
        },
        None => CompileError {
            line: None,
            message: log
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("compilation failed")
                .to_string(),
            raw: log.to_string(),
        },
    }
}

fn parse_log_line(line: &str) -> Option<(usize, String)> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("ERROR:") {
        let mut parts = rest.splitn(3, ':');
        let _column = parts.next()?.trim().parse::<usize>().ok()?;
        let number = parts.next()?.trim().parse::<usize>().ok()?;
        let message = parts.next().unwrap_or("").trim().to_string();
        return Some((number, message));
    }

    let (location, message) = line.split_once(": error:")?;
    let (_, number) = location.rsplit_once(':')?;
    let number = number.trim().parse::<usize>().ok()?;
    Some((number, message.trim().to_string()))
}

/// Prologue shared by every assembled program.
///
/// The standard block layout must match `StandardUniforms` in `uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform StandardInputs {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    float _iFrameRate;
    float _iBeat;
    vec4 _iMouse;
    vec4 _iDate;
    vec3 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
#define iFrameRate ubo._iFrameRate
#define iBeat ubo._iBeat
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iChannelResolution ubo._iChannelResolution

layout(set = 1, binding = 0) uniform texture2D deck_channel0_texture;
layout(set = 1, binding = 1) uniform sampler deck_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D deck_channel1_texture;
layout(set = 1, binding = 3) uniform sampler deck_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D deck_channel2_texture;
layout(set = 1, binding = 5) uniform sampler deck_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D deck_channel3_texture;
layout(set = 1, binding = 7) uniform sampler deck_channel3_sampler;

#define iChannel0 sampler2D(deck_channel0_texture, deck_channel0_sampler)
#define iChannel1 sampler2D(deck_channel1_texture, deck_channel1_sampler)
#define iChannel2 sampler2D(deck_channel2_texture, deck_channel2_sampler)
#define iChannel3 sampler2D(deck_channel3_texture, deck_channel3_sampler)

";

/// Epilogue: flips to a bottom-left origin and delegates to `mainImage`.
const FOOTER: &str = r"
void main() {
    vec2 fragCoord = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
    outColor = color;
}
";

/// Full-screen triangle vertex stage paired with every program.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use directives::parse_directives;

    use super::*;

    const BODY: &str = "// @param speed float 1.0 [0.0, 2.0]\n// @param lights color[2]\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = vec4(lights[0] * speed, 1.0);\n}\n";

    #[test]
    fn preamble_count_matches_emitted_lines() {
        let parsed = parse_directives(BODY);
        let program = assemble_program(BODY, &parsed.params);
        let lines: Vec<&str> = program.text.lines().collect();
        assert_eq!(lines[program.preamble_lines], BODY.lines().next().unwrap());
        assert_eq!(
            &lines[program.preamble_lines..program.preamble_lines + program.user_lines],
            BODY.lines().collect::<Vec<_>>().as_slice()
        );
    }

    #[test]
    fn custom_block_declares_each_parameter() {
        let parsed = parse_directives(BODY);
        let program = assemble_program(BODY, &parsed.params);
        assert!(program.text.contains("uniform CustomInputs {\n    float speed;\n    vec3 lights[2];\n};"));
        assert!(program.text.contains(BODY));
        assert!(program.text.trim_end().ends_with('}'));
        assert!(program.text.contains("mainImage(color, fragCoord);"));
    }

    #[test]
    fn custom_block_is_omitted_without_parameters() {
        let body = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";
        let program = assemble_program(body, &[]);
        assert!(!program.text.contains("CustomInputs"));
        assert_eq!(program.preamble_lines, HEADER.matches('\n').count());
        assert_eq!(program.user_lines, 1);
    }

    #[test]
    fn maps_driver_lines_back_to_user_source() {
        let program = assemble_program(BODY, &[]);
        let log = format!(
            "ERROR: 0:{}: 'foo' : undeclared identifier\nERROR: 1 compilation errors.",
            program.preamble_lines + 3
        );
        let error = parse_compile_log(&log, &program);
        assert_eq!(error.line, Some(3));
        assert_eq!(error.message, "'foo' : undeclared identifier");
        assert_eq!(error.raw, log);
    }

    #[test]
    fn understands_file_prefixed_logs() {
        let program = assemble_program(BODY, &[]);
        let log = format!(
            "shader.frag:{}: error: 'bar' : no matching overloaded function found",
            program.preamble_lines + 4
        );
        let error = parse_compile_log(&log, &program);
        assert_eq!(error.line, Some(4));
        assert_eq!(error.message, "'bar' : no matching overloaded function found");
    }

    #[test]
    fn errors_outside_user_source_have_no_line() {
        let program = assemble_program(BODY, &[]);
        let in_header = parse_compile_log("ERROR: 0:2: bad header", &program);
        assert_eq!(in_header.line, None);
        let footer_line = program.preamble_lines + program.user_lines + 2;
        let in_footer = parse_compile_log(&format!("ERROR: 0:{footer_line}: x"), &program);
        assert_eq!(in_footer.line, None);
        let unlocated = parse_compile_log("linker exploded\n", &program);
        assert_eq!(unlocated.line, None);
        assert_eq!(unlocated.message, "linker exploded");
    }
}
