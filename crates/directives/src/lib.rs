//! Comment-embedded directives for live-tunable fragment programs.
//!
//! Program authors declare tunable uniforms and channel inputs in ordinary
//! line comments:
//!
//! ```text
//! // @param speed float 1.0 [0.0, 2.0] "Speed"
//! // @param lights color[2] [[0.9,0.4,0.1],[0.2,0.6,0.7]]
//! // @texture iChannel1 mic 512
//! ```
//!
//! Each line is scanned on its own, so directives can sit anywhere in the
//! source. Lines that look like directives but fail to parse are skipped
//! with a debug log; parsing never fails as a whole.

mod param;
mod scan;
mod texture;
mod value;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use param::{parse_param_line, ParameterDefinition, MAX_ARRAY_SIZE, PARAM_KEYWORD};
pub use texture::{
    parse_texture_line, BuiltinPattern, TextureDirective, TextureSource, CHANNEL_SLOTS,
    FFT_SIZES, TEXTURE_KEYWORD,
};
pub use value::{BaseType, ParamValue};

/// Current value of every declared parameter, keyed by name.
pub type ParameterValues = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSource {
    /// Parameter definitions in declaration order.
    pub params: Vec<ParameterDefinition>,
    /// At most one directive per channel, ordered by channel index.
    pub textures: Vec<TextureDirective>,
}

impl ParsedSource {
    pub fn param(&self, name: &str) -> Option<&ParameterDefinition> {
        self.params.iter().find(|def| def.name == name)
    }

    pub fn texture_for(&self, channel: usize) -> Option<&TextureSource> {
        self.textures
            .iter()
            .find(|directive| directive.channel == channel)
            .map(|directive| &directive.source)
    }
}

/// Scans `source` for `@param` and `@texture` directives.
///
/// A repeated parameter name keeps the first declaration; a repeated channel
/// keeps the last `@texture` line.
pub fn parse_directives(source: &str) -> ParsedSource {
    let mut params: Vec<ParameterDefinition> = Vec::new();
    let mut seen = HashSet::new();
    let mut textures: [Option<TextureSource>; CHANNEL_SLOTS] = Default::default();

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_start();
        if !trimmed.starts_with("//") {
            continue;
        }
        let comment = trimmed.trim_start_matches('/').trim_start();

        if comment.starts_with(PARAM_KEYWORD) {
            match parse_param_line(line) {
                Some(def) => {
                    if seen.insert(def.name.clone()) {
                        params.push(def);
                    } else {
                        debug!(line = line_number, name = %def.name, "skipping duplicate @param");
                    }
                }
                None if comment[PARAM_KEYWORD.len()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace) =>
                {
                    debug!(line = line_number, text = line.trim(), "skipping malformed @param");
                }
                None => {}
            }
        } else if comment.starts_with(TEXTURE_KEYWORD) {
            match parse_texture_line(line) {
                Some(directive) => textures[directive.channel] = Some(directive.source),
                None => {
                    debug!(line = line_number, text = line.trim(), "skipping malformed @texture");
                }
            }
        }
    }

    let textures = textures
        .into_iter()
        .enumerate()
        .filter_map(|(channel, source)| source.map(|source| TextureDirective { channel, source }))
        .collect();

    ParsedSource { params, textures }
}

/// Builds the initial value map from each definition's default.
pub fn create_default_values(defs: &[ParameterDefinition]) -> ParameterValues {
    defs.iter()
        .map(|def| (def.name.clone(), def.default_value()))
        .collect()
}
