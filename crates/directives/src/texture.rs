use serde::{Deserialize, Serialize};

use crate::scan::{directive_body, next_word};

pub const TEXTURE_KEYWORD: &str = "@texture";

/// FFT sizes accepted by `mic` directives.
pub const FFT_SIZES: [usize; 7] = [64, 128, 256, 512, 1024, 2048, 4096];

/// Number of input channels a program can sample.
pub const CHANNEL_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinPattern {
    Noise,
    NoiseRgb,
}

impl BuiltinPattern {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "noise" => Some(Self::Noise),
            "noise-rgb" => Some(Self::NoiseRgb),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Noise => "noise",
            Self::NoiseRgb => "noise-rgb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TextureSource {
    Builtin { pattern: BuiltinPattern },
    File { name: String },
    Microphone { fft_size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDirective {
    pub channel: usize,
    pub source: TextureSource,
}

/// Parses `// @texture <slot> <source>`; `None` for anything malformed.
pub fn parse_texture_line(line: &str) -> Option<TextureDirective> {
    let body = directive_body(line, TEXTURE_KEYWORD)?;
    let (slot, rest) = next_word(body)?;
    let channel = parse_slot(slot)?;
    let (kind, rest) = next_word(rest)?;
    let rest = rest.trim();

    let source = match kind {
        "file" => TextureSource::File {
            name: parse_file_name(rest)?,
        },
        "mic" => {
            let (size, trailing) = next_word(rest)?;
            if !trailing.trim().is_empty() {
                return None;
            }
            let fft_size = size.parse::<usize>().ok()?;
            if !FFT_SIZES.contains(&fft_size) {
                return None;
            }
            TextureSource::Microphone { fft_size }
        }
        other => {
            if !rest.is_empty() {
                return None;
            }
            TextureSource::Builtin {
                pattern: BuiltinPattern::from_name(other)?,
            }
        }
    };

    Some(TextureDirective { channel, source })
}

fn parse_slot(token: &str) -> Option<usize> {
    let digits = token.strip_prefix("iChannel").unwrap_or(token);
    let channel = digits.parse::<usize>().ok()?;
    (channel < CHANNEL_SLOTS).then_some(channel)
}

fn parse_file_name(rest: &str) -> Option<String> {
    let name = match rest.strip_prefix('"') {
        Some(quoted) => quoted.strip_suffix('"')?,
        None => {
            if rest.contains(char::is_whitespace) {
                return None;
            }
            rest
        }
    };
    (!name.is_empty()).then(|| name.to_string())
}
