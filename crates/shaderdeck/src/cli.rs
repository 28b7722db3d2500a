use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shaderdeck",
    author,
    version,
    about = "Compile, inspect, and render live-tunable fragment programs"
)]
pub struct Cli {
    /// Stage configuration file; defaults to `shaderdeck.toml` in the config directory.
    #[arg(long, global = true, value_name = "FILE", env = "SHADERDECK_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a program without a GPU and report errors against its own lines.
    Check(CheckArgs),
    /// Print parameter definitions, defaults, and texture directives as JSON.
    Params(ParamsArgs),
    /// Render frames offscreen and write the last one to a PNG.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Number of frames to render before capturing.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub frames: u32,

    /// Render resolution (e.g. `1280x720`); overrides the configured viewport.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Playback speed multiplier; overrides `timing.speed`.
    #[arg(long, value_name = "SPEED")]
    pub speed: Option<f32>,

    /// Simulated frame rate used to space frame timestamps.
    #[arg(long, value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Parameter override, `name=1.0` or `name[2]=0.5,0.2,1`. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<Assignment>,

    /// Output PNG path.
    #[arg(long, value_name = "PNG")]
    pub out: PathBuf,
}

/// A `--set` argument before it is checked against the program's definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub index: Option<usize>,
    pub components: Vec<f64>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_assignment(value: &str) -> Result<Assignment, String> {
    let (target, raw) = value
        .split_once('=')
        .ok_or_else(|| "expected NAME=VALUE".to_string())?;
    let target = target.trim();

    let (name, index) = match target.split_once('[') {
        Some((name, rest)) => {
            let digits = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated index in '{target}'"))?;
            let index = digits
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid index '{digits}'"))?;
            (name.trim(), Some(index))
        }
        None => (target, None),
    };
    if name.is_empty() {
        return Err("parameter name must not be empty".into());
    }

    let components = raw
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .ok_or_else(|| format!("invalid number '{part}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Assignment {
        name: name.to_string(),
        index,
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 64X32 ").unwrap(), (64, 32));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("1280").is_err());
    }

    #[test]
    fn parses_scalar_and_indexed_assignments() {
        assert_eq!(
            parse_assignment("speed=2.5").unwrap(),
            Assignment {
                name: "speed".into(),
                index: None,
                components: vec![2.5],
            }
        );
        assert_eq!(
            parse_assignment("tint[1]=0.5, 0.2,1").unwrap(),
            Assignment {
                name: "tint".into(),
                index: Some(1),
                components: vec![0.5, 0.2, 1.0],
            }
        );
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_assignment("speed").is_err());
        assert!(parse_assignment("=1").is_err());
        assert!(parse_assignment("tint[x]=1").is_err());
        assert!(parse_assignment("tint[1=1").is_err());
        assert!(parse_assignment("speed=fast").is_err());
        assert!(parse_assignment("speed=inf").is_err());
    }
}
