use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use directives::{
    create_default_values, parse_directives, ParamValue, ParameterDefinition, ParameterValues,
    TextureDirective,
};
use renderer::{
    compile_program, EngineOptions, GpuBackend, GpuSettings, HeadlessBackend, MemoryHint,
    PowerHint, ScanlineOrder, ShaderEngine, WgpuBackend,
};
use serde::Serialize;
use stageconfig::{MemoryMode, PowerMode, StageConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{Assignment, CheckArgs, ParamsArgs, RenderArgs};
use crate::paths::load_stage_config;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn check(args: CheckArgs) -> Result<()> {
    let source = read_source(&args.file)?;
    let mut backend = HeadlessBackend::new(1, 1);

    match compile_program(&mut backend, &source) {
        Ok(compiled) => {
            backend.release_program(compiled.binding.handle);
            println!(
                "{}: ok ({} parameter(s), {} texture directive(s))",
                args.file.display(),
                compiled.parsed.params.len(),
                compiled.parsed.textures.len()
            );
            Ok(())
        }
        Err(error) => {
            match error.line {
                Some(line) => eprintln!("{}:{line}: error: {}", args.file.display(), error.message),
                None => eprintln!("{}: error: {}", args.file.display(), error.message),
            }
            tracing::debug!(raw = %error.raw, "compiler log");
            bail!("{} failed to compile", args.file.display())
        }
    }
}

#[derive(Serialize)]
struct ParamsReport<'a> {
    parameters: &'a [ParameterDefinition],
    defaults: ParameterValues,
    textures: &'a [TextureDirective],
}

pub fn params(args: ParamsArgs) -> Result<()> {
    let source = read_source(&args.file)?;
    let parsed = parse_directives(&source);
    let report = ParamsReport {
        parameters: &parsed.params,
        defaults: create_default_values(&parsed.params),
        textures: &parsed.textures,
    };
    let json = serde_json::to_string_pretty(&report).context("failed to encode parameters")?;
    println!("{json}");
    Ok(())
}

pub fn render(args: RenderArgs, config_path: Option<&Path>) -> Result<()> {
    if args.frames == 0 {
        bail!("--frames must be at least 1");
    }
    if !args.fps.is_finite() || args.fps <= 0.0 {
        bail!("--fps must be a positive number, got {}", args.fps);
    }
    if let Some(speed) = args.speed {
        if !speed.is_finite() || speed < 0.0 {
            bail!("--speed must be a finite value >= 0, got {speed}");
        }
    }

    let config = load_stage_config(config_path)?;
    let source = read_source(&args.file)?;
    let options = engine_options(&config, &args);
    let (width, height) = (options.width, options.height);

    let backend = WgpuBackend::new(width, height, gpu_settings(&config))
        .context("failed to initialise GPU backend")?;
    let mut engine = ShaderEngine::new(backend, options)?;
    engine
        .compile(&source)
        .with_context(|| format!("{} failed to compile", args.file.display()))?;

    for assignment in &args.set {
        apply_assignment(&mut engine, assignment)?;
    }

    let interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let start = Instant::now();
    for index in 0..args.frames {
        let stats = engine.render(start + interval * index);
        report_channel_events(&mut engine);
        tracing::debug!(
            frame = stats.frame,
            time = stats.time,
            delta = stats.delta,
            fps = stats.fps,
            drawn = stats.drawn,
            "rendered frame"
        );
        if !stats.drawn {
            bail!("frame {} was not drawn", stats.frame);
        }
    }

    let pixels = engine.read_pixels(ScanlineOrder::TopDown)?;
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("read-back returned a truncated frame"))?;
    image
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    tracing::info!(
        frames = args.frames,
        width,
        height,
        out = %args.out.display(),
        "render complete"
    );
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn engine_options(config: &StageConfig, args: &RenderArgs) -> EngineOptions {
    let (width, height) = args
        .size
        .unwrap_or((config.viewport.width, config.viewport.height));
    EngineOptions {
        width,
        height,
        speed: args.speed.unwrap_or(config.timing.speed),
        fps_window: config.timing.fps_window,
        texture_dir: config.channels.texture_dir.clone(),
        noise_size: config.channels.noise_size,
        noise_seed: config.channels.noise_seed,
    }
}

fn gpu_settings(config: &StageConfig) -> GpuSettings {
    GpuSettings {
        power: match config.gpu.power {
            PowerMode::Low => PowerHint::Low,
            PowerMode::High => PowerHint::High,
        },
        memory: match config.gpu.memory {
            MemoryMode::Balanced => MemoryHint::Balanced,
            MemoryMode::Performance => MemoryHint::Performance,
        },
    }
}

/// Shapes a `--set` argument after the declared parameter and writes it.
fn apply_assignment<B: GpuBackend>(
    engine: &mut ShaderEngine<B>,
    assignment: &Assignment,
) -> Result<()> {
    let definition = engine
        .parameters()
        .iter()
        .find(|def| def.name == assignment.name)
        .ok_or_else(|| anyhow!("program has no parameter named '{}'", assignment.name))?;

    if definition.is_array() && assignment.index.is_none() {
        bail!(
            "'{}' is an array; set one element with {}[INDEX]=...",
            assignment.name,
            assignment.name
        );
    }
    let expected = definition.base_type.components();
    if assignment.components.len() != expected {
        bail!(
            "'{}' is a {} and takes {expected} component(s), got {}",
            assignment.name,
            definition.base_type,
            assignment.components.len()
        );
    }

    let value = ParamValue::from_components(definition.base_type, &assignment.components);
    engine.set_parameter(&assignment.name, assignment.index, value)?;
    tracing::debug!(name = %assignment.name, index = ?assignment.index, "parameter override applied");
    Ok(())
}

fn report_channel_events<B: GpuBackend>(engine: &mut ShaderEngine<B>) {
    for event in engine.take_channel_events() {
        match event.outcome {
            Ok(()) => tracing::info!(
                channel = event.channel,
                kind = event.kind.label(),
                "channel ready"
            ),
            Err(error) => tracing::warn!(
                channel = event.channel,
                kind = event.kind.label(),
                %error,
                "channel source unavailable"
            ),
        }
    }
}
