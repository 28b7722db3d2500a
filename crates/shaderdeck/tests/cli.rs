use std::fs;
use std::process::Command;

use tempfile::TempDir;

const GOOD: &str = "// @param speed float 2.0 [0, 10] \"Scroll speed\"\n\
// @param tint color [1, 0.5, 0]\n\
// @texture iChannel1 noise-rgb\n\
void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n\
    vec2 uv = fragCoord / iResolution.xy;\n\
    fragColor = vec4(tint * uv.x * speed, 1.0);\n\
}\n";

const BROKEN: &str = "// @param speed float 1.0\n\
void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n\
    fragColor = vec4(missingValue);\n\
}\n";

fn shaderdeck(config_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shaderdeck"));
    command
        .env("SHADERDECK_CONFIG_DIR", config_dir.path())
        .env_remove("SHADERDECK_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn check_accepts_a_valid_program() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("good.glsl");
    fs::write(&file, GOOD).unwrap();

    let output = shaderdeck(&root)
        .arg("check")
        .arg(&file)
        .output()
        .expect("failed to run shaderdeck check");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("ok (2 parameter(s), 1 texture directive(s))"), "{stdout}");
}

#[test]
fn check_reports_errors_on_user_lines() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("broken.glsl");
    fs::write(&file, BROKEN).unwrap();

    let output = shaderdeck(&root)
        .arg("check")
        .arg(&file)
        .output()
        .expect("failed to run shaderdeck check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let expected = format!("{}:3: error:", file.display());
    assert!(stderr.contains(&expected), "{stderr}");
}

#[test]
fn params_prints_definitions_and_defaults() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("good.glsl");
    fs::write(&file, GOOD).unwrap();

    let output = shaderdeck(&root)
        .arg("params")
        .arg(&file)
        .output()
        .expect("failed to run shaderdeck params");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let parameters = report["parameters"].as_array().unwrap();
    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0]["name"], "speed");
    assert_eq!(parameters[0]["base_type"], "float");
    assert_eq!(parameters[1]["base_type"], "color");
    assert_eq!(
        report["defaults"]["speed"],
        serde_json::json!({ "type": "float", "value": 2.0 })
    );
    assert_eq!(report["textures"][0]["channel"], 1);
    assert_eq!(report["textures"][0]["source"]["kind"], "builtin");
}

#[test]
fn render_rejects_a_missing_config_file() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("good.glsl");
    fs::write(&file, GOOD).unwrap();

    let output = shaderdeck(&root)
        .arg("render")
        .arg(&file)
        .arg("--config")
        .arg(root.path().join("absent.toml"))
        .arg("--out")
        .arg(root.path().join("frame.png"))
        .output()
        .expect("failed to run shaderdeck render");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read config"));
    assert!(!root.path().join("frame.png").exists());
}

#[test]
fn render_rejects_malformed_overrides() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("good.glsl");
    fs::write(&file, GOOD).unwrap();

    let output = shaderdeck(&root)
        .arg("render")
        .arg(&file)
        .args(["--set", "speed=fast", "--out"])
        .arg(root.path().join("frame.png"))
        .output()
        .expect("failed to run shaderdeck render");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid number 'fast'"));
}
