use std::sync::Mutex;

use tempfile::NamedTempFile;

use detect_overlay::config::OverlaydConfig;
use detect_overlay::OverlayMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "OVERLAYD_CONFIG",
        "OVERLAYD_SOURCE_URL",
        "OVERLAYD_BACKEND",
        "OVERLAYD_MODEL_PATH",
        "OVERLAYD_FONT_PATH",
        "OVERLAYD_MAX_RESULTS",
        "OVERLAYD_SCORE_THRESHOLD",
        "OVERLAYD_OUTPUT_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "url": "stub://kitchen",
            "width": 320,
            "height": 240,
            "target_fps": 10,
            "repeat": true
        },
        "detector": {
            "backend": "Tract",
            "model_path": "models/ssd_mobilenet.onnx",
            "labels_path": "models/labels.txt",
            "max_results": 5,
            "score_threshold": 0.3
        },
        "overlay": {
            "font_path": "fonts/Roboto.ttf",
            "mode": "layer"
        },
        "output_dir": "frames_out"
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("OVERLAYD_CONFIG", file.path());
    std::env::set_var("OVERLAYD_MAX_RESULTS", "3");
    std::env::set_var("OVERLAYD_OUTPUT_DIR", "elsewhere");

    let cfg = OverlaydConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "stub://kitchen");
    assert_eq!(cfg.source.width, 320);
    assert_eq!(cfg.source.height, 240);
    assert_eq!(cfg.source.target_fps, 10);
    assert!(cfg.source.repeat);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path.to_str(),
        Some("models/ssd_mobilenet.onnx")
    );
    assert_eq!(
        cfg.detector.labels_path.as_deref().and_then(|p| p.to_str()),
        Some("models/labels.txt")
    );
    assert_eq!(cfg.detector.options.max_results, 3);
    assert!((cfg.detector.options.score_threshold - 0.3).abs() < f32::EPSILON);
    assert_eq!(
        cfg.overlay.font_path.as_deref().and_then(|p| p.to_str()),
        Some("fonts/Roboto.ttf")
    );
    assert_eq!(cfg.overlay.mode, OverlayMode::Layer);
    assert_eq!(cfg.output_dir.to_str(), Some("elsewhere"));

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = OverlaydConfig::load().expect("load defaults");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.options.max_results, 2);
    assert!((cfg.detector.options.score_threshold - 0.5).abs() < f32::EPSILON);
    assert_eq!(cfg.overlay.mode, OverlayMode::Composite);

    clear_env();
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAYD_SCORE_THRESHOLD", "1.5");
    assert!(OverlaydConfig::load().is_err());
    clear_env();

    std::env::set_var("OVERLAYD_MAX_RESULTS", "many");
    assert!(OverlaydConfig::load().is_err());
    clear_env();

    std::env::set_var("OVERLAYD_BACKEND", "coreml");
    assert!(OverlaydConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    assert!(OverlaydConfig::load_from(Some(&missing)).is_err());

    clear_env();
}
