use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use onroad_pipeline::config::PipelineConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ONROAD_CONFIG",
        "ONROAD_SOURCE_URL",
        "ONROAD_DETECTOR",
        "ONROAD_CATEGORIES",
        "ONROAD_CONFIDENCE",
        "ONROAD_QUEUE_CAPACITY",
        "ONROAD_SAMPLING_INTERVAL",
        "ONROAD_STATUS_INTERVAL",
        "ONROAD_LOG_DIR",
        "ONROAD_ENABLE_LOG",
        "ONROAD_ENABLE_STATUS",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.queue_capacity, 5);
    assert_eq!(cfg.sampling_interval, 1);
    assert_eq!(cfg.status_interval, 5);
    assert_eq!(cfg.source.url, "stub://front_camera");
    assert_eq!(cfg.source.target_fps, 30);
    assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
    assert_eq!(cfg.detector.backend, "synthetic");
    assert_eq!(cfg.detector.confidence, 0.5);
    assert_eq!(
        cfg.detector.categories,
        vec!["bicycle", "car", "motorbike", "bus", "truck"]
    );
    assert!(cfg.output.enable_log);
    assert!(cfg.output.enable_status);
    assert_eq!(cfg.output.log_dir, PathBuf::from("data_logs"));
    assert_eq!(cfg.max_results, None);
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[pipeline]
queue_capacity = 8
sampling_interval = 2
status_interval = 10
shutdown_grace_ms = 500
health_log_secs = 0
max_results = 100

[source]
url = "/tmp/latest_frame.jpg"
target_fps = 5
width = 1280
height = 720

[detector]
backend = "fixed"
confidence = 0.6
categories = ["car", "truck"]
fixed = ["car"]

[output]
enable_status = false
log_dir = "/var/lib/onroad"
status_path = "/run/onroad/status.txt"
"#,
    );

    std::env::set_var("ONROAD_CONFIG", file.path());
    std::env::set_var("ONROAD_SAMPLING_INTERVAL", "3");
    std::env::set_var("ONROAD_CATEGORIES", "bus, car");
    std::env::set_var("ONROAD_ENABLE_LOG", "off");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.queue_capacity, 8);
    assert_eq!(cfg.sampling_interval, 3);
    assert_eq!(cfg.status_interval, 10);
    assert_eq!(cfg.shutdown_grace, Duration::from_millis(500));
    assert_eq!(cfg.health_log_interval, None);
    assert_eq!(cfg.max_results, Some(100));
    assert_eq!(cfg.source.url, "/tmp/latest_frame.jpg");
    assert_eq!(cfg.source.target_fps, 5);
    assert_eq!((cfg.source.width, cfg.source.height), (1280, 720));
    assert_eq!(cfg.detector.backend, "fixed");
    assert_eq!(cfg.detector.confidence, 0.6);
    assert_eq!(cfg.detector.categories, vec!["bus", "car"]);
    assert_eq!(cfg.detector.fixed, vec!["car"]);
    assert!(!cfg.output.enable_log);
    assert!(!cfg.output.enable_status);
    assert_eq!(cfg.output.log_dir, PathBuf::from("/var/lib/onroad"));
    assert_eq!(
        cfg.output.status_path,
        Some(PathBuf::from("/run/onroad/status.txt"))
    );

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.queue_capacity, 8);
    assert_eq!(settings.filter.categories().collect::<Vec<_>>(), vec!["bus", "car"]);

    clear_env();
}

#[test]
fn json_file_is_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "pipeline": { "queue_capacity": 3, "status_interval": 2 },
            "detector": { "seed": 42 }
        }"#,
    );
    let cfg = PipelineConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.queue_capacity, 3);
    assert_eq!(cfg.status_interval, 2);
    assert_eq!(cfg.detector.seed, Some(42));
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for (key, value) in [
        ("ONROAD_QUEUE_CAPACITY", "0"),
        ("ONROAD_SAMPLING_INTERVAL", "0"),
        ("ONROAD_STATUS_INTERVAL", "0"),
        ("ONROAD_CONFIDENCE", "1.5"),
        ("ONROAD_CONFIDENCE", "high"),
        ("ONROAD_QUEUE_CAPACITY", "-1"),
        ("ONROAD_ENABLE_LOG", "maybe"),
    ] {
        std::env::set_var(key, value);
        assert!(
            PipelineConfig::load().is_err(),
            "{}={} should be rejected",
            key,
            value
        );
        std::env::remove_var(key);
    }

    let file = config_file(".toml", "[detector]\ncategories = []\n");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());

    for body in [
        "[source]\nwidth = 70000\nheight = 70000\n",
        "[source]\nwidth = 0\n",
        "[source]\nheight = 0\n",
        "[source]\nwidth = 8193\nheight = 480\n",
    ] {
        let file = config_file(".toml", body);
        let err = PipelineConfig::load_from(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("source"), "{:?} accepted", body);
    }
    let file = config_file(".toml", "[source]\nwidth = 8192\nheight = 8192\n");
    let cfg = PipelineConfig::load_from(Some(file.path())).expect("largest frame accepted");
    assert_eq!((cfg.source.width, cfg.source.height), (8192, 8192));

    let file = config_file(".toml", "[pipeline\nqueue_capacity = 5\n");
    let err = PipelineConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
