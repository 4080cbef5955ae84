//! `metaball run` and `metaball collect`: assemble the pipeline from the
//! configuration and drive it until the operator stops it.

use std::path::Path;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use metaball_hal::{SimCamera, SimForceSensor};
use metaball_middleware::TelemetryPublisher;
use metaball_perception::{FrameTransform, JumpGate, PoseFilter, WrenchTransform};
use metaball_runtime::acquisition::POSE_DIM;
use metaball_runtime::{
    AcquisitionLoop, ForceModel, InitialPoseConfig, LinearForceModel, Pipeline, PipelineReport,
    RecordingCoordinator, SampleQueue, SharedRecordingState, WorkerExit, capture_initial_pose, spawn_worker,
};
use metaball_types::{MetaballError, Pose};
use tracing::warn;

use crate::config::{COLLECT_PORT, DEPLOY_PORT, MetaballConfig};
use crate::keyboard;

const SUPERVISE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Telemetry with inference, no recording.
    Deploy,
    /// Telemetry plus force sensor and keyboard-driven recording.
    Collect,
}

impl Mode {
    pub fn default_port(self) -> u16 {
        match self {
            Mode::Deploy => DEPLOY_PORT,
            Mode::Collect => COLLECT_PORT,
        }
    }

    pub fn records(self) -> bool {
        self == Mode::Collect
    }
}

pub fn execute(mode: Mode, cfg: &MetaballConfig) -> Result<(), MetaballError> {
    // ── Collaborators that can fail on bad configuration ─────────────────
    let model = cfg
        .model
        .path
        .as_deref()
        .map(LinearForceModel::from_json_file)
        .transpose()?;
    if let Some(model) = &model {
        model.check_input_dim(POSE_DIM)?;
    }
    // The remap is checked here; the real transform needs the initial pose.
    FrameTransform::from_rows(Pose::zero(), cfg.transform.axis_remap, cfg.transform.convention)?;
    let wrench = WrenchTransform::from_rows(cfg.force_sensor.rotation, cfg.force_sensor.translation)?;

    let state = SharedRecordingState::new();
    crate::install_ctrlc(state.stop_flag());

    // ── Transport ─────────────────────────────────────────────────────────
    let runtime = crate::build_runtime()?;
    let publisher = runtime.block_on(TelemetryPublisher::bind(&cfg.publisher.address(mode.default_port())))?;
    println!(
        "  Publishing on {}",
        format!("tcp://{}", publisher.local_addr()).bold()
    );

    // ── Camera and reference pose ─────────────────────────────────────────
    let mut camera = SimCamera::new(cfg.camera.id.clone())
        .with_fps(cfg.camera.fps)
        .with_size(cfg.camera.width, cfg.camera.height);
    let initial = capture_initial_pose(
        &mut camera,
        &InitialPoseConfig {
            warmup_frames: cfg.camera.warmup_frames,
            samples: cfg.camera.initial_samples,
            max_attempts: cfg.camera.max_initial_attempts,
        },
    )?;
    let transform = FrameTransform::from_rows(initial, cfg.transform.axis_remap, cfg.transform.convention)?;

    // ── Acquisition loop ──────────────────────────────────────────────────
    let queue = SampleQueue::bounded(cfg.recording.queue_capacity);
    let mut acquisition = AcquisitionLoop::new(
        Box::new(camera),
        Box::new(publisher),
        transform,
        queue.clone(),
        state.clone(),
    )
    .with_node_dim(cfg.model.node_dim);
    if cfg.filter.jump_gate {
        acquisition = acquisition.with_jump_gate(JumpGate::new(cfg.filter.jump_threshold));
    }
    if cfg.filter.enabled {
        acquisition = acquisition.with_filter(PoseFilter::with_mode(cfg.filter.window, cfg.filter.mode));
    }
    if let Some(model) = model {
        acquisition = acquisition.with_model(Box::new(model))?;
    }
    if mode.records() && cfg.force_sensor.enabled {
        acquisition = acquisition.with_force_sensor(Box::new(SimForceSensor::new(cfg.force_sensor.id.clone())), wrench);
    }

    let recorder = mode.records().then(|| {
        RecordingCoordinator::new(queue, state.clone(), &cfg.recording.data_dir)
            .with_poll_interval(Duration::from_millis(cfg.recording.poll_interval_ms.max(1)))
    });

    print_controls(mode, &cfg.recording.data_dir);
    let pipeline = Pipeline::start(state.clone(), acquisition, recorder)?;

    let keyboard_state = state.clone();
    let records = mode.records();
    let keys = match spawn_worker("keyboard", move || keyboard::run(keyboard_state, records)) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "keyboard control unavailable");
            None
        }
    };

    // ── Supervise ─────────────────────────────────────────────────────────
    while !state.should_stop() && !pipeline.any_finished() {
        thread::sleep(SUPERVISE_INTERVAL);
    }

    let timeout = Duration::from_millis(cfg.shutdown.join_timeout_ms);
    let report = pipeline.stop(timeout);
    if let Some(keys) = keys {
        keys.join_timeout(timeout);
    }
    runtime.shutdown_timeout(timeout);

    print_report(&report);
    Ok(())
}

fn print_controls(mode: Mode, data_dir: &Path) {
    println!();
    if mode.records() {
        println!(
            "  {} start recording   {} stop recording   {} quit",
            "[r]".bold().cyan(),
            "[s]".bold().cyan(),
            "[q]".bold().cyan()
        );
        println!("  Sessions are written to {}", data_dir.display().to_string().bold());
    } else {
        println!("  {} quit", "[q]".bold().cyan());
    }
    println!();
}

fn print_report(report: &PipelineReport) {
    println!();
    match &report.acquisition {
        WorkerExit::Finished(stats) => println!(
            "  {} {} ticks, {} camera failures, {} samples recorded, {} dropped",
            "✓".green().bold(),
            stats.ticks,
            stats.camera_failures,
            stats.enqueued,
            stats.dropped
        ),
        WorkerExit::Panicked => println!("  {}", "Acquisition thread panicked.".red()),
        WorkerExit::TimedOut => println!("  {}", "Acquisition thread did not stop in time.".yellow()),
    }
    match &report.recorder {
        Some(WorkerExit::Finished(sessions)) => {
            println!("  {} {} session(s) saved", "✓".green().bold(), sessions)
        }
        Some(WorkerExit::Panicked) => println!("  {}", "Recorder thread panicked.".red()),
        Some(WorkerExit::TimedOut) => println!("  {}", "Recorder thread did not stop in time.".yellow()),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// A config whose publish port is already taken, so reaching the bind
    /// step would fail with a transport error instead.
    fn occupied_port_config() -> (MetaballConfig, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let mut cfg = MetaballConfig::default();
        cfg.publisher.host = "127.0.0.1".to_string();
        cfg.publisher.port = Some(listener.local_addr().expect("addr").port());
        (cfg, listener)
    }

    #[test]
    fn mode_ports_and_recording() {
        assert_eq!(Mode::Collect.default_port(), 5555);
        assert_eq!(Mode::Deploy.default_port(), 6666);
        assert!(Mode::Collect.records());
        assert!(!Mode::Deploy.records());
    }

    #[test]
    fn bad_model_path_is_fatal_before_binding() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut cfg = MetaballConfig::default();
        cfg.model.path = Some(dir.path().join("missing.json"));
        let err = execute(Mode::Deploy, &cfg).unwrap_err();
        assert!(matches!(err, MetaballError::Configuration(_)));
    }

    #[test]
    fn non_orthogonal_axis_remap_is_fatal_before_binding() {
        let (mut cfg, _listener) = occupied_port_config();
        cfg.transform.axis_remap = [[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let err = execute(Mode::Deploy, &cfg).unwrap_err();
        assert!(matches!(err, MetaballError::Configuration(_)), "got {err:?}");
    }

    #[test]
    fn model_input_mismatch_is_fatal_before_binding() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{
                "name": "three-inputs",
                "input_dim": 3,
                "force": {"weights": [[1.0, 0.0, 0.0]], "bias": [0.0]},
                "node": {"weights": [[0.0, 1.0, 0.0]], "bias": [0.0]}
            }"#,
        )
        .expect("write model");
        let (mut cfg, _listener) = occupied_port_config();
        cfg.model.path = Some(path);
        let err = execute(Mode::Deploy, &cfg).unwrap_err();
        assert!(matches!(err, MetaballError::Configuration(_)), "got {err:?}");
    }

    #[test]
    fn non_orthogonal_sensor_rotation_is_fatal() {
        let mut cfg = MetaballConfig::default();
        cfg.force_sensor.rotation = [[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let err = execute(Mode::Collect, &cfg).unwrap_err();
        assert!(matches!(err, MetaballError::Configuration(_)));
    }
}
