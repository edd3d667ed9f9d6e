mod routes;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use dualsight_core::app_context::{AppContext, Collaborators};
use dualsight_core::capture::domain::frame_source::FrameSource;
use dualsight_core::capture::infrastructure::ffmpeg_camera_source::FfmpegCameraSource;
use dualsight_core::capture::infrastructure::still_image_source::StillImageSource;
use dualsight_core::detection::infrastructure::coco_labels::{coco_labels, load_labels};
use dualsight_core::detection::infrastructure::onnx_sface_encoder::OnnxSfaceEncoder;
use dualsight_core::detection::infrastructure::onnx_yolo_face_locator::{
    OnnxYoloFaceLocator, DEFAULT_CONFIDENCE,
};
use dualsight_core::detection::infrastructure::onnx_yolo_object_tracker::OnnxYoloObjectTracker;
use dualsight_core::identity::domain::identity_matcher::IdentityMatcher;
use dualsight_core::identity::domain::snapshot_store::SnapshotStore;
use dualsight_core::identity::infrastructure::fs_snapshot_store::FsSnapshotStore;
use dualsight_core::identity::infrastructure::sqlite_identity_store::SqliteIdentityStore;
use dualsight_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL, IMAGE_EXTENSIONS,
    OBJECT_MODEL_NAME,
};
use dualsight_core::shared::model_resolver;
use dualsight_core::shared::settings::{ConfigError, Settings};

/// Live camera with face recognition and object counting streams.
#[derive(Parser)]
#[command(name = "dualsight")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Capture device, or an image file to replay [default: /dev/video0].
    #[arg(long)]
    device: Option<String>,

    /// libavdevice input format [default: video4linux2].
    #[arg(long)]
    device_format: Option<String>,

    /// Requested capture width [default: 640].
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height [default: 480].
    #[arg(long)]
    height: Option<u32>,

    /// Requested capture frame rate [default: 30].
    #[arg(long)]
    fps: Option<u32>,

    /// SQLite identity database.
    #[arg(long, default_value = "faces.db")]
    database: PathBuf,

    /// Directory for recognised-face snapshots.
    #[arg(long, default_value = "recognized_faces")]
    snapshot_dir: PathBuf,

    /// Directory searched for model files before the cache.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Run face detection every Nth frame [default: 2].
    #[arg(long)]
    face_skip_frames: Option<usize>,

    /// Minimum milliseconds between face detections [default: 100].
    #[arg(long)]
    face_interval_ms: Option<u64>,

    /// Downscale factor applied before face location (0.0-1.0] [default: 0.25].
    #[arg(long)]
    face_scale: Option<f64>,

    /// Maximum embedding distance for a match [default: 0.6].
    #[arg(long)]
    match_tolerance: Option<f64>,

    /// Minimum milliseconds between object detections [default: 100].
    #[arg(long)]
    object_interval_ms: Option<u64>,

    /// Square model input size for object detection [default: 320].
    #[arg(long)]
    object_input_size: Option<u32>,

    /// Object confidence threshold (0.0-1.0) [default: 0.5].
    #[arg(long)]
    object_confidence: Option<f64>,

    /// Object overlap (IoU) threshold (0.0-1.0) [default: 0.45].
    #[arg(long)]
    object_iou: Option<f64>,

    /// Object detection ONNX model [default: yolov8n.onnx from --models-dir or the cache].
    #[arg(long)]
    object_model: Option<PathBuf>,

    /// Class labels file, one per line [default: COCO].
    #[arg(long)]
    labels: Option<PathBuf>,

    /// JPEG quality of streamed frames (1-100) [default: 80].
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// JSON settings file; flags given on the command line override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remove snapshot files no identity references, and identities whose
    /// snapshot file is gone, before serving.
    #[arg(long)]
    prune_orphans: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = build_settings(&cli)?;
    let context = Arc::new(build_context(&cli, &settings)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let served = runtime.block_on(routes::serve(context.clone(), &cli.bind, cli.port));
    context.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(2));
    served?;
    Ok(())
}

fn build_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    apply_overrides(cli, &mut settings);
    settings.validate()?;
    Ok(settings)
}

fn apply_overrides(cli: &Cli, settings: &mut Settings) {
    fn set<T: Clone>(target: &mut T, value: &Option<T>) {
        if let Some(v) = value {
            *target = v.clone();
        }
    }
    set(&mut settings.camera.device, &cli.device);
    set(&mut settings.camera.format, &cli.device_format);
    set(&mut settings.camera.width, &cli.width);
    set(&mut settings.camera.height, &cli.height);
    set(&mut settings.camera.fps, &cli.fps);
    set(&mut settings.face.skip_frames, &cli.face_skip_frames);
    set(&mut settings.face.min_interval_ms, &cli.face_interval_ms);
    set(&mut settings.face.downscale, &cli.face_scale);
    set(&mut settings.face.match_tolerance, &cli.match_tolerance);
    set(&mut settings.object.min_interval_ms, &cli.object_interval_ms);
    set(&mut settings.object.input_size, &cli.object_input_size);
    set(&mut settings.object.confidence, &cli.object_confidence);
    set(&mut settings.object.overlap, &cli.object_iou);
    set(&mut settings.stream.jpeg_quality, &cli.jpeg_quality);
}

fn build_context(cli: &Cli, settings: &Settings) -> Result<AppContext, ConfigError> {
    let store = Arc::new(
        SqliteIdentityStore::open(&cli.database, settings.face.match_tolerance)
            .map_err(|e| ConfigError::Storage(format!("{}: {e}", cli.database.display())))?,
    );
    let snapshots = Arc::new(
        FsSnapshotStore::open(&cli.snapshot_dir)
            .map_err(|e| ConfigError::Storage(format!("{}: {e}", cli.snapshot_dir.display())))?,
    );
    if cli.prune_orphans {
        prune_orphans(&store, &snapshots)?;
    }
    log::info!("{} identities registered", store.count().unwrap_or(0));

    let models_dir = cli.models_dir.as_deref();
    let face_model = resolve_model(FACE_MODEL_NAME, Some(FACE_MODEL_URL), models_dir)?;
    let embedding_model = resolve_model(EMBEDDING_MODEL_NAME, Some(EMBEDDING_MODEL_URL), models_dir)?;
    let object_model = match &cli.object_model {
        Some(path) => path.clone(),
        None => resolve_model(OBJECT_MODEL_NAME, None, models_dir)?,
    };
    let labels = match &cli.labels {
        Some(path) => load_labels(path).map_err(|e| model_error(&path.display().to_string(), e))?,
        None => coco_labels(),
    };

    let face_locator = OnnxYoloFaceLocator::new(&face_model, DEFAULT_CONFIDENCE)
        .map_err(|e| model_error(FACE_MODEL_NAME, e))?;
    let face_encoder =
        OnnxSfaceEncoder::new(&embedding_model).map_err(|e| model_error(EMBEDDING_MODEL_NAME, e))?;
    let object_tracker = OnnxYoloObjectTracker::new(&object_model, labels)
        .map_err(|e| model_error(&object_model.display().to_string(), e))?;

    let collaborators = Collaborators {
        camera: open_camera(settings)?,
        face_locator: Box::new(face_locator),
        face_encoder: Box::new(face_encoder),
        object_tracker: Box::new(object_tracker),
        matcher: store,
        snapshots,
    };
    AppContext::new(collaborators, settings)
}

fn open_camera(settings: &Settings) -> Result<Box<dyn FrameSource>, ConfigError> {
    let device = Path::new(&settings.camera.device);
    let source: Box<dyn FrameSource> = if is_image(device) {
        Box::new(StillImageSource::open(device).map_err(|e| ConfigError::Device(e.to_string()))?)
    } else {
        Box::new(
            FfmpegCameraSource::open(&settings.camera)
                .map_err(|e| ConfigError::Device(e.to_string()))?,
        )
    };
    Ok(source)
}

fn prune_orphans(store: &SqliteIdentityStore, snapshots: &FsSnapshotStore) -> Result<(), ConfigError> {
    let dropped = store.remove_missing_snapshots().map_err(storage_error)?;
    let referenced: HashSet<String> = store
        .list()
        .map_err(storage_error)?
        .into_iter()
        .filter_map(|record| record.snapshot_ref)
        .collect();
    let removed = snapshots.prune_orphans(&referenced).map_err(storage_error)?;
    log::info!(
        "Pruned {removed} orphaned snapshots and {} stale identities",
        dropped.len()
    );
    Ok(())
}

fn resolve_model(name: &str, url: Option<&str>, models_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    log::info!("Resolving model: {name}");
    let progress: Option<model_resolver::ProgressFn> = url.map(|_| {
        let label = name.to_string();
        Box::new(move |downloaded: u64, total: u64| download_progress(&label, downloaded, total))
            as model_resolver::ProgressFn
    });
    model_resolver::resolve(name, url, models_dir, progress).map_err(|e| model_error(name, e))
}

fn storage_error(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Storage(e.to_string())
}

fn model_error(name: &str, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Model {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}
