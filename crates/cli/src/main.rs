use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};

use facemood_core::config::ServiceConfig;
use facemood_core::detection::domain::face_encoder::FaceEncoder;
use facemood_core::detection::domain::face_locator::FaceLocator;
use facemood_core::detection::infrastructure::detection_backend::FACE_BACKEND;
use facemood_core::detection::infrastructure::encoding_face_locator::EncodingFaceLocator;
use facemood_core::detection::infrastructure::model_resolver;
use facemood_core::detection::infrastructure::onnx_arcface_encoder::OnnxArcfaceEncoder;
use facemood_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facemood_core::expression::domain::happiness_estimator::HappinessEstimator;
use facemood_core::expression::infrastructure::haar_cascade::HaarCascade;
use facemood_core::http::handler::FaceDetectionHandler;
use facemood_core::http::message::{HttpRequest, ALLOW_ORIGIN};
use facemood_core::pipeline::detect_expressions_use_case::DetectExpressionsUseCase;
use facemood_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, IMAGE_EXTENSIONS, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};

/// 1x1 PNG used by the smoke checks.
const SMOKE_TEST_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

/// Face detection with smile-based expression scores.
#[derive(Parser)]
#[command(name = "facemood")]
struct Cli {
    /// Config file (default: the user config directory's FaceMood/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Smile cascade XML file.
    #[arg(long, global = true)]
    cascade: Option<PathBuf>,

    /// Skip computing face encodings.
    #[arg(long, global = true)]
    no_encodings: bool,

    /// Directory with pre-packaged ONNX models.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an image file through the handler as a POST and print the JSON body.
    Detect {
        /// Input image file.
        image: PathBuf,
    },
    /// Feed a raw request to the handler and print the full response.
    Request {
        /// HTTP method, matched case-sensitively.
        #[arg(long, default_value = "POST")]
        method: String,

        /// File holding the request body; reads stdin when omitted.
        #[arg(long)]
        body: Option<PathBuf>,
    },
    /// Run the built-in smoke checks.
    SelfTest,
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
    let config = load_config(&cli)?;
    validate(&cli)?;

    init_backend(&config);
    let handler = FaceDetectionHandler::new(DetectExpressionsUseCase::new(
        &FACE_BACKEND,
        HappinessEstimator::new(Box::new(config.smile_source())),
    ));

    match cli.command {
        Command::Detect { image } => run_detect(&handler, &image),
        Command::Request { method, body } => run_request(&handler, method, body.as_deref()),
        Command::SelfTest => run_self_test(&handler, &config),
    }
}

fn load_config(cli: &Cli) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::load(),
    };
    if let Some(confidence) = cli.confidence {
        config.confidence = confidence;
    }
    if let Some(cascade) = &cli.cascade {
        config.smile_cascade = Some(cascade.clone());
    }
    if cli.no_encodings {
        config.compute_encodings = false;
    }
    if let Some(dir) = &cli.models_dir {
        config.models_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(cascade) = &cli.cascade {
        if !cascade.is_file() {
            return Err(format!("Cascade file not found: {}", cascade.display()).into());
        }
    }
    match &cli.command {
        Command::Detect { image } => {
            if !image.exists() {
                return Err(format!("Input file not found: {}", image.display()).into());
            }
            if !is_image(image) {
                return Err(format!(
                    "Unsupported image type: {} (expected one of {})",
                    image.display(),
                    IMAGE_EXTENSIONS.join(", ")
                )
                .into());
            }
        }
        Command::Request {
            body: Some(body), ..
        } if !body.exists() => {
            return Err(format!("Body file not found: {}", body.display()).into());
        }
        _ => {}
    }
    Ok(())
}

/// Builds the locator once; a failure leaves the backend marked unavailable
/// so every request reports it.
fn init_backend(config: &ServiceConfig) {
    match build_locator(config) {
        Ok(locator) => {
            FACE_BACKEND.install(locator);
            log::info!("Face detection backend ready");
        }
        Err(e) => {
            log::error!("Face detection backend unavailable: {e}");
            FACE_BACKEND.mark_unavailable(e.to_string());
        }
    }
}

fn build_locator(
    config: &ServiceConfig,
) -> Result<Box<dyn FaceLocator>, Box<dyn std::error::Error>> {
    let bundled = config.models_dir.as_deref();

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        bundled,
        Some(Box::new(|d, t| download_progress("face detection", d, t))),
    )?;
    let detector = Box::new(OnnxYoloDetector::new(&model_path, config.confidence)?);

    let encoder: Option<Box<dyn FaceEncoder>> = if config.compute_encodings {
        log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
        let embedding_path = model_resolver::resolve(
            EMBEDDING_MODEL_NAME,
            EMBEDDING_MODEL_URL,
            bundled,
            Some(Box::new(|d, t| download_progress("face encoding", d, t))),
        )?;
        Some(Box::new(OnnxArcfaceEncoder::new(&embedding_path)?))
    } else {
        None
    };

    Ok(Box::new(EncodingFaceLocator::new(detector, encoder)))
}

fn run_detect(handler: &FaceDetectionHandler<'_>, image: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(image)?;
    let body = serde_json::json!({ "image": BASE64.encode(bytes) }).to_string();
    let response = handler.handle(&HttpRequest::post(body));

    let json = response.json_body()?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    if response.status_code != 200 {
        return Err(format!("Request failed with status {}", response.status_code).into());
    }
    Ok(())
}

fn run_request(
    handler: &FaceDetectionHandler<'_>,
    method: String,
    body_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = match body_file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let response = handler.handle(&HttpRequest::new(method, Some(body)));
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_self_test(
    handler: &FaceDetectionHandler<'_>,
    config: &ServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut failures = 0;
    let mut check = |name: &str, passed: bool, detail: String| {
        let mark = if passed { "PASS" } else { "FAIL" };
        println!("[{mark}] {name}: {detail}");
        if !passed {
            failures += 1;
        }
    };

    let ready = FACE_BACKEND.is_ready();
    let state = if ready { "ready" } else { "unavailable" };
    check("detection backend", ready, state.to_string());

    match config.smile_source().locate() {
        Some(path) => match HaarCascade::from_file(&path) {
            Ok(cascade) => check(
                "smile cascade",
                true,
                format!("{} ({} stages)", path.display(), cascade.stage_count()),
            ),
            Err(e) => check("smile cascade", false, format!("{}: {e}", path.display())),
        },
        None => check(
            "smile cascade",
            true,
            "not found, brightness heuristic only".to_string(),
        ),
    }

    let post = handler.handle(&HttpRequest::post(
        serde_json::json!({ "image": SMOKE_TEST_PNG }).to_string(),
    ));
    let body = post.json_body()?;
    check(
        "detection",
        body["success"] == serde_json::json!(true),
        match body["error"].as_str() {
            Some(error) => error.to_string(),
            None => format!("{} face(s)", body["face_count"]),
        },
    );
    check(
        "POST handler",
        post.status_code == 200,
        format!("status {}", post.status_code),
    );

    let preflight = handler.handle(&HttpRequest::options());
    check(
        "CORS preflight",
        preflight.status_code == 200 && preflight.header(ALLOW_ORIGIN).is_some(),
        format!("status {}", preflight.status_code),
    );

    if failures > 0 {
        return Err(format!("{failures} self-test check(s) failed").into());
    }
    println!("All checks passed");
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
