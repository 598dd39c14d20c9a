//! overlayd - live object-detection overlay daemon
//!
//! This daemon:
//! 1. Loads the detector once at startup (a load failure is fatal)
//! 2. Pulls frames from the configured source on a worker thread
//! 3. Decodes, detects, maps and renders each frame on that worker
//! 4. Shows the newest overlay on the main thread (PNG files or headless)

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use detect_overlay::config::{DetectorSettings, OverlaydConfig};
use detect_overlay::display::{run_display_loop, CountingSink, DisplaySink, PngSink};
use detect_overlay::ingest::DeliveryReport;
use detect_overlay::ui::Ui;
use detect_overlay::{
    display_queue, open_source, run_source, BackendRegistry, DetectionCapability, OverlayMode,
    OverlayRenderer, OverlayStyle, Pipeline, RenderedOverlay, SharedBackend, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (defaults to $OVERLAYD_CONFIG).
    #[arg(long, env = "OVERLAYD_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: stub://<name> or a directory of frames.
    #[arg(long)]
    source: Option<String>,
    /// Detector backend: stub or tract.
    #[arg(long)]
    backend: Option<String>,
    /// Model file for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label file, one label per line.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// TrueType/OpenType font for labels. Without one only boxes are drawn.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Directory overlays are written to.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Start a frame directory over once it runs out.
    #[arg(long)]
    repeat: bool,
    /// Draw on a transparent layer instead of over the frame.
    #[arg(long)]
    layer: bool,
    /// Count overlays instead of writing them.
    #[arg(long)]
    headless: bool,
    /// auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stderr().is_terminal());
    let cfg = load_config(&args)?;

    log::info!(
        "overlayd {}: source={}, backend={}, max_results={}, score_threshold={}",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.detector.backend,
        cfg.detector.options.max_results,
        cfg.detector.options.score_threshold
    );

    let detector = {
        let _stage = ui.stage("load detector");
        build_detector(&cfg.detector)?
    };

    let renderer = {
        let _stage = ui.stage("load overlay font");
        match &cfg.overlay.font_path {
            Some(path) => OverlayRenderer::from_font_file(OverlayStyle::default(), path)?,
            None => OverlayRenderer::new(OverlayStyle::default()),
        }
    };
    if !renderer.has_font() {
        log::warn!("no overlay font configured; labels will not be drawn");
    }

    let (display, mut receiver) = display_queue();
    let pipeline = Arc::new(
        Pipeline::new(detector, cfg.detector.options, renderer, display)
            .with_mode(cfg.overlay.mode),
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("install Ctrl-C handler")?;
    }

    let worker = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop);
        let source_cfg = cfg.source.clone();
        let max_frames = args.frames;
        std::thread::Builder::new()
            .name("frame-worker".to_string())
            .spawn(move || -> Result<DeliveryReport> {
                let _shutdown = pipeline.shutdown_on_drop();
                let mut source = open_source(
                    &source_cfg.url,
                    source_cfg.width,
                    source_cfg.height,
                    source_cfg.repeat,
                )?;
                source.connect()?;
                run_source(
                    source.as_mut(),
                    &pipeline,
                    &stop,
                    max_frames,
                    source_cfg.target_fps,
                )
            })
            .context("spawn frame worker")?
    };

    let counter = ui.frame_counter();
    let mut sink: Box<dyn DisplaySink> = if args.headless {
        Box::new(CountingSink::default())
    } else {
        Box::new(PngSink::new(&cfg.output_dir)?)
    };
    let mut progress = ProgressSink {
        inner: sink.as_mut(),
        counter: &counter,
    };
    let shown = run_display_loop(&mut receiver, &mut progress);
    counter.finish();

    let report = worker
        .join()
        .map_err(|_| anyhow!("frame worker panicked"))??;
    let stats = pipeline.stats();

    println!("overlayd summary:");
    println!("  frames delivered: {}", report.delivered);
    println!("  frames rendered: {}", stats.frames_rendered);
    println!("  frames skipped: {}", stats.frames_skipped);
    println!("  frames dropped: {}", stats.frames_dropped);
    println!("  objects drawn: {}", stats.results_drawn);
    println!("  overlays shown: {}", shown);
    println!("  overlays coalesced: {}", receiver.coalesced());
    if !args.headless {
        println!("  output dir: {}", cfg.output_dir.display());
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<OverlaydConfig> {
    let mut cfg = OverlaydConfig::load_from(args.config.as_deref())?;
    if let Some(source) = &args.source {
        cfg.source.url = source.clone();
    }
    if let Some(backend) = &args.backend {
        cfg.detector.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        cfg.detector.labels_path = Some(labels.clone());
    }
    if let Some(font) = &args.font {
        cfg.overlay.font_path = Some(font.clone());
    }
    if let Some(out) = &args.out {
        cfg.output_dir = out.clone();
    }
    if args.layer {
        cfg.overlay.mode = OverlayMode::Layer;
    }
    if args.repeat {
        cfg.source.repeat = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_detector(settings: &DetectorSettings) -> Result<SharedBackend> {
    let mut registry = BackendRegistry::new();
    match settings.backend.as_str() {
        "stub" => registry.register(StubBackend::centered("object", 0.9)),
        "tract" => register_tract(&mut registry, settings)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }
    registry.set_default(&settings.backend)?;
    let backend = registry.backend_for_capability(DetectionCapability::ObjectDetection)?;
    backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?
        .warm_up()
        .context("detector warm-up failed")?;
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, settings: &DetectorSettings) -> Result<()> {
    let mut backend = detect_overlay::TractBackend::new(
        &settings.model_path,
        settings.input_width,
        settings.input_height,
    )?;
    if let Some(path) = &settings.labels_path {
        backend = backend.with_labels(detect_overlay::detect::ssd::read_labels(path)?);
    }
    registry.register(backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, settings: &DetectorSettings) -> Result<()> {
    Err(anyhow!(
        "detector backend 'tract' (model {}) requires the backend-tract feature",
        settings.model_path.display()
    ))
}

/// Forwards to the real sink and ticks the terminal counter.
struct ProgressSink<'a> {
    inner: &'a mut dyn DisplaySink,
    counter: &'a detect_overlay::ui::FrameCounter,
}

impl DisplaySink for ProgressSink<'_> {
    fn show(&mut self, overlay: &RenderedOverlay) -> Result<()> {
        self.inner.show(overlay)?;
        self.counter.shown(overlay.sequence, overlay.results.len());
        Ok(())
    }
}
