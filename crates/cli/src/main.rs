mod settings;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::Sender;

use facesession_core::detection::domain::face_detector::FaceDetector;
use facesession_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facesession_core::detection::infrastructure::skip_frame_detector::SkipFrameDetector;
use facesession_core::enrollment::domain::face_capture::FaceCapture;
use facesession_core::pipeline::control::{ControlCommand, FrameObserver, FrameReport};
use facesession_core::pipeline::session_logger::StdoutSessionLogger;
use facesession_core::pipeline::track_sessions_use_case::TrackSessionsUseCase;
use facesession_core::recognition::domain::face_recognizer::{FaceRecognizer, Prediction};
use facesession_core::recognition::domain::recognition_voter::RecognitionVoter;
use facesession_core::recognition::infrastructure::arcface_embedder::ArcFaceEmbedder;
use facesession_core::recognition::infrastructure::embedding_gallery_recognizer::EmbeddingGalleryRecognizer;
use facesession_core::recognition::infrastructure::timeout_recognizer::TimeoutRecognizer;
use facesession_core::recording::domain::recorder::Recorder;
use facesession_core::shared::clock::{Clock, FrameClock, MonotonicClock};
use facesession_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facesession_core::shared::frame::Frame;
use facesession_core::shared::model_resolver;
use facesession_core::shared::session_config::SessionConfig;
use facesession_core::tracking::domain::identity_tracker::IdentityTracker;
use facesession_core::tracking::domain::session::SessionEvent;
use facesession_core::video::domain::video_reader::VideoReader;
use facesession_core::video::domain::video_writer::VideoWriter;
use facesession_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use facesession_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use facesession_core::video::infrastructure::image_file_writer::ImageFileWriter;
use facesession_core::video::infrastructure::threaded_video_writer::ThreadedVideoWriter;

use settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClockKind {
    /// Frame index divided by the source frame rate.
    Frame,
    /// Monotonic wall clock, for live sources.
    Wall,
}

/// Tracks face sessions in a video stream, labels them by majority vote and
/// records one clip per session.
#[derive(Parser)]
#[command(name = "facesession")]
struct Cli {
    /// Video file or device/stream URL.
    source: PathBuf,

    /// Settings file (defaults to the per-user settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Root directory for kept clips.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory of labelled face images used for recognition and capture.
    #[arg(long)]
    faces_dir: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Run detection every Nth frame (1 = every frame).
    #[arg(long)]
    skip_frames: Option<usize>,

    /// Start with recording disabled.
    #[arg(long)]
    no_recording: bool,

    /// Start with recognition disabled.
    #[arg(long)]
    no_recognition: bool,

    /// Abandon a recognition call after this many milliseconds (0 = no limit).
    #[arg(long)]
    recognition_timeout_ms: Option<u64>,

    /// Encode clips on a background thread.
    #[arg(long)]
    threaded_writer: bool,

    /// Timestamp source for session timing.
    #[arg(long, value_enum, default_value_t = ClockKind::Frame)]
    clock: ClockKind,

    /// Read single-letter commands from stdin (r f s a d t q).
    #[arg(long)]
    interactive: bool,
}

/// Stand-in when the embedding model cannot be loaded; recognition starts
/// disabled and every prediction fails.
struct UnavailableRecognizer(String);

impl FaceRecognizer for UnavailableRecognizer {
    fn predict(&mut self, _face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
        Err(self.0.clone().into())
    }
}

/// Logs session changes and, at debug level, the per-frame state.
#[derive(Default)]
struct LoggingObserver {
    last_label: Option<String>,
}

impl FrameObserver for LoggingObserver {
    fn on_frame(&mut self, report: &FrameReport) {
        for event in &report.events {
            match event {
                SessionEvent::Mount(t) => {
                    log::info!("[{:>8.2}s] session {} started", t.at.as_secs_f64(), t.session_id.short())
                }
                SessionEvent::Dismount(t) => {
                    log::info!("[{:>8.2}s] session {} ended", t.at.as_secs_f64(), t.session_id.short())
                }
            }
        }
        if report.label != self.last_label {
            if let Some(label) = &report.label {
                log::info!("[{:>8.2}s] identified as {label}", report.timestamp.as_secs_f64());
            }
            self.last_label = report.label.clone();
        }
        log::debug!(
            "frame {} box={:?} rec={}{} recog={} capture={}(person_{})",
            report.frame_index,
            report.bounding_box,
            report.recording_enabled,
            if report.is_recording { "*" } else { "" },
            report.recognition_enabled,
            report.capture_enabled,
            report.person_index
        );
    }
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
    let settings = merge_settings(&cli, Settings::load(cli.settings.as_deref()));
    validate(&settings)?;
    let config = &settings.session;

    let mut reader = FfmpegReader::new();
    let metadata = reader
        .open(&cli.source)
        .map_err(|e| format!("Cannot open source {}: {e}", cli.source.display()))?;
    let fps = metadata.fps_or(config.recording_fps);
    log::info!(
        "Source {}x{} at {fps:.1} fps ({})",
        metadata.width,
        metadata.height,
        if metadata.total_frames > 0 {
            format!("{} frames", metadata.total_frames)
        } else {
            "live".to_string()
        }
    );

    let mut clock: Box<dyn Clock> = match cli.clock {
        ClockKind::Frame => Box::new(FrameClock::new(fps)?),
        ClockKind::Wall => Box::new(MonotonicClock::new()),
    };

    let detector = build_detector(&settings)?;
    let (recognizer, recognizer_ready) = build_recognizer(&settings);
    let mut voter = RecognitionVoter::from_config(recognizer, config);
    if !recognizer_ready {
        voter.set_enabled(false);
    }

    let writer: Box<dyn VideoWriter> = if settings.threaded_writer {
        Box::new(ThreadedVideoWriter::new(Box::new(FfmpegWriter::new())))
    } else {
        Box::new(FfmpegWriter::new())
    };
    let recorder = Recorder::from_config(writer, config);
    let capture = FaceCapture::from_config(Box::new(ImageFileWriter::new()), config);

    let mut use_case = TrackSessionsUseCase::new(
        detector,
        IdentityTracker::from_config(config),
        voter,
        recorder,
        capture,
        Box::new(StdoutSessionLogger::default()),
        config.bbox_scale,
    );

    let (commands_tx, commands) = crossbeam_channel::unbounded();
    ctrlc::set_handler(interrupt_handler(commands_tx.clone()))?;
    if cli.interactive {
        eprintln!("Commands: r=recording f=recognition s=capture a/d=person t=reload q=quit");
        spawn_command_reader(commands_tx);
    }

    let mut observer = LoggingObserver::default();
    let processed = use_case.run(
        &mut reader,
        metadata.total_frames,
        clock.as_mut(),
        Some(&commands),
        &mut observer,
    );
    reader.close();

    log::info!(
        "Processed {processed} frames, clips under {}",
        config.output_dir.display()
    );
    Ok(())
}

fn merge_settings(cli: &Cli, mut settings: Settings) -> Settings {
    if let Some(dir) = &cli.output_dir {
        settings.session.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.faces_dir {
        settings.session.faces_dir = dir.clone();
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    if let Some(n) = cli.skip_frames {
        settings.skip_frames = n;
    }
    if let Some(ms) = cli.recognition_timeout_ms {
        settings.recognition_timeout_ms = ms;
    }
    if cli.no_recording {
        settings.session.recording_enabled = false;
    }
    if cli.no_recognition {
        settings.session.recognition_enabled = false;
    }
    if cli.threaded_writer {
        settings.threaded_writer = true;
    }
    settings
}

fn validate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    settings.session.validate()?;
    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    if settings.skip_frames == 0 {
        return Err("Skip frames must be at least 1".into());
    }
    Ok(())
}

fn build_detector(settings: &Settings) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("face detection", d, t))),
    )?;
    eprintln!();

    let base: Box<dyn FaceDetector> =
        Box::new(OnnxYoloDetector::new(&model_path, settings.confidence)?);
    if settings.skip_frames > 1 {
        Ok(Box::new(SkipFrameDetector::new(base, settings.skip_frames)?))
    } else {
        Ok(base)
    }
}

/// Builds the gallery recognizer. Returns `false` alongside a stand-in
/// when the embedding model is unavailable.
fn build_recognizer(settings: &Settings) -> (Box<dyn FaceRecognizer>, bool) {
    let config: &SessionConfig = &settings.session;
    let embedder = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("face embedding", d, t))),
    )
    .map_err(|e| e.to_string())
    .and_then(|path| ArcFaceEmbedder::new(&path).map_err(|e| e.to_string()));
    eprintln!();

    let embedder = match embedder {
        Ok(embedder) => embedder,
        Err(e) => {
            log::warn!("Recognition unavailable: {e}");
            return (Box::new(UnavailableRecognizer(e)), false);
        }
    };

    let recognizer: Box<dyn FaceRecognizer> = Box::new(EmbeddingGalleryRecognizer::new(
        Box::new(embedder),
        &config.faces_dir,
    ));
    if settings.recognition_timeout_ms > 0 {
        let timeout = Duration::from_millis(settings.recognition_timeout_ms);
        (Box::new(TimeoutRecognizer::new(recognizer, timeout)), true)
    } else {
        (recognizer, true)
    }
}

/// Turns Ctrl-C into a `Quit` so the loop stops between frames and the active
/// clip is finalized. A second Ctrl-C exits at once.
fn interrupt_handler(commands: Sender<ControlCommand>) -> impl FnMut() + Send + 'static {
    let mut interrupted = false;
    move || {
        if interrupted {
            process::exit(130);
        }
        interrupted = true;
        eprintln!();
        log::info!("Interrupted, finishing the current session (Ctrl-C again to abort)");
        if commands.send(ControlCommand::Quit).is_err() {
            process::exit(130);
        }
    }
}

/// Feeds stdin commands to the session loop. The thread ends with stdin or
/// once the loop drops the receiver.
fn spawn_command_reader(tx: Sender<ControlCommand>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            for key in line.trim().chars() {
                match ControlCommand::from_key(key) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                    None => log::warn!("Unknown command '{key}'"),
                }
            }
        }
    });
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesession_core::pipeline::session_logger::NullSessionLogger;
    use facesession_core::shared::face_box::FaceBox;
    use facesession_core::shared::video_metadata::VideoMetadata;
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["facesession", "input.mp4"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = cli(&[
            "--output-dir",
            "clips",
            "--faces-dir",
            "people",
            "--confidence",
            "0.6",
            "--skip-frames",
            "2",
            "--no-recording",
            "--no-recognition",
            "--recognition-timeout-ms",
            "0",
            "--threaded-writer",
        ]);
        let settings = merge_settings(&cli, Settings::default());
        assert_eq!(settings.session.output_dir, Path::new("clips"));
        assert_eq!(settings.session.faces_dir, Path::new("people"));
        assert_eq!(settings.confidence, 0.6);
        assert_eq!(settings.skip_frames, 2);
        assert!(!settings.session.recording_enabled);
        assert!(!settings.session.recognition_enabled);
        assert_eq!(settings.recognition_timeout_ms, 0);
        assert!(settings.threaded_writer);
    }

    #[test]
    fn test_absent_flags_keep_settings() {
        let mut base = Settings::default();
        base.skip_frames = 4;
        base.session.output_dir = PathBuf::from("saved");
        let settings = merge_settings(&cli(&[]), base.clone());
        assert_eq!(settings, base);
    }

    #[test]
    fn test_clock_defaults_to_frame() {
        assert_eq!(cli(&[]).clock, ClockKind::Frame);
        assert_eq!(cli(&["--clock", "wall"]).clock, ClockKind::Wall);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.confidence = 1.5;
        assert!(validate(&settings).is_err());

        let mut settings = Settings::default();
        settings.skip_frames = 0;
        assert!(validate(&settings).is_err());

        let mut settings = Settings::default();
        settings.session.grace_window_secs = 0.0;
        assert!(validate(&settings).is_err());

        assert!(validate(&Settings::default()).is_ok());
    }

    // --- Interrupt wiring ---

    const W: u32 = 160;
    const H: u32 = 120;

    struct FixedFace;

    impl FaceDetector for FixedFace {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>> {
            Ok(Some(FaceBox::new(60, 40, 40, 40)))
        }
    }

    struct AlwaysAlice;

    impl FaceRecognizer for AlwaysAlice {
        fn predict(&mut self, _face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
            Ok(Prediction {
                label: "alice".to_string(),
                raw_confidence: 0.9,
                normalized_confidence: 90.0,
            })
        }
    }

    /// Writes one byte per frame so clip files exist on disk.
    #[derive(Default)]
    struct ByteSink {
        file: Option<fs::File>,
    }

    impl VideoWriter for ByteSink {
        fn open(&mut self, path: &Path, _: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
            self.file = Some(fs::File::create(path)?);
            Ok(())
        }

        fn write(&mut self, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.file.as_mut().ok_or("not opened")?.write_all(b"x")?;
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.file = None;
            Ok(())
        }
    }

    /// An endless-looking live source whose user hits Ctrl-C at `interrupt_at`.
    struct LiveSource {
        frames: usize,
        interrupt_at: usize,
        on_interrupt: Box<dyn FnMut() + Send>,
    }

    impl VideoReader for LiveSource {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            Ok(VideoMetadata::for_sink(W, H, 30.0))
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            let (total, at) = (self.frames, self.interrupt_at);
            let interrupt = &mut self.on_interrupt;
            Box::new((0..total).map(move |i| -> Result<Frame, Box<dyn std::error::Error>> {
                if i == at {
                    interrupt();
                }
                Ok(Frame::new(vec![0; (W * H * 3) as usize], W, H, 3, i))
            }))
        }

        fn close(&mut self) {}
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_interrupt_finalizes_the_active_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output_dir: tmp.path().join("clips"),
            faces_dir: tmp.path().join("faces"),
            ..SessionConfig::default()
        };
        let mut use_case = TrackSessionsUseCase::new(
            Box::new(FixedFace),
            IdentityTracker::from_config(&config),
            RecognitionVoter::from_config(Box::new(AlwaysAlice), &config),
            Recorder::from_config(Box::new(ByteSink::default()), &config),
            FaceCapture::from_config(Box::new(ImageFileWriter::new()), &config),
            Box::new(NullSessionLogger),
            config.bbox_scale,
        );

        let (tx, commands) = crossbeam_channel::unbounded();
        let mut source = LiveSource {
            frames: 10_000,
            interrupt_at: 180,
            on_interrupt: Box::new(interrupt_handler(tx)),
        };
        let mut clock = FrameClock::new(30.0).unwrap();
        let processed = use_case.run(
            &mut source,
            0,
            &mut clock,
            Some(&commands),
            &mut LoggingObserver::default(),
        );

        assert_eq!(processed, 180);
        assert!(use_case.quit_requested());
        assert!(!use_case.recorder().is_recording());
        assert!(files_in(&config.output_dir.join("temp")).is_empty());
        let kept = files_in(&config.output_dir.join("alice"));
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::metadata(&kept[0]).unwrap().len(), 180);
    }

    #[test]
    fn test_interrupt_sends_quit() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut handler = interrupt_handler(tx);
        handler();
        assert_eq!(rx.try_recv().unwrap(), ControlCommand::Quit);
    }
}
