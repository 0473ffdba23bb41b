//! Record one clip from the local camera and microphone.
//!
//! ```text
//! clip-capture --duration 10 --output take1.mp4
//! clip-capture --list-devices
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clip_capture_core::{CaptureConfiguration, CaptureRequest, CaptureState, DeviceCatalog, DeviceDirection, Recorder};
use clip_capture_devices::{native_backends, NativeCatalog};

#[derive(Debug, Parser)]
#[command(name = "clip-capture", about = "Record a fixed-length camera clip with overlays and audio")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, default_value = "clip-capture.toml")]
    config: PathBuf,

    /// Final container path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Clip length in seconds.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Record video only.
    #[arg(long)]
    no_audio: bool,

    /// Print cameras and microphones, then exit.
    #[arg(long)]
    list_devices: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let config = CaptureConfiguration::load_or_default(&args.config);
    let backends = native_backends(&config);
    let recorder = match Recorder::new(config, backends) {
        Ok(recorder) => recorder,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = CaptureRequest {
        output_path: args.output,
        duration_secs: args.duration,
        enable_audio: if args.no_audio { Some(false) } else { None },
    };

    let job = match recorder.start(request) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Started job {}", job);

    let state = match recorder.wait(&job) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match recorder.status(&job) {
        Ok(view) => {
            println!("{} {:?} {}", view.job_id, view.status, view.output_path.display());
            if let Some(error) = view.error {
                println!("  {}", error);
            }
        }
        Err(e) => eprintln!("error: {}", e),
    }

    match state {
        CaptureState::Completed(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn list_devices() -> ExitCode {
    let catalog = NativeCatalog;
    let mut failed = false;
    for direction in [DeviceDirection::Video, DeviceDirection::Audio] {
        println!("{} devices:", direction);
        match catalog.list(direction) {
            Ok(devices) if devices.is_empty() => println!("  (none)"),
            Ok(devices) => {
                for device in devices {
                    println!("  {}", device);
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
