use anyhow::Result;
use clap::Parser;
use depthcam::{
    BroadcastTransport, DepthcamConfig, SimulatedCamera, SimulatedCameraSpec, SimulatedProvider,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "depthcam")]
#[command(about = "Session and streaming service for a time-of-flight depth camera")]
#[command(version)]
#[command(long_about = "Opens a time-of-flight depth camera, selects a use case and publishes \
point clouds, images, exposure times and calibration for every stream it delivers. \
A watchdog reconnects the camera when frames stop arriving.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "depthcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening the camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Connect, print the diagnostic snapshot as JSON and exit
    #[arg(long, help = "Connect to the camera, print a diagnostic dump and exit")]
    dump: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting depthcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match DepthcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // No vendor driver is linked into this binary; drive a simulated camera
    let camera = SimulatedCamera::new(SimulatedCameraSpec {
        width: config.simulation.resolution.0,
        height: config.simulation.resolution.1,
        fps: Some(config.simulation.fps),
        ..Default::default()
    });
    let provider = Arc::new(SimulatedProvider::with_camera(camera));
    let transport = Arc::new(BroadcastTransport::default());

    let session = depthcam::initialize(&config, provider, transport).map_err(|e| {
        error!("Failed to initialize camera session: {}", e);
        e
    })?;

    if args.dump {
        println!("{}", session.dump().to_json()?);
        depthcam::shutdown(session);
        return Ok(());
    }

    session.start().map_err(|e| {
        error!("Failed to start streaming: {}", e);
        e
    })?;

    let exit_code = depthcam::run_until_signal(session).await;

    info!("depthcam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("depthcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Depthcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Every key can be overridden with DEPTHCAM_<SECTION>__<KEY>, e.g.");
    println!("# DEPTHCAM_CAMERA__SERIAL_NUMBER=0005-4804-0050-1622");
    println!();

    let default_config = r#"[camera]
# Access code unlocking higher access levels (empty for the default level)
access_code = ""
# Serial number of the camera to open ("-" for the first camera found)
serial_number = "-"
# Use case selected after connecting (empty keeps the camera's current one)
initial_use_case = ""
# Frame images and calibration are published in
optical_frame = "camera_optical_link"
# Frame point clouds and XYZ images are published in
sensor_frame = "camera_link"

[watchdog]
# Seconds between liveness checks
poll_bus_secs = 1.0
# Seconds without frames before the camera is reconnected
timeout_secs = 1.0

[simulation]
# Frame rate of the simulated camera
fps = 5
# Sensor resolution (width, height)
resolution = [224, 171]
"#;

    println!("{}", default_config);
}
