use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};

use vna_sweep::calibration::{Calibration, Standard};
use vna_sweep::config::{Config, DeviceConfig};
use vna_sweep::domain::types::SweepData;
use vna_sweep::dsp::{cable_length, VF_SOLID_PE};
use vna_sweep::instrument::{Instrument, NanoVna};
use vna_sweep::rf_math::{format_frequency, format_si, parse_frequency};
use vna_sweep::sweep::{SweepEvent, SweepSettings, SweepWorker};
use vna_sweep::touchstone::Touchstone;

#[derive(Parser, Debug)]
#[command(name = "vna-sweep", version)]
#[command(about = "Swept-frequency VNA acquisition with SOL(T) error correction")]
struct Args {
    /// JSON configuration file. Defaults are used when it does not exist.
    #[arg(short, long, default_value = "vna.json")]
    config: PathBuf,

    /// log4rs configuration file
    #[arg(long, default_value = "log.yml")]
    log_config: PathBuf,

    /// Serial port path (e.g., /dev/ttyACM0), overrides the config file
    #[arg(long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep, correct and export the measurement
    Sweep {
        /// Touchstone file to write; `.s2p` exports S21 as well
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Calibration file to apply, overrides the config file
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Start frequency, e.g. 1M or 1500000
        #[arg(long)]
        start: Option<String>,

        /// Stop frequency
        #[arg(long)]
        end: Option<String>,

        /// Keep sweeping until Ctrl-C
        #[arg(long)]
        continuous: bool,

        /// Velocity factor used for the TDR cable length
        #[arg(long, default_value_t = VF_SOLID_PE)]
        velocity_factor: f64,
    },

    /// Measure calibration standards and save the result
    Calibrate {
        /// Calibration file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Also measure isolation and through
        #[arg(long)]
        two_port: bool,
    },

    /// Print the instrument's firmware information
    Info,
}

fn init_logging(path: &Path) -> Result<()> {
    if path.exists() {
        log4rs::init_file(path, Default::default())
            .with_context(|| format!("Failed to initialise logging from {}", path.display()))?;
    } else {
        let stdout = ConsoleAppender::builder().build();
        let config = LogConfig::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;
        log4rs::init_config(config)?;
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Ok(Config::load(path)?)
}

fn connect(device: &DeviceConfig) -> Result<NanoVna> {
    let mut vna = NanoVna::connect(&device.port, device.baud_rate)
        .with_context(|| format!("Failed to connect to {}", device.port))?;
    vna.set_validate_input(device.validate_input);
    Ok(vna)
}

fn print_summary(data: &SweepData, velocity_factor: f64) {
    let index = data.data11.len() / 2;
    let Some(s11) = data.data11.get(index) else {
        return;
    };
    let z = s11.impedance();
    let sign = if z.im < 0.0 { "-" } else { "+" };

    println!("{}", format_frequency(s11.freq as f64));
    println!(
        "  Impedance:   {} {} j{}",
        format_si(z.re, "\u{03a9}", 5),
        sign,
        format_si(z.im.abs(), "\u{03a9}", 5)
    );
    println!("  VSWR:        {:.3}", s11.vswr());
    println!("  Return loss: {:.3} dB", -s11.gain());
    println!("  S11 phase:   {:.2}\u{b0}", s11.phase());
    println!("  Q:           {:.3}", s11.quality_factor());
    if z.im < 0.0 {
        println!("  Capacitance: {}", format_si(s11.capacitive_equivalent(), "F", 5));
    } else {
        println!("  Inductance:  {}", format_si(s11.inductive_equivalent(), "H", 5));
    }
    if let Some(s21) = data.data21.get(index) {
        println!("  S21 gain:    {:.3} dB", s21.gain());
        println!("  S21 phase:   {:.2}\u{b0}", s21.phase());
    }
    if let Some(length) = cable_length(&data.data11, velocity_factor) {
        println!("  TDR length:  {:.3} m (VF {})", length, velocity_factor);
    }
}

fn export(data: &SweepData, path: &Path) -> Result<()> {
    let two_port = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("s2p"));
    let mut touchstone = if two_port {
        Touchstone::two_port(&data.data11, &data.data21)
    } else {
        Touchstone::one_port(&data.data11)
    };
    touchstone
        .comments
        .push(format!("Exported by vna-sweep at {}", Utc::now().to_rfc3339()));
    touchstone
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} points to {}", data.data11.len(), path.display());
    Ok(())
}

async fn run_sweep(
    config: Config,
    settings: SweepSettings,
    calibration_file: Option<PathBuf>,
    output: Option<PathBuf>,
    velocity_factor: f64,
) -> Result<()> {
    let mut calibration = Calibration::new(config.calibration.standards);
    if let Some(path) = calibration_file.or(config.calibration.file) {
        calibration
            .load(&path)
            .with_context(|| format!("Failed to load calibration {}", path.display()))?;
        calibration
            .calculate()
            .with_context(|| format!("Unusable calibration {}", path.display()))?;
    }

    let instrument: Arc<dyn Instrument> = Arc::new(connect(&config.device)?);
    let continuous = settings.continuous;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = Arc::new(SweepWorker::new(
        instrument.clone(),
        Arc::new(RwLock::new(calibration)),
        settings,
        tx,
    ));

    let stop = worker.stop_handle();
    let handle = worker.spawn();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SweepEvent::Progress(percentage)) => debug!("Sweep {:.0}% done", percentage),
                Some(SweepEvent::Updated(data)) => {
                    if continuous {
                        print_summary(&data, velocity_factor);
                    }
                }
                Some(SweepEvent::Error(e)) => {
                    error!("{}", e);
                    break;
                }
                Some(SweepEvent::Finished) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping sweep");
                stop.stop();
            }
        }
    }
    handle.await.context("Sweep task failed")??;

    let data = worker.data();
    instrument.disconnect();
    if data.is_empty() {
        bail!("The sweep returned no valid data");
    }
    if !continuous {
        print_summary(&data, velocity_factor);
    }
    if let Some(path) = output {
        export(&data, &path)?;
    }
    Ok(())
}

/// Waits for Enter. Returns false when the user types `q` or closes stdin.
fn prompt(message: &str) -> Result<bool> {
    print!("{message} [Enter to measure, q to quit] ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(!line.trim().eq_ignore_ascii_case("q"))
}

fn run_calibration(config: Config, output: PathBuf, two_port: bool) -> Result<()> {
    let instrument: Arc<dyn Instrument> = Arc::new(connect(&config.device)?);
    let mut settings = config.sweep.clone();
    settings.continuous = false;

    // Standards are measured uncorrected.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = SweepWorker::new(
        instrument.clone(),
        Arc::new(RwLock::new(Calibration::default())),
        settings,
        tx,
    );

    let mut steps = vec![Standard::Open, Standard::Short, Standard::Load];
    if two_port {
        steps.extend([Standard::Isolation, Standard::Through]);
    }

    let expected_points = worker.settings().plan()?.total_points();
    let mut calibration = Calibration::new(config.calibration.standards);
    for standard in steps {
        let message = match standard {
            Standard::Isolation => "Terminate both ports with loads".to_string(),
            Standard::Through => "Connect port 1 to port 2".to_string(),
            s => format!("Connect the {s} standard to port 1"),
        };
        if !prompt(&message)? {
            warn!("Calibration aborted");
            instrument.disconnect();
            return Ok(());
        }
        worker
            .run()
            .with_context(|| format!("Failed to measure the {standard} standard"))?;
        while rx.try_recv().is_ok() {}

        let data = worker.data();
        let measured = match standard {
            Standard::Isolation | Standard::Through => data.raw21,
            _ => data.raw11,
        };
        if measured.len() != expected_points {
            bail!(
                "Measuring the {} standard returned {} of {} points",
                standard,
                measured.len(),
                expected_points
            );
        }
        info!("Measured {} standard ({} points)", standard, measured.len());
        calibration.set_standard(standard, measured);
    }
    instrument.disconnect();

    calibration
        .calculate()
        .context("Could not calculate the calibration")?;
    calibration
        .save(&output)
        .with_context(|| format!("Failed to save calibration to {}", output.display()))?;
    println!("Calibration saved to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_config)?;
    info!("vna-sweep {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.device.port = port;
    }

    match args.command {
        Command::Sweep {
            output,
            calibration,
            start,
            end,
            continuous,
            velocity_factor,
        } => {
            let mut settings = config.sweep.clone();
            if let Some(start) = start {
                settings.start = parse_frequency(&start)
                    .with_context(|| format!("Invalid start frequency '{start}'"))?;
            }
            if let Some(end) = end {
                settings.end = parse_frequency(&end)
                    .with_context(|| format!("Invalid stop frequency '{end}'"))?;
            }
            settings.continuous |= continuous;
            run_sweep(config, settings, calibration, output, velocity_factor).await
        }
        Command::Calibrate { output, two_port } => {
            tokio::task::spawn_blocking(move || run_calibration(config, output, two_port))
                .await
                .context("Calibration task failed")?
        }
        Command::Info => {
            let vna = connect(&config.device)?;
            let version = vna.version();
            println!(
                "Firmware version: {}.{}.{}",
                version.0, version.1, version.2
            );
            println!("{}", vna.read_firmware()?);
            vna.disconnect();
            Ok(())
        }
    }
}
