use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, error, info, warn};
use num::complex::Complex64;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::averaging::average_repeats;
use super::{FrequencySweepPlan, SweepError, SweepSettings};
use crate::calibration::{correct_delay, Calibration};
use crate::domain::types::{Datapoint, SweepData};
use crate::instrument::{DataChannel, Instrument};

/// Largest plausible magnitude of either component of a raw sample.
pub const MAX_RAW_VALUE: f64 = 9.5;

/// Failed reads of one channel after which a warning is logged.
const READ_WARN_ATTEMPTS: usize = 5;
/// Failed reads of one channel after which the sweep is abandoned.
const READ_MAX_ATTEMPTS: usize = 10;

/// Notifications from a running sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    /// Percentage of the sweep done.
    Progress(f64),
    /// New corrected data is available.
    Updated(SweepData),
    Finished,
    Error(SweepError),
}

/// Cooperative cancellation of a sweep. Observed between segments and
/// between averaging reads, never during a device read.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One segment as read from the instrument, before correction.
#[derive(Debug, Default)]
struct RawSegment {
    frequencies: Vec<u64>,
    values11: Vec<Complex64>,
    values21: Vec<Complex64>,
}

impl RawSegment {
    fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct SegmentData {
    data11: Vec<Datapoint>,
    data21: Vec<Datapoint>,
    raw11: Vec<Datapoint>,
    raw21: Vec<Datapoint>,
}

/// Full-span results, kept per segment so a repeated sweep of the same plan
/// updates in place.
#[derive(Debug, Default)]
struct Buffers {
    plan: Option<FrequencySweepPlan>,
    segments: Vec<SegmentData>,
    percentage: f64,
}

impl Buffers {
    fn snapshot(&self) -> SweepData {
        let mut data = SweepData::default();
        for segment in &self.segments {
            data.data11.extend_from_slice(&segment.data11);
            data.data21.extend_from_slice(&segment.data21);
            data.raw11.extend_from_slice(&segment.raw11);
            data.raw21.extend_from_slice(&segment.raw21);
        }
        data
    }
}

/// Parses `"<re> <im>"` lines, rejecting the whole read on a malformed or
/// (when `validate` is set) implausible value.
fn parse_values(lines: &[String], validate: bool) -> Result<Vec<Complex64>, String> {
    lines
        .iter()
        .map(|line| {
            let mut fields = line.split_whitespace();
            let (Some(re), Some(im), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(format!("Malformed data value: ({line})"));
            };
            let re: f64 = re
                .parse()
                .map_err(|e| format!("An exception occurred reading ({line}): {e}"))?;
            let im: f64 = im
                .parse()
                .map_err(|e| format!("An exception occurred reading ({line}): {e}"))?;
            if validate && (re.abs() > MAX_RAW_VALUE || im.abs() > MAX_RAW_VALUE) {
                return Err(format!("Got a non plausible data value: ({line})"));
            }
            Ok(Complex64::new(re, im))
        })
        .collect()
}

/// Runs sweeps against one instrument. Only one sweep runs at a time; the
/// host follows progress through the event channel.
pub struct SweepWorker {
    instrument: Arc<dyn Instrument>,
    calibration: Arc<RwLock<Calibration>>,
    settings: Mutex<SweepSettings>,
    buffers: Mutex<Buffers>,
    events: UnboundedSender<SweepEvent>,
    stop: StopHandle,
    running: AtomicBool,
    retry_delay: Duration,
}

impl SweepWorker {
    pub fn new(
        instrument: Arc<dyn Instrument>,
        calibration: Arc<RwLock<Calibration>>,
        settings: SweepSettings,
        events: UnboundedSender<SweepEvent>,
    ) -> SweepWorker {
        info!("Initializing SweepWorker");
        SweepWorker {
            instrument,
            calibration,
            settings: Mutex::new(settings),
            buffers: Mutex::new(Buffers::default()),
            events,
            stop: StopHandle::default(),
            running: AtomicBool::new(false),
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Pause between re-reads of a channel that returned bad data.
    pub fn with_retry_delay(mut self, delay: Duration) -> SweepWorker {
        self.retry_delay = delay;
        self
    }

    /// Replaces the settings used by the next sweep.
    pub fn set_settings(&self, settings: SweepSettings) {
        *lock(&self.settings) = settings;
    }

    pub fn settings(&self) -> SweepSettings {
        lock(&self.settings).clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn percentage(&self) -> f64 {
        lock(&self.buffers).percentage
    }

    /// The latest full-span data.
    pub fn data(&self) -> SweepData {
        lock(&self.buffers).snapshot()
    }

    /// Runs [`SweepWorker::run`] on tokio's blocking pool.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<(), SweepError>> {
        let worker = Arc::clone(self);
        tokio::task::spawn_blocking(move || worker.run())
    }

    /// Performs a complete sweep, or keeps sweeping in continuous mode until
    /// stopped. Ends with a `Finished` or `Error` event unless rejected
    /// because another sweep is running.
    pub fn run(&self) -> Result<(), SweepError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Ignoring sweep request while a sweep is running");
            return Err(SweepError::AlreadyRunning);
        }
        self.stop.clear();

        let result = self.sweep();
        self.running.store(false, Ordering::SeqCst);
        match &result {
            Ok(()) => {
                debug!("Sending \"finished\" signal");
                self.emit(SweepEvent::Finished);
            }
            Err(e) => {
                error!("Sweep failed: {}", e);
                self.emit(SweepEvent::Error(e.clone()));
            }
        }
        result
    }

    fn sweep(&self) -> Result<(), SweepError> {
        if !self.instrument.connected() {
            debug!("Attempted to run without being connected to the instrument");
            return Err(SweepError::NotConnected);
        }
        let settings = self.settings();
        let plan = settings.plan()?;
        info!("Starting {}", plan);
        if settings.averaging.repeats() > 1 {
            info!("{} averages", settings.averaging.repeats());
        }

        {
            let mut buffers = lock(&self.buffers);
            if buffers.plan != Some(plan) {
                buffers.plan = Some(plan);
                buffers.segments = vec![SegmentData::default(); plan.segments()];
            }
        }

        let mut result = Ok(());
        'sweeping: loop {
            self.set_progress(0.0);
            for i in 0..plan.segments() {
                debug!("Sweep segment no {}", i);
                if self.stop.is_stopped() {
                    debug!("Stopping sweeping as signalled");
                    break 'sweeping;
                }
                let (start, stop) = plan.index_range(i);
                let segment = match self.read_averaged_segment(&plan, &settings, start, stop) {
                    Ok(segment) => segment,
                    Err(e) => {
                        result = Err(e);
                        break 'sweeping;
                    }
                };
                self.set_progress((i + 1) as f64 * 100.0 / plan.segments() as f64);
                if segment.is_empty() {
                    warn!("No valid data for segment {} ({} to {})", i, start, stop);
                    self.clear_segment(i);
                    continue;
                }
                self.publish(i, segment, &settings);
            }
            if !settings.continuous || self.stop.is_stopped() {
                break;
            }
        }

        if plan.segments() > 1 {
            debug!(
                "Resetting instrument sweep to full range: {} to {}",
                plan.start(),
                plan.end()
            );
            if let Err(e) = self
                .instrument
                .reset_sweep(plan.start(), plan.end(), plan.points())
            {
                warn!("Failed to reset the instrument sweep: {}", e);
            }
        }
        self.set_progress(100.0);
        result
    }

    /// Reads a segment once, or `averages` times and averages the reads.
    fn read_averaged_segment(
        &self,
        plan: &FrequencySweepPlan,
        settings: &SweepSettings,
        start: u64,
        stop: u64,
    ) -> Result<RawSegment, SweepError> {
        let repeats = settings.averaging.repeats();
        if repeats == 1 {
            return self.read_segment(start, stop, plan.points());
        }

        info!("Reading {} averages from {} to {}", repeats, start, stop);
        let mut frequencies = Vec::new();
        let mut reads11 = Vec::with_capacity(repeats);
        let mut reads21 = Vec::with_capacity(repeats);
        for i in 0..repeats {
            if self.stop.is_stopped() {
                debug!("Stopping averaging as signalled");
                break;
            }
            debug!("Reading average no {} / {}", i + 1, repeats);
            let read = self.read_segment(start, stop, plan.points())?;
            self.add_progress(100.0 / (plan.segments() * repeats) as f64);
            if read.is_empty() {
                continue;
            }
            if frequencies.is_empty() {
                frequencies = read.frequencies;
            } else if read.frequencies != frequencies {
                warn!("Frequencies changed between averaged reads, dropping read");
                continue;
            }
            reads11.push(read.values11);
            reads21.push(read.values21);
        }

        debug!("Post-processing {} averages", reads11.len());
        let truncates = settings.averaging.truncates;
        Ok(RawSegment {
            values11: average_repeats(&reads11, truncates),
            values21: average_repeats(&reads21, truncates),
            frequencies,
        })
    }

    fn read_segment(&self, start: u64, stop: u64, points: usize) -> Result<RawSegment, SweepError> {
        debug!("Setting sweep range to {} to {}", start, stop);
        self.instrument.set_sweep(start, stop, points)?;

        let frequencies = self.instrument.read_frequencies()?;
        let values11 = self.read_data(DataChannel::S11)?;
        let values21 = self.read_data(DataChannel::S21)?;

        if frequencies.len() != values11.len() || frequencies.len() != values21.len() {
            info!(
                "No valid data during this run ({} frequencies, {} S11, {} S21)",
                frequencies.len(),
                values11.len(),
                values21.len()
            );
            return Ok(RawSegment::default());
        }
        Ok(RawSegment {
            frequencies,
            values11,
            values21,
        })
    }

    /// Reads a channel until it returns plausible data.
    fn read_data(&self, channel: DataChannel) -> Result<Vec<Complex64>, SweepError> {
        debug!("Reading {}", channel);
        let validate = self.instrument.validate_input();
        let mut count = 0;
        loop {
            let lines = self.instrument.read_values(channel)?;
            debug!("Read {} values", lines.len());
            match parse_values(&lines, validate) {
                Ok(values) => return Ok(values),
                Err(reason) => warn!("{}", reason),
            }

            count += 1;
            if count == READ_WARN_ATTEMPTS {
                warn!("Tried and failed to read {} {} times.", channel, count);
            }
            if count >= READ_MAX_ATTEMPTS {
                error!(
                    "Tried and failed to read {} {} times. Giving up.",
                    channel, count
                );
                return Err(SweepError::DeviceIO(format!(
                    "Failed reading {channel} {count} times.\n\
                     Data outside expected valid ranges, or in an unexpected format.\n\n\
                     You can disable data validation in the device settings."
                )));
            }
            debug!("Re-reading {}", channel);
            sleep(self.retry_delay);
        }
    }

    /// Corrects a segment and stores it at its place in the full span.
    fn publish(&self, index: usize, segment: RawSegment, settings: &SweepSettings) {
        let raw11: Vec<Datapoint> = segment
            .frequencies
            .iter()
            .zip(&segment.values11)
            .map(|(&f, &z)| Datapoint::from_complex(f, z))
            .collect();
        let raw21: Vec<Datapoint> = segment
            .frequencies
            .iter()
            .zip(&segment.values21)
            .map(|(&f, &z)| Datapoint::from_complex(f, z))
            .collect();

        let delay = settings.offset_delay;
        let (data11, data21) = {
            let calibration = self
                .calibration
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let data11 = raw11
                .iter()
                .map(|dp| {
                    let dp = if delay != 0.0 { correct_delay(dp, delay, true) } else { *dp };
                    calibration.correct11(&dp)
                })
                .collect();
            let data21 = raw21
                .iter()
                .map(|dp| {
                    let dp = if delay != 0.0 { correct_delay(dp, delay, false) } else { *dp };
                    calibration.correct21(&dp)
                })
                .collect();
            (data11, data21)
        };

        let snapshot = {
            let mut buffers = lock(&self.buffers);
            debug!(
                "Inserting {} points at offset {}",
                raw11.len(),
                buffers.plan.map(|p| p.segment_offset(index)).unwrap_or(0)
            );
            if let Some(slot) = buffers.segments.get_mut(index) {
                *slot = SegmentData {
                    data11,
                    data21,
                    raw11,
                    raw21,
                };
            }
            buffers.snapshot()
        };
        debug!("Sending \"updated\" signal ({} points)", snapshot.len());
        self.emit(SweepEvent::Updated(snapshot));
    }

    /// Drops a segment's stored data so an unreadable segment never shows
    /// an earlier run's samples.
    fn clear_segment(&self, index: usize) {
        if let Some(slot) = lock(&self.buffers).segments.get_mut(index) {
            *slot = SegmentData::default();
        }
    }

    fn set_progress(&self, percentage: f64) {
        lock(&self.buffers).percentage = percentage;
        self.emit(SweepEvent::Progress(percentage));
    }

    fn add_progress(&self, delta: f64) {
        let percentage = {
            let mut buffers = lock(&self.buffers);
            buffers.percentage += delta;
            buffers.percentage
        };
        self.emit(SweepEvent::Progress(percentage));
    }

    fn emit(&self, event: SweepEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for sweep events");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
