//! Offline Batch Runner
//!
//! Drives a single effect over a recorded WAV file and reports how each block
//! changed. A reader thread decodes the file into fixed-size blocks and feeds
//! them through a [`BufferQueue`]; the calling thread processes them in
//! order, writes a mono float WAV and appends one CSV row per block.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use std::thread;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use murmur_dsp::{
    consts, peak, rms, AudioEffect, DeEsser, Limiter, NoiseGate, SpectrumMeter, ThreeBandEq,
};

use crate::buffer_queue::BufferQueue;
use crate::config::{
    DeEsserSettings, EffectSettings, EqSettings, GateSettings, LimiterSettings,
};
use crate::error::{EngineError, EngineResult};

/// Default block length, matching the de-esser frame
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Largest block the EQ's doubled transform allows
pub const MAX_BLOCK_SIZE: usize = consts::gate::MAX_FFT_SIZE / 2;

/// Blocks buffered between the reader thread and the processor
const QUEUE_BLOCKS: usize = 8;

/// The effect a batch run measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEffect {
    NoiseGate,
    Limiter,
    Eq,
    DeEsser,
}

impl BatchEffect {
    pub const ALL: [BatchEffect; 4] = [
        BatchEffect::NoiseGate,
        BatchEffect::Limiter,
        BatchEffect::Eq,
        BatchEffect::DeEsser,
    ];

    /// Statistic names, each written as a `_Before` / `_After` column pair
    fn statistics(self) -> &'static [&'static str] {
        match self {
            BatchEffect::NoiseGate => &["RMS"],
            BatchEffect::Limiter => &["RMS", "Peak"],
            BatchEffect::Eq => &["Low", "Mid", "High"],
            BatchEffect::DeEsser => &["Sibilance"],
        }
    }

    /// CSV header row
    pub fn csv_header(self) -> Vec<String> {
        let mut header = vec!["Time (s)".to_string()];
        for stat in self.statistics() {
            header.push(format!("{stat}_Before"));
            header.push(format!("{stat}_After"));
        }
        header
    }
}

impl fmt::Display for BatchEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchEffect::NoiseGate => "noisegate",
            BatchEffect::Limiter => "limiter",
            BatchEffect::Eq => "eq",
            BatchEffect::DeEsser => "deesser",
        };
        f.write_str(name)
    }
}

impl FromStr for BatchEffect {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "noisegate" | "gate" => Ok(BatchEffect::NoiseGate),
            "limiter" => Ok(BatchEffect::Limiter),
            "eq" | "equalizer" => Ok(BatchEffect::Eq),
            "deesser" => Ok(BatchEffect::DeEsser),
            _ => Err(EngineError::ConfigError(format!("Unknown effect: {s}"))),
        }
    }
}

/// What to run and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub effect: BatchEffect,
    pub block_size: usize,
    /// Only the selected effect's section is used; it runs enabled regardless
    pub settings: EffectSettings,
}

impl BatchOptions {
    /// Settings tuned to make each effect's change easy to see in the CSV
    pub fn for_effect(effect: BatchEffect) -> Self {
        let mut settings = EffectSettings::default();
        match effect {
            BatchEffect::NoiseGate => {
                settings.gate = GateSettings {
                    threshold: 0.1,
                    attack_ms: 20.0,
                    release_ms: 200.0,
                    fft_size: DEFAULT_BLOCK_SIZE,
                    ..GateSettings::default()
                }
            }
            BatchEffect::Limiter => {
                settings.limiter = LimiterSettings {
                    threshold: 0.6,
                    attack_ms: 10.0,
                    release_ms: 100.0,
                    ..LimiterSettings::default()
                }
            }
            BatchEffect::Eq => {
                settings.eq = EqSettings {
                    gains: [1.5, 0.8, 1.2],
                    ..EqSettings::default()
                }
            }
            BatchEffect::DeEsser => settings.de_esser = DeEsserSettings::default(),
        }

        Self {
            effect,
            block_size: DEFAULT_BLOCK_SIZE,
            settings,
        }
    }
}

/// Whole-file results of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub blocks: u64,
    pub frames: u64,
    pub sample_rate: u32,
    pub input_rms: f32,
    pub output_rms: f32,
    pub input_peak: f32,
    pub output_peak: f32,
}

/// One block of the first channel, with its true length before padding
struct SourceBlock {
    samples: Vec<f32>,
    len: usize,
}

/// The selected effect, ready to run on whole blocks
enum BatchProcessor {
    Effect(Box<dyn AudioEffect>),
    DeEsser(DeEsser),
}

impl BatchProcessor {
    fn new(options: &BatchOptions, sample_rate: f32) -> EngineResult<Self> {
        let settings = &options.settings;
        let processor = match options.effect {
            BatchEffect::NoiseGate => {
                let gate = NoiseGate::new(sample_rate, settings.gate.fft_size);
                let params = gate.params();
                params.set_threshold(settings.gate.threshold);
                params.set_attack_ms(settings.gate.attack_ms);
                params.set_release_ms(settings.gate.release_ms);
                BatchProcessor::Effect(Box::new(gate))
            }
            BatchEffect::Limiter => {
                let limiter = Limiter::new(sample_rate);
                let params = limiter.params();
                params.set_threshold(settings.limiter.threshold);
                params.set_attack_ms(settings.limiter.attack_ms);
                params.set_release_ms(settings.limiter.release_ms);
                BatchProcessor::Effect(Box::new(limiter))
            }
            BatchEffect::Eq => {
                let eq = ThreeBandEq::new(sample_rate, options.block_size);
                let params = eq.params();
                for (band, &gain) in settings.eq.gains.iter().enumerate() {
                    params.set_band_gain(band, gain)?;
                }
                params.set_band_cutoff(0, settings.eq.low_mid_cutoff_hz)?;
                params.set_band_cutoff(1, settings.eq.mid_high_cutoff_hz)?;
                BatchProcessor::Effect(Box::new(eq))
            }
            BatchEffect::DeEsser => {
                let de_esser = DeEsser::new(sample_rate);
                let params = de_esser.params();
                params.set_frequency_range(settings.de_esser.start_hz, settings.de_esser.end_hz);
                params.set_reduction_db(settings.de_esser.reduction_db);
                de_esser.set_enabled(true);
                BatchProcessor::DeEsser(de_esser)
            }
        };

        if let BatchProcessor::Effect(effect) = &processor {
            effect.store_enabled(true);
        }
        Ok(processor)
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        match self {
            BatchProcessor::Effect(effect) => effect.process(input, output),
            BatchProcessor::DeEsser(de_esser) => {
                output.copy_from_slice(input);
                de_esser.process_in_place(output);
            }
        }
    }
}

/// Per-block before/after measurements for the CSV
struct BlockMeter {
    effect: BatchEffect,
    spectrum: SpectrumMeter,
}

impl BlockMeter {
    fn new(effect: BatchEffect, sample_rate: f32, frame_size: usize) -> EngineResult<Self> {
        Ok(Self {
            effect,
            spectrum: SpectrumMeter::new(sample_rate, frame_size)?,
        })
    }

    /// Values interleaved as `stat_before, stat_after, ...`
    fn measure(&mut self, before: &[f32], after: &[f32]) -> Vec<f64> {
        let mut row = Vec::with_capacity(6);
        match self.effect {
            BatchEffect::NoiseGate => {
                row.extend([rms(before) as f64, rms(after) as f64]);
            }
            BatchEffect::Limiter => {
                row.extend([rms(before) as f64, rms(after) as f64]);
                row.extend([peak(before) as f64, peak(after) as f64]);
            }
            BatchEffect::Eq => {
                let b = self.spectrum.bands(before);
                let a = self.spectrum.bands(after);
                row.extend([b.low, a.low, b.mid, a.mid, b.high, a.high]);
            }
            BatchEffect::DeEsser => {
                row.push(self.spectrum.sibilance(before));
                row.push(self.spectrum.sibilance(after));
            }
        }
        row
    }
}

/// Whole-file accumulators for [`BatchSummary`]
#[derive(Default)]
struct Totals {
    frames: u64,
    input_energy: f64,
    output_energy: f64,
    input_peak: f32,
    output_peak: f32,
}

impl Totals {
    fn add(&mut self, before: &[f32], after: &[f32]) {
        self.frames += before.len() as u64;
        self.input_energy += before.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>();
        self.output_energy += after.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>();
        self.input_peak = self.input_peak.max(peak(before));
        self.output_peak = self.output_peak.max(peak(after));
    }

    fn rms(energy: f64, frames: u64) -> f32 {
        if frames == 0 {
            0.0
        } else {
            (energy / frames as f64).sqrt() as f32
        }
    }
}

/// Run one effect over `input_wav`
///
/// Multi-channel input is reduced to its first channel. The last block is
/// zero-padded for processing and trimmed again on output, so the output has
/// exactly as many frames as the input.
pub fn run_batch(
    input_wav: impl AsRef<Path>,
    output_wav: impl AsRef<Path>,
    csv_path: impl AsRef<Path>,
    options: &BatchOptions,
) -> EngineResult<BatchSummary> {
    let block_size = options.block_size;
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(EngineError::ConfigError(format!(
            "Block size must be between 1 and {}, got {}",
            MAX_BLOCK_SIZE, block_size
        )));
    }

    let reader = WavReader::open(input_wav.as_ref())?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    if sample_rate == 0 {
        return Err(EngineError::ConfigError(format!(
            "{} has a sample rate of 0",
            input_wav.as_ref().display()
        )));
    }
    info!(
        "Batch {}: {} ({} Hz, {} ch, {} blocks of {})",
        options.effect,
        input_wav.as_ref().display(),
        sample_rate,
        spec.channels,
        (reader.duration() as usize + block_size - 1) / block_size,
        block_size
    );

    let mut processor = BatchProcessor::new(options, sample_rate as f32)?;
    let mut meter = BlockMeter::new(options.effect, sample_rate as f32, block_size)?;

    let mut writer = WavWriter::create(
        output_wav.as_ref(),
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;
    let mut csv = csv::Writer::from_path(csv_path.as_ref())?;
    csv.write_record(options.effect.csv_header())?;

    let queue: BufferQueue<SourceBlock> = BufferQueue::new(QUEUE_BLOCKS);
    let mut totals = Totals::default();
    let mut blocks = 0u64;

    // Rust pattern: scoped threads may borrow `queue` from this stack frame
    let processed = thread::scope(|scope| -> EngineResult<()> {
        let feeder = scope.spawn(|| {
            let result = feed_blocks(reader, block_size, &queue);
            queue.set_done();
            result
        });

        let consumed = (|| -> EngineResult<()> {
            let mut output = vec![0.0; block_size];
            while let Some(block) = queue.pop() {
                processor.process(&block.samples, &mut output);

                let before = &block.samples[..block.len];
                let after = &output[..block.len];
                for &sample in after {
                    writer.write_sample(sample)?;
                }

                let time = (blocks * block_size as u64) as f64 / sample_rate as f64;
                let mut record = vec![format!("{time:.4}")];
                record.extend(meter.measure(before, after).iter().map(f64::to_string));
                csv.write_record(&record)?;

                totals.add(before, after);
                blocks += 1;
            }
            Ok(())
        })();

        // Unblocks the feeder if processing stopped early
        queue.set_done();
        let fed = feeder.join().map_err(|_| EngineError::ThreadPanicked)?;
        consumed.and(fed)
    });
    processed?;

    writer.finalize()?;
    csv.flush()?;

    let summary = BatchSummary {
        blocks,
        frames: totals.frames,
        sample_rate,
        input_rms: Totals::rms(totals.input_energy, totals.frames),
        output_rms: Totals::rms(totals.output_energy, totals.frames),
        input_peak: totals.input_peak,
        output_peak: totals.output_peak,
    };
    info!(
        "Batch {} done: {} blocks, RMS {:.4} -> {:.4}, peak {:.4} -> {:.4}",
        options.effect,
        summary.blocks,
        summary.input_rms,
        summary.output_rms,
        summary.input_peak,
        summary.output_peak
    );
    Ok(summary)
}

/// Decode the first channel into padded blocks and push them into `queue`
fn feed_blocks(
    reader: WavReader<BufReader<File>>,
    block_size: usize,
    queue: &BufferQueue<SourceBlock>,
) -> EngineResult<()> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Box<dyn Iterator<Item = Result<f32, hound::Error>>> = match spec.sample_format {
        SampleFormat::Float => Box::new(reader.into_samples::<f32>()),
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            Box::new(
                reader
                    .into_samples::<i32>()
                    .map(move |s| s.map(|v| v as f32 * scale)),
            )
        }
    };

    let mut block = Vec::with_capacity(block_size);
    let mut pushed = 0u64;
    for sample in samples.step_by(channels) {
        block.push(sample?);
        if block.len() == block_size {
            queue.push(SourceBlock {
                samples: std::mem::replace(&mut block, Vec::with_capacity(block_size)),
                len: block_size,
            });
            pushed += 1;
        }
    }

    if !block.is_empty() {
        let len = block.len();
        block.resize(block_size, 0.0);
        queue.push(SourceBlock {
            samples: block,
            len,
        });
        pushed += 1;
    }

    debug!("Reader thread queued {} blocks", pushed);
    Ok(())
}
