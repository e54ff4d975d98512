use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mf_core::config::PipelineConfig;

/// melcep: MFCC feature extraction for audio files.
#[derive(Parser, Debug)]
#[command(name = "melcep", version, about, long_about = None)]
pub struct Cli {
    /// Audio file to analyse (wav, flac, mp3, ogg, aac, mp4, mkv).
    pub input: PathBuf,

    /// TOML pipeline configuration. Missing keys keep their defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Frame length in samples.
    #[arg(long)]
    pub frame_length: Option<usize>,

    /// Hop length in samples.
    #[arg(long)]
    pub hop_length: Option<usize>,

    /// Cepstral coefficients per frame.
    #[arg(long)]
    pub coefficients: Option<usize>,

    /// Process frames in order on one thread.
    #[arg(long)]
    pub sequential: bool,

    /// Print MFCC followed by delta and delta-delta.
    #[arg(long, conflicts_with_all = ["analyze", "stream"])]
    pub deltas: bool,

    /// Print per-frame descriptors (zcr, pitch, centroid, rolloff, energy).
    #[arg(long, conflicts_with = "stream")]
    pub analyze: bool,

    /// Feed the file through the streaming extractor in chunks.
    #[arg(long)]
    pub stream: bool,

    /// Z-score every printed vector.
    #[arg(long)]
    pub normalize: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// What the binary prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mfcc,
    Deltas,
    Analyze,
    Stream,
}

impl Cli {
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.deltas {
            Mode::Deltas
        } else if self.analyze {
            Mode::Analyze
        } else if self.stream {
            Mode::Stream
        } else {
            Mode::Mfcc
        }
    }

    /// Config file (or defaults), then flag overrides, then the file's sample rate.
    ///
    /// Validation happens when the pipeline is built.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded.
    pub fn pipeline_config(&self, sample_rate: u32) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(n) = self.frame_length {
            config.frame_length = n;
        }
        if let Some(n) = self.hop_length {
            config.hop_length = n;
        }
        if let Some(n) = self.coefficients {
            config.num_coefficients = n;
        }
        if self.sequential {
            config.parallel = false;
        }
        if sample_rate != config.sample_rate {
            log::info!(
                "Sample rate {} Hz from file overrides {} Hz",
                sample_rate,
                config.sample_rate
            );
            config.sample_rate = sample_rate;
        }
        Ok(config)
    }
}
