mod cli;
mod decode;
mod report;

use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use mf_audio::Pipeline;
use mf_audio::normalize::normalize_frames;
use mf_core::frame::FeatureVector;

use crate::cli::{Cli, Mode};

/// Samples handed to the streamer per write, in hops.
const STREAM_CHUNK_HOPS: usize = 4;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (samples, sample_rate) = decode::decode_mono(&cli.input)?;
    let config = cli.pipeline_config(sample_rate)?;
    let pipeline = Pipeline::new(config).context("Configuration invalide")?;

    let mut out = BufWriter::new(io::stdout().lock());
    run(&cli, &pipeline, &samples, &mut out)?;
    out.flush()?;

    pipeline.release()?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: &Cli, pipeline: &Pipeline, samples: &[f32], out: &mut impl Write) -> Result<()> {
    match cli.mode() {
        Mode::Mfcc => {
            let mut mfcc = pipeline.process(samples)?;
            if cli.normalize {
                normalize_frames(&mut mfcc);
            }
            report::write_vectors(out, &mfcc)?;
        }
        Mode::Deltas => {
            let mut set = pipeline.extract(samples)?;
            if cli.normalize {
                normalize_frames(&mut set.mfcc);
                normalize_frames(&mut set.delta);
                normalize_frames(&mut set.delta_delta);
            }
            report::write_feature_set(out, &set)?;
        }
        Mode::Analyze => {
            let mut frames = pipeline.analyze(samples)?;
            if cli.normalize {
                for frame in &mut frames {
                    normalize_frames(std::slice::from_mut(&mut frame.mfcc));
                }
            }
            report::write_analysis(out, &frames)?;
        }
        Mode::Stream => {
            let mut mfcc = stream(pipeline, samples)?;
            if cli.normalize {
                normalize_frames(&mut mfcc);
            }
            report::write_vectors(out, &mfcc)?;
        }
    }
    Ok(())
}

/// Push `samples` through a streamer in fixed chunks while a reader thread
/// collects the vectors.
fn stream(pipeline: &Pipeline, samples: &[f32]) -> Result<Vec<FeatureVector>> {
    let streamer = pipeline.streamer()?;
    let chunk = pipeline.config().hop_length * STREAM_CHUNK_HOPS;
    let expected = pipeline.config().frame_count(samples.len());

    let collected = std::thread::scope(|s| {
        let reader = s.spawn(|| std::iter::from_fn(|| streamer.read()).collect::<Vec<_>>());
        for part in samples.chunks(chunk) {
            streamer.write(part);
        }
        streamer.close();
        reader.join()
    })
    .map_err(|_| anyhow::anyhow!("Stream reader thread panicked"))?;

    if collected.len() < expected {
        log::warn!(
            "Stream returned {} of {} frames (reader too slow)",
            collected.len(),
            expected
        );
    }
    Ok(collected)
}
