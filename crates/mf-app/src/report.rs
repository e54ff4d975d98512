//! Text output, one line per frame.

use std::io::{self, Write};

use mf_core::frame::{FeatureSet, FeatureVector, FrameAnalysis};

fn write_values(out: &mut impl Write, values: &[f32]) -> io::Result<()> {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{v:.5}")?;
    }
    Ok(())
}

/// `index<TAB>c0 c1 ...`
///
/// # Errors
/// Propagates write failures.
pub fn write_vectors(out: &mut impl Write, vectors: &[FeatureVector]) -> io::Result<()> {
    for (i, v) in vectors.iter().enumerate() {
        write!(out, "{i}\t")?;
        write_values(out, v)?;
        writeln!(out)?;
    }
    Ok(())
}

/// `index<TAB>mfcc | delta | delta-delta`
///
/// # Errors
/// Propagates write failures.
pub fn write_feature_set(out: &mut impl Write, set: &FeatureSet) -> io::Result<()> {
    let rows = set.mfcc.iter().zip(&set.delta).zip(&set.delta_delta);
    for (i, ((m, d), dd)) in rows.enumerate() {
        write!(out, "{i}\t")?;
        write_values(out, m)?;
        out.write_all(b" | ")?;
        write_values(out, d)?;
        out.write_all(b" | ")?;
        write_values(out, dd)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Header line, then `index zcr pitch centroid rolloff energy | mfcc` per frame.
///
/// # Errors
/// Propagates write failures.
pub fn write_analysis(out: &mut impl Write, frames: &[FrameAnalysis]) -> io::Result<()> {
    writeln!(out, "# frame\tzcr\tpitch_hz\tcentroid_hz\trolloff_hz\tenergy\t| mfcc")?;
    for (i, a) in frames.iter().enumerate() {
        write!(
            out,
            "{i}\t{:.4}\t{:.1}\t{:.1}\t{:.1}\t{:.5}\t| ",
            a.zcr, a.pitch, a.spectral_centroid, a.spectral_rolloff, a.energy
        )?;
        write_values(out, &a.mfcc)?;
        writeln!(out)?;
    }
    Ok(())
}
