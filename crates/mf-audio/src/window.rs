use std::f64::consts::PI;

use mf_core::config::WindowKind;
use mf_core::frame::Window;

/// Build a symmetric window of `length` samples.
///
/// # Example
/// ```
/// use mf_core::config::WindowKind;
/// use mf_audio::window::build_window;
/// let window = build_window(WindowKind::Hamming, 512);
/// assert_eq!(window.len(), 512);
/// assert!((window.weights()[0] - 0.08).abs() < 1e-6);
/// ```
#[must_use]
pub fn build_window(kind: WindowKind, length: usize) -> Window {
    // Single-sample windows would divide by zero below.
    let denom = length.saturating_sub(1).max(1) as f64;

    let weights = (0..length)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / denom;
            let w = match kind {
                WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowKind::Hanning => 0.5 * (1.0 - phase.cos()),
                WindowKind::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
                WindowKind::Rectangular => 1.0,
            };
            w as f32
        })
        .collect();

    Window::from_weights(kind, weights)
}
