use image::Rgba;

/// Matplotlib's "rainbow" ramp at `t` in [0, 1]
pub fn rainbow(t: f64) -> [u8; 3] {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0) as u8;
    [
        channel((2.0 * t - 0.5).abs()),
        channel((std::f64::consts::PI * t).sin()),
        channel((std::f64::consts::FRAC_PI_2 * t).cos()),
    ]
}

/// `count` colors sampled evenly along the ramp, first at t=0 and last at t=1.
///
/// Colors depend only on position and count, so two images with the same
/// number of objects get the same colors.
pub fn ramp_colors(count: usize) -> Vec<Rgba<u8>> {
    (0..count)
        .map(|i| {
            let t = if count > 1 { i as f64 / (count - 1) as f64 } else { 0.0 };
            let [r, g, b] = rainbow(t);
            Rgba([r, g, b, 255])
        })
        .collect()
}
