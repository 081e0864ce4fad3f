//! Scalar helpers shared by calibration and behaviors

/// Clamp `v` into `[min, max]`.
#[inline]
pub fn clamp(v: f32, min: f32, max: f32) -> f32 {
    v.min(max).max(min)
}

/// Linearly map `v` from `[in1, in2]` to `[out1, out2]`.
///
/// Either range may be reversed (`in1 > in2`).
#[inline]
pub fn remap(v: f32, in1: f32, in2: f32, out1: f32, out2: f32) -> f32 {
    (out2 - out1) * (v - in1) / (in2 - in1) + out1
}

/// [`remap`] then clamp to the output range, whichever way round it is.
#[inline]
pub fn remap_clamp(v: f32, in1: f32, in2: f32, out1: f32, out2: f32) -> f32 {
    let lo = out1.min(out2);
    let hi = out1.max(out2);
    clamp(remap(v, in1, in2, out1, out2), lo, hi)
}
