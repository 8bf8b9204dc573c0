use glam::{Vec3, Vec4};

/// Clamps a color into [0, 1] with alpha forced to 1. Non-finite channels become 0.
pub fn finish(c: Vec4) -> Vec4 {
    let ch = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    Vec4::new(ch(c.x), ch(c.y), ch(c.z), 1.0)
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h = fract01(h) * 6.0;
    let i = h.floor() as i32;
    let f = h - i as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i.rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Vec3::new(r, g, b)
}

/// Hue-rotating ramp used when rainbow mode is on.
pub fn rainbow(phase: f32) -> Vec3 {
    hsv_to_rgb(phase, 0.85, 1.0)
}

pub(crate) fn fract01(x: f32) -> f32 {
    if !x.is_finite() {
        return 0.0;
    }
    let f = x - x.floor();
    if f < 0.0 { f + 1.0 } else { f }
}
