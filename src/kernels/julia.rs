use super::color::rainbow;
use super::{effective_cap, rotate, safe_zoom, KernelDescriptor, UniformSet};
use super::{ESCAPE_RADIUS_SQ, MAX_ITERATIONS};
use crate::fractal_config::FractalType;
use glam::{Vec2, Vec3, Vec4};

pub static JULIA: KernelDescriptor = KernelDescriptor {
    fractal_type: FractalType::Julia,
    name: "julia",
    uniforms: &[
        "time",
        "resolution",
        "bass",
        "treble",
        "rotation",
        "zoom",
        "iterations",
        "primary",
        "secondary",
        "rainbow",
        "julia_c",
    ],
    shade,
};

// How far the audio levels push C away from the configured constant.
const C_WOBBLE: f32 = 0.045;

fn shade(uv: Vec2, u: &UniformSet) -> Vec4 {
    let p = rotate(uv / safe_zoom(u.zoom), u.rotation);
    let c = u.julia_c
        + Vec2::new(
            C_WOBBLE * u.bass * (u.time * 0.7).sin(),
            C_WOBBLE * u.treble * (u.time * 0.9).cos(),
        );

    let cap = effective_cap(u.iterations, MAX_ITERATIONS);
    let mut z = p * 1.4;
    let mut n = 0u32;
    for _ in 0..cap {
        z = Vec2::new(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
        if z.length_squared() > ESCAPE_RADIUS_SQ {
            break;
        }
        n += 1;
    }

    let escaped = n < cap;
    let f = n as f32 / cap as f32;
    let mut color = if !escaped {
        u.primary * 0.06
    } else if u.rainbow {
        rainbow(f * 3.0 + u.time * 0.1 + u.treble * 0.2) * (0.3 + 0.7 * f.sqrt())
    } else {
        u.primary.lerp(u.secondary, f.sqrt()) * (0.25 + 0.75 * f.sqrt())
    };

    // Inner glow around the origin, breathing with the bass.
    let glow = (0.06 + 0.12 * u.bass) / (1.0 + 12.0 * p.length_squared());
    color += u.secondary.lerp(Vec3::ONE, 0.5) * glow;

    color.extend(1.0)
}
