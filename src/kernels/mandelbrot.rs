use super::color::rainbow;
use super::{effective_cap, rotate, safe_zoom, KernelDescriptor, UniformSet};
use super::{ESCAPE_RADIUS_SQ, MAX_ITERATIONS};
use crate::fractal_config::FractalType;
use glam::{Vec2, Vec4};

pub static MANDELBROT: KernelDescriptor = KernelDescriptor {
    fractal_type: FractalType::Mandelbrot,
    name: "mandelbrot",
    uniforms: &[
        "time",
        "resolution",
        "bass",
        "rotation",
        "zoom",
        "iterations",
        "primary",
        "secondary",
        "rainbow",
    ],
    shade,
};

/// Floor of the bass-reduced iteration cap.
pub const MIN_ITERATIONS: u32 = 16;

const CENTER: Vec2 = Vec2::new(-0.55, 0.0);

/// Iteration cap for a given bass level: loud bass lowers it, never below
/// `MIN_ITERATIONS` (or the configured count, if that is smaller).
pub fn iteration_cap(iterations: u32, bass: f32) -> u32 {
    let upper = effective_cap(iterations, MAX_ITERATIONS);
    let bass = if bass.is_finite() { bass.clamp(0.0, 1.0) } else { 0.0 };
    let damped = (upper as f32 * (1.0 - 0.6 * bass)).round() as u32;
    damped.max(MIN_ITERATIONS.min(upper)).min(upper)
}

fn shade(uv: Vec2, u: &UniformSet) -> Vec4 {
    let p = rotate(uv / safe_zoom(u.zoom), u.rotation);
    let c = p * 1.25 + CENTER;

    let cap = iteration_cap(u.iterations, u.bass);
    let mut z = Vec2::ZERO;
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
    let color = if !escaped {
        u.primary * 0.04
    } else if u.rainbow {
        rainbow(f * 2.5 + u.time * 0.08) * (0.25 + 0.75 * f)
    } else {
        u.primary.lerp(u.secondary, f) * (0.2 + 0.8 * f)
    };

    let vignette = (1.0 - 0.3 * uv.length_squared()).max(0.0);
    (color * vignette).extend(1.0)
}
