use super::color::rainbow;
use super::{effective_cap, safe_zoom, KernelDescriptor, UniformSet};
use crate::fractal_config::FractalType;
use glam::{Vec2, Vec3, Vec4};

pub static MANDELBULB: KernelDescriptor = KernelDescriptor {
    fractal_type: FractalType::Mandelbulb,
    name: "mandelbulb",
    uniforms: &[
        "time",
        "resolution",
        "bass",
        "treble",
        "rotation",
        "zoom",
        "rotation_speed",
        "zoom_pulse",
        "ray_steps",
        "primary",
        "secondary",
        "rainbow",
    ],
    shade,
};

pub const MAX_RAY_STEPS: u32 = 256;
pub const DE_ITERATIONS: u32 = 12;
pub const BAILOUT: f32 = 4.0;
pub const HIT_EPSILON: f32 = 0.001;
pub const MAX_DISTANCE: f32 = 50.0;

const NORMAL_EPSILON: f32 = 0.001;
const FOCAL_LENGTH: f32 = 1.6;

/// Bulb exponent: 8 plus a slow bass swing and a treble offset.
pub fn bulb_power(u: &UniformSet) -> f32 {
    8.0 + 1.5 * u.bass * (u.time * 0.35).sin() + 0.75 * u.treble
}

/// Distance from `pos` to the bulb surface for the given exponent.
pub fn distance_estimate(pos: Vec3, power: f32) -> f32 {
    let mut z = pos;
    let mut dr = 1.0f32;
    let mut r = 0.0f32;
    for _ in 0..DE_ITERATIONS {
        r = z.length();
        if r > BAILOUT {
            break;
        }
        let (theta, phi) = if r > 1e-6 {
            ((z.z / r).clamp(-1.0, 1.0).acos(), z.y.atan2(z.x))
        } else {
            (0.0, 0.0)
        };
        dr = r.powf(power - 1.0) * power * dr + 1.0;

        let zr = r.powf(power);
        let theta = theta * power;
        let phi = phi * power;
        z = Vec3::new(
            theta.sin() * phi.cos(),
            phi.sin() * theta.sin(),
            theta.cos(),
        ) * zr
            + pos;
    }
    if r <= 1e-6 {
        return 0.0;
    }
    0.5 * r.ln() * r / dr
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchResult {
    pub hit: bool,
    pub distance: f32,
    pub steps: u32,
}

/// Sphere-traces from `origin` along `dir` for at most `max_steps` steps
/// (itself capped at `MAX_RAY_STEPS`).
pub fn march(origin: Vec3, dir: Vec3, power: f32, max_steps: u32) -> MarchResult {
    let cap = effective_cap(max_steps, MAX_RAY_STEPS);
    let mut t = 0.0f32;
    let mut steps = 0u32;
    for _ in 0..cap {
        let d = distance_estimate(origin + dir * t, power);
        if d < HIT_EPSILON {
            return MarchResult {
                hit: true,
                distance: t,
                steps,
            };
        }
        t += d;
        steps += 1;
        // Also stops on NaN.
        if !(t <= MAX_DISTANCE) {
            break;
        }
    }
    MarchResult {
        hit: false,
        distance: t,
        steps,
    }
}

fn normal_at(p: Vec3, power: f32) -> Vec3 {
    let e = NORMAL_EPSILON;
    let dx = distance_estimate(p + Vec3::X * e, power) - distance_estimate(p - Vec3::X * e, power);
    let dy = distance_estimate(p + Vec3::Y * e, power) - distance_estimate(p - Vec3::Y * e, power);
    let dz = distance_estimate(p + Vec3::Z * e, power) - distance_estimate(p - Vec3::Z * e, power);
    Vec3::new(dx, dy, dz).normalize_or_zero()
}

fn camera(u: &UniformSet) -> (Vec3, Vec3, Vec3, Vec3) {
    let bass = if u.bass.is_finite() { u.bass.clamp(0.0, 2.0) } else { 0.0 };
    let dist = (2.6 / safe_zoom(u.zoom) - 0.25 * bass * (1.0 + u.zoom_pulse)).max(1.3);
    let angle = u.rotation + 0.15 * u.treble;
    let elevation = 0.35 * (u.time * u.rotation_speed * 0.3).sin();

    let origin = Vec3::new(
        angle.sin() * elevation.cos(),
        elevation.sin(),
        angle.cos() * elevation.cos(),
    ) * dist;
    let forward = (-origin).normalize_or_zero();
    let right = forward.cross(Vec3::Y).normalize_or_zero();
    let up = right.cross(forward);
    (origin, forward, right, up)
}

fn shade(uv: Vec2, u: &UniformSet) -> Vec4 {
    let power = bulb_power(u);
    let (origin, forward, right, up) = camera(u);
    let dir = (forward * FOCAL_LENGTH + right * uv.x + up * uv.y).normalize_or_zero();

    let res = march(origin, dir, power, u.ray_steps);
    if !res.hit {
        let bg = u.primary.lerp(u.secondary, 0.5 + 0.5 * uv.y.clamp(-1.0, 1.0)) * 0.06;
        return bg.extend(1.0);
    }

    let p = origin + dir * res.distance;
    let n = normal_at(p, power);
    let light = Vec3::new(0.6, 0.8, -0.4).normalize();
    let lambert = n.dot(light).max(0.0);

    let base = if u.rainbow {
        rainbow(p.length() * 0.9 + u.time * 0.05 + u.treble * 0.15)
    } else {
        let k = 0.5 + 0.5 * (p.length() * 5.0 + u.time * 0.8 + u.bass * 2.0).sin();
        u.primary.lerp(u.secondary, k)
    };

    // Occlusion from the step count.
    let cap = effective_cap(u.ray_steps, MAX_RAY_STEPS) as f32;
    let occlusion = 1.0 - 0.6 * (res.steps as f32 / cap).min(1.0);

    (base * (0.18 + 0.82 * lambert) * occlusion).extend(1.0)
}
