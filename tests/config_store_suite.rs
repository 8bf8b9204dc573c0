use fractal_studio::fractal_config::{
    hex_to_rgb01, julia_preset, julia_presets, merge_config, preset_name_for, rgb01_to_hex,
    ConfigStore, FractalConfiguration, FractalType, HexColorError, JuliaParams, PartialConfig,
    PartialMotion, PartialQuality,
};
use fractal_studio::kernels::UniformSet;
use std::cell::RefCell;
use std::rc::Rc;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[test]
fn defaults_match_documented_values() {
    let cfg = FractalConfiguration::default();
    assert_eq!(cfg.fractal_type, FractalType::Julia);
    assert_eq!(cfg.colors.primary, [0.15, 0.55, 1.0]);
    assert_eq!(cfg.colors.secondary, [1.0, 0.3, 0.65]);
    assert!(approx(cfg.motion.bass_strength, 1.5));
    assert!(approx(cfg.motion.treble_strength, 1.0));
    assert!(approx(cfg.motion.rotation_speed, 0.5));
    assert!(approx(cfg.motion.zoom_pulse, 0.15));
    assert_eq!(cfg.quality.iterations, 200);
    assert_eq!(cfg.quality.ray_steps, 96);
    assert_eq!(cfg.julia, JuliaParams { cx: -0.4, cy: -0.59 });
    assert!(!cfg.color_mode.rainbow);
}

#[test]
fn merge_only_touches_named_fields() {
    let base = FractalConfiguration::default();
    let patch = PartialConfig::motion(PartialMotion {
        bass_strength: Some(3.5),
        ..PartialMotion::default()
    });
    let merged = merge_config(&base, &patch);

    assert!(approx(merged.motion.bass_strength, 3.5));
    assert_eq!(merged.motion.treble_strength, base.motion.treble_strength);
    assert_eq!(merged.motion.rotation_speed, base.motion.rotation_speed);
    assert_eq!(merged.motion.zoom_pulse, base.motion.zoom_pulse);
    assert_eq!(merged.colors, base.colors);
    assert_eq!(merged.quality, base.quality);
    assert_eq!(merged.julia, base.julia);
    assert_eq!(merged.fractal_type, base.fractal_type);
}

#[test]
fn empty_patch_is_identity() {
    let base = FractalConfiguration::default();
    let patch = PartialConfig::default();
    assert!(patch.is_empty());
    assert_eq!(merge_config(&base, &patch), base);
}

#[test]
fn store_update_returns_merged_snapshot() {
    let mut store = ConfigStore::new();
    let after = store.update(&PartialConfig::quality(PartialQuality {
        iterations: Some(512),
        ray_steps: None,
    }));
    assert_eq!(after.quality.iterations, 512);
    assert_eq!(after.quality.ray_steps, 96);
    assert_eq!(store.snapshot(), after);

    let after = store.update(&PartialConfig::rainbow(true));
    assert!(after.color_mode.rainbow);
    assert_eq!(after.quality.iterations, 512, "earlier updates survive");
}

#[test]
fn store_snapshot_is_detached_from_store() {
    let store = ConfigStore::new();
    let mut snap = store.snapshot();
    snap.quality.iterations = 7;
    assert_eq!(store.snapshot().quality.iterations, 200);
}

#[test]
fn julia_preset_update_sets_constant() {
    let mut store = ConfigStore::new();
    let dragon = julia_preset("dragon").expect("dragon preset");
    let cfg = store.update(&PartialConfig::julia(dragon));
    assert!(approx(cfg.julia.cx, 0.37));
    assert!(approx(cfg.julia.cy, 0.1));
    assert_eq!(preset_name_for(cfg.julia), Some("dragon"));
}

#[test]
fn presets_table_and_lookup() {
    let names: Vec<_> = julia_presets().iter().map(|p| p.name).collect();
    assert_eq!(
        names,
        ["classic", "dragon", "snowflake", "spiral", "lotus", "chaos"]
    );
    assert!(julia_preset("LOTUS").is_some());
    assert!(julia_preset("nope").is_none());
    // Defaults coincide with the chaos preset.
    assert_eq!(
        preset_name_for(FractalConfiguration::default().julia),
        Some("chaos")
    );
    assert_eq!(preset_name_for(JuliaParams { cx: 0.9, cy: 0.9 }), None);
}

#[test]
fn fractal_type_parses_lowercase_names() {
    assert_eq!("julia".parse::<FractalType>().ok(), Some(FractalType::Julia));
    assert_eq!(
        "mandelbrot".parse::<FractalType>().ok(),
        Some(FractalType::Mandelbrot)
    );
    assert_eq!(
        "mandelbulb".parse::<FractalType>().ok(),
        Some(FractalType::Mandelbulb)
    );
    let err = "sierpinski".parse::<FractalType>().expect_err("unknown type");
    assert!(err.to_string().contains("sierpinski"));
    for t in FractalType::all() {
        assert_eq!(t.as_str().parse::<FractalType>().ok(), Some(t));
    }
}

#[test]
fn hex_colors_convert_both_ways() {
    assert_eq!(hex_to_rgb01("#ffffff"), Ok([1.0, 1.0, 1.0]));
    assert_eq!(hex_to_rgb01("000000"), Ok([0.0, 0.0, 0.0]));
    let rgb = hex_to_rgb01("#ff8000").expect("valid hex");
    assert!(approx(rgb[0], 1.0));
    assert!(approx(rgb[1], 128.0 / 255.0));
    assert!(approx(rgb[2], 0.0));
    assert_eq!(hex_to_rgb01("#f80"), hex_to_rgb01("#ff8800"));

    assert_eq!(hex_to_rgb01("#12345"), Err(HexColorError::Length(5)));
    assert_eq!(hex_to_rgb01("#12345g"), Err(HexColorError::Digit('g')));

    assert_eq!(rgb01_to_hex([1.0, 128.0 / 255.0, 0.0]), "#ff8000");
    assert_eq!(rgb01_to_hex([2.0, -1.0, 0.5]), "#ff0080");
}

#[test]
fn partial_config_deserializes_camel_case_json() {
    let patch: PartialConfig =
        serde_json::from_str(r#"{"motion":{"bassStrength":3.5}}"#).expect("valid patch");
    let merged = merge_config(&FractalConfiguration::default(), &patch);
    assert!(approx(merged.motion.bass_strength, 3.5));
    assert!(approx(merged.motion.treble_strength, 1.0));

    let patch: PartialConfig = serde_json::from_str(
        r#"{"fractalType":"mandelbulb","quality":{"raySteps":128},"colorMode":{"rainbow":true}}"#,
    )
    .expect("valid patch");
    let merged = merge_config(&FractalConfiguration::default(), &patch);
    assert_eq!(merged.fractal_type, FractalType::Mandelbulb);
    assert_eq!(merged.quality.ray_steps, 128);
    assert_eq!(merged.quality.iterations, 200);
    assert!(merged.color_mode.rainbow);
}

#[test]
fn bound_uniforms_follow_updates_until_unbound() {
    let mut store = ConfigStore::new();
    let live = Rc::new(RefCell::new(UniformSet::from_config(&store.snapshot(), 8, 8)));
    store.bind(&live);

    store.update(&PartialConfig::quality(PartialQuality {
        iterations: Some(333),
        ray_steps: None,
    }));
    assert_eq!(live.borrow().iterations, 333);

    store.unbind(&live);
    assert!(store.live_uniforms().is_none());
    store.update(&PartialConfig::quality(PartialQuality {
        iterations: Some(50),
        ray_steps: None,
    }));
    assert_eq!(live.borrow().iterations, 333);
    assert_eq!(store.snapshot().quality.iterations, 50);
}

#[test]
fn unbind_ignores_other_uniform_sets() {
    let mut store = ConfigStore::new();
    let cfg = store.snapshot();
    let a = Rc::new(RefCell::new(UniformSet::from_config(&cfg, 4, 4)));
    let b = Rc::new(RefCell::new(UniformSet::from_config(&cfg, 4, 4)));
    store.bind(&b);
    store.unbind(&a);
    assert!(store.live_uniforms().is_some());
}

#[test]
fn dropped_uniforms_unbind_themselves() {
    let mut store = ConfigStore::new();
    {
        let live = Rc::new(RefCell::new(UniformSet::from_config(&store.snapshot(), 4, 4)));
        store.bind(&live);
    }
    assert!(store.live_uniforms().is_none());
    store.update(&PartialConfig::rainbow(true));
    assert!(store.snapshot().color_mode.rainbow);
}

#[test]
fn hex_examples_map_componentwise() {
    assert_eq!(hex_to_rgb01("#FF0000"), Ok([1.0, 0.0, 0.0]));
    assert_eq!(hex_to_rgb01("#00FF00"), Ok([0.0, 1.0, 0.0]));
    assert_eq!(hex_to_rgb01("#0000FF"), Ok([0.0, 0.0, 1.0]));
    let purple = hex_to_rgb01("#800080").expect("valid hex");
    assert!((purple[0] - 0.5).abs() < 0.01);
    assert_eq!(purple[1], 0.0);
    assert!((purple[2] - 0.5).abs() < 0.01);
}

#[test]
fn presets_are_bounded_and_classic_is_exact() {
    for p in julia_presets() {
        assert!(p.cx.abs() <= 2.0 && p.cy.abs() <= 2.0, "{} out of range", p.name);
    }
    let mut store = ConfigStore::new();
    let classic = julia_preset("classic").expect("classic");
    let cfg = store.update(&PartialConfig::julia(classic));
    assert_eq!(cfg.julia, JuliaParams { cx: 0.0, cy: 0.8 });
    assert_eq!(cfg.motion, FractalConfiguration::default().motion);
}
