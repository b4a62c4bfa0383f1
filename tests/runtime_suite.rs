use approx::assert_abs_diff_eq;
use milkwarp::audio::{AudioLevels, WaveData};
use milkwarp::catalog::PresetDefinition;
use milkwarp::runtime::{GlobalVars, PixelInput, PresetFrame, PresetRuntime};
use milkwarp::visual::WarpMesh;
use serde_json::json;

fn preset(value: serde_json::Value) -> PresetDefinition {
    serde_json::from_value(value).expect("valid preset json")
}

fn globals(frame: u64) -> GlobalVars {
    GlobalVars {
        frame,
        time: frame as f64 / 60.0,
        ..GlobalVars::default()
    }
}

// ── Frame evaluation ────────────────────────────────────────────────────────

#[test]
fn preset_without_expressions_matches_its_base_values() {
    let def = preset(json!({
        "name": "bare",
        "baseVals": { "decay": 0.9, "zoom": 1.0, "wave_mode": 3 }
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    let frame = *rt.update_frame(&globals(0));
    assert_eq!(frame, PresetFrame::with_base(&def.base_vals));
    assert_eq!(rt.var("decay"), Some(0.9));
    assert_eq!(rt.var("zoom"), Some(1.0));
    assert_eq!(rt.var("warp"), Some(1.0));
    assert_eq!(frame.decay, 0.9_f64 as f32);
    assert_eq!(frame.zoom, 1.0);
    assert_eq!(frame.wave_mode_index(), 3);
    assert_eq!(rt.shape_count(), 0);
    assert_eq!(rt.wave_count(), 0);
}

#[test]
fn frame_expression_starts_from_base_each_frame() {
    let def = preset(json!({
        "name": "grow",
        "baseVals": { "zoom": 1.0 },
        "frame_eqs_str": "zoom = zoom + 0.1; counter = counter + 1;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    for f in 0..3 {
        rt.update_frame(&globals(f));
    }
    assert_abs_diff_eq!(rt.frame().zoom, 1.1, epsilon = 1e-6);
    assert_eq!(rt.var("counter"), Some(3.0));
}

#[test]
fn frame_expression_sees_audio_levels() {
    let def = preset(json!({
        "name": "pump",
        "frame_eqs_str": "zoom = 1 + bass * 0.1; rot = treb_att;"
    }));
    let mut g = globals(0);
    g.levels = AudioLevels {
        bass: 2.0,
        treb_att: 0.5,
        ..AudioLevels::neutral()
    };
    let mut rt = PresetRuntime::new(&def, &g);
    let frame = rt.update_frame(&g);
    assert_abs_diff_eq!(frame.zoom, 1.2, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.rot, 0.5);
}

#[test]
fn broken_expression_is_ignored() {
    let def = preset(json!({
        "name": "broken",
        "baseVals": { "zoom": 1.05 },
        "frame_eqs_str": "zoom = (;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    assert_abs_diff_eq!(rt.update_frame(&globals(0)).zoom, 1.05);
}

#[test]
fn q_values_reset_to_init_every_frame() {
    let def = preset(json!({
        "name": "q",
        "init_eqs_str": "q1 = 5;",
        "frame_eqs_str": "q1 = q1 + 1;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    for f in 0..4 {
        rt.update_frame(&globals(f));
        assert_eq!(rt.q(0), 6.0);
    }
}

#[test]
fn random_seeds_are_exposed() {
    let def = preset(json!({
        "name": "seeds",
        "frame_eqs_str": "a = rand_start_x; b = rand_preset_w;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    assert_eq!(rt.var("a"), Some(rt.rand_start()[0]));
    assert_eq!(rt.var("b"), Some(rt.rand_preset()[3]));
    assert!((0.0..1.0).contains(&rt.rand_start()[0]));
}

// ── Per-pixel ───────────────────────────────────────────────────────────────

#[test]
fn pixel_expression_overrides_per_vertex_only() {
    let def = preset(json!({
        "name": "pixel",
        "baseVals": { "zoom": 1.0, "rot": 0.2 },
        "pixel_eqs_str": "zoom = x; dx = rad;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    assert!(rt.has_pixel_eqs());

    let inputs = [
        PixelInput { x: 0.25, y: 0.5, rad: 0.1, ang: 0.0 },
        PixelInput { x: 0.75, y: 0.5, rad: 0.3, ang: 0.0 },
    ];
    let mut out = Vec::new();
    rt.eval_pixels(&inputs, &mut out);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].zoom, 0.25);
    assert_eq!(out[1].zoom, 0.75);
    assert_abs_diff_eq!(out[1].dx, 0.3);
    assert_abs_diff_eq!(out[0].rot, 0.2);

    assert_eq!(rt.frame().zoom, 1.0);
    assert_eq!(rt.var("zoom"), Some(1.0));
}

#[test]
fn pixel_expression_covers_every_mesh_vertex() {
    let def = preset(json!({
        "name": "grid",
        "baseVals": { "zoom": 1.0 },
        "frame_eqs_str": "zoom = 1.05;",
        "pixel_eqs_str": "zoom = x;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    let mut mesh = WarpMesh::new(8, 6, (1.0, 0.75));

    for f in 0..2 {
        rt.update_frame(&globals(f));
        assert_eq!(rt.frame().zoom, 1.05_f64 as f32);
        assert_eq!(rt.var("zoom"), Some(1.05));

        let (inputs, verts) = mesh.split_mut();
        rt.eval_pixels(inputs, verts);
        assert_eq!(mesh.vertices().len(), 9 * 7);
        for (input, v) in mesh.inputs().iter().zip(mesh.vertices()) {
            assert_eq!(v.zoom, input.x as f32);
        }
        let mut columns = mesh.vertices().iter().map(|v| v.zoom.to_bits()).collect::<Vec<_>>();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(columns.len(), 9);
    }
}

#[test]
fn pixel_values_do_not_leak_between_vertices() {
    let def = preset(json!({
        "name": "leak",
        "baseVals": { "zoom": 1.0 },
        "pixel_eqs_str": "zoom = zoom * 2;"
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let inputs = vec![PixelInput::default(); 3];
    let mut out = Vec::new();
    rt.eval_pixels(&inputs, &mut out);
    assert!(out.iter().all(|v| v.zoom == 2.0));
}

#[test]
fn no_pixel_expression_copies_frame_values() {
    let def = preset(json!({ "name": "flat", "baseVals": { "zoom": 0.97 } }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let mut out = Vec::new();
    rt.eval_pixels(&[PixelInput::default(); 5], &mut out);
    assert_eq!(out.len(), 5);
    assert!(out.iter().all(|v| v.zoom == 0.97));
}

// ── Shapes and waves ────────────────────────────────────────────────────────

#[test]
fn shape_instances_see_their_index() {
    let def = preset(json!({
        "name": "inst",
        "shapes": [
            { "baseVals": { "enabled": 1, "num_inst": 3 }, "frame_eqs_str": "x = instance / 10;" },
            { "baseVals": { "enabled": 0 } }
        ]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    assert_eq!(rt.shape_count(), 1);
    rt.update_frame(&globals(0));
    let shapes = rt.eval_shapes();
    assert_eq!(shapes.len(), 3);
    assert_abs_diff_eq!(shapes[0].x, 0.0);
    assert_abs_diff_eq!(shapes[1].x, 0.1);
    assert_abs_diff_eq!(shapes[2].x, 0.2);
}

#[test]
fn shape_t_values_restart_from_init() {
    let def = preset(json!({
        "name": "t",
        "init_eqs_str": "q1 = 0.4;",
        "shapes": [{
            "baseVals": { "enabled": 1 },
            "init_eqs_str": "t1 = 0.3;",
            "frame_eqs_str": "x = t1; y = q1; t1 = 0.9;"
        }]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    for f in 0..3 {
        rt.update_frame(&globals(f));
        let s = rt.eval_shapes()[0];
        assert_abs_diff_eq!(s.x, 0.3);
        assert_abs_diff_eq!(s.y, 0.4);
    }
}

fn reg_chain() -> PresetDefinition {
    preset(json!({
        "name": "reg chain",
        "shapes": [{
            "baseVals": { "enabled": 1 },
            "frame_eqs_str": "reg00 = reg00 + 1;"
        }],
        "waves": [{
            "baseVals": { "enabled": 1, "samples": 8 },
            "frame_eqs_str": "r = reg00 / 10;"
        }]
    }))
}

#[test]
fn registers_flow_from_shapes_to_waves_and_persist() {
    let def = reg_chain();
    let mut rt = PresetRuntime::new(&def, &globals(0));
    let wave = WaveData::default();

    rt.update_frame(&globals(0));
    rt.eval_shapes();
    let waves = rt.eval_waves(&wave);
    assert_abs_diff_eq!(waves[0].frame.r, 0.1);
    assert_eq!(rt.reg(0), 1.0);

    rt.update_frame(&globals(1));
    rt.eval_shapes();
    let waves = rt.eval_waves(&wave);
    assert_abs_diff_eq!(waves[0].frame.r, 0.2);
    assert_eq!(rt.reg(0), 2.0);
}

#[test]
fn registers_written_by_pixels_reach_shapes() {
    let def = preset(json!({
        "name": "pixel reg",
        "pixel_eqs_str": "reg10 = reg10 + 1;",
        "shapes": [{ "baseVals": { "enabled": 1 }, "frame_eqs_str": "x = reg10;" }]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let mut out = Vec::new();
    rt.eval_pixels(&[PixelInput::default(); 4], &mut out);
    let s = rt.eval_shapes()[0];
    assert_eq!(s.x, 4.0);
}

#[test]
fn new_preset_starts_with_clear_registers() {
    let def = reg_chain();
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    rt.eval_shapes();
    assert_eq!(rt.reg(0), 1.0);

    let fresh = PresetRuntime::new(&def, &globals(1));
    assert_eq!(fresh.reg(0), 0.0);
}

#[test]
fn gmegabuf_resets_between_preset_instances() {
    let def = preset(json!({
        "name": "global buffer",
        "init_eqs_str": "gmegabuf(7) = gmegabuf(7) + 2;"
    }));
    let first = PresetRuntime::new(&def, &globals(0));
    assert_eq!(first.gmegabuf(7.0), 2.0);
    let second = PresetRuntime::new(&def, &globals(0));
    assert_eq!(second.gmegabuf(7.0), 2.0);
}

#[test]
fn wave_point_expression_places_points() {
    let def = preset(json!({
        "name": "points",
        "waves": [{
            "baseVals": { "enabled": 1, "samples": 4 },
            "point_eqs_str": "x = sample; y = 0.25; a = sample * 0.5;"
        }]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let waves = rt.eval_waves(&WaveData::default());
    let pts = &waves[0].points;
    assert_eq!(pts.len(), 4);
    assert_abs_diff_eq!(pts[1].x, 1.0 / 3.0, epsilon = 1e-6);
    assert_eq!(pts[3].x, 1.0);
    assert!(pts.iter().all(|p| p.y == 0.25));
    assert_abs_diff_eq!(pts[2].a, 1.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn wave_without_point_expression_centers_on_silence() {
    let def = preset(json!({
        "name": "silent",
        "waves": [{ "baseVals": { "enabled": 1, "samples": 16 } }]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let waves = rt.eval_waves(&WaveData::default());
    assert_eq!(waves[0].points.len(), 16);
    assert!(waves[0].points.iter().all(|p| p.x == 0.5 && p.y == 0.5));
}

#[test]
fn wave_disabled_by_frame_expression_has_no_points() {
    let def = preset(json!({
        "name": "off",
        "waves": [{ "baseVals": { "enabled": 1 }, "frame_eqs_str": "enabled = 0;" }]
    }));
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    assert!(rt.eval_waves(&WaveData::default())[0].points.is_empty());
}

#[test]
fn huge_wave_separation_is_clamped_to_the_buffer() {
    let def = preset(json!({
        "name": "far apart",
        "waves": [{
            "baseVals": { "enabled": 1, "samples": 8 },
            "frame_eqs_str": "sep = 1e30;",
            "point_eqs_str": "x = 0.5; y = value2;"
        }]
    }));
    let ramp = (0..512).map(|i| i as f32 / 511.0).collect::<Vec<_>>();
    let data = WaveData {
        time_left: ramp.clone(),
        time_right: ramp,
        ..WaveData::default()
    };
    let mut rt = PresetRuntime::new(&def, &globals(0));
    rt.update_frame(&globals(0));
    let waves = rt.eval_waves(&data);
    assert!(waves[0].frame.sep > 1e29);
    assert_eq!(waves[0].points.len(), 8);
    // The right channel is read from its newest sample.
    assert!(waves[0].points.iter().all(|p| p.y == 0.5));
}
