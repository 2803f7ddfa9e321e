//! End-to-end loading tests across all four formats.
//!
//! Every fixture is generated into a temporary directory: binary and ASCII
//! STL written byte by byte, OBJ with an MTL companion, 3MF archives
//! written with `zip`, and STEP exchange text.
//!
//! To run: cargo test -p mesh-loader --test conformance

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use mesh_loader::{
    load_3mf, load_mesh, load_obj, load_step, load_stl, CancellationToken, LoadError, LoadParams,
    LoadingState, MeshFormat, Model, ParserRegistry, ProgressiveLoader, WarningKind,
};
use mesh_types::Vector3;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

// =============================================================================
// Fixtures
// =============================================================================

/// Corners of the unit cube.
const CUBE_POINTS: [[f32; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Cube faces as quads, counter-clockwise seen from outside.
const CUBE_QUADS: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 4, 7, 3],
    [1, 2, 6, 5],
];

fn cube_triangles() -> Vec<[[f32; 3]; 3]> {
    CUBE_QUADS
        .iter()
        .flat_map(|q| {
            [
                [CUBE_POINTS[q[0]], CUBE_POINTS[q[1]], CUBE_POINTS[q[2]]],
                [CUBE_POINTS[q[0]], CUBE_POINTS[q[2]], CUBE_POINTS[q[3]]],
            ]
        })
        .collect()
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    path
}

fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes[..4].copy_from_slice(b"cube");
    bytes.extend_from_slice(&u32::try_from(triangles.len()).unwrap().to_le_bytes());
    for tri in triangles {
        bytes.extend_from_slice(&[0u8; 12]);
        for v in tri {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }
    bytes
}

fn ascii_stl(triangles: &[[[f32; 3]; 3]]) -> String {
    let mut text = String::from("solid cube\n");
    for tri in triangles {
        text.push_str("  facet normal 0 0 0\n    outer loop\n");
        for v in tri {
            text.push_str(&format!("      vertex {} {} {}\n", v[0], v[1], v[2]));
        }
        text.push_str("    endloop\n  endfacet\n");
    }
    text.push_str("endsolid cube\n");
    text
}

fn write_3mf(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (entry, content) in entries {
        zip.start_file(*entry, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

fn threemf_model(build: &str) -> String {
    let mut vertices = String::new();
    for p in CUBE_POINTS {
        vertices.push_str(&format!(
            "<vertex x=\"{}\" y=\"{}\" z=\"{}\"/>",
            p[0], p[1], p[2]
        ));
    }
    let mut triangles = String::new();
    for q in CUBE_QUADS {
        triangles.push_str(&format!(
            "<triangle v1=\"{}\" v2=\"{}\" v3=\"{}\"/><triangle v1=\"{}\" v2=\"{}\" v3=\"{}\"/>",
            q[0], q[1], q[2], q[0], q[2], q[3]
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <metadata name="Title">Cube Pair</metadata>
  <resources>
    <object id="1" type="model">
      <mesh><vertices>{vertices}</vertices><triangles>{triangles}</triangles></mesh>
    </object>
    <object id="2" type="model">
      <components>
        <component objectid="1"/>
        <component objectid="1" transform="1 0 0 0 1 0 0 0 1 10 0 0"/>
      </components>
    </object>
  </resources>
  <build>{build}</build>
</model>"#
    )
}

fn step_cube() -> String {
    let mut data = String::new();
    for (i, p) in CUBE_POINTS.iter().enumerate() {
        data.push_str(&format!(
            "#{} = CARTESIAN_POINT('', ({:.1}, {:.1}, {:.1}));\n",
            i + 1,
            p[0],
            p[1],
            p[2]
        ));
    }
    data.push_str("#40 = AXIS2_PLACEMENT_3D('', #1, $, $);\n#41 = PLANE('', #40);\n");
    for (i, q) in CUBE_QUADS.iter().enumerate() {
        let refs: Vec<String> = q.iter().map(|v| format!("#{}", v + 1)).collect();
        data.push_str(&format!(
            "#{loop_id} = POLY_LOOP('', ({}));\n#{bound} = FACE_OUTER_BOUND('', #{loop_id}, .T.);\n#{face} = FACE_SURFACE('', (#{bound}), #41, .T.);\n",
            refs.join(", "),
            loop_id = 100 + i,
            bound = 200 + i,
            face = 300 + i,
        ));
    }
    format!(
        "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''), '2;1');\nFILE_NAME('cube', '', (''), (''), '', '', '');\nFILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));\nENDSEC;\nDATA;\n{data}ENDSEC;\nEND-ISO-10303-21;\n"
    )
}

/// Every triangle of a closed unit cube faces away from its centre.
fn assert_outward_cube(model: &Model) {
    let centre = Vector3::new(0.5_f32, 0.5, 0.5);
    for t in &model.triangles {
        let c = (t.vertices[0] + t.vertices[1] + t.vertices[2]) / 3.0;
        let n = (t.vertices[1] - t.vertices[0]).cross(&(t.vertices[2] - t.vertices[0]));
        assert!(n.dot(&(c - centre)) > 0.0, "inward triangle {t:?}");
    }
}

fn assert_stats_consistent(model: &Model) {
    assert_eq!(model.stats.triangle_count, model.triangles.len());
    assert_eq!(model.stats.vertex_count, 3 * model.stats.triangle_count);
    for t in &model.triangles {
        for v in &t.vertices {
            for axis in 0..3 {
                assert!(v[axis] >= model.stats.min_bounds[axis]);
                assert!(v[axis] <= model.stats.max_bounds[axis]);
            }
        }
    }
}

// =============================================================================
// STL
// =============================================================================

#[test]
fn binary_stl_cube() {
    let dir = tempdir().unwrap();
    let bytes = binary_stl(&cube_triangles());
    assert_eq!(bytes.len(), 684);
    let path = write_file(dir.path(), "cube.stl", &bytes);

    let outcome = load_stl(&path).unwrap();
    let model = &outcome.model;
    assert_eq!(model.stats.format, MeshFormat::StlBinary);
    assert_eq!(model.triangle_count(), 12);
    assert_eq!(model.vertex_count(), 36);
    assert_eq!(model.stats.file_size, 684);
    assert_eq!(model.header.as_deref(), Some("cube"));
    assert_relative_eq!(model.stats.min_bounds, Vector3::zeros());
    assert_relative_eq!(model.stats.max_bounds, Vector3::new(1.0, 1.0, 1.0));
    assert_stats_consistent(model);
}

#[test]
fn binary_stl_size_mismatch_is_structural() {
    let dir = tempdir().unwrap();
    let mut bytes = binary_stl(&cube_triangles());
    bytes.truncate(600);
    let path = write_file(dir.path(), "short.stl", &bytes);

    let err = load_stl(&path).unwrap_err();
    assert!(matches!(err, LoadError::Structural { .. }), "{err}");
}

#[test]
fn solid_header_with_wrong_size_is_structural() {
    let dir = tempdir().unwrap();
    let mut bytes = binary_stl(&cube_triangles());
    bytes[..80].fill(0);
    bytes[..22].copy_from_slice(b"solid exported by CAD ");
    bytes.resize(600, 0);
    let path = write_file(dir.path(), "exported.stl", &bytes);

    let err = load_mesh(&path).unwrap_err();
    assert!(matches!(err, LoadError::Structural { .. }), "{err}");
}

#[test]
fn ascii_stl_cube_matches_binary() {
    let dir = tempdir().unwrap();
    let ascii = write_file(dir.path(), "a.stl", ascii_stl(&cube_triangles()).as_bytes());
    let binary = write_file(dir.path(), "b.stl", &binary_stl(&cube_triangles()));

    let a = load_mesh(&ascii).unwrap().model;
    let b = load_mesh(&binary).unwrap().model;
    assert_eq!(a.stats.format, MeshFormat::StlAscii);
    assert_eq!(a.header.as_deref(), Some("cube"));
    assert_eq!(a.triangle_count(), b.triangle_count());
    for (ta, tb) in a.triangles.iter().zip(&b.triangles) {
        assert_eq!(ta.vertices, tb.vertices);
    }
}

#[test]
fn stl_low_res_stage_is_bounded() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "cube.stl", &binary_stl(&cube_triangles()));
    let params = LoadParams::default().with_low_res_max_triangles(5);

    let outcome = ParserRegistry::new()
        .load_stage(&path, LoadingState::LowResGeometry, &params, None, None)
        .unwrap();
    assert!(outcome.model.triangle_count() <= 5);
    assert!(outcome.model.triangle_count() > 0);
    assert_eq!(outcome.model.loading_state, LoadingState::LowResGeometry);
    assert!(outcome.has_warning(WarningKind::Subsampled));
}

// =============================================================================
// OBJ
// =============================================================================

#[test]
fn obj_quad_with_material() {
    let dir = tempdir().unwrap();
    write_file(
        dir.path(),
        "paint.mtl",
        b"newmtl red\nKd 1 0 0\nd 0.5\nmap_Kd red.png\n",
    );
    let path = write_file(
        dir.path(),
        "quad.obj",
        b"mtllib paint.mtl\no panel\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nusemtl red\nf 1 2 3 4\n",
    );

    let outcome = load_obj(&path).unwrap();
    let model = &outcome.model;
    assert!(!outcome.has_warnings(), "{:?}", outcome.warnings);
    assert_eq!(model.triangle_count(), 2);
    assert_eq!(model.header.as_deref(), Some("panel"));
    let material = model.material_for(1).unwrap();
    assert_eq!(material.name, "red");
    assert_relative_eq!(material.dissolve, 0.5);
    for t in &model.triangles {
        assert_relative_eq!(t.normal, Vector3::new(0.0, 0.0, 1.0));
    }
}

#[test]
fn obj_without_faces_is_empty() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "points.obj", b"v 0 0 0\nv 1 0 0\nv 0 1 0\n");

    let outcome = load_obj(&path).unwrap();
    assert_eq!(outcome.model.triangle_count(), 0);
    assert!(outcome.model.is_empty());
    assert_relative_eq!(outcome.model.stats.min_bounds, Vector3::zeros());
}

#[test]
fn obj_bad_index_reports_line() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "bad.obj", b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n");

    match load_obj(&path).unwrap_err() {
        LoadError::Parse { location, .. } => {
            assert_eq!(location, mesh_loader::Location::Line(4));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// 3MF
// =============================================================================

#[test]
fn threemf_components_are_transformed() {
    let dir = tempdir().unwrap();
    let model_xml = threemf_model(r#"<item objectid="2" transform="1 0 0 0 1 0 0 0 1 0 0 5"/>"#);
    let path = write_3mf(
        dir.path(),
        "pair.3mf",
        &[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("3D/3dmodel.model", &model_xml),
        ],
    );

    let outcome = load_3mf(&path).unwrap();
    let model = &outcome.model;
    assert_eq!(model.header.as_deref(), Some("Cube Pair"));
    assert_eq!(model.triangle_count(), 24);
    assert_relative_eq!(model.stats.min_bounds, Vector3::new(0.0, 0.0, 5.0));
    assert_relative_eq!(model.stats.max_bounds, Vector3::new(11.0, 1.0, 6.0));
    assert_stats_consistent(model);
}

#[test]
fn threemf_detected_without_extension() {
    let dir = tempdir().unwrap();
    let model_xml = threemf_model(r#"<item objectid="1"/>"#);
    let path = write_3mf(
        dir.path(),
        "archive.bin",
        &[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("3D/3dmodel.model", &model_xml),
        ],
    );

    let outcome = load_mesh(&path).unwrap();
    assert_eq!(outcome.model.stats.format, MeshFormat::ThreeMf);
    assert_eq!(outcome.model.triangle_count(), 12);
    assert_outward_cube(&outcome.model);
}

#[test]
fn threemf_missing_model_entry_is_structural() {
    let dir = tempdir().unwrap();
    let path = write_3mf(
        dir.path(),
        "empty.3mf",
        &[("[Content_Types].xml", CONTENT_TYPES)],
    );

    let err = load_3mf(&path).unwrap_err();
    assert!(matches!(err, LoadError::Structural { .. }), "{err}");
}

// =============================================================================
// STEP
// =============================================================================

#[test]
fn step_cube_from_poly_loops() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "cube.step", step_cube().as_bytes());

    let outcome = load_step(&path).unwrap();
    let model = &outcome.model;
    assert!(!outcome.has_warnings(), "{:?}", outcome.warnings);
    assert_eq!(model.header.as_deref(), Some("cube"));
    assert_eq!(model.triangle_count(), 12);
    assert_outward_cube(model);
    assert_stats_consistent(model);
}

#[test]
fn step_without_header_is_structural() {
    let dir = tempdir().unwrap();
    let text = step_cube().replacen("ISO-10303-21;\n", "", 1);
    let path = write_file(dir.path(), "headless.stp", text.as_bytes());

    let err = load_mesh(&path).unwrap_err();
    assert!(matches!(err, LoadError::Structural { .. }), "{err}");
}

#[test]
fn step_dangling_face_is_skipped() {
    let dir = tempdir().unwrap();
    let text = step_cube().replace("#100 = POLY_LOOP('', (#1,", "#100 = POLY_LOOP('', (#999,");
    let path = write_file(dir.path(), "dangling.step", text.as_bytes());

    let outcome = load_step(&path).unwrap();
    assert_eq!(outcome.model.triangle_count(), 10);
    assert!(outcome.has_warning(WarningKind::UnresolvedReference));
}

// =============================================================================
// Progress, cancellation, concurrency
// =============================================================================

#[test]
fn progress_is_monotonic_and_completes() {
    let dir = tempdir().unwrap();
    let many: Vec<_> = std::iter::repeat(cube_triangles()).take(50).flatten().collect();
    let path = write_file(dir.path(), "many.stl", &binary_stl(&many));

    let seen = RefCell::new(Vec::new());
    let sink = |percent: u8, _: &str| seen.borrow_mut().push(percent);
    let params = LoadParams::default().with_progress_interval(16);

    ParserRegistry::new()
        .load(&path, &params, Some(&sink), None)
        .unwrap();

    let seen = seen.into_inner();
    assert!(seen.len() > 2);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[test]
fn cancellation_during_parse() {
    let dir = tempdir().unwrap();
    let many: Vec<_> = std::iter::repeat(cube_triangles()).take(100).flatten().collect();
    let path = write_file(dir.path(), "many.stl", &binary_stl(&many));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |_: u8, _: &str| trigger.cancel();
    let params = LoadParams::default().with_progress_interval(16);

    let err = ParserRegistry::new()
        .load(&path, &params, Some(&sink), Some(&cancel))
        .unwrap_err();
    assert!(matches!(err, LoadError::Cancelled));
}

/// Load `path` with a sink that cancels on the first report of `phase`.
/// Returns the error and every message the sink saw.
fn cancel_during(path: &Path, phase: &'static str, interval: usize) -> (LoadError, Vec<String>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let seen = RefCell::new(Vec::new());
    let sink = |_: u8, message: &str| {
        seen.borrow_mut().push(message.to_string());
        if message == phase {
            trigger.cancel();
        }
    };
    let params = LoadParams::default().with_progress_interval(interval);

    let err = ParserRegistry::new()
        .load(path, &params, Some(&sink), Some(&cancel))
        .unwrap_err();
    (err, seen.into_inner())
}

#[test]
fn obj_cancellation_during_parse() {
    let dir = tempdir().unwrap();
    let mut obj = String::new();
    for i in 0..200 {
        obj.push_str(&format!("v {i} 0 0\nv {i} 1 0\nv {i} 0 1\n"));
        obj.push_str(&format!("f {} {} {}\n", 3 * i + 1, 3 * i + 2, 3 * i + 3));
    }
    let path = write_file(dir.path(), "strip.obj", obj.as_bytes());

    let (err, seen) = cancel_during(&path, "Reading OBJ", 16);
    assert!(matches!(err, LoadError::Cancelled), "{err}");
    assert!(!seen.iter().any(|m| m == "OBJ loaded"));
}

#[test]
fn threemf_cancellation_while_reading_document() {
    let dir = tempdir().unwrap();
    let model = threemf_model(r#"<item objectid="2"/>"#);
    let path = write_3mf(
        dir.path(),
        "read.3mf",
        &[("[Content_Types].xml", CONTENT_TYPES), ("3D/3dmodel.model", &model)],
    );

    let (err, seen) = cancel_during(&path, "Reading 3MF model", 2);
    assert!(matches!(err, LoadError::Cancelled), "{err}");
    assert!(!seen.iter().any(|m| m == "Resolving 3MF build"));
}

#[test]
fn threemf_cancellation_while_resolving_build() {
    let dir = tempdir().unwrap();
    let items = r#"<item objectid="2"/>"#.repeat(40);
    let model = threemf_model(&items);
    let path = write_3mf(
        dir.path(),
        "resolve.3mf",
        &[("[Content_Types].xml", CONTENT_TYPES), ("3D/3dmodel.model", &model)],
    );

    let (err, seen) = cancel_during(&path, "Resolving 3MF build", 1);
    assert!(matches!(err, LoadError::Cancelled), "{err}");
    assert!(seen.iter().any(|m| m == "Reading 3MF model"));
    assert_eq!(seen.last().map(String::as_str), Some("Resolving 3MF build"));
}

#[test]
fn step_cancellation_while_reading_entities() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "read.step", step_cube().as_bytes());

    let (err, seen) = cancel_during(&path, "Reading STEP entities", 2);
    assert!(matches!(err, LoadError::Cancelled), "{err}");
    assert!(!seen.iter().any(|m| m == "Triangulating STEP faces"));
}

#[test]
fn step_cancellation_while_triangulating() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "faces.step", step_cube().as_bytes());

    let (err, seen) = cancel_during(&path, "Triangulating STEP faces", 1);
    assert!(matches!(err, LoadError::Cancelled), "{err}");
    assert!(seen.iter().any(|m| m == "Reading STEP entities"));
    assert_eq!(seen.last().map(String::as_str), Some("Triangulating STEP faces"));
}

#[test]
fn cancelled_before_start() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "cube.step", step_cube().as_bytes());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ParserRegistry::new()
        .load(&path, &LoadParams::default(), None, Some(&cancel))
        .unwrap_err();
    assert!(matches!(err, LoadError::Cancelled));
}

#[test]
fn concurrent_loads_share_a_registry() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write_file(dir.path(), "cube.stl", &binary_stl(&cube_triangles())),
        write_file(dir.path(), "cube_ascii.stl", ascii_stl(&cube_triangles()).as_bytes()),
        write_file(dir.path(), "cube.step", step_cube().as_bytes()),
        write_file(
            dir.path(),
            "quad.obj",
            b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        ),
    ];
    let registry = ParserRegistry::new();
    let params = LoadParams::default();

    let counts: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| {
                let registry = &registry;
                let params = &params;
                scope.spawn(move || {
                    registry
                        .load(path, params, None, None)
                        .unwrap()
                        .model
                        .triangle_count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(counts, vec![12, 12, 12, 2]);
}

#[test]
fn progressive_loader_walks_stages() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "cube.stl", &binary_stl(&cube_triangles()));
    let registry = ParserRegistry::new();
    let params = LoadParams::default().with_low_res_max_triangles(4);
    let mut loader = ProgressiveLoader::new(&registry, &path, params);

    let mut states = Vec::new();
    while let Some(state) = loader.advance(None, None).unwrap() {
        states.push(state);
        let model = loader.model().unwrap();
        assert_eq!(model.stats.vertex_count, 3 * model.stats.triangle_count);
    }
    assert_eq!(
        states,
        vec![
            LoadingState::MetadataOnly,
            LoadingState::LowResGeometry,
            LoadingState::FullGeometry,
        ]
    );
    assert_eq!(loader.model().unwrap().triangle_count(), 12);
}
