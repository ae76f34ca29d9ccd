//! Export mode against scene and material files on disk.
//!
//! Run with: cargo test --test export_dump

use std::fs;

use evertims_bridge::export::export_scene;
use evertims_bridge::memory_scene::MemoryScene;
use evertims_bridge::SessionConfig;

const SCENE: &str = r#"{
    "groups": { "Room": ["Walls"] },
    "objects": {
        "Walls": {
            "mesh": {
                "vertices": [[0, 0, 0], [2, 0, 0], [2, 0, 3], [0, 0, 3]],
                "faces": [{ "indices": [0, 1, 2, 3] }]
            },
            "materials": ["Plaster"]
        },
        "Speaker": { "position": [0.5, 1.0, 1.25] },
        "Head": { "position": [1.5, 1.0, 1.7], "scale": [2, 2, 2] }
    }
}"#;

const MATERIALS: &str = r#"{
    "Plaster": { "frequencies": [125, 500, 2000], "absorption": [0.013, 0.02, 0.04] }
}"#;

#[test]
fn test_export_dump_is_replayable_text() {
    let dir = tempfile::tempdir().unwrap();
    let scene_path = dir.path().join("scene.json");
    let materials_path = dir.path().join("materials.json");
    let out = dir.path().join("evert-export.txt");
    fs::write(&scene_path, SCENE).unwrap();
    fs::write(&materials_path, MATERIALS).unwrap();

    let config = SessionConfig {
        room_group: Some("Room".to_string()),
        source_object: Some("Speaker".to_string()),
        listener_object: Some("Head".to_string()),
        material_file: Some(materials_path),
        ..SessionConfig::default()
    };
    let mut scene = MemoryScene::load(&scene_path).unwrap();
    export_scene(&config, None, &mut scene, &out).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        &lines[..6],
        &[
            "/order 2",
            "/air 1",
            "/soundvelocity 343.0",
            "/source/1/spawn",
            "/listener/1/spawn",
            "/room/spawn",
        ]
    );
    assert!(lines.contains(&"/source/1/transform/matrix 1.0 0.0 0.0 0.0 0.0 1.0 0.0 0.0 0.0 0.0 1.0 0.0 0.5 1.0 1.25 1.0"));
    // Listener scale is dropped from the matrix
    assert!(lines.contains(&"/listener/1/transform/matrix 1.0 0.0 0.0 0.0 0.0 1.0 0.0 0.0 0.0 0.0 1.0 0.0 1.5 1.0 1.7 1.0"));
    assert!(lines.contains(&"/room/face/1/triangles/xyz 0.0 0.0 0.0 2.0 0.0 0.0 2.0 0.0 3.0"));
    assert!(lines.contains(&"/room/face/2/triangles/xyz 2.0 0.0 3.0 0.0 0.0 3.0 0.0 0.0 0.0"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("/room/face/") && l.ends_with("Plaster")).count(), 2);
    assert_eq!(lines.last(), Some(&"/room/defineover"));

    assert!(lines.iter().all(|l| !l.contains("dsp") && !l.contains("destroy")));
}

#[test]
fn test_export_without_material_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let scene_path = dir.path().join("scene.json");
    fs::write(&scene_path, SCENE).unwrap();

    let config = SessionConfig {
        room_group: Some("Room".to_string()),
        source_object: Some("Speaker".to_string()),
        listener_object: Some("Head".to_string()),
        ..SessionConfig::default()
    };
    let mut scene = MemoryScene::load(&scene_path).unwrap();
    let err = export_scene(&config, None, &mut scene, dir.path().join("out.txt")).unwrap_err();
    assert!(err.to_string().contains("material"));
}
