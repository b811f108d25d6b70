// Example: Building a CoastSeg config from GeoJSON layers
// This example loads ROIs and a bounding box, saves settings and writes
// config_gdf.geojson + config.json, then loads the config in a fresh session
use anyhow::Result;
use coastseg::collect::settings::SettingsUpdate;
use coastseg::geometric::preprocess::FeatureKind;
use coastseg::ui::{run_action, Action, Session};
use std::fs;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Example: config from GeoJSON ===\n");

    let workspace = std::env::temp_dir().join("coastseg_example");
    fs::create_dir_all(&workspace)?;

    // Two ROIs along the coast of Santa Cruz
    let rois_path = workspace.join("rois.geojson");
    fs::write(
        &rois_path,
        r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"ID": "sc_1"},
                "geometry": {"type": "Polygon", "coordinates": [[
                    [-122.05, 36.95], [-122.0, 36.95], [-122.0, 36.99], [-122.05, 36.99], [-122.05, 36.95]
                ]]}
            },
            {
                "type": "Feature",
                "properties": {"ID": "sc_2"},
                "geometry": {"type": "Polygon", "coordinates": [[
                    [-122.0, 36.95], [-121.95, 36.95], [-121.95, 36.99], [-122.0, 36.99], [-122.0, 36.95]
                ]]}
            }
        ]
    }"#,
    )?;

    let bbox_path = workspace.join("bbox.geojson");
    fs::write(
        &bbox_path,
        r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[
                [-122.1, 36.9], [-121.9, 36.9], [-121.9, 37.0], [-122.1, 37.0], [-122.1, 36.9]
            ]]}
        }]
    }"#,
    )?;

    let mut session = Session::open(workspace.join("map"))?;
    let actions = vec![
        Action::SaveSettings(SettingsUpdate {
            sat_list: Some(vec!["L8".into(), "L9".into(), "S2".into()]),
            dates: Some(vec!["2022-01-01".into(), "2022-12-31".into()]),
            cloud_thresh: Some(0.3),
            ..SettingsUpdate::default()
        }),
        Action::LoadFeature {
            kind: FeatureKind::Rois,
            path: rois_path,
        },
        Action::LoadFeature {
            kind: FeatureKind::Bbox,
            path: bbox_path,
        },
        Action::ComputeArea {
            roi_id: Some("sc_1".into()),
        },
        Action::SaveConfig {
            dir: Some(workspace.join("config")),
        },
        Action::ViewSettings,
    ];

    for action in actions {
        let outcome = run_action(&mut session, action);
        println!("[{}] {}", outcome.title, outcome.message);
        if !outcome.success {
            return Ok(());
        }
    }

    println!("\n=== Loading the config in a new session ===\n");
    let mut fresh = Session::open(workspace.join("fresh"))?;
    let outcome = run_action(
        &mut fresh,
        Action::LoadConfigs {
            path: workspace.join("config"),
        },
    );
    println!("[{}] {}", outcome.title, outcome.message);
    for (roi_id, roi) in &fresh.roi_settings {
        println!("  {} -> {} ({} satellites)", roi_id, roi.sitename, roi.sat_list.len());
    }

    Ok(())
}
