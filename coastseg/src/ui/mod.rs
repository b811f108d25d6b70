pub mod exception_handler;
pub mod session;

use anyhow::Result;
use log::info;
use std::path::PathBuf;

use crate::collect::settings::SettingsUpdate;
use crate::geometric::preprocess::FeatureKind;
use crate::geometric::shorelines::remove_extracted_shorelines;
use exception_handler::handle_exception;
pub use session::Session;

/// One button of the map UI
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SaveSettings(SettingsUpdate),
    ViewSettings,
    SaveConfig { dir: Option<PathBuf> },
    LoadConfigs { path: PathBuf },
    LoadFeature { kind: FeatureKind, path: PathBuf },
    SaveFeature { kind: FeatureKind, dir: Option<PathBuf> },
    RemoveFeature { kind: FeatureKind },
    RemoveAll,
    FilterImages { directory: PathBuf, roi_id: Option<String> },
    RemoveShorelines { session_dir: PathBuf, items: Vec<String> },
    ComputeArea { roi_id: Option<String> },
}

impl Action {
    pub fn title(&self) -> String {
        match self {
            Action::SaveSettings(_) => "Save Settings".to_string(),
            Action::ViewSettings => "View Settings".to_string(),
            Action::SaveConfig { .. } => "Save Config".to_string(),
            Action::LoadConfigs { .. } => "Load Config".to_string(),
            Action::LoadFeature { kind, .. } => format!("Load {}", kind),
            Action::SaveFeature { kind, .. } => format!("Save {}", kind),
            Action::RemoveFeature { kind } => format!("Remove {}", kind),
            Action::RemoveAll => "Remove All".to_string(),
            Action::FilterImages { .. } => "Filter Images".to_string(),
            Action::RemoveShorelines { .. } => "Remove Shorelines".to_string(),
            Action::ComputeArea { .. } => "ROI Area".to_string(),
        }
    }

    /// Whether the session must be written back after the action succeeds
    pub fn changes_session(&self) -> bool {
        matches!(
            self,
            Action::SaveSettings(_)
                | Action::LoadConfigs { .. }
                | Action::LoadFeature { .. }
                | Action::RemoveFeature { .. }
                | Action::RemoveAll
        )
    }
}

/// Result of one action as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub title: String,
    pub success: bool,
    pub message: String,
}

fn dispatch(session: &mut Session, action: Action) -> Result<String> {
    let persist = action.changes_session();
    let message = match action {
        Action::SaveSettings(update) => {
            session.save_settings(update)?;
            "Settings saved".to_string()
        }
        Action::ViewSettings => session.settings.summary()?,
        Action::SaveConfig { dir } => {
            let (gdf_path, json_path) = session.save_config(dir.as_deref())?;
            format!("Saved {} and {}", gdf_path.display(), json_path.display())
        }
        Action::LoadConfigs { path } => {
            let count = session.load_configs(&path)?;
            format!("Loaded {} ROIs from {}", count, path.display())
        }
        Action::LoadFeature { kind, path } => {
            let count = session.load_feature(kind, &path)?;
            format!("Loaded {} {} features", count, kind)
        }
        Action::SaveFeature { kind, dir } => {
            let path = session.save_feature(kind, dir.as_deref())?;
            format!("Saved {} to {}", kind, path.display())
        }
        Action::RemoveFeature { kind } => match session.remove_feature(kind) {
            Some(_) => format!("Removed {}", kind),
            None => format!("No {} on the map", kind),
        },
        Action::RemoveAll => {
            session.remove_all();
            "Removed all features from the map".to_string()
        }
        Action::FilterImages { directory, roi_id } => {
            let bad = session.filter_images(&directory, roi_id.as_deref())?;
            format!("Moved {} partial images out of {}", bad.len(), directory.display())
        }
        Action::RemoveShorelines { session_dir, items } => {
            let report = remove_extracted_shorelines(&session_dir, &items)?;
            format!(
                "Removed {} shorelines ({} feature rows, {} time series files, {} images)",
                items.len(),
                report.frame_rows,
                report.csv_files,
                report.jpgs_deleted
            )
        }
        Action::ComputeArea { roi_id } => {
            let area = session.roi_area_km2(roi_id.as_deref())?;
            format!("ROI area: {:.3} km²", area)
        }
    };
    if persist {
        session.persist()?;
    }
    Ok(message)
}

/// Run one action inside the error boundary: every failure becomes an `Outcome`
pub fn run_action(session: &mut Session, action: Action) -> Outcome {
    let title = action.title();
    info!("{}: started", title);
    match dispatch(session, action) {
        Ok(message) => {
            info!("{}: done", title);
            Outcome {
                title,
                success: true,
                message,
            }
        }
        Err(err) => {
            let message = handle_exception(&err, Some(&title), None);
            Outcome {
                title,
                success: false,
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_action_reports_failure() {
        let dir = tempdir().unwrap();
        let mut session = Session::open(dir.path()).unwrap();
        let outcome = run_action(&mut session, Action::ComputeArea { roi_id: None });
        assert!(!outcome.success);
        assert_eq!(outcome.title, "ROI Area");
        assert!(outcome.message.starts_with("ROI Area: "));
    }

    #[test]
    fn test_run_action_save_settings() {
        let dir = tempdir().unwrap();
        let mut session = Session::open(dir.path()).unwrap();
        let outcome = run_action(
            &mut session,
            Action::SaveSettings(SettingsUpdate {
                sat_list: Some(vec!["S2".into()]),
                ..SettingsUpdate::default()
            }),
        );
        assert!(outcome.success, "{}", outcome.message);

        let outcome = run_action(&mut session, Action::ViewSettings);
        assert!(outcome.message.contains("sat_list: [\"S2\"]"));

        let outcome = run_action(
            &mut session,
            Action::SaveSettings(SettingsUpdate {
                sat_list: Some(vec![]),
                ..SettingsUpdate::default()
            }),
        );
        assert!(!outcome.success);
        assert!(outcome.message.contains("Must select at least one satellite first"));
        assert_eq!(Session::open(dir.path()).unwrap().settings.sat_list, vec!["S2"]);
    }

    #[test]
    fn test_open_failure_is_rendered() {
        let dir = tempdir().unwrap();
        let session_dir = dir.path().join("session");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(session_dir.join("settings.json"), "{not json").unwrap();

        let err = Session::open(dir.path()).unwrap_err();
        let rendered = handle_exception(&err, Some("Open Session"), None);
        assert!(rendered.starts_with("Open Session: "));
        assert!(rendered.contains("settings.json"));
    }

    #[test]
    fn test_remove_feature_titles() {
        assert_eq!(
            Action::RemoveFeature { kind: FeatureKind::Bbox }.title(),
            "Remove Bounding Box"
        );
        assert!(Action::RemoveAll.changes_session());
        assert!(!Action::ViewSettings.changes_session());
    }
}
