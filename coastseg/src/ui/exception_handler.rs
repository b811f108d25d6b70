use crate::commons::errors::{find_coastseg_error, CoastsegError};

/// Extra advice for the errors a user can fix on their own
fn tailored_message(err: &anyhow::Error) -> Option<String> {
    match find_coastseg_error(err)? {
        CoastsegError::DirectoryNotFound(path) => Some(format!(
            "The directory {} does not exist. Download the ROI imagery or pick another directory.",
            path.display()
        )),
        CoastsegError::FileNotFound(path) => {
            Some(format!("Could not find {}. Check the path and try again.", path.display()))
        }
        CoastsegError::InvalidCrs(_) => {
            Some("Use a valid EPSG code, for example 4326 or 32610.".to_string())
        }
        CoastsegError::EmptyFrame(what) => Some(format!("Load the {} before trying again.", what)),
        CoastsegError::InvalidInput(_) | CoastsegError::MissingColumn(_) => None,
    }
}

/// Render an error for the user as `title: msg` followed by its causes, and log it.
/// `msg` defaults to the tailored advice for the error, then to the error itself.
pub fn handle_exception(err: &anyhow::Error, title: Option<&str>, msg: Option<&str>) -> String {
    let title = title.unwrap_or("Error");
    let (msg, skip) = match msg.map(str::to_string).or_else(|| tailored_message(err)) {
        Some(msg) => (msg, 0),
        // the outermost error is the headline
        None => (err.to_string(), 1),
    };

    let mut lines = vec![format!("{}: {}", title, msg)];
    lines.extend(
        err.chain()
            .skip(skip)
            .map(|cause| format!("  caused by: {}", cause)),
    );
    let rendered = lines.join("\n");
    log::error!("{}", rendered);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};
    use std::path::PathBuf;

    #[test]
    fn test_handle_exception_defaults() {
        let err = anyhow!("something broke");
        let rendered = handle_exception(&err, None, None);
        assert_eq!(rendered, "Error: something broke");

        let err = anyhow!("disk full").context("Failed to save config");
        let rendered = handle_exception(&err, Some("Save Config"), None);
        assert_eq!(
            rendered,
            "Save Config: Failed to save config\n  caused by: disk full"
        );
    }

    #[test]
    fn test_handle_exception_title_and_message() {
        let err = anyhow!("disk full").context("Failed to save config");
        let rendered = handle_exception(&err, Some("Save Config"), Some("Could not save"));
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "Save Config: Could not save");
        assert_eq!(lines[1], "  caused by: Failed to save config");
        assert_eq!(lines[2], "  caused by: disk full");
    }

    #[test]
    fn test_handle_exception_tailored() {
        let result: anyhow::Result<()> =
            Err(CoastsegError::DirectoryNotFound(PathBuf::from("/data/ID_1"))).context("Filter images");
        let rendered = handle_exception(&result.unwrap_err(), Some("Filter Images"), None);
        assert!(rendered.starts_with("Filter Images: The directory /data/ID_1 does not exist."));
    }
}
