//! Visualization tool config generation.
//!
//! `rviz/template_config.rviz` holds a full display config with the token
//! `TEMPLATE_TO_FILL` where the marker displays belong.  The filled-in copy
//! is written next to it as `rviz/current_rviz.rviz`.

use std::fs;
use std::path::{Path, PathBuf};

use jointmark_types::JointError;
use tracing::info;

pub const TEMPLATE_TOKEN: &str = "TEMPLATE_TO_FILL";

pub fn template_path(package: &Path) -> PathBuf {
    package.join("rviz").join("template_config.rviz")
}

pub fn output_path(package: &Path) -> PathBuf {
    package.join("rviz").join("current_rviz.rviz")
}

/// Substitute `fragments` for every occurrence of the token.
pub fn render(template: &str, fragments: &str) -> String {
    template.replace(TEMPLATE_TOKEN, fragments)
}

/// Fill the package's template and write the result.  Returns the output
/// path.
///
/// # Errors
///
/// [`JointError::Io`] when the template cannot be read or the output cannot
/// be written.
pub fn write_config(package: &Path, fragments: &str) -> Result<PathBuf, JointError> {
    let template_path = template_path(package);
    let template = fs::read_to_string(&template_path).map_err(|e| {
        JointError::Io(format!("failed to read {}: {e}", template_path.display()))
    })?;

    let out = output_path(package);
    fs::write(&out, render(&template, fragments))
        .map_err(|e| JointError::Io(format!("failed to write {}: {e}", out.display())))?;
    info!(path = %out.display(), "visualization config created");
    Ok(out)
}
