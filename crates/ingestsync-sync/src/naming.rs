//! Project-user folder naming patterns

use ingestsync_types::{Error, Result};
use regex::Regex;

/// Project and user parsed from a folder name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectUser<'a> {
    /// Project name, used to find the destination
    pub project: &'a str,
    /// User name, used as the destination subfolder
    pub user: &'a str,
}

/// Compiled folder naming pattern with `project` and `user` named groups
#[derive(Debug, Clone)]
pub struct FolderPattern {
    regex: Regex,
}

impl FolderPattern {
    /// Compile a pattern, checking it exposes the required groups
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::naming(format!("Invalid folder pattern '{}': {}", pattern, e)))?;

        for group in ["project", "user"] {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(Error::naming(format!(
                    "Folder pattern '{}' has no `{}` group",
                    pattern, group
                )));
            }
        }

        Ok(Self { regex })
    }

    /// Parse a folder name, or `None` when it does not follow the convention
    pub fn parse<'a>(&self, folder_name: &'a str) -> Option<ProjectUser<'a>> {
        let captures = self.regex.captures(folder_name)?;
        let project = captures.name("project")?.as_str();
        let user = captures.name("user")?.as_str();
        if !is_plain_name(project) || !is_plain_name(user) {
            return None;
        }
        Some(ProjectUser { project, user })
    }

    /// The source pattern
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Names become path segments, so `.` and `..` would escape the destination.
fn is_plain_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..")
}
