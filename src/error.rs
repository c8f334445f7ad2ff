// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Consistent error formatting for the drivesoft CLI.
//!
//! Failures are printed with a title, the likely causes, and numbered fixes
//! the user can try, followed by a pointer to `drivesoft --help`.

use std::fmt;

use crate::catalog::{CatalogError, LaunchError};
use crate::download::DownloadError;

/// Footer appended to every formatted error.
pub const HELP_FOOTER: &str = "Need help? Run: drivesoft --help";

/// Formats an error message with title, causes, fixes, and the help footer.
///
/// # Example
///
/// ```
/// use drivesoft::error::format_error;
///
/// let error = format_error(
///     "Package 9 not found",
///     &["The id is mistyped", "The catalog was reset"],
///     &["List packages: drivesoft catalog"],
/// );
/// assert!(error.contains("1. List packages"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_FOOTER);
    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(String::as_str).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(String::as_str).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Turn any CLI failure into an actionable message.
///
/// Known domain errors get tailored causes and fixes; everything else falls
/// back to the full context chain.
pub fn describe(err: &anyhow::Error) -> ErrorBuilder {
    if let Some(e) = err.downcast_ref::<CatalogError>() {
        return match e {
            CatalogError::NotFound(_) => ErrorBuilder::new(e.to_string())
                .cause("The id is mistyped")
                .cause("The package was published from another data directory")
                .fix("List packages: drivesoft catalog"),
            CatalogError::UnsupportedFormat(_) => ErrorBuilder::new(e.to_string())
                .cause("Only .exe, .zip and .iso packages are distributed")
                .fix("Rename or repackage the binary with a supported extension"),
        };
    }

    if let Some(e) = err.downcast_ref::<LaunchError>() {
        return match e {
            LaunchError::NotExecutable { .. } => ErrorBuilder::new(e.to_string())
                .fix("Open the downloaded archive from your download folder"),
            LaunchError::NotInstalled(id) => ErrorBuilder::new(e.to_string())
                .fix(format!("Download it: drivesoft download {}", id)),
        };
    }

    if let Some(e) = err.downcast_ref::<DownloadError>() {
        return match e {
            DownloadError::Failed { id, .. } => ErrorBuilder::new(e.to_string())
                .cause("The transfer was interrupted")
                .fix(format!("Retry: drivesoft download {}", id)),
            DownloadError::Interrupted(id) => ErrorBuilder::new(e.to_string())
                .fix(format!("Retry: drivesoft download {}", id)),
            DownloadError::InvalidItem(_) => ErrorBuilder::new(e.to_string())
                .cause("The catalog entry is corrupt")
                .fix("Inspect the catalog: drivesoft config path"),
        };
    }

    if format!("{:#}", err).contains("Timed out waiting") {
        return ErrorBuilder::new(format!("{:#}", err))
            .cause("Another drivesoft process is holding the data directory lock")
            .fix("Wait for the other process to finish and retry");
    }

    ErrorBuilder::new(format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let error = format_error("Test Error", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.contains("[✗] Test Error"));
        assert!(error.contains("  - Cause 2"));
        assert!(error.contains("  2. Fix 2"));
        assert!(error.ends_with(HELP_FOOTER));
    }

    #[test]
    fn test_empty_causes_and_fixes() {
        let error = format_error("Empty test", &[], &[]);
        assert!(!error.contains("Possible causes:"));
        assert!(!error.contains("Try these fixes:"));
    }

    #[test]
    fn test_describe_not_found() {
        let err = anyhow::Error::from(CatalogError::NotFound("9".to_string()));
        let text = describe(&err).build();
        assert!(text.contains("no package with id 9"));
        assert!(text.contains("drivesoft catalog"));
    }

    #[test]
    fn test_describe_download_failure_suggests_retry() {
        let err = anyhow::Error::from(DownloadError::Failed {
            id: "7".to_string(),
            progress: 40,
            reason: "connection dropped at 40%".to_string(),
        });
        assert!(describe(&err).to_string().contains("drivesoft download 7"));
    }

    #[test]
    fn test_describe_falls_back_to_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to write catalog");
        let text = describe(&err).build();
        assert!(text.contains("Failed to write catalog: disk full"));
    }
}
