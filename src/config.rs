// Runtime settings: every tunable of the import run lives here with a
// sensible default. Only two values can be overridden from the
// environment, the rest are fixed for the cluster admin API.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the directory searched for pipeline files.
pub const DIR_ENV: &str = "PIPELINES_DIR";
/// Environment variable overriding how many attempts an upload gets.
pub const RETRY_ENV: &str = "PIPELINES_RETRY";

/// Settings shared by the uploader and the interactive flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the template and pipeline files.
    pub work_dir: PathBuf,
    /// Maximum number of attempts for a single upload.
    pub retry_bound: u32,
    /// Fixed pause after a retryable failure.
    pub retry_delay: Duration,
    /// Timeout for the health check and delete requests.
    pub check_timeout: Duration,
    /// Timeout for each upload request.
    pub upload_timeout: Duration,
    /// Glob for index templates, always uploaded first.
    pub template_pattern: String,
    /// Glob for ingest pipelines, uploaded only when the user opts in.
    pub pipeline_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            work_dir: PathBuf::from("."),
            retry_bound: 4,
            retry_delay: Duration::from_secs(5),
            check_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(10),
            template_pattern: "template_corelight*".into(),
            pipeline_pattern: "corelight*".into(),
        }
    }
}

impl Settings {
    /// Build settings from the process environment, see [`Settings::from_vars`].
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build settings from a variable lookup. Unset variables keep their
    /// default; a retry bound that is not a positive integer is ignored.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(dir) = lookup(DIR_ENV).filter(|d| !d.trim().is_empty()) {
            settings.work_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(RETRY_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => settings.retry_bound = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", RETRY_ENV),
            }
        }
        settings
    }
}
