//! Run settings: built-in defaults, then an optional RON file, then flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mirror_core::JobOptions;
use mirror_engine::MirrorConfig;
use serde::{Deserialize, Serialize};

use crate::cli::MirrorArgs;

const DEFAULT_OUTPUT: &str = "output";

/// Every field is optional; missing fields keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub output: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub redirect_limit: Option<usize>,
    pub user_agent: Option<String>,
    pub send_referer: Option<bool>,
    pub max_css_depth: Option<usize>,
    pub preview: Option<bool>,
    pub ignore_ssl: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub output_root: PathBuf,
    pub options: JobOptions,
    pub config: MirrorConfig,
}

pub fn load(path: &Path) -> anyhow::Result<FileSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    ron::from_str(&content).with_context(|| format!("failed to parse settings in {}", path.display()))
}

pub fn resolve(file: FileSettings, args: &MirrorArgs) -> RunSettings {
    let defaults = MirrorConfig::default();
    let config = MirrorConfig {
        max_concurrent: args
            .concurrency
            .or(file.concurrency)
            .unwrap_or(defaults.max_concurrent)
            .max(1),
        connect_timeout: file
            .connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout),
        read_timeout: args
            .timeout
            .or(file.read_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.read_timeout),
        redirect_limit: file.redirect_limit.unwrap_or(defaults.redirect_limit),
        user_agent: args
            .user_agent
            .clone()
            .or(file.user_agent)
            .unwrap_or(defaults.user_agent),
        send_referer: !args.no_referer && file.send_referer.unwrap_or(defaults.send_referer),
        max_css_depth: file.max_css_depth.unwrap_or(defaults.max_css_depth),
    };

    RunSettings {
        output_root: args
            .output
            .clone()
            .or(file.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        options: JobOptions {
            preview: args.preview || file.preview.unwrap_or(false),
            ignore_ssl: args.ignore_ssl || file.ignore_ssl.unwrap_or(false),
        },
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::{load, resolve, FileSettings};
    use crate::cli::MirrorArgs;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn args() -> MirrorArgs {
        MirrorArgs {
            url: "https://example.com".into(),
            product: "Acme".into(),
            ..MirrorArgs::default()
        }
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let settings = resolve(FileSettings::default(), &args());
        assert_eq!(settings.output_root, PathBuf::from("output"));
        assert_eq!(settings.config.max_concurrent, 10);
        assert_eq!(settings.config.max_css_depth, 3);
        assert!(settings.config.send_referer);
        assert!(!settings.options.preview);
    }

    #[test]
    fn flags_override_file_values() {
        let file = FileSettings {
            output: Some("from-file".into()),
            concurrency: Some(3),
            read_timeout_secs: Some(5),
            user_agent: Some("file-agent".into()),
            ignore_ssl: Some(true),
            ..FileSettings::default()
        };
        let flags = MirrorArgs {
            concurrency: Some(8),
            no_referer: true,
            ..args()
        };

        let settings = resolve(file, &flags);
        assert_eq!(settings.output_root, PathBuf::from("from-file"));
        assert_eq!(settings.config.max_concurrent, 8);
        assert_eq!(settings.config.read_timeout, Duration::from_secs(5));
        assert_eq!(settings.config.user_agent, "file-agent");
        assert!(!settings.config.send_referer);
        assert!(settings.options.ignore_ssl);
    }

    #[test]
    fn loads_partial_ron_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.ron");
        fs::write(&path, "(concurrency: Some(2), max_css_depth: Some(1))").unwrap();

        let file = load(&path).unwrap();
        assert_eq!(file.concurrency, Some(2));
        assert_eq!(file.max_css_depth, Some(1));
        assert_eq!(file.output, None);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.ron");
        fs::write(&path, "(concurrency: ").unwrap();

        let err = load(&path).unwrap_err();
        assert!(format!("{err}").contains("broken.ron"));
    }
}
