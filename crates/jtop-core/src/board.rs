//! Board identification variables (`JETSON_*`) sourced from a shell file.
//!
//! The file is shell syntax, so it is sourced by `sh` with auto-export on and
//! the resulting environment is captured. This happens once at startup; the map is
//! read-only afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Default location of the board variables file.
pub const DEFAULT_VARIABLES_FILE: &str = "/etc/jetson_easy/jetson_variables";

/// Only variables whose name contains this pattern are kept.
pub const BOARD_PATTERN: &str = "JETSON_";

pub const DESCRIPTION: &str = "JETSON_DESCRIPTION";
pub const JETPACK: &str = "JETSON_JETPACK";
pub const L4T: &str = "JETSON_L4T";

/// Read-only board identity map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    vars: BTreeMap<String, String>,
}

impl BoardInfo {
    /// Source `path` and keep the variables whose name contains `pattern`.
    ///
    /// A missing file or a failing shell is not fatal: it is logged and an
    /// empty map is returned.
    pub fn load(path: &Path, pattern: &str) -> Self {
        if !path.is_file() {
            log::error!("board variables file {} does not exist", path.display());
            return Self::default();
        }

        // `.` searches PATH for bare names, so make relative paths explicit.
        let script: PathBuf = if path.is_absolute() || path.starts_with(".") {
            path.to_path_buf()
        } else {
            Path::new(".").join(path)
        };

        let output = Command::new("sh")
            .arg("-c")
            .arg("set -a && . \"$1\" && env")
            .arg("sh")
            .arg(&script)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                let info = Self::from_env_output(&text, pattern);
                log::debug!("loaded {} board variables from {}", info.len(), path.display());
                info
            }
            Ok(out) => {
                log::error!(
                    "sourcing {} failed with status {}",
                    path.display(),
                    out.status
                );
                Self::default()
            }
            Err(e) => {
                log::error!("could not run sh to source {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Build from `env`-style `KEY=VALUE` lines.
    pub fn from_env_output(text: &str, pattern: &str) -> Self {
        let vars = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| k.contains(pattern))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Header line: `<description> - Jetpack <ver> [L4T <ver>]`.
    ///
    /// Missing parts are left out; `None` when none are known.
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(desc) = self.get(DESCRIPTION) {
            parts.push(desc.to_string());
        }
        if let Some(jetpack) = self.get(JETPACK) {
            parts.push(format!("Jetpack {jetpack}"));
        }
        let mut line = parts.join(" - ");
        if let Some(l4t) = self.get(L4T) {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!("[L4T {l4t}]"));
        }
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_output_keeps_matching_keys() {
        let text = "PATH=/usr/bin\nJETSON_L4T=32.4.3\nJETSON_DESCRIPTION = Jetson Nano \nnoise\n";
        let info = BoardInfo::from_env_output(text, BOARD_PATTERN);
        assert_eq!(info.len(), 2);
        assert_eq!(info.get(L4T), Some("32.4.3"));
        assert_eq!(info.get(DESCRIPTION), Some("Jetson Nano"));
        assert_eq!(info.get("PATH"), None);
    }

    #[test]
    fn value_may_contain_equals() {
        let info = BoardInfo::from_env_output("JETSON_X=a=b", BOARD_PATTERN);
        assert_eq!(info.get("JETSON_X"), Some("a=b"));
    }

    #[test]
    fn summary_full_and_partial() {
        let full = BoardInfo::from_pairs([
            (DESCRIPTION, "NVIDIA Jetson Nano"),
            (JETPACK, "4.4"),
            (L4T, "32.4.3"),
        ]);
        assert_eq!(
            full.summary().as_deref(),
            Some("NVIDIA Jetson Nano - Jetpack 4.4 [L4T 32.4.3]")
        );

        let partial = BoardInfo::from_pairs([(L4T, "32.4.3")]);
        assert_eq!(partial.summary().as_deref(), Some("[L4T 32.4.3]"));
        assert_eq!(BoardInfo::default().summary(), None);
    }

    #[test]
    fn missing_file_yields_empty_map() {
        let info = BoardInfo::load(Path::new("/nonexistent/jetson_variables"), BOARD_PATTERN);
        assert!(info.is_empty());
    }

    #[test]
    fn sources_shell_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "JETSON_DESCRIPTION=\"NVIDIA Jetson TX2\"").unwrap();
        writeln!(file, "export JETSON_JETPACK=4.2").unwrap();
        writeln!(file, "export OTHER_VAR=ignored").unwrap();
        file.flush().unwrap();

        let info = BoardInfo::load(file.path(), BOARD_PATTERN);
        assert_eq!(info.get(DESCRIPTION), Some("NVIDIA Jetson TX2"));
        assert_eq!(info.get(JETPACK), Some("4.2"));
        assert_eq!(info.get("OTHER_VAR"), None);
    }
}
