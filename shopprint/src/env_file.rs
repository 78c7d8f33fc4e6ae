//! The `.env` file behind `shopprint config show|set|unset`.
//!
//! Only the keys in [`CONFIG_KEYS`] may be edited. Other lines, comments included, are
//! kept as they are. Every edit rewrites the whole file through a temporary sibling.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::load_config::{
    ENV_ACCESS_TOKEN, ENV_ASSET_PATH, ENV_FILES_PATH, ENV_PDF_DIR, ENV_STORE_NAME,
};

pub const CONFIG_KEYS: [&str; 5] = [
    ENV_ACCESS_TOKEN,
    ENV_ASSET_PATH,
    ENV_FILES_PATH,
    ENV_PDF_DIR,
    ENV_STORE_NAME,
];

/// Shown as `abcd****wxyz` by `config show`.
const MASKED_KEYS: [&str; 2] = [ENV_ACCESS_TOKEN, ENV_STORE_NAME];

/// Canonical spelling of a configurable key, or an error listing the valid ones.
pub fn validate_key(key: &str) -> Result<&'static str> {
    CONFIG_KEYS
        .iter()
        .copied()
        .find(|k| k.eq_ignore_ascii_case(key.trim()))
        .ok_or_else(|| {
            anyhow!(
                "Invalid configuration key: {key}. Valid keys are: {}",
                CONFIG_KEYS.join(", ")
            )
        })
}

/// First and last four characters around `****`. Short values are hidden entirely.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_.]*)\s*=")
            .expect("assignment regex is valid")
    })
}

fn assigned_key(line: &str) -> Option<&str> {
    assignment_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Quote for the dotenv parser: single quotes are literal, double quotes need escapes.
fn quote(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every assignment in the file. A missing file reads as empty.
    pub fn values(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Env file does not exist yet");
            return Ok(BTreeMap::new());
        }
        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut values = BTreeMap::new();
        for item in iter {
            let (key, value) =
                item.with_context(|| format!("Failed to parse {}", self.path.display()))?;
            values.insert(key, value);
        }
        Ok(values)
    }

    /// The configurable keys in display order, masked where sensitive. `None` when unset.
    pub fn show(&self) -> Result<Vec<(&'static str, Option<String>)>> {
        let values = self.values()?;
        Ok(CONFIG_KEYS
            .iter()
            .map(|&key| {
                let value = values.get(key).map(|v| {
                    if MASKED_KEYS.contains(&key) {
                        mask(v)
                    } else {
                        v.clone()
                    }
                });
                (key, value)
            })
            .collect())
    }

    /// Replace the key's first assignment in place, dropping any later duplicates, or
    /// append it when absent.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = validate_key(key)?;
        let line = format!("{key}={}", quote(value));

        let mut replaced = false;
        let mut lines = Vec::new();
        for existing in self.lines()? {
            if assigned_key(&existing) == Some(key) {
                if !replaced {
                    lines.push(line.clone());
                    replaced = true;
                }
                continue;
            }
            lines.push(existing);
        }
        if !replaced {
            lines.push(line);
        }

        self.write_lines(&lines)?;
        info!(key, path = %self.path.display(), "Configuration value set");
        Ok(())
    }

    /// Remove every assignment of the key. Returns whether the key was present.
    pub fn unset(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        if !self.path.exists() {
            return Ok(false);
        }
        let lines = self.lines()?;
        let before = lines.len();
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|l| assigned_key(l) != Some(key))
            .collect();
        let removed = kept.len() != before;
        if removed {
            self.write_lines(&kept)?;
            info!(key, path = %self.path.display(), "Configuration value unset");
        }
        Ok(removed)
    }

    fn lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        for line in lines {
            writeln!(staged, "{line}")?;
        }
        staged
            .persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}
