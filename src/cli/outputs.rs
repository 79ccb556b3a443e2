//! Action outputs and workflow commands
//!
//! Outputs are appended to the file named by `$GITHUB_OUTPUT`. Outside a
//! runner they are printed as `name=value` lines instead.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::github::PromotedPullRequest;

const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";
const MULTILINE_DELIMITER: &str = "ghadelimiter_promote";

/// Ordered set of outputs for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutputs {
    entries: Vec<(String, String)>,
}

impl ActionOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs describing a promotion pull request
    pub fn for_pull_request(pr: &PromotedPullRequest) -> Self {
        let mut outputs = Self::new();
        outputs.set("pull-request-number", pr.number);
        outputs.set("pull-request-url", &pr.html_url);
        outputs.set("pull-request-operation", pr.action);
        outputs.set("pull-request-created", pr.created);
        outputs.set("pull-request-head-sha", &pr.head_sha);
        outputs.set("pull-request-merged", pr.merged);
        outputs
    }

    /// Set (or replace) an output
    pub fn set(&mut self, name: &str, value: impl Display) {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Output file content
    pub fn render(&self) -> String {
        let mut content = String::new();
        for (name, value) in &self.entries {
            if value.contains('\n') {
                content.push_str(&format!(
                    "{}<<{}\n{}\n{}\n",
                    name, MULTILINE_DELIMITER, value, MULTILINE_DELIMITER
                ));
            } else {
                content.push_str(&format!("{}={}\n", name, value));
            }
        }
        content
    }

    /// Append to `$GITHUB_OUTPUT`, or print when it is not set
    pub fn write(&self) -> Result<()> {
        match std::env::var_os(GITHUB_OUTPUT_ENV).filter(|p| !p.is_empty()) {
            Some(path) => self.write_to(Path::new(&path)),
            None => {
                print!("{}", self.render());
                Ok(())
            }
        }
    }

    /// Append to an output file
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.render().as_bytes())?;
        debug!(path = %path.display(), count = self.entries.len(), "wrote action outputs");
        Ok(())
    }
}

/// `::error::` workflow command for a message
pub fn error_annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{}", escaped)
}
