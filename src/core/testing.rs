//! File-backed git fake for auth tests
//!
//! Config files hold one `key=value` line per value. The global file follows
//! the `HOME` override the same way spawned git processes would.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::git::GitCommandManager;
use crate::error::{ActionError, Result};

static SET_CMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"git config --local(?: --add)? '([^']+)' '([^']*)'").unwrap());
static UNSET_CMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"--unset-all '([^']+)'").unwrap());

pub(crate) struct FakeGit {
    pub workdir: PathBuf,
    pub default_home: PathBuf,
    pub env: BTreeMap<String, String>,
    pub submodule_configs: Vec<PathBuf>,
    pub foreach_log: RefCell<Vec<(String, bool)>>,
    pub fail_config_key: Option<String>,
    pub fail_unset: bool,
}

impl FakeGit {
    pub fn new(workdir: &Path, default_home: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            default_home: default_home.to_path_buf(),
            env: BTreeMap::new(),
            submodule_configs: Vec::new(),
            foreach_log: RefCell::new(Vec::new()),
            fail_config_key: None,
            fail_unset: false,
        }
    }

    fn config_path(&self, global: bool) -> PathBuf {
        if global {
            let home = self
                .env
                .get("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| self.default_home.clone());
            home.join(".gitconfig")
        } else {
            self.workdir.join(".git").join("config")
        }
    }
}

fn read_entries(path: &Path) -> Vec<(String, String)> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_entries(path: &Path, entries: &[(String, String)]) {
    let content: String = entries
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect();
    fs::write(path, content).unwrap();
}

fn set_entry(path: &Path, key: &str, value: &str, append: bool) {
    let mut entries = read_entries(path);
    if !append {
        entries.retain(|(k, _)| k != key);
    }
    entries.push((key.to_string(), value.to_string()));
    write_entries(path, &entries);
}

fn unset_entry(path: &Path, key: &str) -> bool {
    let mut entries = read_entries(path);
    let before = entries.len();
    entries.retain(|(k, _)| k != key);
    if entries.len() == before {
        return false;
    }
    write_entries(path, &entries);
    true
}

impl GitCommandManager for FakeGit {
    fn config(&self, key: &str, value: &str, global: bool, append: bool) -> Result<()> {
        if self.fail_config_key.as_deref() == Some(key) {
            return Err(ActionError::GitCommand {
                command: format!("config {}", key),
                stderr: "simulated failure".to_string(),
            });
        }
        set_entry(&self.config_path(global), key, value, append);
        Ok(())
    }

    fn try_config_unset(&self, key: &str, global: bool) -> bool {
        !self.fail_unset && unset_entry(&self.config_path(global), key)
    }

    fn config_exists(&self, key: &str, global: bool) -> bool {
        read_entries(&self.config_path(global))
            .iter()
            .any(|(k, _)| k == key)
    }

    fn config_get_regexp(&self, pattern: &str, global: bool) -> Result<Vec<(String, String)>> {
        let re = Regex::new(pattern).map_err(|e| ActionError::InvalidInput(e.to_string()))?;
        Ok(read_entries(&self.config_path(global))
            .into_iter()
            .filter(|(k, _)| re.is_match(k))
            .collect())
    }

    fn submodule_foreach(&self, command: &str, recursive: bool) -> Result<String> {
        self.foreach_log
            .borrow_mut()
            .push((command.to_string(), recursive));

        let mut output = String::new();
        for path in &self.submodule_configs {
            if let Some(caps) = UNSET_CMD.captures(command) {
                unset_entry(path, &caps[1]);
            } else if let Some(caps) = SET_CMD.captures(command) {
                let append = command.contains("--add");
                set_entry(path, &caps[1], &caps[2], append);
                if command.contains("--show-origin") {
                    output.push_str(&format!("file:{}\tremote.origin.url\n", path.display()));
                }
            }
        }
        Ok(output)
    }

    fn set_environment_variable(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_string(), value.to_string());
    }

    fn remove_environment_variable(&mut self, name: &str) {
        self.env.remove(name);
    }

    fn working_directory(&self) -> PathBuf {
        self.workdir.clone()
    }
}
