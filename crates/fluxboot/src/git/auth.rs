//! Authentication environment for the subprocess git backend.
//!
//! Token auth is injected through a temporary `GIT_ASKPASS` script so the
//! token never appears in the process argument list; the script is removed
//! by an RAII guard once the git command finishes. SSH auth is injected
//! through `GIT_SSH_COMMAND`.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use super::error::{GitError, Result};

/// Escapes a token for safe use in single-quoted shell strings.
pub(crate) fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the askpass script file when dropped so tokens are not left on
/// disk even if an error occurs.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment to apply to a git command.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

impl AuthEnv {
    /// No authentication.
    pub fn none() -> Self {
        Self {
            env_vars: Vec::new(),
            _cleanup: AskpassCleanup::empty(),
        }
    }
}

/// Builds the environment for token authentication over HTTPS.
pub fn token_env(token: &SecretString) -> Result<AuthEnv> {
    let escaped = shell_escape(token.expose_secret());

    let script = format!("#!/bin/sh\necho '{}'", escaped);
    let path = std::env::temp_dir().join(format!(".git-askpass-{}.sh", uuid::Uuid::new_v4()));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&path)
            .map_err(|e| GitError::Io {
                path: path.clone(),
                source: e,
            })?;
        file.write_all(script.as_bytes()).map_err(|e| GitError::Io {
            path: path.clone(),
            source: e,
        })?;
    }

    #[cfg(not(unix))]
    std::fs::write(&path, &script).map_err(|e| GitError::Io {
        path: path.clone(),
        source: e,
    })?;

    let cleanup = AskpassCleanup::new(path.clone());
    let path_str = path
        .to_str()
        .ok_or_else(|| GitError::AuthFailed("temp path is not valid UTF-8".to_string()))?
        .to_string();

    Ok(AuthEnv {
        env_vars: vec![
            ("GIT_ASKPASS".to_string(), path_str),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ],
        _cleanup: cleanup,
    })
}

/// Builds the environment for SSH key authentication. A `~`-prefixed path
/// is expanded against the home directory.
pub fn ssh_env(key_path: &str) -> Result<AuthEnv> {
    let expanded = if key_path == "~" {
        dirs::home_dir().unwrap_or_default()
    } else if let Some(rest) = key_path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(key_path))
    } else {
        PathBuf::from(key_path)
    };

    if !expanded.exists() {
        return Err(GitError::AuthFailed(format!(
            "SSH key file not found: {}",
            expanded.display()
        )));
    }

    let display = expanded.display().to_string();
    let escaped = shell_escape(&display);
    let safe_path = if escaped.starts_with('-') {
        format!("'./{}'", escaped)
    } else {
        format!("'{}'", escaped)
    };

    Ok(AuthEnv {
        env_vars: vec![(
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -i {} -o StrictHostKeyChecking=accept-new", safe_path),
        )],
        _cleanup: AskpassCleanup::empty(),
    })
}
