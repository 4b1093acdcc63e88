//! Agent credential lookup.
//!
//! The token comes from the process environment first, then from a
//! `KEY=value` line in the local secret file.

use std::fmt;
use std::path::Path;

use crate::error::SetupError;

/// Variable carrying the agent's OAuth token, both on the host and inside
/// the container.
pub const CREDENTIAL_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// A previously issued agent token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Load the credential from the environment or `env_file`.
pub fn load_credential(env_file: &Path) -> Result<Credential, SetupError> {
    let from_env = std::env::var(CREDENTIAL_ENV).ok();
    let file_text = std::fs::read_to_string(env_file).ok();
    resolve_credential(from_env.as_deref(), file_text.as_deref(), env_file)
}

pub(super) fn resolve_credential(
    from_env: Option<&str>,
    env_file_text: Option<&str>,
    env_file: &Path,
) -> Result<Credential, SetupError> {
    if let Some(token) = from_env.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Credential::new(token));
    }
    if let Some(token) = env_file_text.and_then(token_from_env_file) {
        return Ok(Credential::new(token));
    }
    Err(SetupError::MissingCredential(format!(
        "{CREDENTIAL_ENV} is not set and {} has no {CREDENTIAL_ENV} line; \
         run `claude setup-token` and export the token or add it to that file",
        env_file.display()
    )))
}

fn token_from_env_file(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return None;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=')?;
        if key.trim() != CREDENTIAL_ENV {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}
