//! Endpoint URLs and node credentials.

use std::fmt;
use std::path::Path;

use reqwest::Url;

use crate::error::CoreError;

/// Basic-auth pair sent with every node request.
#[derive(Clone, PartialEq, Eq)]
pub(super) struct NodeCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NodeCredentials {
    /// Pick the credentials for a node connection.
    ///
    /// A full `user`/`pass` pair wins; otherwise the node's cookie file is
    /// read if one is given. With neither, requests go out unauthenticated.
    pub fn resolve(
        user: Option<&str>,
        pass: Option<&str>,
        cookie_file: Option<&Path>,
    ) -> Result<Option<Self>, CoreError> {
        match (user, pass, cookie_file) {
            (Some(user), Some(password), _) => Ok(Some(Self {
                user: user.to_owned(),
                password: password.to_owned(),
            })),
            (Some(_), None, _) | (None, Some(_), _) => Err(CoreError::InvalidConfig(
                "node rpc user and password must be given together".to_owned(),
            )),
            (None, None, Some(path)) => Self::from_cookie_file(path).map(Some),
            (None, None, None) => Ok(None),
        }
    }

    fn from_cookie_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidConfig(format!("read node cookie {}: {e}", path.display()))
        })?;
        Self::from_cookie(&content).ok_or_else(|| {
            CoreError::InvalidConfig(format!(
                "node cookie {} must hold `user:password` on its first line",
                path.display()
            ))
        })
    }

    fn from_cookie(content: &str) -> Option<Self> {
        let (user, password) = content.lines().next()?.trim().split_once(':')?;
        if user.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_owned(),
            password: password.to_owned(),
        })
    }
}

/// Validate an HTTP(S) URL with a host. `what` names the setting in errors.
pub(crate) fn http_endpoint(what: &str, raw: &str) -> Result<Url, CoreError> {
    let url = Url::parse(raw)
        .map_err(|e| CoreError::InvalidConfig(format!("{what} `{raw}` is not a URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::InvalidConfig(format!(
            "{what} `{raw}` must use http or https, not {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::InvalidConfig(format!("{what} `{raw}` has no host")));
    }
    Ok(url)
}

/// Explorer base URL without a trailing slash, ready for `{base}/tx/{txid}`.
pub(crate) fn explorer_base(what: &str, raw: &str) -> Result<String, CoreError> {
    http_endpoint(what, raw)?;
    Ok(raw.trim_end_matches('/').to_owned())
}
