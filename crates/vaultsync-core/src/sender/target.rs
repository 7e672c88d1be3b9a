//! Package manager endpoints.

use std::fmt;

use url::Url;

use crate::error::ConfigError;

/// One remote instance to push to.
///
/// Credentials embedded in the configured URL are split off here and only
/// ever travel as a basic-auth header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    base: Url,
    username: Option<String>,
    password: Option<String>,
    packmgr_path: String,
}

impl Target {
    pub fn parse(raw: &str, packmgr_path: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTarget {
            url: redact(raw),
            reason: reason.to_string(),
        };

        let mut base = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if base.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        let username = match base.username() {
            "" => None,
            name => Some(decode(name)),
        };
        let password = base.password().map(decode);

        base.set_username("")
            .map_err(|_| invalid("cannot strip credentials"))?;
        base.set_password(None)
            .map_err(|_| invalid("cannot strip credentials"))?;

        Ok(Self {
            base,
            username,
            password,
            packmgr_path: packmgr_path.to_string(),
        })
    }

    /// Target URL without credentials or trailing slash.
    pub fn base_url(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    /// Package manager service URL.
    pub fn endpoint(&self) -> String {
        let path = self.packmgr_path.trim_start_matches('/');
        format!("{}/{}", self.base_url(), path)
    }

    /// `(username, password)` for basic auth, if the URL carried any.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref()))
            .or_else(|| self.password.as_deref().map(|pass| ("", Some(pass))))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// `raw` with any userinfo removed, for error messages.
fn redact(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://{}", &rest[at + 1..]),
        None => raw.to_string(),
    }
}
