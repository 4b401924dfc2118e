//! Token injection for private repository clones.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("clone url '{0}' has no scheme")]
    MissingScheme(String),
    #[error("access token is empty")]
    EmptyToken,
}

/// A clone URL that may carry a token.
///
/// `Debug` and `Display` print the public form; only [`expose`](Self::expose)
/// yields the authenticated one.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedUrl {
    authenticated: String,
    public: String,
}

impl AuthenticatedUrl {
    /// A URL used as-is, for repositories that need no token.
    pub fn anonymous(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            authenticated: url.clone(),
            public: url,
        }
    }

    pub fn expose(&self) -> &str {
        &self.authenticated
    }

    pub fn public(&self) -> &str {
        &self.public
    }
}

impl fmt::Debug for AuthenticatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthenticatedUrl({})", redact(&self.authenticated))
    }
}

impl fmt::Display for AuthenticatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(&self.authenticated))
    }
}

/// Splices `token` in right after the scheme separator:
/// `scheme://host/path` becomes `scheme://<token>@host/path`.
///
/// Credentials already present in the URL are replaced.
pub fn inject_token(clone_url: &str, token: &str) -> Result<AuthenticatedUrl, CredentialError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CredentialError::EmptyToken);
    }
    let (scheme, rest) = clone_url
        .split_once("://")
        .ok_or_else(|| CredentialError::MissingScheme(clone_url.to_string()))?;

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let rest = match rest[..authority_end].rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    };

    Ok(AuthenticatedUrl {
        authenticated: format!("{scheme}://{token}@{rest}"),
        public: format!("{scheme}://{rest}"),
    })
}

/// Masks the userinfo of every URL in `text`: `scheme://user@host` becomes
/// `scheme://***@host`.
pub fn redact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("://") {
        let (head, tail) = rest.split_at(idx + 3);
        out.push_str(head);
        let end = tail
            .find(|c: char| c == '/' || c.is_whitespace() || c == '\'' || c == '"')
            .unwrap_or(tail.len());
        let authority = &tail[..end];
        match authority.rfind('@') {
            Some(at) => {
                out.push_str("***");
                out.push_str(&authority[at..]);
            }
            None => out.push_str(authority),
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
