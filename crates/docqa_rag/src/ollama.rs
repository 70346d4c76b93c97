use std::time::Duration;

use docqa_core::error::AppError;

/// Base address of an Ollama server, validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Accepts `http(s)://host[:port]` with an optional trailing slash.
    /// Paths, userinfo, empty hosts and out-of-range ports are rejected.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let invalid = |reason: &str| {
            AppError::config("Ollama base URL is invalid")
                .with_details(format!("base_url={base_url}; reason={reason}"))
        };

        let authority = base_url
            .strip_prefix("http://")
            .or_else(|| base_url.strip_prefix("https://"))
            .ok_or_else(|| invalid("scheme must be http or https"))?;
        if authority.contains('/') {
            return Err(invalid("path is not allowed"));
        }
        if authority.contains('@') {
            return Err(invalid("userinfo is not allowed"));
        }
        if authority.contains('?') || authority.contains('#') {
            return Err(invalid("query or fragment is not allowed"));
        }

        let (host, port) = split_host_port(authority);
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if let Some(port) = port {
            match port.parse::<u16>() {
                Ok(p) if p > 0 => {}
                _ => return Err(invalid("port must be 1-65535")),
            }
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let resp = ureq::get(&self.endpoint("api/tags"))
            .timeout(Duration::from_millis(800))
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(AppError::generation("Ollama health check failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(AppError::generation("Failed to reach Ollama")
                .with_details(format!("base_url={}; err={e}", self.base_url))
                .with_retryable(true)),
        }
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => ("", None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}
