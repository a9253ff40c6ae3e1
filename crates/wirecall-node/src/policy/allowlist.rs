//! Route allowlist compilation and matching.
//!
//! Entry forms:
//! - `*`            every route
//! - `/admin/*`     `/admin` itself and anything below it
//! - `/sys/ping`    exactly this route

use wirecall_core::error::{Result, WireError};

/// Compiled allowlist rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRule {
    Any,
    Exact(String),
    /// Stored without the trailing `/*`.
    Prefix(String),
}

pub fn compile_route_rules(raw: &[String]) -> Result<Vec<RouteRule>> {
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        if s == "*" {
            out.push(RouteRule::Any);
            continue;
        }
        if !s.starts_with('/') {
            return Err(WireError::BadRequest(format!(
                "invalid route_allowlist entry: {s} (expected '*' or a path starting with '/')"
            )));
        }
        let rule = match s.strip_suffix("/*") {
            Some(prefix) => RouteRule::Prefix(prefix.to_string()),
            None if s.contains('*') => {
                return Err(WireError::BadRequest(format!(
                    "invalid route_allowlist entry: {s} ('*' only allowed as a trailing segment)"
                )))
            }
            None => RouteRule::Exact(s.clone()),
        };
        out.push(rule);
    }
    Ok(out)
}

pub fn is_route_allowed(rules: &[RouteRule], route: &str) -> bool {
    rules.iter().any(|r| match r {
        RouteRule::Any => true,
        RouteRule::Exact(p) => p == route,
        RouteRule::Prefix(p) => match route.strip_prefix(p.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rules(raw: &[&str]) -> Vec<RouteRule> {
        let owned: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        compile_route_rules(&owned).unwrap()
    }

    #[test]
    fn prefix_rules_respect_segment_boundaries() {
        let r = rules(&["/admin/*"]);
        assert!(is_route_allowed(&r, "/admin"));
        assert!(is_route_allowed(&r, "/admin/users/1"));
        assert!(!is_route_allowed(&r, "/administrator"));
    }

    #[test]
    fn root_prefix_allows_everything_under_root() {
        let r = rules(&["/*"]);
        assert!(is_route_allowed(&r, "/anything/at/all"));
    }

    #[test]
    fn exact_and_any() {
        let r = rules(&["/sys/ping"]);
        assert!(is_route_allowed(&r, "/sys/ping"));
        assert!(!is_route_allowed(&r, "/sys/ping/2"));
        assert!(is_route_allowed(&rules(&["*"]), "/x"));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(compile_route_rules(&["admin".to_string()]).is_err());
        assert!(compile_route_rules(&["/a*b".to_string()]).is_err());
    }
}
