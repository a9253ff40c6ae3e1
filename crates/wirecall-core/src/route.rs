//! Route descriptors and the route matcher.
//!
//! A descriptor is one of three shapes:
//! - `Literal`: a path with no `:param` segments, matched byte-for-byte.
//! - `Params`: a path with `:param` segments, matched segment-wise.
//! - `Pattern`: a regular expression that must match the whole path.
//!
//! Parameter values are passed through exactly as received (no decoding).

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{Result, WireError};

/// Path separator.
pub const SEPARATOR: char = '/';
/// Marker that starts a parameter segment.
pub const PARAM_MARKER: char = ':';

/// Extracted route parameters.
pub type Params = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    /// May be empty (`/users/:`); such descriptors never match.
    Param(String),
}

#[derive(Debug, Clone)]
pub enum RouteDescriptor {
    Literal(String),
    Params { raw: String, segments: Vec<Segment> },
    Pattern { source: Regex, anchored: Regex },
}

impl RouteDescriptor {
    /// Parse a path descriptor. It must be non-empty and start with `/`.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(WireError::InvalidRoute("route must not be empty".into()));
        }
        if !path.starts_with(SEPARATOR) {
            return Err(WireError::InvalidRoute(format!(
                "route must start with '{SEPARATOR}': {path}"
            )));
        }

        let has_params = split(path).any(|s| s.starts_with(PARAM_MARKER));
        if !has_params {
            return Ok(RouteDescriptor::Literal(path.to_owned()));
        }

        let segments = split(path)
            .map(|s| match s.strip_prefix(PARAM_MARKER) {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Static(s.to_owned()),
            })
            .collect();
        Ok(RouteDescriptor::Params {
            raw: path.to_owned(),
            segments,
        })
    }

    /// Pattern descriptor. The pattern must match the whole path.
    pub fn pattern(source: Regex) -> Result<Self> {
        let anchored = Regex::new(&format!(r"\A(?:{})\z", source.as_str()))
            .map_err(|e| WireError::InvalidRoute(format!("pattern {source}: {e}")))?;
        Ok(RouteDescriptor::Pattern { source, anchored })
    }

    /// Descriptor text: the path, or the pattern source.
    pub fn as_str(&self) -> &str {
        match self {
            RouteDescriptor::Literal(p) => p,
            RouteDescriptor::Params { raw, .. } => raw,
            RouteDescriptor::Pattern { source, .. } => source.as_str(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, RouteDescriptor::Pattern { .. })
    }

    /// Match `path` against this descriptor.
    pub fn matches(&self, path: &str) -> Option<Params> {
        match self {
            RouteDescriptor::Literal(p) => (p == path).then(Params::new),
            RouteDescriptor::Params { segments, .. } => match_segments(segments, path),
            // capture groups are deliberately ignored
            RouteDescriptor::Pattern { anchored, .. } => anchored.is_match(path).then(Params::new),
        }
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion accepted wherever a route descriptor is expected.
pub trait IntoRoute {
    fn into_route(self) -> Result<RouteDescriptor>;
}

impl IntoRoute for RouteDescriptor {
    fn into_route(self) -> Result<RouteDescriptor> {
        Ok(self)
    }
}

impl IntoRoute for &str {
    fn into_route(self) -> Result<RouteDescriptor> {
        RouteDescriptor::parse(self)
    }
}

impl IntoRoute for String {
    fn into_route(self) -> Result<RouteDescriptor> {
        RouteDescriptor::parse(&self)
    }
}

impl IntoRoute for &String {
    fn into_route(self) -> Result<RouteDescriptor> {
        RouteDescriptor::parse(self)
    }
}

impl IntoRoute for Regex {
    fn into_route(self) -> Result<RouteDescriptor> {
        RouteDescriptor::pattern(self)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

fn match_segments(segments: &[Segment], path: &str) -> Option<Params> {
    let parts: Vec<&str> = split(path).collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = Params::new();
    for (seg, part) in segments.iter().zip(parts) {
        match seg {
            Segment::Static(s) => {
                if s != part {
                    return None;
                }
            }
            Segment::Param(name) => {
                if name.is_empty() {
                    return None;
                }
                params.insert(name.clone(), part.to_owned());
            }
        }
    }
    Some(params)
}

/// First-match lookup over descriptors in registration order.
pub fn first_match<'a, T>(
    routes: impl IntoIterator<Item = &'a (RouteDescriptor, T)>,
    path: &str,
) -> Option<(&'a RouteDescriptor, &'a T, Params)>
where
    T: 'a,
{
    routes
        .into_iter()
        .find_map(|(d, t)| d.matches(path).map(|p| (d, t, p)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn literal_requires_exact_bytes() {
        let d = RouteDescriptor::parse("/sys/ping").unwrap();
        assert_eq!(d.matches("/sys/ping"), Some(Params::new()));
        assert_eq!(d.matches("/sys/ping/"), None);
        assert_eq!(d.matches("/sys//ping"), None);
    }

    #[test]
    fn params_bind_raw_segments() {
        let d = RouteDescriptor::parse("/files/:dir/:name").unwrap();
        let p = d.matches("/files/a%20b/c.txt").unwrap();
        assert_eq!(p["dir"], "a%20b");
        assert_eq!(p["name"], "c.txt");
        assert_eq!(d.matches("/files/a"), None);
        assert_eq!(d.matches("/docs/a/b"), None);
    }

    #[test]
    fn params_ignore_empty_segments() {
        let d = RouteDescriptor::parse("/users/:id").unwrap();
        assert_eq!(d.matches("//users//7/").unwrap()["id"], "7");
    }

    #[test]
    fn empty_param_name_never_matches() {
        let d = RouteDescriptor::parse("/users/:").unwrap();
        assert!(matches!(d, RouteDescriptor::Params { .. }));
        assert_eq!(d.matches("/users/7"), None);
    }

    #[test]
    fn pattern_must_cover_whole_path() {
        let d = RouteDescriptor::pattern(Regex::new(r"/items/(\d+)").unwrap()).unwrap();
        assert_eq!(d.matches("/items/12"), Some(Params::new()));
        assert_eq!(d.matches("/v2/items/12"), None);
        assert_eq!(d.matches("/items/12/extra"), None);
    }

    #[test]
    fn pattern_alternation_can_still_cover_whole_path() {
        // unanchored leftmost-first search would stop at "/a"
        let d = RouteDescriptor::pattern(Regex::new(r"/a|/ab").unwrap()).unwrap();
        assert_eq!(d.matches("/ab"), Some(Params::new()));
    }

    #[test]
    fn descriptor_must_start_with_separator() {
        assert!("users".into_route().is_err());
        assert!("".into_route().is_err());
        assert!("/".into_route().is_ok());
    }

    #[test]
    fn first_registered_wins() {
        let routes = vec![
            (RouteDescriptor::parse("/users/me").unwrap(), 1),
            (RouteDescriptor::parse("/users/:id").unwrap(), 2),
        ];
        let (_, which, params) = first_match(&routes, "/users/me").unwrap();
        assert_eq!(*which, 1);
        assert!(params.is_empty());

        let (d, which, params) = first_match(&routes, "/users/42").unwrap();
        assert_eq!(*which, 2);
        assert_eq!(d.as_str(), "/users/:id");
        assert_eq!(params["id"], "42");
    }
}
