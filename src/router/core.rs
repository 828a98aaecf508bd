use crate::request::ParamVec;
use http::Method;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// One compiled `(method, template)` entry. `index` points back into the caller's table.
#[derive(Debug, Clone)]
struct CompiledRoute {
    method: Method,
    template: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    index: usize,
    literal_segments: usize,
}

/// Result of matching a request path.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMatch {
    Matched {
        /// Position of the route in the order it was registered.
        index: usize,
        /// URL-decoded placeholder values.
        path_params: ParamVec,
    },
    /// The path matches but not for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Path-template matcher.
///
/// Each template is compiled once into an anchored regex with one capture group per
/// `{placeholder}`. When several templates match, the one with the most literal
/// segments wins, so `/items/search` beats `/items/{id}`.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile `(method, template)` pairs; positions become the match `index`.
    pub fn new<I, S>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (Method, S)>,
        S: AsRef<str>,
    {
        let mut routes = Vec::new();
        for (index, (method, template)) in entries.into_iter().enumerate() {
            let template = normalize_path(template.as_ref()).to_string();
            let (regex, param_names) = path_to_regex(&template)?;
            let literal_segments = template
                .split('/')
                .filter(|s| !s.is_empty() && !s.contains('{'))
                .count();
            routes.push(CompiledRoute {
                method,
                template,
                regex,
                param_names,
                index,
                literal_segments,
            });
        }
        // Stable: equally specific templates keep registration order.
        routes.sort_by(|a, b| b.literal_segments.cmp(&a.literal_segments));
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered `(method, template)` pairs in match-priority order.
    pub fn templates(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.template.as_str()))
    }

    pub fn route(&self, method: &Method, path: &str) -> RouteMatch {
        let path = normalize_path(path);
        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            let Some(captures) = route.regex.captures(path) else {
                continue;
            };
            if route.method != *method {
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
                continue;
            }
            let mut path_params = ParamVec::new();
            for (name, capture) in route.param_names.iter().zip(captures.iter().skip(1)) {
                let raw = capture.map(|m| m.as_str()).unwrap_or("");
                let value = urlencoding::decode(raw)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                path_params.push((Arc::clone(name), value));
            }
            debug!(method = %method, path = %path, template = %route.template, "route matched");
            return RouteMatch::Matched {
                index: route.index,
                path_params,
            };
        }
        if allowed.is_empty() {
            debug!(method = %method, path = %path, "no route matched");
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }
}

/// Drop one trailing slash, keeping the root path intact.
pub fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// `/users/{id}` → `^/users/([^/]+)$` plus `["id"]`. Literal text is regex-escaped.
pub(crate) fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), regex::Error> {
    if path == "/" || path.is_empty() {
        return Ok((Regex::new(r"^/$")?, Vec::new()));
    }

    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');
    let mut param_names = Vec::with_capacity(path.matches('{').count());

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');
        let mut rest = segment;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            pattern.push_str(&regex::escape(&rest[..start]));
            pattern.push_str("([^/]+)");
            param_names.push(Arc::from(&rest[start + 1..start + len]));
            rest = &rest[start + len + 1..];
        }
        pattern.push_str(&regex::escape(rest));
    }

    pattern.push('$');
    Ok((Regex::new(&pattern)?, param_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new([
            (Method::GET, "/items"),
            (Method::POST, "/items"),
            (Method::GET, "/items/{id}"),
            (Method::GET, "/items/search"),
            (Method::GET, "/files/{name}.json"),
        ])
        .unwrap()
    }

    #[test]
    fn matches_and_extracts_params() {
        let r = router();
        match r.route(&Method::GET, "/items/a%20b") {
            RouteMatch::Matched { index, path_params } => {
                assert_eq!(index, 2);
                assert_eq!(path_params[0].1, "a b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn literal_segments_win() {
        let r = router();
        assert!(matches!(
            r.route(&Method::GET, "/items/search"),
            RouteMatch::Matched { index: 3, .. }
        ));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let r = router();
        assert!(matches!(
            r.route(&Method::GET, "/items/"),
            RouteMatch::Matched { index: 0, .. }
        ));
    }

    #[test]
    fn method_mismatch_lists_allowed() {
        let r = router();
        match r.route(&Method::DELETE, "/items") {
            RouteMatch::MethodNotAllowed { allowed } => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.route(&Method::GET, "/nope"), RouteMatch::NotFound);
    }

    #[test]
    fn literal_text_is_escaped() {
        let r = router();
        assert!(matches!(
            r.route(&Method::GET, "/files/report.json"),
            RouteMatch::Matched { index: 4, .. }
        ));
        assert_eq!(r.route(&Method::GET, "/files/reportxjson"), RouteMatch::NotFound);
    }
}
