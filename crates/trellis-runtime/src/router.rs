//! Route tables and HTTP dispatch.
//!
//! Each Running instance publishes one compiled [`RouteTable`] under its
//! slug. Matching precedence: static segments beat parameters at the
//! first point of difference; remaining ties go to the earlier
//! registration. Re-registering an identical (method, path) during boot
//! overwrites, last one wins.

use std::sync::Arc;

use dashmap::DashMap;

use trellis_core::HandlerId;
use trellis_core::script_abi::{KeyValuePair, RouteRegistration, RouteRequest, RouteResponse};

use crate::error::{RuntimeError, RuntimeResult};
use crate::instance::ServiceInstance;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A parsed route path pattern, e.g. `/users/:id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern. Segments are literals or `:name` parameters.
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed segment.
    pub fn parse(path: &str) -> Result<Self, String> {
        if path == "/" {
            return Ok(Self {
                raw: path.to_owned(),
                segments: Vec::new(),
            });
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(format!("route path must start with '/': {path:?}"));
        };
        if rest.ends_with('/') {
            return Err(format!("route path must not end with '/': {path:?}"));
        }
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(format!("route path has an empty segment: {path:?}"));
            }
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty()
                    || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(format!("invalid parameter segment {segment:?} in {path:?}"));
                }
                segments.push(Segment::Param(name.to_owned()));
            } else if segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '~'))
            {
                segments.push(Segment::Static(segment.to_owned()));
            } else {
                return Err(format!("invalid route segment {segment:?} in {path:?}"));
            }
        }
        Ok(Self {
            raw: path.to_owned(),
            segments,
        })
    }

    /// The pattern as registered.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match a concrete request path, extracting parameters.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Vec<KeyValuePair>> {
        let trimmed = path.strip_prefix('/')?;
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Static(literal) => {
                    if literal != part {
                        return None;
                    }
                },
                Segment::Param(name) => params.push(KeyValuePair::new(name.clone(), *part)),
            }
        }
        Some(params)
    }

    /// Sort key implementing static-before-param precedence.
    fn precedence_key(&self) -> Vec<u8> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Static(_) => 0,
                Segment::Param(_) => 1,
            })
            .collect()
    }
}

#[derive(Debug)]
struct CompiledRoute {
    method: String,
    pattern: PathPattern,
    handler: HandlerId,
}

/// An instance's compiled, precedence-ordered routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile boot registrations into a lookup table.
    ///
    /// Later registrations of an identical (method, path) replace earlier
    /// ones; the survivor keeps the original registration position for
    /// tie-breaking.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed pattern.
    pub fn build(registrations: &[RouteRegistration]) -> Result<Self, String> {
        let mut deduped: Vec<RouteRegistration> = Vec::new();
        for registration in registrations {
            if let Some(existing) = deduped
                .iter_mut()
                .find(|r| r.method == registration.method && r.path == registration.path)
            {
                existing.handler = registration.handler;
            } else {
                deduped.push(registration.clone());
            }
        }

        let mut routes = Vec::with_capacity(deduped.len());
        for registration in &deduped {
            routes.push(CompiledRoute {
                method: registration.method.clone(),
                pattern: PathPattern::parse(&registration.path)?,
                handler: registration.handler,
            });
        }
        routes.sort_by(|a, b| a.pattern.precedence_key().cmp(&b.pattern.precedence_key()));
        Ok(Self { routes })
    }

    /// Resolve a request to a handler, first match wins.
    #[must_use]
    pub fn resolve(&self, method: &str, path: &str) -> Option<(HandlerId, Vec<KeyValuePair>)> {
        let method = method.to_uppercase();
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route
                    .pattern
                    .match_path(path)
                    .map(|params| (route.handler, params))
            })
    }

    /// Number of compiled routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The process-wide dispatch surface: slug → published instance.
#[derive(Debug, Default)]
pub struct Router {
    published: DashMap<String, Arc<ServiceInstance>>,
}

impl Router {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an instance's routes under its slug.
    pub fn publish(&self, instance: Arc<ServiceInstance>) {
        self.published
            .insert(instance.slug().as_str().to_owned(), instance);
    }

    /// Remove a slug's routes. Called during Stop while the instance lock
    /// is still reachable, so no new dispatch can slip in after teardown.
    pub fn unpublish(&self, slug: &str) {
        self.published.remove(slug);
    }

    /// Dispatch one inbound request to the instance mounted at `slug`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownSlug`] when nothing is published there,
    /// [`RuntimeError::NotRunning`] when the instance is mid-teardown,
    /// [`RuntimeError::RouteNotFound`] when no route matches, and
    /// invocation/timeout errors from the handler itself.
    pub async fn dispatch(
        &self,
        slug: &str,
        mut request: RouteRequest,
    ) -> RuntimeResult<RouteResponse> {
        let Some(instance) = self.published.get(slug).map(|e| e.value().clone()) else {
            return Err(RuntimeError::UnknownSlug(slug.to_owned()));
        };
        if !instance.state().is_running() {
            return Err(RuntimeError::NotRunning(instance.project().clone()));
        }
        let Some((handler, params)) = instance.routes().resolve(&request.method, &request.path)
        else {
            return Err(RuntimeError::RouteNotFound);
        };
        request.params = params;
        instance.invoke_route(handler, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(method: &str, path: &str, handler: u32) -> RouteRegistration {
        RouteRegistration {
            method: method.to_owned(),
            path: path.to_owned(),
            handler: HandlerId(handler),
        }
    }

    #[test]
    fn static_route_matches_exactly() {
        let table = RouteTable::build(&[reg("GET", "/ping", 0)]).unwrap();
        let (handler, params) = table.resolve("GET", "/ping").unwrap();
        assert_eq!(handler, HandlerId(0));
        assert!(params.is_empty());
        assert!(table.resolve("GET", "/pong").is_none());
        assert!(table.resolve("POST", "/ping").is_none());
    }

    #[test]
    fn params_are_extracted_in_order() {
        let table = RouteTable::build(&[reg("GET", "/users/:id/posts/:post", 1)]).unwrap();
        let (_, params) = table.resolve("GET", "/users/42/posts/7").unwrap();
        assert_eq!(params[0], KeyValuePair::new("id", "42"));
        assert_eq!(params[1], KeyValuePair::new("post", "7"));
    }

    #[test]
    fn static_beats_param() {
        let table =
            RouteTable::build(&[reg("GET", "/users/:id", 1), reg("GET", "/users/list", 2)])
                .unwrap();
        assert_eq!(table.resolve("GET", "/users/list").unwrap().0, HandlerId(2));
        assert_eq!(table.resolve("GET", "/users/42").unwrap().0, HandlerId(1));
    }

    #[test]
    fn static_leading_segment_beats_param_leading_segment() {
        let table =
            RouteTable::build(&[reg("GET", "/:y/b", 2), reg("GET", "/a/:x", 1)]).unwrap();
        // "/a/b" matches both; "/a/:x" wins on its static first segment.
        assert_eq!(table.resolve("GET", "/a/b").unwrap().0, HandlerId(1));
    }

    #[test]
    fn equal_precedence_goes_to_first_registered() {
        let table =
            RouteTable::build(&[reg("GET", "/items/:a", 1), reg("GET", "/items/:b", 2)]).unwrap();
        assert_eq!(table.resolve("GET", "/items/7").unwrap().0, HandlerId(1));
    }

    #[test]
    fn duplicate_registration_last_wins() {
        let table =
            RouteTable::build(&[reg("GET", "/ping", 1), reg("GET", "/ping", 9)]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("GET", "/ping").unwrap().0, HandlerId(9));
    }

    #[test]
    fn root_route_and_trailing_slash_normalization() {
        let table = RouteTable::build(&[reg("GET", "/", 0), reg("GET", "/ping", 1)]).unwrap();
        assert_eq!(table.resolve("GET", "/").unwrap().0, HandlerId(0));
        assert_eq!(table.resolve("GET", "/ping/").unwrap().0, HandlerId(1));
    }

    #[test]
    fn method_match_is_case_insensitive_on_requests() {
        let table = RouteTable::build(&[reg("GET", "/ping", 0)]).unwrap();
        assert!(table.resolve("get", "/ping").is_some());
    }

    #[test]
    fn malformed_patterns_fail_compilation() {
        assert!(RouteTable::build(&[reg("GET", "ping", 0)]).is_err());
        assert!(RouteTable::build(&[reg("GET", "/a//b", 0)]).is_err());
        assert!(RouteTable::build(&[reg("GET", "/a/:", 0)]).is_err());
    }
}
