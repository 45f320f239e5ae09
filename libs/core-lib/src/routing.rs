//! Host-based tenant resolution.
//!
//! Every inbound request is classified from its `Host` header alone: either it
//! belongs to the platform (marketing site, API, dashboards) and passes through,
//! or it targets a tenant storefront and is rewritten under the tenant-scoping
//! prefix. The host is attacker-controlled; the result says which tenant the
//! host claims, never whether the caller may act for it.

use crate::domain::tenant::is_valid_slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Serve the request as-is.
    Passthrough,
    /// Serve the request from this path and query instead.
    Rewrite { tenant: String, path_and_query: String },
    /// Permanent redirect to an absolute URL.
    Redirect { location: String },
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Hosts that serve the platform itself.
    pub main_domains: Vec<String>,
    /// Substrings marking local or preview hosts.
    pub dev_host_markers: Vec<String>,
    /// Second-level domain + TLD under which tenants get a subdomain.
    pub tenant_base_domain: String,
    /// Platform routes that are never tenant-scoped.
    pub excluded_prefixes: Vec<String>,
    /// Path segment tenant storefront routes live under.
    pub tenant_prefix: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            main_domains: [
                "vysionhoreca.com",
                "www.vysionhoreca.com",
                "ordervysion.com",
                "www.ordervysion.com",
            ]
            .map(String::from)
            .to_vec(),
            dev_host_markers: ["localhost", "127.0.0.1", "vercel.app"]
                .map(String::from)
                .to_vec(),
            tenant_base_domain: "ordervysion.com".to_string(),
            excluded_prefixes: [
                "/api",
                "/_next",
                "/static",
                "/admin",
                "/superadmin",
                "/login",
                "/register",
                "/auth",
                "/monitoring",
                "/favicon.ico",
            ]
            .map(String::from)
            .to_vec(),
            tenant_prefix: "/shop".to_string(),
        }
    }
}

/// Lowercase, drop the port and a trailing root dot. `None` for hosts that
/// cannot be a DNS name.
fn normalize_host(raw: &str) -> Option<String> {
    let host = raw.trim().to_ascii_lowercase();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name.to_string(),
        Some(_) => return None,
        None => host,
    };
    let host = host.trim_end_matches('.');
    if host.is_empty()
        || !host
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return None;
    }
    Some(host.to_string())
}

/// `/api` matches `/api` and `/api/x`, not `/apiary`.
fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

fn with_query(path: String, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    }
}

impl RoutingConfig {
    /// `www.<slug>.<base domain>`: the wildcard certificate only covers one
    /// subdomain level, so these must bounce to the bare tenant host.
    fn apex_redirect(&self, host: &str, path: &str, query: Option<&str>) -> Option<String> {
        let labels: Vec<&str> = host.split('.').collect();
        let base = format!(".{}", self.tenant_base_domain);
        if labels.len() == 4 && labels[0] == "www" && host.ends_with(&base) {
            let bare = &host["www.".len()..];
            let path = if path.is_empty() { "/" } else { path };
            return Some(with_query(format!("https://{bare}{path}"), query));
        }
        None
    }

    fn is_platform_host(&self, host: &str) -> bool {
        self.main_domains.iter().any(|d| d == host)
            || self.dev_host_markers.iter().any(|m| host.contains(m.as_str()))
    }

    /// The subdomain label a host claims, if any.
    pub fn tenant_candidate<'h>(&self, host: &'h str) -> Option<&'h str> {
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 3 {
            return None;
        }
        let candidate = if labels[0] == "www" && labels.len() >= 4 {
            labels[1]
        } else {
            labels[0]
        };
        if candidate.is_empty() || candidate == "www" || !is_valid_slug(candidate) {
            return None;
        }
        Some(candidate)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix))
    }

    /// Place `path` under `<tenant_prefix>/<tenant>`, replacing any slug a deep
    /// link already carries.
    fn scoped_path(&self, tenant: &str, path: &str) -> String {
        let prefix = self.tenant_prefix.trim_end_matches('/');
        let scoped_root = format!("{prefix}/{tenant}");

        if let Some(rest) = path.strip_prefix(prefix) {
            if rest.is_empty() || rest == "/" {
                return scoped_root;
            }
            if let Some(after_slash) = rest.strip_prefix('/') {
                let remainder = match after_slash.find('/') {
                    Some(idx) => &after_slash[idx..],
                    None => "",
                };
                return format!("{scoped_root}{remainder}");
            }
        }

        if path.is_empty() || path == "/" {
            scoped_root
        } else if path.starts_with('/') {
            format!("{scoped_root}{path}")
        } else {
            format!("{scoped_root}/{path}")
        }
    }

    /// Decide how to serve a request from its host, path and query string.
    pub fn resolve_and_route(&self, host: &str, path: &str, query: Option<&str>) -> RoutingDecision {
        let Some(host) = normalize_host(host) else {
            return RoutingDecision::Passthrough;
        };

        if let Some(location) = self.apex_redirect(&host, path, query) {
            return RoutingDecision::Redirect { location };
        }

        if self.is_platform_host(&host) {
            return RoutingDecision::Passthrough;
        }

        let Some(tenant) = self.tenant_candidate(&host) else {
            return RoutingDecision::Passthrough;
        };

        if self.is_excluded(path) {
            return RoutingDecision::Passthrough;
        }

        RoutingDecision::Rewrite {
            tenant: tenant.to_string(),
            path_and_query: with_query(self.scoped_path(tenant, path), query),
        }
    }
}

/// [`RoutingConfig::resolve_and_route`] with the platform defaults.
pub fn resolve_and_route(host: &str, path: &str, query: Option<&str>) -> RoutingDecision {
    RoutingConfig::default().resolve_and_route(host, path, query)
}
