//! Request descriptors and the builder that turns them into wire requests

use std::env;
use std::fmt;

use serde_json::Value;
use tracing::warn;

use crate::constants::{API_V0_BASE_URL, API_V1_BASE_URL, DEFAULT_USER_AGENT, WRITE_HTTP_METHODS};
use crate::error::{InatError, Result};
use crate::paginate::{AllStrategy, PaginationMode};
use crate::params::{ListStyle, ParamValue, RequestParams};
use crate::types::Warning;
use crate::validation::validate_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub fn is_write(&self) -> bool {
        WRITE_HTTP_METHODS.contains(&self.as_str())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which family of endpoints a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Legacy Rails API at www.inaturalist.org
    Rest,
    /// Node API at api.inaturalist.org/v1
    Node,
}

/// Everything needed to call one endpoint, independent of credentials and transport
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    dialect: Dialect,
    path_template: String,
    params: RequestParams,
    requires_auth: bool,
    pagination: PaginationMode,
    all_strategy: AllStrategy,
    list_style: ListStyle,
    deprecated_params: Vec<(String, String)>,
    body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, dialect: Dialect, path_template: impl Into<String>) -> Self {
        Self {
            method,
            dialect,
            path_template: path_template.into(),
            params: RequestParams::new(),
            requires_auth: false,
            pagination: PaginationMode::None,
            all_strategy: AllStrategy::Page,
            list_style: ListStyle::CommaJoined,
            deprecated_params: Vec::new(),
            body: None,
        }
    }

    pub fn get(dialect: Dialect, path_template: impl Into<String>) -> Self {
        Self::new(Method::Get, dialect, path_template)
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.set(key, value);
        self
    }

    pub fn without_param(mut self, key: &str) -> Self {
        self.params.remove(key);
        self
    }

    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn with_pagination(mut self, mode: PaginationMode) -> Self {
        self.pagination = mode;
        self
    }

    /// How `page=all` walks this endpoint
    pub fn with_all_strategy(mut self, strategy: AllStrategy) -> Self {
        self.all_strategy = strategy;
        self
    }

    pub fn with_list_style(mut self, style: ListStyle) -> Self {
        self.list_style = style;
        self
    }

    /// Accept `name` as a legacy alias for `replacement`, with a warning
    pub fn with_deprecated_param(
        mut self,
        name: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.deprecated_params.push((name.into(), replacement.into()));
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn is_auth_required(&self) -> bool {
        self.requires_auth
    }

    pub fn pagination(&self) -> PaginationMode {
        self.pagination
    }

    pub fn all_strategy(&self) -> &AllStrategy {
        &self.all_strategy
    }

    pub fn list_style(&self) -> ListStyle {
        self.list_style
    }
}

/// Resolved credentials for a call. The token is never printed.
#[derive(Clone, Default)]
pub struct AuthContext {
    access_token: Option<String>,
}

impl AuthContext {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Read `INAT_ACCESS_TOKEN`
    pub fn from_env() -> Self {
        Self {
            access_token: env::var("INAT_ACCESS_TOKEN").ok(),
        }
    }

    /// The token, if one is present and not blank
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("access_token", &self.token().map(|_| "<redacted>"))
            .finish()
    }
}

/// A transport-ready request
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    /// URL without query string
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl WireRequest {
    /// URL including the percent-encoded query string
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.url, query.join("&"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First query value for `key`
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A wire request plus anything worth telling the caller about how it was built
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub wire: WireRequest,
    pub warnings: Vec<Warning>,
}

/// Turns descriptors into wire requests
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    rest_base_url: String,
    node_base_url: String,
    user_agent: String,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(API_V0_BASE_URL, API_V1_BASE_URL, DEFAULT_USER_AGENT)
    }
}

impl RequestBuilder {
    pub fn new(rest_base_url: &str, node_base_url: &str, user_agent: &str) -> Self {
        Self {
            rest_base_url: rest_base_url.trim_end_matches('/').to_string(),
            node_base_url: node_base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    fn base_url(&self, dialect: Dialect) -> &str {
        match dialect {
            Dialect::Rest => &self.rest_base_url,
            Dialect::Node => &self.node_base_url,
        }
    }

    pub fn build(&self, descriptor: &RequestDescriptor, auth: &AuthContext) -> Result<BuiltRequest> {
        let mut params = descriptor.params.clone();
        params.apply_count_only();

        // The auto-pagination directive never goes on the wire
        if params.get("page").and_then(ParamValue::as_str) == Some("all") {
            params.remove("page");
        }

        let mut warnings = Vec::new();
        for (name, replacement) in &descriptor.deprecated_params {
            if let Some(value) = params.remove(name) {
                warn!(param = %name, replacement = %replacement, "Deprecated request parameter");
                if !params.contains(replacement) {
                    params.set(replacement.clone(), value);
                }
                warnings.push(Warning::DeprecatedParam {
                    name: name.clone(),
                    replacement: replacement.clone(),
                });
            }
        }

        let path = fill_path(&descriptor.path_template, &mut params)?;
        let url = format!(
            "{}/{}",
            self.base_url(descriptor.dialect),
            path.trim_start_matches('/')
        );

        let user_agent = match params.remove("user_agent") {
            Some(ParamValue::Str(ua)) if !ua.is_empty() => ua,
            _ => self.user_agent.clone(),
        };

        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), user_agent),
        ];
        match auth.token() {
            Some(token) => headers.push(("Authorization".to_string(), format!("Bearer {}", token))),
            None if descriptor.requires_auth => {
                return Err(InatError::Authentication {
                    endpoint: url,
                    status: None,
                })
            }
            None => {}
        }

        let query = params.encode(descriptor.list_style)?;

        Ok(BuiltRequest {
            wire: WireRequest {
                method: descriptor.method,
                url,
                query,
                headers,
                body: descriptor.body.clone(),
            },
            warnings,
        })
    }
}

/// Substitute `{name}` placeholders from params, consuming them.
/// `{id}` / `{ids}` placeholders must hold one or more integers.
fn fill_path(template: &str, params: &mut RequestParams) -> Result<String> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let end = rest[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| InatError::Validation(format!("Unclosed placeholder in path: {}", template)))?;
        let name = &rest[start + 1..end];

        let value = params
            .remove(name)
            .ok_or_else(|| InatError::Validation(format!("Missing required parameter: {}", name)))?;
        let segment = if name == "id" || name == "ids" {
            validate_ids(&value)?
        } else {
            match value {
                ParamValue::Str(s) if !s.is_empty() => urlencoding::encode(&s).into_owned(),
                ParamValue::Int(i) => i.to_string(),
                other => {
                    return Err(InatError::Validation(format!(
                        "Invalid value for path parameter {}: {:?}",
                        name, other
                    )))
                }
            }
        };

        path.push_str(&rest[..start]);
        path.push_str(&segment);
        rest = &rest[end + 1..];
    }
    path.push_str(rest);
    Ok(path)
}
