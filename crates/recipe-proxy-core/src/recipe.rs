//! The `/generate-recipe` endpoint: one inbound request, one call to the upstream
//! `recipes/random` API, and a translation of whatever comes back.

use std::fmt;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::body::Body;
use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::http::{Method, Response, Uri};
use crate::proxy::{ProxyClient, ProxyRequest, ProxyResponse};
use crate::response::{empty_ok, IntoResponse, Json};

pub const GENERATE_RECIPE_PATH: &str = "/generate-recipe";
pub const RANDOM_RECIPES_PATH: &str = "/recipes/random";

const NO_JSON_ERROR_BODY: &str = r#"{"message":"No JSON error response."}"#;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Upstream credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Where the upstream lives and how to authenticate against it.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    base_url: String,
    api_key: Option<ApiKey>,
}

impl UpstreamConfig {
    pub fn new(base_url: &str, api_key: Option<ApiKey>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Optional search filters taken from the inbound query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RecipeFilters {
    pub diet: Option<String>,
    #[serde(rename = "mealType")]
    pub meal_type: Option<String>,
}

impl RecipeFilters {
    pub fn new(diet: Option<&str>, meal_type: Option<&str>) -> Self {
        Self {
            diet: diet.map(str::to_owned),
            meal_type: meal_type.map(str::to_owned),
        }
        .normalized()
    }

    /// Build filters from decoded query pairs. The first occurrence of a key wins and empty values
    /// count as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filters = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "diet" => &mut filters.diet,
                "mealType" => &mut filters.meal_type,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        filters.normalized()
    }

    fn normalized(self) -> Self {
        Self {
            diet: self.diet.filter(|value| !value.is_empty()),
            meal_type: self.meal_type.filter(|value| !value.is_empty()),
        }
    }
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// `<base>/recipes/random?number=1&apiKey=<key>[&diet=..][&type=..]`
pub fn random_recipe_uri(
    base_url: &str,
    api_key: &ApiKey,
    filters: &RecipeFilters,
) -> Result<Uri, ProxyError> {
    let mut url = format!(
        "{}{}?number=1&apiKey={}",
        base_url.trim_end_matches('/'),
        RANDOM_RECIPES_PATH,
        encode_component(api_key.expose())
    );
    if let Some(diet) = &filters.diet {
        url.push_str("&diet=");
        url.push_str(&encode_component(diet));
    }
    if let Some(meal_type) = &filters.meal_type {
        url.push_str("&type=");
        url.push_str(&encode_component(meal_type));
    }
    url.parse::<Uri>().map_err(ProxyError::internal)
}

/// Render `uri` for logs with the `apiKey` value masked.
pub fn redact_uri(uri: &Uri) -> String {
    let base = format!(
        "{}://{}{}",
        uri.scheme_str().unwrap_or("http"),
        uri.authority().map(|a| a.as_str()).unwrap_or(""),
        uri.path()
    );
    match uri.query() {
        None => base,
        Some(query) => {
            let query = query
                .split('&')
                .map(|pair| {
                    if pair.starts_with("apiKey=") {
                        "apiKey=***"
                    } else {
                        pair
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            format!("{}?{}", base, query)
        }
    }
}

#[derive(Deserialize)]
struct RandomRecipes<'a> {
    #[serde(borrow, default)]
    recipes: Option<&'a RawValue>,
}

/// Turn an upstream response into the recipe to relay, or the error to report.
///
/// Non-success statuses are logged with their body; the client only sees the mapped message.
pub fn classify_response(response: ProxyResponse) -> Result<Body, ProxyError> {
    let status = response.status();

    if !status.is_success() {
        let details = match response.body().to_json::<serde_json::Value>() {
            Ok(value) => value.to_string(),
            Err(_) => NO_JSON_ERROR_BODY.to_string(),
        };
        log::error!(
            "recipe API error: {} - {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            details
        );
        return Err(match status.as_u16() {
            401 => ProxyError::Unauthorized,
            402 => ProxyError::QuotaExceeded,
            404 => ProxyError::NoRecipes,
            _ => ProxyError::upstream(status, details),
        });
    }

    first_recipe(response.body())
}

fn first_recipe(body: &Body) -> Result<Body, ProxyError> {
    let document: &RawValue = serde_json::from_slice(body.as_bytes()).map_err(|err| {
        log::error!("recipe API returned an unreadable body: {}", err);
        ProxyError::transport(err)
    })?;

    let recipes = serde_json::from_str::<RandomRecipes<'_>>(document.get())
        .ok()
        .and_then(|envelope| envelope.recipes)
        .and_then(|raw| serde_json::from_str::<Vec<&RawValue>>(raw.get()).ok())
        .unwrap_or_default();

    match recipes.first() {
        Some(recipe) => Ok(Body::from(recipe.get().as_bytes())),
        None => Err(ProxyError::NoMatchingRecipes),
    }
}

/// Handler state for `/generate-recipe`.
pub struct RecipeService {
    upstream: UpstreamConfig,
    client: Arc<dyn ProxyClient>,
}

impl RecipeService {
    pub fn new(upstream: UpstreamConfig, client: Arc<dyn ProxyClient>) -> Self {
        Self { upstream, client }
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    /// Full endpoint behaviour apart from CORS, which the `Cors` middleware adds on the way out.
    pub async fn handle(&self, ctx: RequestContext) -> Result<Response, ProxyError> {
        let method = ctx.method();
        if *method == Method::OPTIONS {
            return Ok(empty_ok());
        }
        if *method != Method::GET {
            return Err(ProxyError::method_not_allowed(method, &[Method::GET]));
        }

        let pairs: Vec<(String, String)> = ctx.query()?;
        let filters = RecipeFilters::from_pairs(pairs);
        let recipe = self.fetch_random_recipe(&filters).await?;
        Ok(Json(recipe).into_response())
    }

    pub async fn fetch_random_recipe(&self, filters: &RecipeFilters) -> Result<Body, ProxyError> {
        let Some(api_key) = self.upstream.api_key() else {
            log::error!("recipe API key is not configured on the server");
            return Err(ProxyError::MissingApiKey);
        };

        let uri = random_recipe_uri(self.upstream.base_url(), api_key, filters)?;
        log::debug!("fetching random recipe from {}", redact_uri(&uri));

        let response = match self.client.send(ProxyRequest::get(uri)).await {
            Ok(response) => response,
            Err(err) => {
                match err.source() {
                    Some(source) => log::error!("error fetching recipe from upstream: {:#}", source),
                    None => log::error!("error fetching recipe from upstream: {}", err),
                }
                if matches!(err, ProxyError::Transport { .. }) {
                    return Err(err);
                }
                return Err(ProxyError::transport(anyhow::anyhow!(err.message())));
            }
        };

        classify_response(response)
    }
}
