use std::sync::Arc;

use crate::context::RequestContext;
use crate::cors::{Cors, CorsPolicy};
use crate::middleware::RequestLogger;
use crate::proxy::ProxyClient;
use crate::recipe::{RecipeService, UpstreamConfig, GENERATE_RECIPE_PATH};
use crate::router::RouterService;

const DEFAULT_APP_NAME: &str = "Recipe Proxy";

/// Fully wired application: the `/generate-recipe` route behind CORS and request logging.
///
/// `Cors` sits outermost so `RequestLogger` still sees handler errors before they are rendered.
pub struct App {
    router: RouterService,
    name: String,
}

impl App {
    pub fn new(upstream: UpstreamConfig, cors: CorsPolicy, client: Arc<dyn ProxyClient>) -> Self {
        Self::with_name(build_router(upstream, cors, client), DEFAULT_APP_NAME)
    }

    pub fn with_name<S>(router: RouterService, name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            router,
            name: name.into(),
        }
    }

    pub fn router(&self) -> &RouterService {
        &self.router
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_router(self) -> RouterService {
        self.router
    }
}

pub fn build_router(
    upstream: UpstreamConfig,
    cors: CorsPolicy,
    client: Arc<dyn ProxyClient>,
) -> RouterService {
    let service = Arc::new(RecipeService::new(upstream, client));
    let generate_recipe = move |ctx: RequestContext| {
        let service = Arc::clone(&service);
        async move { service.handle(ctx).await }
    };

    RouterService::builder()
        .middleware(Cors::new(cors))
        .middleware(RequestLogger)
        .any(GENERATE_RECIPE_PATH, generate_recipe)
        .build()
}
