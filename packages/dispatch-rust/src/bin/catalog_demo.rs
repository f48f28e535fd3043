//! `catalog-demo`: runs a scripted set of category operations through the
//! dispatcher and prints every outcome as JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::Parser;
use courier_core::{
    fail, AuthorizationResult, Authorizer, CancellationToken, Error, Handler, Outcome, Validator,
};
use courier_dispatch::{
    init_tracing, Dispatcher, HandlerModule, HandlerRegistry, LogFormat, PipelineOptions,
    RegistryBuilder,
};
use parking_lot::RwLock;
use serde::Serialize;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "catalog-demo", about = "Dispatch a scripted catalog session")]
struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// JSON file with pipeline option overrides.
    #[arg(long, env = "COURIER_PIPELINE_CONFIG")]
    config: Option<PathBuf>,
    /// Enable the performance behavior with this threshold.
    #[arg(long)]
    slow_threshold_ms: Option<u64>,
    /// Enable the authorization behavior.
    #[arg(long)]
    enable_authorization: bool,
    /// Role of the simulated caller.
    #[arg(long, default_value = "editor")]
    role: String,
}

impl Args {
    fn pipeline_options(&self) -> anyhow::Result<PipelineOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                PipelineOptions::from_json(&json)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => PipelineOptions::default(),
        };
        if let Some(ms) = self.slow_threshold_ms {
            options.performance.enabled = true;
            options.slow_threshold_ms = ms;
        }
        if self.enable_authorization {
            options.authorization.enabled = true;
        }
        Ok(options)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct CategoryDto {
    id: u64,
    name: String,
    slug: String,
}

#[derive(Default)]
struct Catalog {
    categories: RwLock<BTreeMap<u64, CategoryDto>>,
    next_id: AtomicU64,
}

struct CreateCategory {
    name: String,
    slug: String,
}
courier_core::impl_command!(CreateCategory => u64);

struct GetCategoryById {
    id: u64,
}
courier_core::impl_query!(GetCategoryById => CategoryDto);

struct DeleteCategory {
    id: u64,
}
courier_core::impl_command!(DeleteCategory);

fn category_not_found(id: u64) -> Error {
    Error::not_found("Category.NotFound", format!("category {id} does not exist")).with_status_code(404)
}

struct CreateCategoryHandler(Arc<Catalog>);

#[async_trait]
impl Handler<CreateCategory> for CreateCategoryHandler {
    async fn handle(&self, message: CreateCategory, _cancel: &CancellationToken) -> Outcome<u64> {
        let mut categories = self.0.categories.write();
        if categories.values().any(|c| c.slug == message.slug) {
            return fail(
                Error::conflict("Category.SlugTaken", format!("slug `{}` is already used", message.slug))
                    .with_status_code(409),
            );
        }
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        categories.insert(
            id,
            CategoryDto {
                id,
                name: message.name,
                slug: message.slug,
            },
        );
        Ok(id)
    }
}

struct GetCategoryHandler(Arc<Catalog>);

#[async_trait]
impl Handler<GetCategoryById> for GetCategoryHandler {
    async fn handle(&self, message: GetCategoryById, _cancel: &CancellationToken) -> Outcome<CategoryDto> {
        self.0
            .categories
            .read()
            .get(&message.id)
            .cloned()
            .ok_or_else(|| category_not_found(message.id).into())
    }
}

struct DeleteCategoryHandler(Arc<Catalog>);

#[async_trait]
impl Handler<DeleteCategory> for DeleteCategoryHandler {
    async fn handle(&self, message: DeleteCategory, _cancel: &CancellationToken) -> Outcome {
        match self.0.categories.write().remove(&message.id) {
            Some(_) => Ok(()),
            None => fail(category_not_found(message.id)),
        }
    }
}

struct NameRequired;

#[async_trait]
impl Validator<CreateCategory> for NameRequired {
    async fn validate(&self, message: &CreateCategory, _cancel: &CancellationToken) -> Vec<Error> {
        if message.name.trim().is_empty() {
            vec![Error::validation("Category.NameRequired", "Name is required")]
        } else {
            Vec::new()
        }
    }
}

struct SlugFormat;

#[async_trait]
impl Validator<CreateCategory> for SlugFormat {
    async fn validate(&self, message: &CreateCategory, _cancel: &CancellationToken) -> Vec<Error> {
        let slug = message.slug.trim();
        if slug.is_empty() {
            return vec![Error::validation("Category.SlugRequired", "Slug is required")];
        }
        if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return vec![Error::validation(
                "Category.SlugFormat",
                "Slug may only contain lowercase letters, digits and dashes",
            )];
        }
        Vec::new()
    }
}

/// Lets only the `admin` role delete categories.
struct AdminOnly {
    caller_role: String,
}

#[async_trait]
impl Authorizer<DeleteCategory> for AdminOnly {
    async fn authorize(&self, _message: &DeleteCategory, _cancel: &CancellationToken) -> AuthorizationResult {
        if self.caller_role == "admin" {
            AuthorizationResult::allow()
        } else {
            AuthorizationResult::deny(
                Error::forbidden(
                    "Category.AdminOnly",
                    format!("role `{}` may not delete categories", self.caller_role),
                )
                .with_status_code(403),
            )
        }
    }
}

struct CatalogModule {
    catalog: Arc<Catalog>,
    caller_role: String,
}

impl HandlerModule for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn register(&self, registry: &mut RegistryBuilder) {
        registry
            .handler::<CreateCategory, _>(CreateCategoryHandler(Arc::clone(&self.catalog)))
            .handler::<GetCategoryById, _>(GetCategoryHandler(Arc::clone(&self.catalog)))
            .handler::<DeleteCategory, _>(DeleteCategoryHandler(Arc::clone(&self.catalog)))
            .validator::<CreateCategory, _>(NameRequired)
            .validator::<CreateCategory, _>(SlugFormat)
            .authorizer::<DeleteCategory, _>(AdminOnly {
                caller_role: self.caller_role.clone(),
            });
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(untagged)]
enum Report<'a, T: Serialize> {
    Success { step: &'a str, value: &'a T },
    Failure { step: &'a str, errors: &'a courier_core::Failure },
}

fn print_outcome<T: Serialize>(step: &str, outcome: &Outcome<T>) -> anyhow::Result<()> {
    let report = match outcome {
        Ok(value) => Report::Success { step, value },
        Err(failure) => Report::Failure { step, errors: failure },
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let options = args.pipeline_options()?;
    let mut builder = HandlerRegistry::builder();
    builder.module(&CatalogModule {
        catalog: Arc::new(Catalog::default()),
        caller_role: args.role.clone(),
    });
    let registry = Arc::new(builder.build()?);
    let dispatcher = Dispatcher::new(registry, options)?;
    let cancel = CancellationToken::new();

    let invalid = CreateCategory {
        name: String::new(),
        slug: "Not A Slug".to_string(),
    };
    print_outcome("create-invalid", &dispatcher.send(invalid, &cancel).await)?;

    let books = dispatcher
        .send(
            CreateCategory {
                name: "Books".to_string(),
                slug: "books".to_string(),
            },
            &cancel,
        )
        .await;
    print_outcome("create", &books)?;

    let duplicate = CreateCategory {
        name: "More books".to_string(),
        slug: "books".to_string(),
    };
    print_outcome("create-duplicate", &dispatcher.send(duplicate, &cancel).await)?;

    let id = books.unwrap_or_default();
    print_outcome("get", &dispatcher.query(GetCategoryById { id }, &cancel).await)?;
    print_outcome(
        "get-missing",
        &dispatcher.query(GetCategoryById { id: 999 }, &cancel).await,
    )?;
    print_outcome("delete", &dispatcher.send(DeleteCategory { id }, &cancel).await)?;
    print_outcome(
        "get-after-delete",
        &dispatcher.query(GetCategoryById { id }, &cancel).await,
    )?;

    Ok(())
}
