use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, patch},
};
use chrono::Utc;

use garments_accounting::category::sort_for_listing;
use garments_accounting::{Category, CategoryId, CategoryInput, CategoryType, CategoryView, JournalEntry};
use garments_core::{DomainError, TenantId};
use garments_infra::TenantStore;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{SearchQuery, created, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/search", get(search_categories))
        .route("/type/:category_type", get(by_type))
        .route(
            "/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/:id/toggle-status", patch(toggle_status))
}

fn views(categories: Vec<Category>, entries: &[JournalEntry]) -> Vec<CategoryView> {
    categories
        .into_iter()
        .map(|category| CategoryView {
            usage_count: category.usage_count(entries),
            category,
        })
        .collect()
}

/// Active categories matching `keep`, in listing order, with usage counts.
async fn active_views(
    services: &AppServices,
    tenant_id: TenantId,
    keep: impl Fn(&Category) -> bool,
) -> Result<Vec<CategoryView>, ApiError> {
    let mut categories: Vec<Category> = services
        .categories
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|c| c.is_active && keep(c))
        .collect();
    sort_for_listing(&mut categories);
    let entries = services.journals.list(tenant_id).await?;
    Ok(views(categories, &entries))
}

async fn load_category(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<Category, ApiError> {
    let id: CategoryId = parse(raw_id)?;
    services
        .categories
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Category").into())
}

async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.view").await?;
    Ok(ok(active_views(&services, tenant.tenant_id(), |_| true).await?))
}

async fn get_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.view").await?;
    let category = load_category(&services, tenant.tenant_id(), &id).await?;
    let entries = services.journals.list(tenant.tenant_id()).await?;
    Ok(ok(CategoryView {
        usage_count: category.usage_count(&entries),
        category,
    }))
}

async fn by_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(category_type): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.view").await?;
    let category_type = CategoryType::parse(&category_type)?;
    Ok(ok(
        active_views(&services, tenant.tenant_id(), |c| c.category_type == category_type).await?,
    ))
}

async fn search_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.view").await?;
    Ok(ok(
        active_views(&services, tenant.tenant_id(), |c| c.matches_search(&query.q)).await?,
    ))
}

async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CategoryInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.create").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.categories.list(tenant_id).await?;
    let category = Category::create(&body, &existing, principal.user_id(), Utc::now())?;
    services.categories.upsert(tenant_id, category.id, category.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, name = %category.name, "category created");
    Ok(created(CategoryView {
        category,
        usage_count: 0,
    }))
}

async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CategoryInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.update").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut category = load_category(&services, tenant_id, &id).await?;
    let existing = services.categories.list(tenant_id).await?;
    category.update(&body, &existing, principal.user_id(), Utc::now())?;
    services.categories.upsert(tenant_id, category.id, category.clone()).await?;

    let entries = services.journals.list(tenant_id).await?;
    Ok(ok(CategoryView {
        usage_count: category.usage_count(&entries),
        category,
    }))
}

async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.delete").await?;
    let tenant_id = tenant.tenant_id();
    let mut category = load_category(&services, tenant_id, &id).await?;
    let entries = services.journals.list(tenant_id).await?;
    category.deactivate(category.usage_count(&entries), principal.user_id(), Utc::now())?;
    services.categories.upsert(tenant_id, category.id, category.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, name = %category.name, "category deleted");
    Ok(ok(serde_json::json!({
        "message": format!("Category '{}' deleted successfully", category.name)
    })))
}

async fn toggle_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "category.update").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut category = load_category(&services, tenant_id, &id).await?;
    let entries = services.journals.list(tenant_id).await?;
    let usage_count = category.usage_count(&entries);
    if !category.is_active {
        // Reactivating must not collide with an active namesake.
        let existing = services.categories.list(tenant_id).await?;
        let input = CategoryInput {
            name: category.name.clone(),
            description: category.description.clone(),
            category_type: category.category_type,
        };
        Category::create(&input, &existing, principal.user_id(), Utc::now())?;
    }
    category.toggle_status(usage_count, principal.user_id(), Utc::now())?;
    services.categories.upsert(tenant_id, category.id, category.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, name = %category.name, active = category.is_active, "category status toggled");
    Ok(ok(CategoryView { category, usage_count }))
}
