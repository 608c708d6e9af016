//! HTTP API server
//!
//! Organization, user, group and topic management plus the preference and
//! decision endpoints. Responses use a `{ success, message?, data? }`
//! envelope; failures are rendered by [`crate::error::Error`].

use axum::{
    extract::{FromRequest, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{require_role, USER_ID_HEADER};
use crate::config::ApiConfig;
use crate::decision::{Decision, PreferenceResolver};
use crate::error::{Error, Result};
use crate::models::{
    Channel, ChannelSet, Group, GroupWithTopics, Organization, Role, Topic, User, UserGroupPref,
    UserTopicPref,
};
use crate::overview::{preference_overview, GroupOverview};
use crate::store::Repository;
use crate::validation::{require_fields, validate_email};

/// Shared application state
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub resolver: PreferenceResolver<dyn Repository>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, channels: ChannelSet) -> Self {
        let resolver = PreferenceResolver::new(Arc::clone(&repo), channels);
        Self { repo, resolver }
    }

    fn channels(&self) -> &ChannelSet {
        self.resolver.channels()
    }
}

// ============================================================================
// Envelopes and request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

type Reply<T> = Result<(StatusCode, Json<ApiResponse<T>>)>;

fn reply<T>(status: StatusCode, message: Option<&'static str>, data: T) -> Reply<T> {
    Ok((
        status,
        Json(ApiResponse {
            success: true,
            message,
            data: Some(data),
        }),
    ))
}

/// JSON body extractor whose rejections render as the error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
struct ApiJson<T>(T);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrgRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapAdminRequest {
    pub email: Option<String>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub organization_id: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    pub name: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub user_id: Option<String>,
    pub topic_id: Option<String>,
    /// Kept loose: a non-string channel is a denial, not a rejected body
    pub channel: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupPrefRequest {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicPrefRequest {
    pub user_id: Option<String>,
    pub topic_id: Option<String>,
    pub channel: Option<String>,
    pub enabled: Option<bool>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ============================================================================
// Router
// ============================================================================

/// Routes and tracing, without transport concerns
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Organizations
        .route("/orgs", post(create_org))
        .route("/orgs/:org_id/customers", get(list_customers))
        // Users
        .route("/users/bootstrap/admin", post(bootstrap_admin))
        .route("/users", post(create_user))
        // Groups and topics
        .route("/groups/create", post(create_group))
        .route("/groups/org/:org_id", get(list_groups))
        .route("/topics/create", post(create_topic))
        // Preferences
        .route("/preferences/decision", post(decide))
        .route("/preferences/groups", patch(update_group_pref))
        .route("/preferences/topics", patch(update_topic_pref))
        .route("/preferences/users/:user_id", get(user_preferences))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Full application: routes plus request timeout and CORS
pub fn app(state: Arc<AppState>, config: &ApiConfig) -> Result<Router> {
    let mut app = router(state).layer(TimeoutLayer::new(config.request_timeout));

    if config.cors_enabled {
        app = app.layer(cors_layer(&config.cors_origins)?);
    }

    Ok(app)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|_| Error::config(format!("Invalid CORS origin: {}", o)))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)]))
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server<F>(state: Arc<AppState>, config: &ApiConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(state, config)?;

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let version = env!("CARGO_PKG_VERSION");
    match state.repo.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            version,
        })
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    version,
                }),
            )
                .into_response()
        }
    }
}

async fn create_org(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateOrgRequest>,
) -> Reply<Organization> {
    require_fields(&[req.name.as_deref()], "Name is required")?;
    let name = req.name.unwrap_or_default();

    if state.repo.find_organization_by_name(&name).await?.is_some() {
        return Err(Error::conflict("Organization with this name already exists"));
    }

    let org = state.repo.create_organization(&name).await?;
    info!(org_id = %org.id, "organization created");
    reply(StatusCode::CREATED, Some("Organization created successfully"), org)
}

async fn list_customers(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> Reply<Vec<User>> {
    let customers = state.repo.list_customers(&org_id).await?;
    reply(StatusCode::OK, Some("Customers fetched successfully"), customers)
}

async fn bootstrap_admin(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BootstrapAdminRequest>,
) -> Reply<User> {
    require_fields(
        &[req.email.as_deref(), req.organization_id.as_deref()],
        "All fields are required (email, organizationId)",
    )?;
    let email = req.email.unwrap_or_default();
    let org_id = req.organization_id.unwrap_or_default();

    if !validate_email(&email) {
        return Err(Error::bad_request("Invalid email address"));
    }

    if state.repo.find_organization(&org_id).await?.is_none() {
        return Err(Error::not_found("Organization", org_id));
    }

    if let Some(admin) = state.repo.find_admin(&org_id).await? {
        return reply(
            StatusCode::OK,
            Some("Admin already exists for this organization. Use this ID in x-user-id header."),
            admin,
        );
    }

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(Error::conflict("User with this email already exists"));
    }

    let admin = state.repo.create_user(&email, &org_id, Role::Admin).await?;
    info!(user_id = %admin.id, org_id = %org_id, "bootstrap admin created");
    reply(
        StatusCode::CREATED,
        Some("Admin user created successfully. Use this ID in x-user-id header for admin routes."),
        admin,
    )
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Reply<User> {
    let admin = require_role(state.repo.as_ref(), &headers, None, Role::Admin).await?;

    require_fields(
        &[
            req.email.as_deref(),
            req.organization_id.as_deref(),
            req.role.as_deref(),
        ],
        "All fields are required (email, organizationId, role)",
    )?;
    let email = req.email.unwrap_or_default();
    let org_id = req.organization_id.unwrap_or_default();
    let role: Role = req.role.unwrap_or_default().parse()?;

    if !validate_email(&email) {
        return Err(Error::bad_request("Invalid email address"));
    }

    if state.repo.find_organization(&org_id).await?.is_none() {
        return Err(Error::not_found("Organization", org_id));
    }
    ensure_same_org(&admin, &org_id)?;

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(Error::conflict("User with this email already exists"));
    }

    let user = state.repo.create_user(&email, &org_id, role).await?;
    info!(user_id = %user.id, role = %user.role, "user created");
    reply(StatusCode::CREATED, Some("User created successfully"), user)
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> Reply<Group> {
    let admin = require_role(state.repo.as_ref(), &headers, None, Role::Admin).await?;

    require_fields(
        &[req.name.as_deref(), req.organization_id.as_deref()],
        "All fields are required (name, organizationId)",
    )?;
    let name = req.name.unwrap_or_default();
    let org_id = req.organization_id.unwrap_or_default();

    if state.repo.find_organization(&org_id).await?.is_none() {
        return Err(Error::not_found("Organization", org_id));
    }
    ensure_same_org(&admin, &org_id)?;

    if state.repo.find_group_by_name(&org_id, &name).await?.is_some() {
        return Err(Error::conflict(
            "Group with this name already exists in the organization",
        ));
    }

    let group = state.repo.create_group(&name, &org_id).await?;
    info!(group_id = %group.id, org_id = %org_id, "group created");
    reply(StatusCode::CREATED, Some("Group created successfully"), group)
}

async fn list_groups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(org_id): Path<String>,
) -> Reply<Vec<GroupWithTopics>> {
    let admin = require_role(state.repo.as_ref(), &headers, None, Role::Admin).await?;
    ensure_same_org(&admin, &org_id)?;

    let groups = state.repo.list_groups_with_topics(&org_id).await?;
    reply(StatusCode::OK, Some("Groups fetched successfully"), groups)
}

async fn create_topic(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateTopicRequest>,
) -> Reply<Topic> {
    let admin = require_role(state.repo.as_ref(), &headers, None, Role::Admin).await?;

    require_fields(
        &[req.name.as_deref(), req.group_id.as_deref()],
        "All fields are required (name, groupId)",
    )?;
    let name = req.name.unwrap_or_default();
    let group_id = req.group_id.unwrap_or_default();

    let group = state
        .repo
        .find_group(&group_id)
        .await?
        .ok_or_else(|| Error::not_found("Group", group_id.clone()))?;
    ensure_same_org(&admin, &group.organization_id)?;

    if state.repo.find_topic_by_name(&group_id, &name).await?.is_some() {
        return Err(Error::conflict("Topic with this name already exists in the group"));
    }

    let topic = state.repo.create_topic(&name, &group_id).await?;
    info!(topic_id = %topic.id, group_id = %group_id, "topic created");
    reply(StatusCode::CREATED, Some("Topic created successfully"), topic)
}

async fn decide(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<DecisionRequest>,
) -> Reply<Decision> {
    const MISSING: &str = "All fields are required (userId, topicId, channel)";
    require_fields(&[req.user_id.as_deref(), req.topic_id.as_deref()], MISSING)?;
    let user_id = req.user_id.unwrap_or_default();
    let topic_id = req.topic_id.unwrap_or_default();

    let channel = match req.channel {
        Some(Value::String(name)) if !name.trim().is_empty() => Channel::new(name),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            return Err(Error::bad_request(MISSING));
        }
        Some(other) => {
            debug!(%user_id, %topic_id, channel = %other, "non-string channel denied");
            return reply(StatusCode::OK, None, Decision { allowed: false });
        }
    };

    let decision = state
        .resolver
        .is_notification_allowed(&user_id, &topic_id, &channel)
        .await?;
    reply(StatusCode::OK, None, decision)
}

async fn update_group_pref(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateGroupPrefRequest>,
) -> Reply<UserGroupPref> {
    let user = require_role(
        state.repo.as_ref(),
        &headers,
        req.user_id.as_deref(),
        Role::Customer,
    )
    .await?;

    require_fields(
        &[req.group_id.as_deref()],
        "All fields are required (userId, groupId, enabled)",
    )?;
    let enabled = req
        .enabled
        .ok_or_else(|| Error::bad_request("All fields are required (userId, groupId, enabled)"))?;
    let group_id = req.group_id.unwrap_or_default();

    if state.repo.find_group(&group_id).await?.is_none() {
        return Err(Error::not_found("Group", group_id));
    }

    let pref = state
        .repo
        .upsert_group_pref(&user.id, &group_id, enabled)
        .await?;
    info!(user_id = %user.id, group_id = %group_id, enabled, "group preference updated");
    reply(StatusCode::OK, Some("Group preferences updated successfully"), pref)
}

async fn update_topic_pref(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateTopicPrefRequest>,
) -> Reply<UserTopicPref> {
    let user = require_role(
        state.repo.as_ref(),
        &headers,
        req.user_id.as_deref(),
        Role::Customer,
    )
    .await?;

    const MISSING: &str = "All fields are required (userId, topicId, channel, enabled)";
    require_fields(&[req.topic_id.as_deref(), req.channel.as_deref()], MISSING)?;
    let enabled = req.enabled.ok_or_else(|| Error::bad_request(MISSING))?;
    let topic_id = req.topic_id.unwrap_or_default();
    let channel = Channel::new(req.channel.unwrap_or_default());

    if !state.channels().contains(&channel) {
        return Err(Error::bad_request(format!("Unknown channel '{}'", channel)));
    }

    if state.repo.find_topic(&topic_id).await?.is_none() {
        return Err(Error::not_found("Topic", topic_id));
    }

    let pref = state
        .repo
        .upsert_topic_pref(&user.id, &topic_id, &channel, enabled)
        .await?;
    info!(user_id = %user.id, topic_id = %topic_id, channel = %channel, enabled, "topic preference updated");
    reply(StatusCode::OK, Some("Topic preferences updated successfully"), pref)
}

async fn user_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Reply<Vec<GroupOverview>> {
    let overview = preference_overview(state.repo.as_ref(), state.channels(), &user_id).await?;
    reply(StatusCode::OK, None, overview)
}

/// Admins only manage their own organization
fn ensure_same_org(admin: &User, org_id: &str) -> Result<()> {
    if admin.organization_id == org_id {
        Ok(())
    } else {
        Err(Error::forbidden("Organization belongs to another tenant"))
    }
}
