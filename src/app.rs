#![cfg(feature = "web")]

use axum::{
    Extension, Form, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::AppConfig;
use crate::draft::Draft;
use crate::error::{AuthError, Result};
use crate::federated::HttpCodeExchange;
use crate::login::{AuthEvent, AuthService, Identity};
use crate::model::{ItemInput, NewProject, ProjectMeta};
use crate::section::{ItemAction, SectionState};
use crate::store::{DocumentStore, MemoryStore};
use crate::tracker::Tracker;
use crate::views::{self, LoginPage, Views};

const SESSION_COOKIE: &str = "session";

/// Everything request handlers share: the tracker over the document store,
/// the auth service and the compiled views.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Tracker,
    pub auth: Arc<AuthService>,
    pub views: Arc<Views>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(tracker: Tracker, auth: AuthService, config: AppConfig) -> Result<Self> {
        Ok(AppState {
            tracker,
            auth: Arc::new(auth),
            views: Arc::new(Views::new()?),
            config: Arc::new(config),
        })
    }

    /// Open the store and account file named by `config`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match &config.data_file {
            Some(path) => Arc::new(MemoryStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        let mut auth = match &config.users_file {
            Some(path) => AuthService::open(path, config.session_ttl)?,
            None => AuthService::in_memory(config.session_ttl),
        };
        if let Some(federated) = &config.federated {
            let exchange = Arc::new(HttpCodeExchange::new(federated.clone()));
            auth = auth.with_federated(federated.clone(), exchange);
        }

        Self::new(Tracker::new(store), auth, config)
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(serve_dashboard))
        .route("/project/new", get(serve_new_project).post(handle_new_project))
        .route("/project/:project_id", get(serve_project))
        .route("/project/:project_id/meta", post(handle_save_meta))
        .route("/project/:project_id/sections", post(handle_add_section))
        .route(
            "/project/:project_id/sections/:section_id",
            post(handle_rename_section),
        )
        .route(
            "/project/:project_id/sections/:section_id/items",
            post(handle_submit_item),
        )
        .route(
            "/project/:project_id/sections/:section_id/items/:item_id/delete",
            post(handle_delete_item),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(serve_root))
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/login/federated", post(handle_federated_start))
        .route("/login/federated/callback", get(handle_federated_callback))
        .route("/logout", post(handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

pub async fn run(config: AppConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    let seed = config.seed_legacy_project;
    let state = AppState::from_config(config)?;

    if seed {
        state.tracker.seed_legacy_project().await?;
    }

    // Auth events are logged for as long as the service lives
    let mut events = state.auth.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AuthEvent::SignedIn(identity) => log::info!("signed in: {}", identity.uid),
                AuthEvent::SignedOut(identity) => log::info!("signed out: {}", identity.uid),
            }
        }
    });

    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

fn session_identity(state: &AppState, jar: &CookieJar) -> Option<Identity> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.auth.current_identity(cookie.value()))
}

/// Authentication gate
///
/// Requests with a valid session continue with the [`Identity`] attached as
/// an extension; everything else is redirected to the login page.
async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_identity(&state, &jar) {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

async fn serve_root(State(state): State<AppState>, jar: CookieJar) -> Redirect {
    if session_identity(&state, &jar).is_some() {
        Redirect::to("/dashboard")
    } else {
        Redirect::to("/login")
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginQuery {
    mode: Option<String>,
}

/// Credential data for email/password sign-in and sign-up
#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    /// `signup` registers a new account, anything else signs in
    #[serde(default)]
    mode: String,
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

async fn serve_login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Html<String>> {
    let signup = query.mode.as_deref() == Some("signup");
    let page = LoginPage::new(signup, state.auth.federated_config().is_some());
    state.views.login(&page)
}

/// Handle email/password sign-in and sign-up
///
/// On success the session cookie is set and the browser is sent to the
/// dashboard; on failure the login view is rendered again with the error.
async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let signup = form.mode == "signup";
    let email = form.email.as_str();
    let password = form.password.as_str();

    let outcome = if signup {
        state.auth.sign_up(email, password)
    } else {
        state.auth.sign_in(email, password)
    }
    .and_then(|identity| state.auth.start_session(&identity));

    match outcome {
        Ok(session_id) => (jar.add(session_cookie(session_id)), Redirect::to("/dashboard")).into_response(),
        Err(err) => login_failure(&state, signup, email, err),
    }
}

fn login_failure(state: &AppState, signup: bool, email: &str, err: AuthError) -> Response {
    log::warn!("sign-in failed: {}", err);
    let page = LoginPage::new(signup, state.auth.federated_config().is_some()).with_error(email, &err);
    match state.views.login(&page) {
        Ok(html) => (StatusCode::UNAUTHORIZED, html).into_response(),
        Err(render_err) => render_err.into_response(),
    }
}

async fn handle_federated_start(State(state): State<AppState>) -> Response {
    let Some(config) = state.auth.federated_config() else {
        return login_failure(&state, false, "", AuthError::FederatedUnavailable);
    };

    match state.auth.begin_federated() {
        Ok(auth_state) => Redirect::to(&config.authorize_redirect(&auth_state)).into_response(),
        Err(err) => login_failure(&state, false, "", err),
    }
}

#[derive(Debug, Deserialize)]
struct FederatedCallback {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
    error: Option<String>,
}

async fn handle_federated_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(callback): Query<FederatedCallback>,
) -> Response {
    if let Some(error) = callback.error {
        return login_failure(&state, false, "", AuthError::Exchange(error));
    }

    let outcome = match state.auth.complete_federated(&callback.code, &callback.state).await {
        Ok(identity) => state.auth.start_session(&identity),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(session_id) => (jar.add(session_cookie(session_id)), Redirect::to("/dashboard")).into_response(),
        Err(err) => login_failure(&state, false, "", err),
    }
}

async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.auth.sign_out(cookie.value());
    }
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(removal), Redirect::to("/login"))
}

async fn serve_dashboard(State(state): State<AppState>) -> Result<Html<String>> {
    let dashboard = state.tracker.dashboard().await?;
    state.views.dashboard(&dashboard)
}

async fn serve_new_project(State(state): State<AppState>) -> Result<Html<String>> {
    state.views.new_project(None)
}

#[derive(Debug, Deserialize)]
struct NewProjectForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    start_date: String,
}

async fn handle_new_project(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Form(form): Form<NewProjectForm>,
) -> Result<Response> {
    let start_date = NaiveDate::parse_from_str(form.start_date.trim(), "%Y-%m-%d").ok();
    if form.name.trim().is_empty() || start_date.is_none() {
        let html = state
            .views
            .new_project(Some("Project name and start date are required"))?;
        return Ok((StatusCode::BAD_REQUEST, html).into_response());
    }

    let input = NewProject {
        name: form.name,
        description: form.description,
        start_date,
    };
    state.tracker.create_project(&identity.uid, &input).await?;
    Ok(Redirect::to("/dashboard").into_response())
}

#[derive(Debug, Default, Deserialize)]
struct ProjectQuery {
    open: Option<String>,
    edit: Option<String>,
}

async fn serve_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Html<String>> {
    let detail = state.tracker.load_project(&project_id).await?;
    let open = views::split_open(query.open.as_deref());
    state
        .views
        .project(&detail, &open, query.edit.as_deref().filter(|e| !e.is_empty()))
}

#[derive(Debug, Deserialize)]
struct MetaForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    original_name: String,
    #[serde(default)]
    original_description: String,
}

async fn handle_save_meta(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Form(form): Form<MetaForm>,
) -> Result<Redirect> {
    let mut draft = Draft::from_parts(
        ProjectMeta {
            name: form.original_name,
            description: form.original_description,
        },
        ProjectMeta {
            name: form.name,
            description: form.description,
        },
    );
    let outcome = state.tracker.save_meta(&project_id, &mut draft).await?;
    log::debug!("metadata of {}: {:?}", project_id, outcome);

    Ok(Redirect::to(&views::project_location(&project_id, None, None)))
}

#[derive(Debug, Deserialize)]
struct SectionForm {
    #[serde(default)]
    section_name: String,
    open: Option<String>,
}

async fn handle_add_section(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Form(form): Form<SectionForm>,
) -> Result<Redirect> {
    state.tracker.add_section(&project_id, &form.section_name).await?;
    Ok(Redirect::to(&views::project_location(
        &project_id,
        form.open.as_deref(),
        None,
    )))
}

async fn handle_rename_section(
    State(state): State<AppState>,
    Path((project_id, section_id)): Path<(String, String)>,
    Form(form): Form<SectionForm>,
) -> Result<Redirect> {
    state
        .tracker
        .rename_section(&project_id, &section_id, &form.section_name)
        .await?;
    Ok(Redirect::to(&views::project_location(
        &project_id,
        form.open.as_deref(),
        None,
    )))
}

#[derive(Debug, Deserialize)]
struct ItemForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    amount: String,
    editing: Option<String>,
    open: Option<String>,
}

/// Add a new item, or update the one selected for editing
async fn handle_submit_item(
    State(state): State<AppState>,
    Path((project_id, section_id)): Path<(String, String)>,
    Form(form): Form<ItemForm>,
) -> Result<Redirect> {
    let mut section = SectionState::with_editing(true, form.editing);
    let input = ItemInput::from_form(&form.name, &form.amount);

    let action = state
        .tracker
        .submit_item(&project_id, &section_id, &mut section, &input)
        .await?;
    if action == ItemAction::Rejected {
        log::debug!("item form rejected in {}/{}", project_id, section_id);
    }

    // A rejected edit keeps the item selected
    Ok(Redirect::to(&views::project_location(
        &project_id,
        form.open.as_deref(),
        section.editing_item_id(),
    )))
}

#[derive(Debug, Deserialize)]
struct OpenForm {
    open: Option<String>,
}

async fn handle_delete_item(
    State(state): State<AppState>,
    Path((project_id, section_id, item_id)): Path<(String, String, String)>,
    Form(form): Form<OpenForm>,
) -> Result<Redirect> {
    state
        .tracker
        .delete_item(&project_id, &section_id, &item_id)
        .await?;
    Ok(Redirect::to(&views::project_location(
        &project_id,
        form.open.as_deref(),
        None,
    )))
}
