use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AuthService, AuthUser};
use crate::models::*;
use crate::notify::NotificationDispatcher;
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).min(100)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut account = Account {
        id: String::new(),
        username: body.username.clone(),
        email: body.email.clone(),
        password_hash,
        display_name: body
            .display_name
            .clone()
            .unwrap_or_else(|| body.username.clone()),
        bio: String::new(),
        avatar_url: String::new(),
        is_admin: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_account(&mut account) {
        Ok(_) => {}
        Err(StoreError::Conflict(msg)) => {
            return HttpResponse::Conflict().json(ApiResponse::<()>::error(msg))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to create account: {}", e)))
        }
    }

    let token = match state.auth_service.generate_token(&account.id, account.is_admin) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(LoginResponse { token, account }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let account = match state.store.get_account_by_username(&body.username) {
        Ok(a) => a,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid credentials"))
        }
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Database error"))
        }
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &account.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&account.id, account.is_admin) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(LoginResponse { token, account }))
}

pub async fn get_current_account(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    match state.store.get_account(&auth_user.account_id) {
        Ok(account) => HttpResponse::Ok().json(ApiResponse::success(account)),
        Err(_) => HttpResponse::NotFound().json(ApiResponse::<()>::error("Account not found")),
    }
}

// ==================== Account Endpoints ====================

pub async fn update_settings(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateSettingsRequest>,
) -> impl Responder {
    let mut account = match state.store.get_account(&auth_user.account_id) {
        Ok(a) => a,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Account not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get account: {}", e)))
        }
    };

    if let Some(ref display_name) = body.display_name {
        account.display_name = display_name.clone();
    }
    if let Some(ref bio) = body.bio {
        account.bio = bio.clone();
    }
    if let Some(ref avatar_url) = body.avatar_url {
        account.avatar_url = avatar_url.clone();
    }

    match state.store.update_account(&mut account) {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(account)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update account: {}", e))),
    }
}

pub async fn delete_account(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.delete_account(&auth_user.account_id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Account not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete account: {}", e))),
    }
}

pub async fn get_profile(
    state: web::Data<AppState>,
    viewer: Option<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let username = path.into_inner();
    let account = match state.store.get_account_by_username(&username) {
        Ok(a) => a,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Account not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get account: {}", e)))
        }
    };

    let follower_count = match state.store.follower_count(&account.id) {
        Ok(n) => n,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to count followers: {}", e)))
        }
    };
    let following_count = match state.store.following_count(&account.id) {
        Ok(n) => n,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to count following: {}", e)))
        }
    };

    // Only meaningful to a logged-in viewer; anonymous callers get no field.
    let is_following = match viewer {
        Some(ref v) => match state.store.is_following(&v.account_id, &account.id) {
            Ok(f) => Some(f),
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error(format!("Failed to check follow: {}", e)))
            }
        },
        None => None,
    };

    HttpResponse::Ok().json(ApiResponse::success(ProfileResponse {
        id: account.id,
        username: account.username,
        display_name: account.display_name,
        bio: account.bio,
        avatar_url: account.avatar_url,
        follower_count,
        following_count,
        is_following,
    }))
}

// ==================== Follow Endpoints ====================

pub async fn toggle_follow(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let target_id = path.into_inner();

    match state.store.toggle_follow(&auth_user.account_id, &target_id) {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(StoreError::SelfFollow) => HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("An account cannot follow itself")),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Account not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to toggle follow: {}", e))),
    }
}

// ==================== Photo Endpoints ====================

pub async fn create_photo(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreatePhotoRequest>,
) -> impl Responder {
    let mut photo = Photo {
        id: String::new(),
        owner_id: auth_user.account_id.clone(),
        project_id: None,
        title: body.title.clone(),
        url: body.url.clone(),
        like_count: 0,
        created_at: Utc::now(),
    };

    match state.store.create_photo(&mut photo) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(photo)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create photo: {}", e))),
    }
}

pub async fn list_photos(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    match state.store.list_photos(query.limit(), query.offset()) {
        Ok(photos) => HttpResponse::Ok().json(ApiResponse::success(photos)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list photos: {}", e))),
    }
}

pub async fn get_photo(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_photo(&id) {
        Ok(photo) => HttpResponse::Ok().json(ApiResponse::success(photo)),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get photo: {}", e))),
    }
}

pub async fn delete_photo(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    // Verify ownership first
    match state.store.get_photo(&id) {
        Ok(photo) => {
            if photo.owner_id != auth_user.account_id {
                return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"));
            }
        }
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get photo: {}", e)))
        }
    }

    match state.store.delete_photo(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete photo: {}", e))),
    }
}

// ==================== Vote Endpoints ====================

pub async fn cast_vote(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let photo_id = path.into_inner();

    let result = match state.store.cast_vote(&auth_user.account_id, &photo_id) {
        Ok(r) => r,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to cast vote: {}", e)))
        }
    };

    // A duplicate vote is not an error and must not notify again.
    if result.accepted {
        match (
            state.store.get_account(&auth_user.account_id),
            state.store.get_photo(&photo_id),
        ) {
            (Ok(actor), Ok(photo)) => state.dispatcher.vote_accepted(&actor, &photo),
            _ => log::error!(
                "Vote recorded but notification dispatch skipped for photo {}",
                photo_id
            ),
        }
    }

    HttpResponse::Ok().json(ApiResponse::success(result))
}

pub async fn has_voted(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let photo_id = path.into_inner();

    if let Err(StoreError::NotFound(_)) = state.store.get_photo(&photo_id) {
        return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"));
    }

    match state.store.has_voted(&auth_user.account_id, &photo_id) {
        Ok(voted) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "has_voted": voted })))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to check vote: {}", e))),
    }
}

// ==================== Comment Endpoints ====================

pub async fn create_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<CreateCommentRequest>,
) -> impl Responder {
    let photo_id = path.into_inner();

    let photo = match state.store.get_photo(&photo_id) {
        Ok(p) => p,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get photo: {}", e)))
        }
    };

    let mut comment = Comment {
        id: String::new(),
        photo_id: photo.id.clone(),
        author_id: auth_user.account_id.clone(),
        body: body.body.clone(),
        created_at: Utc::now(),
    };

    if let Err(e) = state.store.create_comment(&mut comment) {
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create comment: {}", e)));
    }

    match state.store.get_account(&auth_user.account_id) {
        Ok(actor) => state.dispatcher.comment_added(&actor, &photo, &comment.body),
        Err(e) => log::error!(
            "Comment recorded but notification dispatch skipped for photo {}: {}",
            photo_id,
            e
        ),
    }

    HttpResponse::Created().json(ApiResponse::success(comment))
}

pub async fn list_comments(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let photo_id = path.into_inner();

    if let Err(StoreError::NotFound(_)) = state.store.get_photo(&photo_id) {
        return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"));
    }

    match state.store.list_comments(&photo_id) {
        Ok(comments) => HttpResponse::Ok().json(ApiResponse::success(comments)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list comments: {}", e))),
    }
}

// ==================== Notification Endpoints ====================

pub async fn list_notifications(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<PageQuery>,
) -> impl Responder {
    match state
        .dispatcher
        .list(&auth_user.account_id, query.limit(), query.offset())
    {
        Ok(batch) => HttpResponse::Ok().json(ApiResponse::success(batch)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list notifications: {}", e))),
    }
}

pub async fn unread_count(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.dispatcher.unread_count(&auth_user.account_id) {
        Ok(count) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "count": count })))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to count unread: {}", e))),
    }
}

// ==================== Project Endpoints ====================

pub async fn create_project(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreateProjectRequest>,
) -> impl Responder {
    let mut project = Project {
        id: String::new(),
        owner_id: auth_user.account_id.clone(),
        name: body.name.clone(),
        status: body.status.unwrap_or(ProjectStatus::Active),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_project(&mut project) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(project)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create project: {}", e))),
    }
}

pub async fn list_projects(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    match state.store.list_projects_by_owner(&auth_user.account_id) {
        Ok(projects) => HttpResponse::Ok().json(ApiResponse::success(projects)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list projects: {}", e))),
    }
}

/// Fetch a project and hide its existence from anyone but the owner.
fn owned_project(
    store: &Store,
    project_id: &str,
    owner_id: &str,
) -> Result<Project, HttpResponse> {
    match store.get_project(project_id) {
        Ok(project) => {
            if project.owner_id != owner_id {
                return Err(HttpResponse::NotFound()
                    .json(ApiResponse::<()>::error("Project not found")));
            }
            Ok(project)
        }
        Err(StoreError::NotFound(_)) => {
            Err(HttpResponse::NotFound().json(ApiResponse::<()>::error("Project not found")))
        }
        Err(e) => Err(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get project: {}", e)))),
    }
}

pub async fn get_project(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    match owned_project(&state.store, &id, &auth_user.account_id) {
        Ok(project) => HttpResponse::Ok().json(ApiResponse::success(project)),
        Err(resp) => resp,
    }
}

pub async fn delete_project(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    if let Err(resp) = owned_project(&state.store, &id, &auth_user.account_id) {
        return resp;
    }

    match state.store.delete_project(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete project: {}", e))),
    }
}

pub async fn attach_photo(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (project_id, photo_id) = path.into_inner();
    if let Err(resp) = owned_project(&state.store, &project_id, &auth_user.account_id) {
        return resp;
    }

    // The photo must belong to the caller too.
    match state.store.get_photo(&photo_id) {
        Ok(photo) => {
            if photo.owner_id != auth_user.account_id {
                return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"));
            }
        }
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get photo: {}", e)))
        }
    }

    if let Err(e) = state.store.attach_photo_to_project(&photo_id, &project_id) {
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to attach photo: {}", e)));
    }

    match state.store.get_photo(&photo_id) {
        Ok(photo) => HttpResponse::Ok().json(ApiResponse::success(photo)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get photo: {}", e))),
    }
}

pub async fn detach_photo(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (project_id, photo_id) = path.into_inner();
    if let Err(resp) = owned_project(&state.store, &project_id, &auth_user.account_id) {
        return resp;
    }

    match state.store.detach_photo_from_project(&photo_id, &project_id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Photo not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to detach photo: {}", e))),
    }
}

// ==================== Share Endpoints ====================

pub async fn resolve_share(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let project_id = path.into_inner();

    match state.store.resolve_share(&project_id) {
        Ok((project_name, photos)) => HttpResponse::Ok().json(ApiResponse::success(ShareView {
            project_name,
            photos,
        })),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Project not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to resolve share link: {}", e))),
    }
}

// ==================== Admin Endpoints ====================

pub async fn admin_list_accounts(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    if !auth_user.is_admin {
        return HttpResponse::Forbidden().json(ApiResponse::<()>::error("Admin access required"));
    }

    match state.store.list_accounts() {
        Ok(accounts) => HttpResponse::Ok().json(ApiResponse::success(accounts)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list accounts: {}", e))),
    }
}

pub async fn admin_reconcile_likes(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> impl Responder {
    if !auth_user.is_admin {
        return HttpResponse::Forbidden().json(ApiResponse::<()>::error("Admin access required"));
    }

    match state.store.reconcile_like_counts() {
        Ok(fixed) => {
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "fixed": fixed })))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to reconcile likes: {}", e))),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Auth routes (no auth required)
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/me", web::get().to(get_current_account))

        // Account
        .route("/api/account/settings", web::put().to(update_settings))
        .route("/api/account", web::delete().to(delete_account))
        .route("/api/accounts/{username}", web::get().to(get_profile))
        .route("/api/accounts/{id}/follow", web::post().to(toggle_follow))

        // Photos
        .route("/api/photos", web::post().to(create_photo))
        .route("/api/photos", web::get().to(list_photos))
        .route("/api/photos/{id}", web::get().to(get_photo))
        .route("/api/photos/{id}", web::delete().to(delete_photo))
        .route("/api/photos/{id}/vote", web::post().to(cast_vote))
        .route("/api/photos/{id}/voted", web::get().to(has_voted))
        .route("/api/photos/{id}/comments", web::post().to(create_comment))
        .route("/api/photos/{id}/comments", web::get().to(list_comments))

        // Notifications
        .route("/api/notifications", web::get().to(list_notifications))
        .route("/api/notifications/unread-count", web::get().to(unread_count))

        // Projects and share links
        .route("/api/projects", web::post().to(create_project))
        .route("/api/projects", web::get().to(list_projects))
        .route("/api/projects/{id}", web::get().to(get_project))
        .route("/api/projects/{id}", web::delete().to(delete_project))
        .route("/api/projects/{id}/photos/{photo_id}", web::post().to(attach_photo))
        .route("/api/projects/{id}/photos/{photo_id}", web::delete().to(detach_photo))
        .route("/api/share/{project_id}", web::get().to(resolve_share))

        // Admin
        .route("/api/admin/accounts", web::get().to(admin_list_accounts))
        .route("/api/admin/reconcile-likes", web::post().to(admin_reconcile_likes));
}
