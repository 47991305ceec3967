use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account is a registered member of the platform. Each account owns its
/// photos, projects, and notification inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// FollowEdge is a directed link: `follower` wants to see `following`'s
/// activity. At most one edge exists per ordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEdge {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
    pub created_at: DateTime<Utc>,
}

/// Vote is a single "like" of a photo by one account, unique per
/// (voter, photo). There is no unvote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub voter_id: String,
    pub photo_id: String,
    pub created_at: DateTime<Utc>,
}

/// Photo metadata. The binary asset lives on external hosting; `url` points
/// at it. `like_count` is a cached tally of the votes referencing this photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub url: String,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Comment on a photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub photo_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The engagement events that fan out to a photo owner's inbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            _ => None,
        }
    }
}

/// Notification delivered to a photo's owner when someone votes or comments.
/// `actor_name` is a display-name snapshot taken when the event happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub actor_name: String,
    pub kind: NotificationKind,
    pub message: String,
    pub photo_id: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Delivered,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Delivered => "delivered",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "delivered" => Some(ProjectStatus::Delivered),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

/// Project is a private client gallery. Its id doubles as the share-link
/// capability token: anyone holding the id can read the project's photos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response types for the API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: Account,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePhotoRequest {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub status: Option<ProjectStatus>,
}

/// Result of a follow toggle. `follower_delta` is what the toggle did to the
/// target's follower count; the authoritative count comes from the profile.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FollowResult {
    pub is_following: bool,
    pub follower_delta: i32,
}

/// Result of a cast-vote attempt. `accepted: false` means the voter had
/// already voted; `new_total` is the stored tally either way.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VoteResult {
    pub accepted: bool,
    pub new_total: i64,
}

/// Public profile with server-computed counts. `is_following` is present
/// only when the request carried a valid token.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    pub follower_count: i64,
    pub following_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
}

/// What an unauthenticated share link resolves to: the project's name and
/// its photos, nothing else.
#[derive(Debug, Serialize)]
pub struct ShareView {
    pub project_name: String,
    pub photos: Vec<Photo>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
