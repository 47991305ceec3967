use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, Comment, FollowEdge, FollowResult, Notification, NotificationKind, Photo, Project,
    ProjectStatus, Vote, VoteResult,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An account cannot follow itself")]
    SelfFollow,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of an inbox, plus how many rows the read-flip touched.
#[derive(Debug, Serialize)]
pub struct NotificationBatch {
    pub notifications: Vec<Notification>,
    pub total: i64,
    pub marked_read: usize,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn account_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT DEFAULT '',
                bio TEXT DEFAULT '',
                avatar_url TEXT DEFAULT '',
                is_admin INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follow_edges (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES accounts(id),
                FOREIGN KEY (following_id) REFERENCES accounts(id),
                UNIQUE(follower_id, following_id)
            );

            CREATE TABLE IF NOT EXISTS photos (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                project_id TEXT,
                title TEXT DEFAULT '',
                url TEXT NOT NULL,
                like_count INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES accounts(id),
                FOREIGN KEY (project_id) REFERENCES projects(id)
            );

            CREATE TABLE IF NOT EXISTS votes (
                id TEXT PRIMARY KEY,
                voter_id TEXT NOT NULL,
                photo_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (voter_id) REFERENCES accounts(id),
                FOREIGN KEY (photo_id) REFERENCES photos(id),
                UNIQUE(voter_id, photo_id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                photo_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (photo_id) REFERENCES photos(id),
                FOREIGN KEY (author_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                actor_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                photo_id TEXT NOT NULL,
                is_read INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (recipient_id) REFERENCES accounts(id)
            );

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES accounts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_follow_edges_follower ON follow_edges(follower_id);
            CREATE INDEX IF NOT EXISTS idx_follow_edges_following ON follow_edges(following_id);
            CREATE INDEX IF NOT EXISTS idx_photos_owner ON photos(owner_id);
            CREATE INDEX IF NOT EXISTS idx_photos_project ON photos(project_id);
            CREATE INDEX IF NOT EXISTS idx_votes_photo ON votes(photo_id);
            CREATE INDEX IF NOT EXISTS idx_comments_photo ON comments(photo_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== Account Operations ====================

    pub fn create_account(&self, account: &mut Account) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        account.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        account.created_at = now;
        account.updated_at = now;

        conn.execute(
            r#"INSERT INTO accounts (id, username, email, password_hash, display_name, bio,
                avatar_url, is_admin, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                &account.id,
                &account.username,
                &account.email,
                &account.password_hash,
                &account.display_name,
                &account.bio,
                &account.avatar_url,
                account.is_admin,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("Username or email already taken".to_string())
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> StoreResult<Account> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM accounts WHERE id = ?1",
            params![id],
            |row| self.row_to_account(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Account {}", id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM accounts WHERE username = ?1",
            params![username],
            |row| self.row_to_account(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Account {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_account(&self, account: &mut Account) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        account.updated_at = Utc::now();

        let rows = conn.execute(
            r#"UPDATE accounts SET display_name = ?1, bio = ?2, avatar_url = ?3, updated_at = ?4
               WHERE id = ?5"#,
            params![
                &account.display_name,
                &account.bio,
                &account.avatar_url,
                account.updated_at.to_rfc3339(),
                &account.id,
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("Account {}", account.id)));
        }
        Ok(())
    }

    pub fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM accounts ORDER BY created_at ASC")?;
        let accounts = stmt
            .query_map([], |row| self.row_to_account(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn count_accounts(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove an account and every row hanging off it. Tallies on other
    /// accounts' photos are recounted after the account's votes disappear.
    pub fn delete_account(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !account_exists(&tx, id)? {
            return Err(StoreError::NotFound(format!("Account {}", id)));
        }

        // Owned photos take their votes and comments with them.
        tx.execute(
            "DELETE FROM votes WHERE photo_id IN (SELECT id FROM photos WHERE owner_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM comments WHERE photo_id IN (SELECT id FROM photos WHERE owner_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM photos WHERE owner_id = ?1", params![id])?;

        // Votes cast elsewhere leave stale tallies behind; recount those photos.
        let affected: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT DISTINCT photo_id FROM votes WHERE voter_id = ?1")?;
            let ids = stmt
                .query_map(params![id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };
        tx.execute("DELETE FROM votes WHERE voter_id = ?1", params![id])?;
        for photo_id in &affected {
            tx.execute(
                r#"UPDATE photos
                   SET like_count = (SELECT COUNT(*) FROM votes WHERE photo_id = ?1)
                   WHERE id = ?1"#,
                params![photo_id],
            )?;
        }

        tx.execute("DELETE FROM comments WHERE author_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM notifications WHERE recipient_id = ?1",
            params![id],
        )?;

        tx.execute(
            "UPDATE photos SET project_id = NULL WHERE project_id IN (SELECT id FROM projects WHERE owner_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM projects WHERE owner_id = ?1", params![id])?;

        tx.execute(
            "DELETE FROM follow_edges WHERE follower_id = ?1 OR following_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    fn row_to_account(&self, row: &rusqlite::Row) -> rusqlite::Result<Account> {
        Ok(Account {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            display_name: row.get("display_name")?,
            bio: row.get("bio")?,
            avatar_url: row.get("avatar_url")?,
            is_admin: row.get("is_admin")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    // ==================== Follow Operations ====================

    /// Flip the follow edge from one account to another. Delete and insert
    /// share a transaction so two racing toggles can never leave a duplicate
    /// edge or report a removal that never happened.
    pub fn toggle_follow(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> StoreResult<FollowResult> {
        if follower_id == following_id {
            return Err(StoreError::SelfFollow);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !account_exists(&tx, follower_id)? {
            return Err(StoreError::NotFound(format!("Account {}", follower_id)));
        }
        if !account_exists(&tx, following_id)? {
            return Err(StoreError::NotFound(format!("Account {}", following_id)));
        }

        let removed = tx.execute(
            "DELETE FROM follow_edges WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
        )?;

        let result = if removed > 0 {
            FollowResult {
                is_following: false,
                follower_delta: -1,
            }
        } else {
            tx.execute(
                r#"INSERT INTO follow_edges (id, follower_id, following_id, created_at)
                   VALUES (?1, ?2, ?3, ?4)"#,
                params![
                    Uuid::new_v4().to_string(),
                    follower_id,
                    following_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            FollowResult {
                is_following: true,
                follower_delta: 1,
            }
        };

        tx.commit()?;
        Ok(result)
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM follow_edges WHERE follower_id = ?1 AND following_id = ?2)",
            params![follower_id, following_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn follower_count(&self, account_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follow_edges WHERE following_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn following_count(&self, account_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follow_edges WHERE follower_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_following(&self, follower_id: &str) -> StoreResult<Vec<FollowEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM follow_edges WHERE follower_id = ?1 ORDER BY created_at DESC",
        )?;
        let edges = stmt
            .query_map(params![follower_id], |row| self.row_to_follow_edge(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn row_to_follow_edge(&self, row: &rusqlite::Row) -> rusqlite::Result<FollowEdge> {
        Ok(FollowEdge {
            id: row.get("id")?,
            follower_id: row.get("follower_id")?,
            following_id: row.get("following_id")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Vote Operations ====================

    /// Record a vote for (voter, photo). The UNIQUE constraint on the pair
    /// enforces at-most-one: a duplicate insert comes back as `accepted:
    /// false` with the tally untouched. Insert and tally bump share one
    /// transaction.
    pub fn cast_vote(&self, voter_id: &str, photo_id: &str) -> StoreResult<VoteResult> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: i64 = tx
            .query_row(
                "SELECT like_count FROM photos WHERE id = ?1",
                params![photo_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Photo {}", photo_id))
                }
                _ => StoreError::Database(e),
            })?;

        let inserted = tx.execute(
            "INSERT INTO votes (id, voter_id, photo_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                voter_id,
                photo_id,
                Utc::now().to_rfc3339(),
            ],
        );

        let result = match inserted {
            Ok(_) => {
                tx.execute(
                    "UPDATE photos SET like_count = like_count + 1 WHERE id = ?1",
                    params![photo_id],
                )?;
                let new_total: i64 = tx.query_row(
                    "SELECT like_count FROM photos WHERE id = ?1",
                    params![photo_id],
                    |row| row.get(0),
                )?;
                VoteResult {
                    accepted: true,
                    new_total,
                }
            }
            Err(e) if is_unique_violation(&e) => VoteResult {
                accepted: false,
                new_total: current,
            },
            Err(e) => return Err(StoreError::Database(e)),
        };

        tx.commit()?;
        Ok(result)
    }

    pub fn has_voted(&self, voter_id: &str, photo_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM votes WHERE voter_id = ?1 AND photo_id = ?2)",
            params![voter_id, photo_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn list_votes_for_photo(&self, photo_id: &str) -> StoreResult<Vec<Vote>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM votes WHERE photo_id = ?1 ORDER BY created_at ASC")?;
        let votes = stmt
            .query_map(params![photo_id], |row| self.row_to_vote(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(votes)
    }

    /// Rewrite every cached tally from the vote rows. Returns how many photos
    /// were out of sync.
    pub fn reconcile_like_counts(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"UPDATE photos
               SET like_count = (SELECT COUNT(*) FROM votes WHERE votes.photo_id = photos.id)
               WHERE like_count <> (SELECT COUNT(*) FROM votes WHERE votes.photo_id = photos.id)"#,
            [],
        )?;
        Ok(changed)
    }

    fn row_to_vote(&self, row: &rusqlite::Row) -> rusqlite::Result<Vote> {
        Ok(Vote {
            id: row.get("id")?,
            voter_id: row.get("voter_id")?,
            photo_id: row.get("photo_id")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Photo Operations ====================

    pub fn create_photo(&self, photo: &mut Photo) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        photo.id = Uuid::new_v4().to_string();
        photo.like_count = 0;
        photo.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO photos (id, owner_id, project_id, title, url, like_count, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &photo.id,
                &photo.owner_id,
                &photo.project_id,
                &photo.title,
                &photo.url,
                photo.like_count,
                photo.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_photo(&self, id: &str) -> StoreResult<Photo> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM photos WHERE id = ?1", params![id], |row| {
            self.row_to_photo(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Photo {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn list_photos(&self, limit: i64, offset: i64) -> StoreResult<Vec<Photo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM photos ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")?;
        let photos = stmt
            .query_map(params![limit, offset], |row| self.row_to_photo(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn delete_photo(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM votes WHERE photo_id = ?1", params![id])?;
        tx.execute("DELETE FROM comments WHERE photo_id = ?1", params![id])?;
        tx.execute("DELETE FROM notifications WHERE photo_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM photos WHERE id = ?1", params![id])?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("Photo {}", id)));
        }

        tx.commit()?;
        Ok(())
    }

    fn row_to_photo(&self, row: &rusqlite::Row) -> rusqlite::Result<Photo> {
        Ok(Photo {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            url: row.get("url")?,
            like_count: row.get("like_count")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Comment Operations ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        comment.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO comments (id, photo_id, author_id, body, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &comment.id,
                &comment.photo_id,
                &comment.author_id,
                &comment.body,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_comments(&self, photo_id: &str) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM comments WHERE photo_id = ?1 ORDER BY created_at ASC")?;
        let comments = stmt
            .query_map(params![photo_id], |row| self.row_to_comment(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    fn row_to_comment(&self, row: &rusqlite::Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get("id")?,
            photo_id: row.get("photo_id")?,
            author_id: row.get("author_id")?,
            body: row.get("body")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Notification Operations ====================

    pub fn create_notification(&self, notification: &Notification) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO notifications (id, recipient_id, actor_name, kind, message, photo_id,
                is_read, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &notification.id,
                &notification.recipient_id,
                &notification.actor_name,
                notification.kind.as_str(),
                &notification.message,
                &notification.photo_id,
                notification.is_read,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Read one page of the inbox and mark the whole inbox read, in a single
    /// transaction. Returned rows carry their pre-flip read state so a client
    /// can still highlight what was new.
    pub fn list_and_mark_notifications(
        &self,
        recipient_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<NotificationBatch> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let notifications = {
            let mut stmt = tx.prepare(
                r#"SELECT * FROM notifications WHERE recipient_id = ?1
                   ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"#,
            )?;
            let rows = stmt
                .query_map(params![recipient_id, limit, offset], |row| {
                    self.row_to_notification(row)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let total: i64 = tx.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
            params![recipient_id],
            |row| row.get(0),
        )?;

        let marked_read = tx.execute(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
            params![recipient_id],
        )?;

        tx.commit()?;
        Ok(NotificationBatch {
            notifications,
            total,
            marked_read,
        })
    }

    pub fn unread_notification_count(&self, recipient_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
            params![recipient_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_notification(&self, row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let kind: String = row.get("kind")?;
        Ok(Notification {
            id: row.get("id")?,
            recipient_id: row.get("recipient_id")?,
            actor_name: row.get("actor_name")?,
            kind: NotificationKind::parse(&kind).unwrap_or(NotificationKind::Like),
            message: row.get("message")?,
            photo_id: row.get("photo_id")?,
            is_read: row.get("is_read")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Project Operations ====================

    pub fn create_project(&self, project: &mut Project) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        project.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        project.created_at = now;
        project.updated_at = now;

        conn.execute(
            r#"INSERT INTO projects (id, owner_id, name, status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &project.id,
                &project.owner_id,
                &project.name,
                project.status.as_str(),
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> StoreResult<Project> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM projects WHERE id = ?1",
            params![id],
            |row| self.row_to_project(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Project {}", id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn list_projects_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM projects WHERE owner_id = ?1 ORDER BY created_at DESC")?;
        let projects = stmt
            .query_map(params![owner_id], |row| self.row_to_project(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Deleting a project detaches its photos rather than deleting them.
    pub fn delete_project(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE photos SET project_id = NULL WHERE project_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("Project {}", id)));
        }

        tx.commit()?;
        Ok(())
    }

    pub fn attach_photo_to_project(&self, photo_id: &str, project_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE photos SET project_id = ?1 WHERE id = ?2",
            params![project_id, photo_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Photo {}", photo_id)));
        }
        Ok(())
    }

    pub fn detach_photo_from_project(&self, photo_id: &str, project_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE photos SET project_id = NULL WHERE id = ?1 AND project_id = ?2",
            params![photo_id, project_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!(
                "Photo {} in project {}",
                photo_id, project_id
            )));
        }
        Ok(())
    }

    /// Resolve a share link: the project's name plus exactly the photos
    /// attached to it. The id is the whole credential, so nothing about the
    /// owner leaks and nothing outside the project is reachable.
    pub fn resolve_share(&self, project_id: &str) -> StoreResult<(String, Vec<Photo>)> {
        let conn = self.conn.lock().unwrap();

        let name: String = conn
            .query_row(
                "SELECT name FROM projects WHERE id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Project {}", project_id))
                }
                _ => StoreError::Database(e),
            })?;

        let mut stmt =
            conn.prepare("SELECT * FROM photos WHERE project_id = ?1 ORDER BY created_at ASC")?;
        let photos = stmt
            .query_map(params![project_id], |row| self.row_to_photo(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((name, photos))
    }

    fn row_to_project(&self, row: &rusqlite::Row) -> rusqlite::Result<Project> {
        let status: String = row.get("status")?;
        Ok(Project {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            name: row.get("name")?,
            status: ProjectStatus::parse(&status).unwrap_or(ProjectStatus::Active),
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
