//! Notification Dispatch Module
//!
//! Engagement events fan out here as notification rows addressed to the
//! photo's owner. Rows are written through the store and surface later
//! through the inbox endpoints.
//!
//! A dispatch failure is logged and swallowed: the vote or comment that
//! triggered it has already committed and stands on its own.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Account, Notification, NotificationKind, Photo};
use crate::store::{NotificationBatch, Store, StoreResult};

pub struct NotificationDispatcher {
    store: Arc<Store>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// An accepted vote: tell the photo's owner who liked it.
    pub fn vote_accepted(&self, actor: &Account, photo: &Photo) {
        let message = format!(
            "{} liked your photo \"{}\"",
            actor.display_name, photo.title
        );
        self.dispatch(actor, photo, NotificationKind::Like, message);
    }

    /// A new comment: tell the photo's owner who said what.
    pub fn comment_added(&self, actor: &Account, photo: &Photo, body: &str) {
        let message = format!(
            "{} commented on \"{}\": {}",
            actor.display_name, photo.title, body
        );
        self.dispatch(actor, photo, NotificationKind::Comment, message);
    }

    fn dispatch(&self, actor: &Account, photo: &Photo, kind: NotificationKind, message: String) {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: photo.owner_id.clone(),
            actor_name: actor.display_name.clone(),
            kind,
            message,
            photo_id: photo.id.clone(),
            is_read: false,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_notification(&notification) {
            log::error!(
                "Failed to dispatch {} notification to {}: {}",
                kind.as_str(),
                photo.owner_id,
                e
            );
        }
    }

    /// One inbox page, newest first. Listing marks the whole inbox read.
    pub fn list(
        &self,
        recipient_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<NotificationBatch> {
        self.store
            .list_and_mark_notifications(recipient_id, limit, offset)
    }

    pub fn unread_count(&self, recipient_id: &str) -> StoreResult<i64> {
        self.store.unread_notification_count(recipient_id)
    }
}
