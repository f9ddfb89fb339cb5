//! Handlers for the two housekeeping pollers: accounts that were never
//! verified, and job listings past their lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use vitae_content::{ContentStore, Post};
use vitae_users::{User, UserStore};

use crate::error::Result;
use crate::poller::{Disposition, DocumentHandler};

/// Deletes accounts still unverified when their grace period ends. Alerts
/// and tasks of a deleted account go with it (FK cascade).
pub struct UnverifiedUserReaper {
    users: UserStore,
}

impl UnverifiedUserReaper {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl DocumentHandler<User> for UnverifiedUserReaper {
    async fn process(&self, user: User, _now: DateTime<Utc>) -> Result<Disposition> {
        if user.verified {
            self.users.clear_sleep(&user.id)?;
            return Ok(Disposition::Retained);
        }
        self.users.delete(&user.id)?;
        info!(user_id = %user.id, "unverified account removed");
        Ok(Disposition::Removed)
    }
}

/// Marks expired listings inactive.
pub struct ListingExpiryReaper {
    content: ContentStore,
}

impl ListingExpiryReaper {
    pub fn new(content: ContentStore) -> Self {
        Self { content }
    }
}

#[async_trait]
impl DocumentHandler<Post> for ListingExpiryReaper {
    async fn process(&self, post: Post, now: DateTime<Utc>) -> Result<Disposition> {
        self.content.expire(&post.id, now)?;
        info!(post_id = %post.id, kind = %post.kind, "listing expired");
        Ok(Disposition::Retained)
    }
}
