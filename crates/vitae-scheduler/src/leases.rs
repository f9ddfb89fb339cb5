//! [`LeaseStore`] for each polled table.

use chrono::{DateTime, Duration, Utc};
use vitae_content::{ContentStore, Post};
use vitae_core::lease::Lease;
use vitae_users::{User, UserStore};

use crate::error::Result;
use crate::poller::LeaseStore;
use crate::store::{Claim, TaskStore};
use crate::types::Task;

impl LeaseStore for TaskStore {
    type Doc = Task;

    fn claim(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Claim<Task>>> {
        TaskStore::claim(self, now, lease_for)
    }

    fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        TaskStore::release(self, lease, retry_at)
    }
}

impl LeaseStore for UserStore {
    type Doc = User;

    fn claim(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Claim<User>>> {
        let Some(lease) = self.claim_expiring(now, lease_for)? else {
            return Ok(None);
        };
        match self.get(&lease.id)? {
            Some(doc) => Ok(Some(Claim { lease, doc })),
            // Deleted between claim and load; nothing left to do.
            None => Ok(None),
        }
    }

    fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        Ok(UserStore::release(self, lease, retry_at)?)
    }
}

impl LeaseStore for ContentStore {
    type Doc = Post;

    fn claim(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Claim<Post>>> {
        let Some(lease) = self.claim_expiring(now, lease_for)? else {
            return Ok(None);
        };
        match self.get(&lease.id)? {
            Some(doc) => Ok(Some(Claim { lease, doc })),
            None => Ok(None),
        }
    }

    fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool> {
        Ok(ContentStore::release(self, lease, retry_at)?)
    }
}
