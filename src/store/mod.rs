//! Storage contracts
//!
//! [`PreferenceLookup`] is the read-only view the preference resolver needs:
//! four point lookups, each answering `Ok(Some(_))`, `Ok(None)` for a missing
//! row, or `Err` when the store itself failed. [`Repository`] extends it with
//! the creation, upsert and listing operations used by the HTTP layer.
//!
//! Two implementations ship with the crate:
//! - [`postgres::PgStore`] backed by `sqlx`
//! - [`memory::InMemoryStore`] used by tests and local tooling

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Channel, Group, GroupWithTopics, Organization, Role, Topic, User, UserGroupPref,
    UserTopicPref,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait PreferenceLookup: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>>;

    async fn find_topic(&self, id: &str) -> Result<Option<Topic>>;

    async fn find_group_pref(&self, user_id: &str, group_id: &str)
        -> Result<Option<UserGroupPref>>;

    async fn find_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
    ) -> Result<Option<UserTopicPref>>;
}

/// Full data-access surface. Uniqueness violations surface as
/// [`crate::error::Error::Conflict`].
#[async_trait]
pub trait Repository: PreferenceLookup {
    // Organizations
    async fn create_organization(&self, name: &str) -> Result<Organization>;
    async fn find_organization(&self, id: &str) -> Result<Option<Organization>>;
    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>>;

    // Users
    async fn create_user(&self, email: &str, organization_id: &str, role: Role) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_admin(&self, organization_id: &str) -> Result<Option<User>>;
    async fn list_customers(&self, organization_id: &str) -> Result<Vec<User>>;

    // Groups
    async fn create_group(&self, name: &str, organization_id: &str) -> Result<Group>;
    async fn find_group(&self, id: &str) -> Result<Option<Group>>;
    async fn find_group_by_name(&self, organization_id: &str, name: &str)
        -> Result<Option<Group>>;
    async fn list_groups_with_topics(&self, organization_id: &str)
        -> Result<Vec<GroupWithTopics>>;

    // Topics
    async fn create_topic(&self, name: &str, group_id: &str) -> Result<Topic>;
    async fn find_topic_by_name(&self, group_id: &str, name: &str) -> Result<Option<Topic>>;

    // Preferences
    async fn upsert_group_pref(
        &self,
        user_id: &str,
        group_id: &str,
        enabled: bool,
    ) -> Result<UserGroupPref>;

    async fn upsert_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
        enabled: bool,
    ) -> Result<UserTopicPref>;

    async fn list_group_prefs(&self, user_id: &str) -> Result<Vec<UserGroupPref>>;
    async fn list_topic_prefs(&self, user_id: &str) -> Result<Vec<UserTopicPref>>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<()>;
}

/// Fresh identifier for a newly created entity
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
