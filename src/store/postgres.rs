//! PostgreSQL store
//!
//! Plain `sqlx` queries against the schema in `migrations/`. Every lookup is
//! a single-row point read with `fetch_optional`, so a missing row is
//! `Ok(None)` and only connectivity or query failures become errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use super::{new_id, PreferenceLookup, Repository};
use crate::error::Result;
use crate::models::{
    Channel, Group, GroupWithTopics, Organization, Role, Topic, User, UserGroupPref,
    UserTopicPref,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    role: String,
    organization_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = crate::error::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            role: row.role.parse::<Role>()?,
            id: row.id,
            email: row.email,
            organization_id: row.organization_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    organization_id: String,
    created_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
            organization_id: row.organization_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TopicRow {
    id: String,
    name: String,
    group_id: String,
    created_at: DateTime<Utc>,
}

impl From<TopicRow> for Topic {
    fn from(row: TopicRow) -> Self {
        Topic {
            id: row.id,
            name: row.name,
            group_id: row.group_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupPrefRow {
    user_id: String,
    group_id: String,
    enabled: bool,
    updated_at: DateTime<Utc>,
}

impl From<GroupPrefRow> for UserGroupPref {
    fn from(row: GroupPrefRow) -> Self {
        UserGroupPref {
            user_id: row.user_id,
            group_id: row.group_id,
            enabled: row.enabled,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TopicPrefRow {
    user_id: String,
    topic_id: String,
    channel: String,
    enabled: bool,
    updated_at: DateTime<Utc>,
}

impl From<TopicPrefRow> for UserTopicPref {
    fn from(row: TopicPrefRow) -> Self {
        UserTopicPref {
            user_id: row.user_id,
            topic_id: row.topic_id,
            channel: Channel::new(row.channel),
            enabled: row.enabled,
            updated_at: row.updated_at,
        }
    }
}

// ============================================================================
// Resolver lookups
// ============================================================================

#[async_trait]
impl PreferenceLookup for PgStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, organization_id, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_topic(&self, id: &str) -> Result<Option<Topic>> {
        let row = sqlx::query_as::<_, TopicRow>(
            "SELECT id, name, group_id, created_at FROM topics WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Topic::from))
    }

    async fn find_group_pref(&self, user_id: &str, group_id: &str) -> Result<Option<UserGroupPref>> {
        let row = sqlx::query_as::<_, GroupPrefRow>(
            r#"
            SELECT user_id, group_id, enabled, updated_at
            FROM user_group_prefs
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserGroupPref::from))
    }

    async fn find_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
    ) -> Result<Option<UserTopicPref>> {
        let row = sqlx::query_as::<_, TopicPrefRow>(
            r#"
            SELECT user_id, topic_id, channel, enabled, updated_at
            FROM user_topic_prefs
            WHERE user_id = $1 AND topic_id = $2 AND channel = $3
            "#,
        )
        .bind(user_id)
        .bind(topic_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserTopicPref::from))
    }
}

// ============================================================================
// Management operations
// ============================================================================

#[async_trait]
impl Repository for PgStore {
    async fn create_organization(&self, name: &str) -> Result<Organization> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            INSERT INTO organizations (id, name, created_at)
            VALUES ($1, $2, NOW())
            RETURNING id, name, created_at
            "#,
        )
        .bind(new_id())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_organization(&self, id: &str) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, created_at FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Organization::from))
    }

    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, created_at FROM organizations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Organization::from))
    }

    async fn create_user(&self, email: &str, organization_id: &str, role: Role) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, role, organization_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, email, role, organization_id, created_at
            "#,
        )
        .bind(new_id())
        .bind(email)
        .bind(role.as_str())
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, organization_id, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_admin(&self, organization_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, role, organization_id, created_at
            FROM users
            WHERE organization_id = $1 AND role = 'ADMIN'
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn list_customers(&self, organization_id: &str) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, role, organization_id, created_at
            FROM users
            WHERE organization_id = $1 AND role = 'CUSTOMER'
            ORDER BY created_at, id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn create_group(&self, name: &str, organization_id: &str) -> Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            INSERT INTO groups (id, name, organization_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, organization_id, created_at
            "#,
        )
        .bind(new_id())
        .bind(name)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, organization_id, created_at FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Group::from))
    }

    async fn find_group_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, organization_id, created_at
            FROM groups
            WHERE organization_id = $1 AND name = $2
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Group::from))
    }

    async fn list_groups_with_topics(&self, organization_id: &str) -> Result<Vec<GroupWithTopics>> {
        let groups = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, organization_id, created_at
            FROM groups
            WHERE organization_id = $1
            ORDER BY created_at, name
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let group_ids: Vec<String> = groups.iter().map(|g| g.id.clone()).collect();
        let topics = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, name, group_id, created_at
            FROM topics
            WHERE group_id = ANY($1)
            ORDER BY created_at, name
            "#,
        )
        .bind(&group_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_group: HashMap<String, Vec<Topic>> = HashMap::new();
        for topic in topics {
            by_group
                .entry(topic.group_id.clone())
                .or_default()
                .push(topic.into());
        }

        Ok(groups
            .into_iter()
            .map(|row| {
                let topics = by_group.remove(&row.id).unwrap_or_default();
                GroupWithTopics {
                    group: row.into(),
                    topics,
                }
            })
            .collect())
    }

    async fn create_topic(&self, name: &str, group_id: &str) -> Result<Topic> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            INSERT INTO topics (id, name, group_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, group_id, created_at
            "#,
        )
        .bind(new_id())
        .bind(name)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_topic_by_name(&self, group_id: &str, name: &str) -> Result<Option<Topic>> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, name, group_id, created_at
            FROM topics
            WHERE group_id = $1 AND name = $2
            "#,
        )
        .bind(group_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Topic::from))
    }

    async fn upsert_group_pref(
        &self,
        user_id: &str,
        group_id: &str,
        enabled: bool,
    ) -> Result<UserGroupPref> {
        let row = sqlx::query_as::<_, GroupPrefRow>(
            r#"
            INSERT INTO user_group_prefs (user_id, group_id, enabled, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, group_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING user_id, group_id, enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn upsert_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
        enabled: bool,
    ) -> Result<UserTopicPref> {
        let row = sqlx::query_as::<_, TopicPrefRow>(
            r#"
            INSERT INTO user_topic_prefs (user_id, topic_id, channel, enabled, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, topic_id, channel) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            RETURNING user_id, topic_id, channel, enabled, updated_at
            "#,
        )
        .bind(user_id)
        .bind(topic_id)
        .bind(channel.as_str())
        .bind(enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_group_prefs(&self, user_id: &str) -> Result<Vec<UserGroupPref>> {
        let rows = sqlx::query_as::<_, GroupPrefRow>(
            "SELECT user_id, group_id, enabled, updated_at FROM user_group_prefs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserGroupPref::from).collect())
    }

    async fn list_topic_prefs(&self, user_id: &str) -> Result<Vec<UserTopicPref>> {
        let rows = sqlx::query_as::<_, TopicPrefRow>(
            r#"
            SELECT user_id, topic_id, channel, enabled, updated_at
            FROM user_topic_prefs
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserTopicPref::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
