//! In-memory store
//!
//! Mirrors the relational schema with plain maps behind a `tokio` lock.
//! Unique and foreign-key constraints are enforced the same way the
//! Postgres schema enforces them, so handler behavior matches in tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{new_id, PreferenceLookup, Repository};
use crate::error::{Error, Result};
use crate::models::{
    Channel, Group, GroupWithTopics, Organization, Role, Topic, User, UserGroupPref,
    UserTopicPref,
};

#[derive(Default)]
struct Tables {
    organizations: HashMap<String, Organization>,
    users: HashMap<String, User>,
    groups: HashMap<String, Group>,
    topics: HashMap<String, Topic>,
    group_prefs: HashMap<(String, String), UserGroupPref>,
    topic_prefs: HashMap<(String, String, Channel), UserTopicPref>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an organization with a caller-chosen id
    pub async fn insert_organization(&self, id: &str, name: &str) -> Organization {
        let org = Organization {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .organizations
            .insert(org.id.clone(), org.clone());
        org
    }

    /// Insert a user with a caller-chosen id
    pub async fn insert_user(&self, id: &str, email: &str, organization_id: &str, role: Role) -> User {
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            role,
            organization_id: organization_id.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .users
            .insert(user.id.clone(), user.clone());
        user
    }

    /// Insert a group with a caller-chosen id
    pub async fn insert_group(&self, id: &str, name: &str, organization_id: &str) -> Group {
        let group = Group {
            id: id.to_string(),
            name: name.to_string(),
            organization_id: organization_id.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .groups
            .insert(group.id.clone(), group.clone());
        group
    }

    /// Insert a topic with a caller-chosen id
    pub async fn insert_topic(&self, id: &str, name: &str, group_id: &str) -> Topic {
        let topic = Topic {
            id: id.to_string(),
            name: name.to_string(),
            group_id: group_id.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .topics
            .insert(topic.id.clone(), topic.clone());
        topic
    }
}

fn missing_reference(constraint: &str) -> Error {
    Error::ConstraintViolation {
        message: format!("Constraint '{}' violated", constraint).into(),
    }
}

#[async_trait]
impl PreferenceLookup for InMemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_topic(&self, id: &str) -> Result<Option<Topic>> {
        Ok(self.tables.read().await.topics.get(id).cloned())
    }

    async fn find_group_pref(&self, user_id: &str, group_id: &str) -> Result<Option<UserGroupPref>> {
        let key = (user_id.to_string(), group_id.to_string());
        Ok(self.tables.read().await.group_prefs.get(&key).cloned())
    }

    async fn find_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
    ) -> Result<Option<UserTopicPref>> {
        let key = (user_id.to_string(), topic_id.to_string(), channel.clone());
        Ok(self.tables.read().await.topic_prefs.get(&key).cloned())
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn create_organization(&self, name: &str) -> Result<Organization> {
        let mut tables = self.tables.write().await;
        if tables.organizations.values().any(|o| o.name == name) {
            return Err(Error::conflict("Organization with this name already exists"));
        }

        let org = Organization {
            id: new_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.organizations.insert(org.id.clone(), org.clone());
        Ok(org)
    }

    async fn find_organization(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(id).cloned())
    }

    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let tables = self.tables.read().await;
        Ok(tables.organizations.values().find(|o| o.name == name).cloned())
    }

    async fn create_user(&self, email: &str, organization_id: &str, role: Role) -> Result<User> {
        let mut tables = self.tables.write().await;
        if !tables.organizations.contains_key(organization_id) {
            return Err(missing_reference("users_organization_id_fkey"));
        }
        if tables.users.values().any(|u| u.email == email) {
            return Err(Error::conflict("User with this email already exists"));
        }

        let user = User {
            id: new_id(),
            email: email.to_string(),
            role,
            organization_id: organization_id.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_admin(&self, organization_id: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.organization_id == organization_id && u.role == Role::Admin)
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn list_customers(&self, organization_id: &str) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut customers: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.organization_id == organization_id && u.role == Role::Customer)
            .cloned()
            .collect();
        customers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(customers)
    }

    async fn create_group(&self, name: &str, organization_id: &str) -> Result<Group> {
        let mut tables = self.tables.write().await;
        if !tables.organizations.contains_key(organization_id) {
            return Err(missing_reference("groups_organization_id_fkey"));
        }
        if tables
            .groups
            .values()
            .any(|g| g.organization_id == organization_id && g.name == name)
        {
            return Err(Error::conflict(
                "Group with this name already exists in the organization",
            ));
        }

        let group = Group {
            id: new_id(),
            name: name.to_string(),
            organization_id: organization_id.to_string(),
            created_at: Utc::now(),
        };
        tables.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>> {
        Ok(self.tables.read().await.groups.get(id).cloned())
    }

    async fn find_group_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .find(|g| g.organization_id == organization_id && g.name == name)
            .cloned())
    }

    async fn list_groups_with_topics(&self, organization_id: &str) -> Result<Vec<GroupWithTopics>> {
        let tables = self.tables.read().await;

        let mut groups: Vec<Group> = tables
            .groups
            .values()
            .filter(|g| g.organization_id == organization_id)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));

        Ok(groups
            .into_iter()
            .map(|group| {
                let mut topics: Vec<Topic> = tables
                    .topics
                    .values()
                    .filter(|t| t.group_id == group.id)
                    .cloned()
                    .collect();
                topics.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
                GroupWithTopics { group, topics }
            })
            .collect())
    }

    async fn create_topic(&self, name: &str, group_id: &str) -> Result<Topic> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(group_id) {
            return Err(missing_reference("topics_group_id_fkey"));
        }
        if tables
            .topics
            .values()
            .any(|t| t.group_id == group_id && t.name == name)
        {
            return Err(Error::conflict("Topic with this name already exists in the group"));
        }

        let topic = Topic {
            id: new_id(),
            name: name.to_string(),
            group_id: group_id.to_string(),
            created_at: Utc::now(),
        };
        tables.topics.insert(topic.id.clone(), topic.clone());
        Ok(topic)
    }

    async fn find_topic_by_name(&self, group_id: &str, name: &str) -> Result<Option<Topic>> {
        let tables = self.tables.read().await;
        Ok(tables
            .topics
            .values()
            .find(|t| t.group_id == group_id && t.name == name)
            .cloned())
    }

    async fn upsert_group_pref(
        &self,
        user_id: &str,
        group_id: &str,
        enabled: bool,
    ) -> Result<UserGroupPref> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(user_id) {
            return Err(missing_reference("user_group_prefs_user_id_fkey"));
        }
        if !tables.groups.contains_key(group_id) {
            return Err(missing_reference("user_group_prefs_group_id_fkey"));
        }

        let pref = UserGroupPref {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            enabled,
            updated_at: Utc::now(),
        };
        tables
            .group_prefs
            .insert((user_id.to_string(), group_id.to_string()), pref.clone());
        Ok(pref)
    }

    async fn upsert_topic_pref(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
        enabled: bool,
    ) -> Result<UserTopicPref> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(user_id) {
            return Err(missing_reference("user_topic_prefs_user_id_fkey"));
        }
        if !tables.topics.contains_key(topic_id) {
            return Err(missing_reference("user_topic_prefs_topic_id_fkey"));
        }

        let pref = UserTopicPref {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            channel: channel.clone(),
            enabled,
            updated_at: Utc::now(),
        };
        tables.topic_prefs.insert(
            (user_id.to_string(), topic_id.to_string(), channel.clone()),
            pref.clone(),
        );
        Ok(pref)
    }

    async fn list_group_prefs(&self, user_id: &str) -> Result<Vec<UserGroupPref>> {
        let tables = self.tables.read().await;
        Ok(tables
            .group_prefs
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_topic_prefs(&self, user_id: &str) -> Result<Vec<UserTopicPref>> {
        let tables = self.tables.read().await;
        Ok(tables
            .topic_prefs
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_names_are_scoped() {
        let store = InMemoryStore::new();
        let o1 = store.create_organization("acme").await.unwrap();
        let o2 = store.create_organization("globex").await.unwrap();

        assert!(matches!(
            store.create_organization("acme").await,
            Err(Error::Conflict { .. })
        ));

        store.create_group("billing", &o1.id).await.unwrap();
        // Same name in another organization is fine
        store.create_group("billing", &o2.id).await.unwrap();
        assert!(matches!(
            store.create_group("billing", &o1.id).await,
            Err(Error::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_upsert_topic_pref_overwrites_same_key() {
        let store = InMemoryStore::new();
        store.insert_organization("o1", "acme").await;
        store.insert_user("u1", "u1@acme.io", "o1", Role::Customer).await;
        store.insert_group("g1", "billing", "o1").await;
        store.insert_topic("t1", "invoices", "g1").await;

        let email = Channel::from("EMAIL");
        store.upsert_topic_pref("u1", "t1", &email, true).await.unwrap();
        store.upsert_topic_pref("u1", "t1", &email, false).await.unwrap();

        let prefs = store.list_topic_prefs("u1").await.unwrap();
        assert_eq!(prefs.len(), 1);
        assert!(!prefs[0].enabled);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.create_user("a@b.io", "missing", Role::Admin).await,
            Err(Error::ConstraintViolation { .. })
        ));
        assert!(matches!(
            store.create_topic("invoices", "missing").await,
            Err(Error::ConstraintViolation { .. })
        ));
    }
}
