//! Preference resolution
//!
//! Answers "may channel C reach user U for topic T". The lookup chain is:
//!
//! 1. user must exist
//! 2. channel must belong to the configured set
//! 3. topic must exist (yields its group)
//! 4. group preference: no row means enabled, `enabled = false` denies
//! 5. topic/channel preference: no row denies, otherwise `enabled` is the answer
//!
//! Every "not found" folds into `allowed = false`. Only store failures are
//! returned as errors. Lookups run one after another and are not wrapped in a
//! transaction, so concurrent preference updates may be observed partially.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::{Channel, ChannelSet};
use crate::store::PreferenceLookup;

/// Result of a decision, as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
}

/// Which step of the chain produced a denial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UnknownUser,
    UnknownChannel,
    UnknownTopic,
    GroupDisabled,
    NoTopicPreference,
    TopicDisabled,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::UnknownUser => "unknown_user",
            DenyReason::UnknownChannel => "unknown_channel",
            DenyReason::UnknownTopic => "unknown_topic",
            DenyReason::GroupDisabled => "group_disabled",
            DenyReason::NoTopicPreference => "no_topic_preference",
            DenyReason::TopicDisabled => "topic_disabled",
        };
        f.write_str(s)
    }
}

/// Decision together with the branch that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied(DenyReason),
}

impl Outcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Outcome::Allowed)
    }
}

impl From<Outcome> for Decision {
    fn from(outcome: Outcome) -> Self {
        Decision {
            allowed: outcome.is_allowed(),
        }
    }
}

/// Stateless resolver over a [`PreferenceLookup`] store
pub struct PreferenceResolver<S: PreferenceLookup + ?Sized> {
    store: Arc<S>,
    channels: ChannelSet,
}

impl<S: PreferenceLookup + ?Sized> Clone for PreferenceResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            channels: self.channels.clone(),
        }
    }
}

impl<S: PreferenceLookup + ?Sized> PreferenceResolver<S> {
    pub fn new(store: Arc<S>, channels: ChannelSet) -> Self {
        Self { store, channels }
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Whether a notification for `topic_id` may be sent to `user_id` over
    /// `channel`.
    pub async fn is_notification_allowed(
        &self,
        user_id: &str,
        topic_id: &str,
        channel: &Channel,
    ) -> Result<Decision> {
        let outcome = self.evaluate(user_id, topic_id, channel).await?;
        Ok(outcome.into())
    }

    /// Same as [`Self::is_notification_allowed`] but keeps the deny reason.
    #[instrument(skip(self, channel), fields(channel = %channel))]
    pub async fn evaluate(&self, user_id: &str, topic_id: &str, channel: &Channel) -> Result<Outcome> {
        let outcome = self.run_chain(user_id, topic_id, channel).await?;

        match outcome {
            Outcome::Allowed => debug!("notification allowed"),
            Outcome::Denied(reason) => debug!(%reason, "notification denied"),
        }

        Ok(outcome)
    }

    async fn run_chain(&self, user_id: &str, topic_id: &str, channel: &Channel) -> Result<Outcome> {
        if self.store.find_user(user_id).await?.is_none() {
            return Ok(Outcome::Denied(DenyReason::UnknownUser));
        }

        if !self.channels.contains(channel) {
            return Ok(Outcome::Denied(DenyReason::UnknownChannel));
        }

        let Some(topic) = self.store.find_topic(topic_id).await? else {
            return Ok(Outcome::Denied(DenyReason::UnknownTopic));
        };

        let group_enabled = self
            .store
            .find_group_pref(user_id, &topic.group_id)
            .await?
            .map_or(true, |pref| pref.enabled);
        if !group_enabled {
            return Ok(Outcome::Denied(DenyReason::GroupDisabled));
        }

        match self.store.find_topic_pref(user_id, topic_id, channel).await? {
            None => Ok(Outcome::Denied(DenyReason::NoTopicPreference)),
            Some(pref) if pref.enabled => Ok(Outcome::Allowed),
            Some(_) => Ok(Outcome::Denied(DenyReason::TopicDisabled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{Role, Topic, User, UserGroupPref, UserTopicPref};
    use crate::store::{InMemoryStore, Repository};
    use async_trait::async_trait;

    /// u1 in o1, group g1 holds topic t1
    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_organization("o1", "acme").await;
        store.insert_user("u1", "u1@acme.io", "o1", Role::Customer).await;
        store.insert_group("g1", "billing", "o1").await;
        store.insert_topic("t1", "invoices", "g1").await;
        store
    }

    fn resolver(store: Arc<InMemoryStore>) -> PreferenceResolver<InMemoryStore> {
        PreferenceResolver::new(store, ChannelSet::default())
    }

    fn email() -> Channel {
        Channel::from("EMAIL")
    }

    #[tokio::test]
    async fn test_unknown_user_denied() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let r = resolver(store);

        let outcome = r.evaluate("nobody", "t1", &email()).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::UnknownUser));
    }

    #[tokio::test]
    async fn test_channel_outside_configured_set_denied() {
        let store = seeded().await;
        // A row exists for the channel, but the deployment no longer accepts it
        store
            .upsert_topic_pref("u1", "t1", &Channel::from("FAX"), true)
            .await
            .unwrap();
        let r = resolver(store);

        let outcome = r.evaluate("u1", "t1", &Channel::from("FAX")).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::UnknownChannel));
    }

    #[tokio::test]
    async fn test_substituted_channel_set() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let r = PreferenceResolver::new(store, ChannelSet::parse("SMS").unwrap());

        let decision = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_unknown_topic_denied() {
        let r = resolver(seeded().await);
        let outcome = r.evaluate("u1", "missing", &email()).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::UnknownTopic));
    }

    #[tokio::test]
    async fn test_group_default_allow() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let r = resolver(store);

        assert_eq!(r.evaluate("u1", "t1", &email()).await.unwrap(), Outcome::Allowed);
    }

    #[tokio::test]
    async fn test_group_deny_overrides_topic_allow() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        store.upsert_group_pref("u1", "g1", false).await.unwrap();
        let r = resolver(store);

        let outcome = r.evaluate("u1", "t1", &email()).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::GroupDisabled));
    }

    #[tokio::test]
    async fn test_topic_default_deny() {
        let store = seeded().await;
        store.upsert_group_pref("u1", "g1", true).await.unwrap();
        let r = resolver(store);

        let outcome = r.evaluate("u1", "t1", &email()).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::NoTopicPreference));
    }

    #[tokio::test]
    async fn test_topic_preference_passes_through() {
        let store = seeded().await;
        store.upsert_group_pref("u1", "g1", true).await.unwrap();
        store.upsert_topic_pref("u1", "t1", &email(), false).await.unwrap();
        let r = resolver(store.clone());

        let decision = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        assert_eq!(decision, Decision { allowed: false });

        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let decision = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        assert_eq!(decision, Decision { allowed: true });
    }

    #[tokio::test]
    async fn test_repeated_calls_are_identical() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let r = resolver(store);

        let first = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        let second = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_email_allowed_sms_denied() {
        let store = seeded().await;
        store.upsert_topic_pref("u1", "t1", &email(), true).await.unwrap();
        let r = resolver(store);

        let email_decision = r.is_notification_allowed("u1", "t1", &email()).await.unwrap();
        let sms_decision = r
            .is_notification_allowed("u1", "t1", &Channel::from("SMS"))
            .await
            .unwrap();
        assert!(email_decision.allowed);
        assert!(!sms_decision.allowed);
    }

    /// Store whose topic lookup is down
    struct TopicLookupDown;

    #[async_trait]
    impl PreferenceLookup for TopicLookupDown {
        async fn find_user(&self, id: &str) -> Result<Option<User>> {
            Ok(Some(User {
                id: id.to_string(),
                email: "u@acme.io".to_string(),
                role: Role::Customer,
                organization_id: "o1".to_string(),
                created_at: chrono::Utc::now(),
            }))
        }

        async fn find_topic(&self, _id: &str) -> Result<Option<Topic>> {
            Err(Error::ServiceUnavailable { service: "database" })
        }

        async fn find_group_pref(&self, _: &str, _: &str) -> Result<Option<UserGroupPref>> {
            Ok(None)
        }

        async fn find_topic_pref(&self, _: &str, _: &str, _: &Channel) -> Result<Option<UserTopicPref>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let r = PreferenceResolver::new(Arc::new(TopicLookupDown), ChannelSet::default());
        let result = r.is_notification_allowed("u1", "t1", &email()).await;
        assert!(matches!(result, Err(Error::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_unknown_channel_checked_before_topic_lookup() {
        // The failing topic lookup is never reached for a bad channel
        let r = PreferenceResolver::new(Arc::new(TopicLookupDown), ChannelSet::default());
        let outcome = r.evaluate("u1", "t1", &Channel::from("PIGEON")).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(DenyReason::UnknownChannel));
    }
}
