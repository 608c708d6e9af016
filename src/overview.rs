//! Per-user preference overview
//!
//! Lays out every group of the user's organization with the effective
//! group switch and, per topic, one flag per configured channel. Missing rows
//! take the same defaults the resolver applies: group on, channel off.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::models::{Channel, ChannelSet};
use crate::store::Repository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOverview {
    pub group: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub enabled: bool,
    pub topics: Vec<TopicOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicOverview {
    pub topic: String,
    #[serde(rename = "topicId")]
    pub topic_id: String,
    pub channels: BTreeMap<Channel, bool>,
}

pub async fn preference_overview(
    repo: &dyn Repository,
    channels: &ChannelSet,
    user_id: &str,
) -> Result<Vec<GroupOverview>> {
    let user = repo
        .find_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User", user_id))?;

    let groups = repo.list_groups_with_topics(&user.organization_id).await?;

    let group_prefs: HashMap<String, bool> = repo
        .list_group_prefs(user_id)
        .await?
        .into_iter()
        .map(|p| (p.group_id, p.enabled))
        .collect();

    let topic_prefs: HashMap<(String, Channel), bool> = repo
        .list_topic_prefs(user_id)
        .await?
        .into_iter()
        .map(|p| ((p.topic_id, p.channel), p.enabled))
        .collect();

    Ok(groups
        .into_iter()
        .map(|entry| GroupOverview {
            enabled: group_prefs.get(&entry.group.id).copied().unwrap_or(true),
            topics: entry
                .topics
                .into_iter()
                .map(|topic| {
                    let flags = channels
                        .iter()
                        .map(|ch| {
                            let key = (topic.id.clone(), ch.clone());
                            (ch.clone(), topic_prefs.get(&key).copied().unwrap_or(false))
                        })
                        .collect();
                    TopicOverview {
                        topic: topic.name,
                        topic_id: topic.id,
                        channels: flags,
                    }
                })
                .collect(),
            group: entry.group.name,
            group_id: entry.group.id,
        })
        .collect())
}
