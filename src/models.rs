//! Domain records
//!
//! Organizations own groups, groups own topics, users belong to one
//! organization. The two preference relations are keyed exactly by
//! `(user_id, group_id)` and `(user_id, topic_id, channel)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Customer => "CUSTOMER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "CUSTOMER" => Ok(Role::Customer),
            other => Err(Error::bad_request(format!("Unknown role '{}'", other))),
        }
    }
}

/// A delivery channel name such as `EMAIL`.
///
/// Any string can be carried here; membership in the deployment's channel
/// set is checked separately through [`ChannelSet::contains`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The closed set of channels a deployment accepts, in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    /// Build a set from channel names. Rejects empty names, duplicates and an
    /// empty set.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut channels: Vec<Channel> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(Error::config("channel names cannot be empty"));
            }
            let channel = Channel::new(name);
            if channels.contains(&channel) {
                return Err(Error::config(format!("duplicate channel '{}'", name)));
            }
            channels.push(channel);
        }

        if channels.is_empty() {
            return Err(Error::config("at least one channel must be configured"));
        }

        Ok(Self { channels })
    }

    /// Parse a comma-separated list, e.g. `EMAIL,SMS,PUSH`
    pub fn parse(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    pub fn contains(&self, channel: &Channel) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self {
            channels: vec![Channel::new("EMAIL"), Channel::new("SMS"), Channel::new("PUSH")],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}

/// A group together with its topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWithTopics {
    #[serde(flatten)]
    pub group: Group,
    pub topics: Vec<Topic>,
}

/// Group-level override. No row means the group is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupPref {
    pub user_id: String,
    pub group_id: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Topic/channel opt-in. No row means the channel is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTopicPref {
    pub user_id: String,
    pub topic_id: String,
    pub channel: Channel,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
