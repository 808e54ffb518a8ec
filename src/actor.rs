//! Actors and the actor resolver boundary
//!
//! The engine never detects devices or user types itself. An
//! [`ActorResolver`] turns whatever the caller has (a request, a session)
//! into an [`Actor`]; [`HeaderActorResolver`] is a small resolver for
//! HTTP-style request metadata.

use serde::{Deserialize, Serialize};

/// Device class of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Phones
    Mobile,
    /// Desktops and laptops
    Desktop,
    /// Tablets
    Tablet,
}

impl Device {
    /// Classify a User-Agent string. Tablet markers win over mobile ones;
    /// anything unrecognized is Desktop.
    ///
    /// # Example
    ///
    /// ```rust
    /// use splitbench::actor::Device;
    ///
    /// assert_eq!(Device::from_user_agent("Mozilla/5.0 (iPad; CPU OS 17_0)"), Device::Tablet);
    /// assert_eq!(Device::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"), Device::Mobile);
    /// ```
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let android_tablet = ua.contains("android") && !ua.contains("mobile");
        if ua.contains("ipad") || ua.contains("tablet") || android_tablet {
            Self::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }
}

/// The subject being bucketed.
///
/// `key` is the authenticated user id when available, otherwise a durable
/// anonymous session id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    key: String,
    device: Device,
    is_new_user: bool,
    region: Option<String>,
}

impl Actor {
    /// A returning desktop actor with no region.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            device: Device::Desktop,
            is_new_user: false,
            region: None,
        }
    }

    /// Set the device class.
    #[must_use]
    pub const fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Mark as a first-time actor.
    #[must_use]
    pub const fn new_user(mut self, is_new_user: bool) -> Self {
        self.is_new_user = is_new_user;
        self
    }

    /// Set the resolved region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Get the stable actor key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the device class.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Whether this is the actor's first visit.
    #[must_use]
    pub const fn is_new_user(&self) -> bool {
        self.is_new_user
    }

    /// Get the resolved region, if known.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// Supplies the [`Actor`] for the current caller.
pub trait ActorResolver: Send + Sync {
    /// Caller-side context the actor is derived from.
    type Context;

    /// Resolve the actor, or `None` if the caller has no stable key.
    fn resolve(&self, context: &Self::Context) -> Option<Actor>;
}

/// Request metadata understood by [`HeaderActorResolver`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Durable anonymous session id.
    pub session_id: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// Region resolved upstream (e.g. from a geo header).
    pub region: Option<String>,
    /// Whether the session has been seen before.
    pub first_visit: bool,
}

/// Resolves actors from [`RequestContext`]: user id before session id,
/// device from the User-Agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderActorResolver;

impl ActorResolver for HeaderActorResolver {
    type Context = RequestContext;

    fn resolve(&self, context: &RequestContext) -> Option<Actor> {
        let key = context
            .user_id
            .as_deref()
            .or(context.session_id.as_deref())
            .filter(|key| !key.is_empty())?;

        let device = context
            .user_agent
            .as_deref()
            .map_or(Device::Desktop, Device::from_user_agent);

        let mut actor = Actor::new(key)
            .with_device(device)
            .new_user(context.first_visit);
        if let Some(region) = &context.region {
            actor = actor.with_region(region.clone());
        }
        Some(actor)
    }
}
