//! Capability resolution and achievement construction.
//!
//! The [`AchievementFactory`] is a registration table built once at
//! startup: reward dispensers keyed by [`RewardKind`] and, in handler-aware
//! deployments, handlers keyed by [`ConfigKind`]. Building an achievement
//! looks both up by the discriminants carried on its configuration and
//! binds the achievement to them for life.
//!
//! The factory does not cache. Every [`create`](AchievementFactory::create)
//! returns a fresh instance, which is what lets a timed group draw the same
//! configuration again after rotating it out.

use std::collections::BTreeMap;
use std::rc::Rc;

use achievements_types::{AchievementConfig, AchievementId, ConfigKind, RewardKind};
use tracing::debug;

use crate::achievement::Achievement;
use crate::handler::AchievementHandler;
use crate::reward::RewardDispenser;

/// The capability categories the factory resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// A [`RewardDispenser`], matched on the reward kind.
    RewardDispenser,
    /// An [`AchievementHandler`], matched on the configuration kind.
    Handler,
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RewardDispenser => f.write_str("reward dispenser"),
            Self::Handler => f.write_str("handler"),
        }
    }
}

/// Errors raised while registering capabilities or building achievements.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// No registered capability matches the configuration.
    #[error("no {capability} registered for kind '{kind}' (achievement {achievement})")]
    MissingCapability {
        /// Which capability could not be resolved.
        capability: Capability,
        /// The unmatched kind.
        kind: String,
        /// The achievement being built.
        achievement: AchievementId,
    },

    /// Two capabilities were registered for the same kind.
    #[error("a {capability} is already registered for kind '{kind}'")]
    DuplicateCapability {
        /// Which capability was registered twice.
        capability: Capability,
        /// The contested kind.
        kind: String,
    },

    /// The configuration cannot produce a working achievement.
    #[error("invalid configuration for achievement {id}: {reason}")]
    InvalidConfig {
        /// The offending configuration.
        id: AchievementId,
        /// Why it was rejected.
        reason: String,
    },
}

/// Builds achievements bound to their capabilities.
#[derive(Default)]
pub struct AchievementFactory {
    /// Reward dispensers by the kind they deliver.
    dispensers: BTreeMap<RewardKind, Rc<dyn RewardDispenser>>,
    /// Handlers by the kind they serve. Empty unless handler-aware.
    handlers: BTreeMap<ConfigKind, Rc<dyn AchievementHandler>>,
}

impl AchievementFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reward dispenser under its [`RewardDispenser::target_kind`].
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::DuplicateCapability`] if a dispenser for the
    /// same kind is already registered.
    pub fn register_dispenser(
        &mut self,
        dispenser: Rc<dyn RewardDispenser>,
    ) -> Result<(), FactoryError> {
        let kind = dispenser.target_kind().clone();
        if self.dispensers.contains_key(&kind) {
            return Err(FactoryError::DuplicateCapability {
                capability: Capability::RewardDispenser,
                kind: kind.into_inner(),
            });
        }
        self.dispensers.insert(kind, dispenser);
        Ok(())
    }

    /// Register a handler under its [`AchievementHandler::target_kind`].
    ///
    /// Registering the first handler makes the factory handler-aware: from
    /// then on every configuration must resolve a handler as well.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::DuplicateCapability`] if a handler for the
    /// same kind is already registered.
    pub fn register_handler(
        &mut self,
        handler: Rc<dyn AchievementHandler>,
    ) -> Result<(), FactoryError> {
        let kind = handler.target_kind().clone();
        if self.handlers.contains_key(&kind) {
            return Err(FactoryError::DuplicateCapability {
                capability: Capability::Handler,
                kind: kind.into_inner(),
            });
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Whether configurations must resolve a handler as well as a dispenser.
    pub fn is_handler_aware(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Whether [`create`](Self::create) would succeed for this configuration.
    pub fn can_create(&self, config: &AchievementConfig) -> bool {
        config.target_progress > 0
            && self.dispensers.contains_key(&config.reward.kind)
            && (!self.is_handler_aware() || self.handlers.contains_key(&config.kind))
    }

    /// Build a new achievement bound to the capabilities matching `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::InvalidConfig`] for a zero target and
    /// [`FactoryError::MissingCapability`] when no dispenser (or, if
    /// handler-aware, no handler) matches.
    pub fn create(&self, config: &Rc<AchievementConfig>) -> Result<Rc<Achievement>, FactoryError> {
        if config.target_progress == 0 {
            return Err(FactoryError::InvalidConfig {
                id: config.id.clone(),
                reason: "target progress must be positive".to_owned(),
            });
        }

        let dispenser = self.dispensers.get(&config.reward.kind).ok_or_else(|| {
            FactoryError::MissingCapability {
                capability: Capability::RewardDispenser,
                kind: config.reward.kind.to_string(),
                achievement: config.id.clone(),
            }
        })?;

        let handler = if self.is_handler_aware() {
            let handler =
                self.handlers
                    .get(&config.kind)
                    .ok_or_else(|| FactoryError::MissingCapability {
                        capability: Capability::Handler,
                        kind: config.kind.to_string(),
                        achievement: config.id.clone(),
                    })?;
            Some(handler)
        } else {
            None
        };

        debug!(
            achievement = %config.id,
            kind = %config.kind,
            reward = %config.reward.kind,
            "Achievement created"
        );
        Ok(Rc::new(Achievement::new(
            Rc::clone(config),
            Rc::clone(dispenser),
            handler,
        )))
    }
}

impl core::fmt::Debug for AchievementFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AchievementFactory")
            .field("dispensers", &self.dispensers.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
