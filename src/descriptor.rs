//! What a host framework needs to register, persist and rebuild a chronicler.

use serde::{Deserialize, Serialize};

use crate::chronicler::Chronicler;
use crate::config::ChroniclerConfig;
use crate::error::{Error, Result};

pub const JSON_FILE_CHRONICLER: &str = "json-file-chronicler";

/// Identity fields a host uses to list and address chroniclers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl Identity {
    /// Identity whose id equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Everything needed to rebuild a chronicler, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChroniclerProperties {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(flatten)]
    pub identity: Identity,
    pub config: ChroniclerConfig,
}

/// Capabilities a host framework relies on.
pub trait HostedChronicler: Sized {
    const TYPE_TAG: &'static str;

    fn identity(&self) -> &Identity;

    fn properties(&self) -> ChroniclerProperties;

    /// Rebuild from persisted properties. Rejects properties of another kind.
    fn from_properties(properties: ChroniclerProperties) -> Result<Self>;
}

impl HostedChronicler for Chronicler {
    const TYPE_TAG: &'static str = JSON_FILE_CHRONICLER;

    fn identity(&self) -> &Identity {
        Chronicler::identity(self)
    }

    fn properties(&self) -> ChroniclerProperties {
        ChroniclerProperties {
            type_tag: Self::TYPE_TAG.to_string(),
            identity: Chronicler::identity(self).clone(),
            config: self.config().clone(),
        }
    }

    fn from_properties(properties: ChroniclerProperties) -> Result<Self> {
        if properties.type_tag != Self::TYPE_TAG {
            return Err(Error::Config(format!(
                "expected type {:?}, got {:?}",
                Self::TYPE_TAG,
                properties.type_tag
            )));
        }
        Ok(Chronicler::open(properties.config)?.with_identity(properties.identity))
    }
}
