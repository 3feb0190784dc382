//! Lockable layer rows: gags, restrictions and restraint sets.

use crate::{EntityId, LockSlot, RestraintLayers, Uid, ValidationError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Content that can occupy a layer.
pub trait LayerContent:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Whether `other` counts as the same item for re-apply checks.
    fn same_item(&self, other: &Self) -> bool {
        self == other
    }
}

/// Name of a gag item, e.g. `Ball Gag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GagType(String);

impl GagType {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "gag_type".to_string(),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GagType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GagType> for String {
    fn from(gag: GagType) -> Self {
        gag.0
    }
}

impl LayerContent for GagType {}

/// Restrictions are referenced by their item id.
impl LayerContent for EntityId {}

/// Restraint set currently worn, with its active sub-layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRestraint {
    pub set_id: EntityId,
    pub layers: RestraintLayers,
}

impl LayerContent for ActiveRestraint {
    /// Layers may change under a lock; identity is the set itself.
    fn same_item(&self, other: &Self) -> bool {
        self.set_id == other.set_id
    }
}

/// One lockable slot: what is applied, by whom, and how it is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C: LayerContent")]
pub struct LayerState<C: LayerContent> {
    pub content: Option<C>,
    pub enabler: Option<Uid>,
    pub lock: LockSlot,
}

impl<C: LayerContent> Default for LayerState<C> {
    fn default() -> Self {
        Self {
            content: None,
            enabler: None,
            lock: LockSlot::default(),
        }
    }
}

impl<C: LayerContent> LayerState<C> {
    pub fn is_occupied(&self) -> bool {
        self.content.is_some()
    }

    /// Whether the slot already holds `content` (by item identity).
    pub fn holds(&self, content: &C) -> bool {
        self.content.as_ref().is_some_and(|c| c.same_item(content))
    }

    /// Empty the slot. Lock columns must already be clear.
    pub fn clear_content(&mut self) {
        self.content = None;
        self.enabler = None;
    }
}

pub type GagLayer = LayerState<GagType>;
pub type RestrictionLayer = LayerState<EntityId>;
pub type RestraintSlot = LayerState<ActiveRestraint>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_gag_type_rejects_blank() {
        assert!(GagType::new("  ").is_err());
        assert_eq!(GagType::new("Ball Gag").unwrap().as_str(), "Ball Gag");
        assert!(serde_json::from_str::<GagType>("\"\"").is_err());
    }

    #[test]
    fn test_restraint_identity_ignores_layers() {
        let set_id = Uuid::now_v7();
        let worn = ActiveRestraint {
            set_id,
            layers: RestraintLayers::LAYER_1,
        };
        let relayered = ActiveRestraint {
            set_id,
            layers: RestraintLayers::LAYER_2 | RestraintLayers::LAYER_3,
        };
        assert!(worn.same_item(&relayered));
        assert_ne!(worn, relayered);

        let slot = RestraintSlot {
            content: Some(worn),
            ..RestraintSlot::default()
        };
        assert!(slot.holds(&relayered));
    }

    #[test]
    fn test_layer_serde_roundtrip() {
        let slot = GagLayer {
            content: Some(GagType::new("Ball Gag").unwrap()),
            enabler: Some(Uid::parse("ZZ99999999").unwrap()),
            lock: LockSlot::default(),
        };
        let json = serde_json::to_string(&slot).unwrap();
        let back: GagLayer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slot);
    }
}
