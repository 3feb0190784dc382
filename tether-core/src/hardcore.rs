//! Independently timed forced-behavior overrides.

use crate::{Capability, Timestamp, Uid, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emote id of `/sit`.
pub const SIT_EMOTE_ID: u16 = 50;
/// Emote id of `/groundsit`.
pub const GROUND_SIT_EMOTE_ID: u16 = 52;

pub fn is_sit_emote(emote_id: u16) -> bool {
    emote_id == SIT_EMOTE_ID || emote_id == GROUND_SIT_EMOTE_ID
}

/// The eight override slots on a [`HardcoreState`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardcoreField {
    LockedFollowing,
    LockedEmote,
    IndoorConfinement,
    Imprisonment,
    ChatBoxesHidden,
    ChatInputHidden,
    ChatInputBlocked,
    HypnoticEffect,
}

impl HardcoreField {
    pub const ALL: [HardcoreField; 8] = [
        HardcoreField::LockedFollowing,
        HardcoreField::LockedEmote,
        HardcoreField::IndoorConfinement,
        HardcoreField::Imprisonment,
        HardcoreField::ChatBoxesHidden,
        HardcoreField::ChatInputHidden,
        HardcoreField::ChatInputBlocked,
        HardcoreField::HypnoticEffect,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            HardcoreField::LockedFollowing => "locked_following",
            HardcoreField::LockedEmote => "locked_emote",
            HardcoreField::IndoorConfinement => "indoor_confinement",
            HardcoreField::Imprisonment => "imprisonment",
            HardcoreField::ChatBoxesHidden => "chat_boxes_hidden",
            HardcoreField::ChatInputHidden => "chat_input_hidden",
            HardcoreField::ChatInputBlocked => "chat_input_blocked",
            HardcoreField::HypnoticEffect => "hypnotic_effect",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_db_str() == needle)
            .ok_or_else(|| ValidationError::UnknownName {
                kind: "hardcore field".to_string(),
                value: s.to_string(),
            })
    }

    /// Grant that gates setting this field. Locked emotes also accept
    /// `allow_locked_sitting` for sit emotes; see [`OverrideValue::satisfied_by`].
    pub fn capability(&self) -> Capability {
        match self {
            HardcoreField::LockedFollowing => Capability::AllowLockedFollowing,
            HardcoreField::LockedEmote => Capability::AllowLockedEmoting,
            HardcoreField::IndoorConfinement => Capability::AllowIndoorConfinement,
            HardcoreField::Imprisonment => Capability::AllowImprisonment,
            HardcoreField::ChatBoxesHidden => Capability::AllowHidingChatBoxes,
            HardcoreField::ChatInputHidden => Capability::AllowHidingChatInput,
            HardcoreField::ChatInputBlocked => Capability::AllowChatInputBlocking,
            HardcoreField::HypnoticEffect => Capability::AllowHypnosisSending,
        }
    }
}

impl fmt::Display for HardcoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for HardcoreField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// OVERRIDE VALUES
// ============================================================================

/// Housing address an identity is confined to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfinementAddress {
    pub world: u16,
    pub zone: u16,
    pub ward: u8,
    pub plot: u8,
    pub apartment: bool,
    pub subdivision: bool,
}

/// Payload of an active override; the variant determines the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverrideValue {
    LockedFollowing,
    LockedEmote { emote_id: u16, cycle_pose: u8 },
    IndoorConfinement(ConfinementAddress),
    Imprisonment {
        territory: u16,
        position: [f32; 3],
        radius: f32,
    },
    ChatBoxesHidden,
    ChatInputHidden,
    ChatInputBlocked,
    HypnoticEffect { descriptor: serde_json::Value },
}

impl OverrideValue {
    pub fn field(&self) -> HardcoreField {
        match self {
            OverrideValue::LockedFollowing => HardcoreField::LockedFollowing,
            OverrideValue::LockedEmote { .. } => HardcoreField::LockedEmote,
            OverrideValue::IndoorConfinement(_) => HardcoreField::IndoorConfinement,
            OverrideValue::Imprisonment { .. } => HardcoreField::Imprisonment,
            OverrideValue::ChatBoxesHidden => HardcoreField::ChatBoxesHidden,
            OverrideValue::ChatInputHidden => HardcoreField::ChatInputHidden,
            OverrideValue::ChatInputBlocked => HardcoreField::ChatInputBlocked,
            OverrideValue::HypnoticEffect { .. } => HardcoreField::HypnoticEffect,
        }
    }

    /// Grants, any one of which authorizes this value.
    pub fn satisfied_by(&self) -> &'static [Capability] {
        match self {
            OverrideValue::LockedEmote { emote_id, .. } if is_sit_emote(*emote_id) => &[
                Capability::AllowLockedSitting,
                Capability::AllowLockedEmoting,
            ],
            OverrideValue::LockedFollowing => &[Capability::AllowLockedFollowing],
            OverrideValue::LockedEmote { .. } => &[Capability::AllowLockedEmoting],
            OverrideValue::IndoorConfinement(_) => &[Capability::AllowIndoorConfinement],
            OverrideValue::Imprisonment { .. } => &[Capability::AllowImprisonment],
            OverrideValue::ChatBoxesHidden => &[Capability::AllowHidingChatBoxes],
            OverrideValue::ChatInputHidden => &[Capability::AllowHidingChatInput],
            OverrideValue::ChatInputBlocked => &[Capability::AllowChatInputBlocking],
            OverrideValue::HypnoticEffect { .. } => &[Capability::AllowHypnosisSending],
        }
    }

    /// Shape checks independent of grants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            OverrideValue::Imprisonment { position, radius, .. } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(ValidationError::InvalidValue {
                        field: "imprisonment.radius".to_string(),
                        reason: "must be a positive finite number".to_string(),
                    });
                }
                if position.iter().any(|c| !c.is_finite()) {
                    return Err(ValidationError::InvalidValue {
                        field: "imprisonment.position".to_string(),
                        reason: "coordinates must be finite".to_string(),
                    });
                }
                Ok(())
            }
            OverrideValue::HypnoticEffect { descriptor } if descriptor.is_null() => {
                Err(ValidationError::RequiredFieldMissing {
                    field: "hypnotic_effect.descriptor".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// An override currently imposed on a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOverride {
    pub value: OverrideValue,
    pub assigner: Uid,
    pub expires_at: Option<Timestamp>,
}

impl ActiveOverride {
    pub fn is_lapsed(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

// ============================================================================
// HARDCORE STATE ROW
// ============================================================================

/// All overrides on one identity. Slots are independent of each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardcoreState {
    pub uid: Uid,
    pub locked_following: Option<ActiveOverride>,
    pub locked_emote: Option<ActiveOverride>,
    pub indoor_confinement: Option<ActiveOverride>,
    pub imprisonment: Option<ActiveOverride>,
    pub chat_boxes_hidden: Option<ActiveOverride>,
    pub chat_input_hidden: Option<ActiveOverride>,
    pub chat_input_blocked: Option<ActiveOverride>,
    pub hypnotic_effect: Option<ActiveOverride>,
}

impl HardcoreState {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            locked_following: None,
            locked_emote: None,
            indoor_confinement: None,
            imprisonment: None,
            chat_boxes_hidden: None,
            chat_input_hidden: None,
            chat_input_blocked: None,
            hypnotic_effect: None,
        }
    }

    pub fn slot(&self, field: HardcoreField) -> Option<&ActiveOverride> {
        match field {
            HardcoreField::LockedFollowing => self.locked_following.as_ref(),
            HardcoreField::LockedEmote => self.locked_emote.as_ref(),
            HardcoreField::IndoorConfinement => self.indoor_confinement.as_ref(),
            HardcoreField::Imprisonment => self.imprisonment.as_ref(),
            HardcoreField::ChatBoxesHidden => self.chat_boxes_hidden.as_ref(),
            HardcoreField::ChatInputHidden => self.chat_input_hidden.as_ref(),
            HardcoreField::ChatInputBlocked => self.chat_input_blocked.as_ref(),
            HardcoreField::HypnoticEffect => self.hypnotic_effect.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, field: HardcoreField) -> &mut Option<ActiveOverride> {
        match field {
            HardcoreField::LockedFollowing => &mut self.locked_following,
            HardcoreField::LockedEmote => &mut self.locked_emote,
            HardcoreField::IndoorConfinement => &mut self.indoor_confinement,
            HardcoreField::Imprisonment => &mut self.imprisonment,
            HardcoreField::ChatBoxesHidden => &mut self.chat_boxes_hidden,
            HardcoreField::ChatInputHidden => &mut self.chat_input_hidden,
            HardcoreField::ChatInputBlocked => &mut self.chat_input_blocked,
            HardcoreField::HypnoticEffect => &mut self.hypnotic_effect,
        }
    }

    /// Empty every slot whose expiry has passed. Returns the cleared fields.
    pub fn clear_lapsed(&mut self, now: Timestamp) -> Vec<HardcoreField> {
        let mut cleared = Vec::new();
        for field in HardcoreField::ALL {
            let slot = self.slot_mut(field);
            if slot.as_ref().is_some_and(|o| o.is_lapsed(now)) {
                *slot = None;
                cleared.push(field);
            }
        }
        cleared
    }

    /// Empty every slot assigned by `uid`. Returns the cleared fields.
    pub fn release_assigned_by(&mut self, uid: &Uid) -> Vec<HardcoreField> {
        let mut cleared = Vec::new();
        for field in HardcoreField::ALL {
            let slot = self.slot_mut(field);
            if slot.as_ref().is_some_and(|o| &o.assigner == uid) {
                *slot = None;
                cleared.push(field);
            }
        }
        cleared
    }

    pub fn active_fields(&self) -> impl Iterator<Item = HardcoreField> + '_ {
        HardcoreField::ALL
            .into_iter()
            .filter(move |f| self.slot(*f).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    #[test]
    fn test_sit_emotes_accept_either_grant() {
        let sit = OverrideValue::LockedEmote {
            emote_id: SIT_EMOTE_ID,
            cycle_pose: 0,
        };
        assert!(sit.satisfied_by().contains(&Capability::AllowLockedSitting));
        assert!(sit.satisfied_by().contains(&Capability::AllowLockedEmoting));

        let dance = OverrideValue::LockedEmote {
            emote_id: 101,
            cycle_pose: 0,
        };
        assert_eq!(dance.satisfied_by(), &[Capability::AllowLockedEmoting]);
    }

    #[test]
    fn test_field_mapping_matches_capability() {
        for field in HardcoreField::ALL {
            assert_eq!(HardcoreField::from_db_str(field.as_db_str()).unwrap(), field);
        }
        assert_eq!(OverrideValue::ChatInputBlocked.field(), HardcoreField::ChatInputBlocked);
        assert_eq!(
            HardcoreField::Imprisonment.capability(),
            Capability::AllowImprisonment
        );
    }

    #[test]
    fn test_validate_imprisonment_radius() {
        let bad = OverrideValue::Imprisonment {
            territory: 132,
            position: [0.0, 0.0, 0.0],
            radius: 0.0,
        };
        assert!(bad.validate().is_err());
        let nan = OverrideValue::Imprisonment {
            territory: 132,
            position: [f32::NAN, 0.0, 0.0],
            radius: 5.0,
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_clear_lapsed_only_touches_expired_slots() {
        let now = Utc::now();
        let mut state = HardcoreState::new(uid("AB12345678"));
        state.locked_following = Some(ActiveOverride {
            value: OverrideValue::LockedFollowing,
            assigner: uid("ZZ99999999"),
            expires_at: Some(now - chrono::Duration::seconds(1)),
        });
        state.chat_input_blocked = Some(ActiveOverride {
            value: OverrideValue::ChatInputBlocked,
            assigner: uid("ZZ99999999"),
            expires_at: None,
        });

        let cleared = state.clear_lapsed(now);
        assert_eq!(cleared, vec![HardcoreField::LockedFollowing]);
        assert!(state.locked_following.is_none());
        assert!(state.chat_input_blocked.is_some());
        assert_eq!(
            state.active_fields().collect::<Vec<_>>(),
            vec![HardcoreField::ChatInputBlocked]
        );
    }

    #[test]
    fn test_release_assigned_by() {
        let mut state = HardcoreState::new(uid("AB12345678"));
        state.chat_boxes_hidden = Some(ActiveOverride {
            value: OverrideValue::ChatBoxesHidden,
            assigner: uid("ZZ99999999"),
            expires_at: None,
        });
        state.chat_input_hidden = Some(ActiveOverride {
            value: OverrideValue::ChatInputHidden,
            assigner: uid("CC00000000"),
            expires_at: None,
        });
        assert_eq!(
            state.release_assigned_by(&uid("ZZ99999999")),
            vec![HardcoreField::ChatBoxesHidden]
        );
        assert!(state.chat_input_hidden.is_some());
    }
}
