//! Core entity structures

use crate::{GarbleChannels, PuppetPerms, Tier, Timestamp, Uid};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// External identity. Referenced by every other row, owned by none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: Uid,
    pub alias: Option<String>,
    pub created_at: Timestamp,
    pub last_login: Option<Timestamp>,
    pub tier: Tier,
}

impl User {
    pub fn new(uid: Uid, alias: Option<String>, tier: Tier, now: Timestamp) -> Self {
        Self {
            uid,
            alias,
            created_at: now,
            last_login: None,
            tier,
        }
    }
}

/// One directed relationship record. A pairing is two of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairEdge {
    pub owner: Uid,
    pub partner: Uid,
    pub created_at: Timestamp,
}

impl PairEdge {
    /// Whether the edge mentions `uid` in either position.
    pub fn involves(&self, uid: &Uid) -> bool {
        &self.owner == uid || &self.partner == uid
    }
}

// ============================================================================
// GLOBAL PERMISSIONS
// ============================================================================

/// Default self-imposed shock intensity ceiling (percent).
pub const DEFAULT_SHOCK_INTENSITY_CEILING: u8 = 100;

/// Default self-imposed shock duration ceiling.
pub const DEFAULT_SHOCK_DURATION_CEILING: Duration = Duration::from_secs(15);

/// An identity's own baseline toggles and passive state.
///
/// Never used as a fallback for a missing pair grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPermissions {
    pub uid: Uid,

    // chat garbler
    pub chat_garbler_active: bool,
    pub chat_garbler_locked: bool,
    pub allowed_garbler_channels: GarbleChannels,
    pub gagged_nameplate: bool,

    // visuals
    pub wardrobe_enabled: bool,
    pub gag_visuals: bool,
    pub restriction_visuals: bool,
    pub restraint_set_visuals: bool,

    // puppeteer
    pub puppeteer_enabled: bool,
    pub trigger_phrase: String,
    pub puppet_perms: PuppetPerms,

    // toybox
    pub toybox_enabled: bool,
    pub lock_toybox_ui: bool,
    pub toys_connected: bool,
    pub toys_interactable: bool,
    pub spatial_audio: bool,

    // shock device, the wearer's own ceiling
    pub shock_share_code: String,
    pub max_shock_intensity: u8,
    pub max_shock_duration: Duration,

    pub arousal_effects: bool,
    pub restraint_traits: bool,
}

impl GlobalPermissions {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            chat_garbler_active: false,
            chat_garbler_locked: false,
            allowed_garbler_channels: GarbleChannels::SAY | GarbleChannels::YELL | GarbleChannels::SHOUT,
            gagged_nameplate: false,
            wardrobe_enabled: true,
            gag_visuals: true,
            restriction_visuals: true,
            restraint_set_visuals: true,
            puppeteer_enabled: false,
            trigger_phrase: String::new(),
            puppet_perms: PuppetPerms::empty(),
            toybox_enabled: false,
            lock_toybox_ui: false,
            toys_connected: false,
            toys_interactable: false,
            spatial_audio: false,
            shock_share_code: String::new(),
            max_shock_intensity: DEFAULT_SHOCK_INTENSITY_CEILING,
            max_shock_duration: DEFAULT_SHOCK_DURATION_CEILING,
            arousal_effects: false,
            restraint_traits: false,
        }
    }
}

/// A single-field edit to [`GlobalPermissions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalChange {
    ChatGarblerActive(bool),
    ChatGarblerLocked(bool),
    AllowedGarblerChannels(GarbleChannels),
    GaggedNameplate(bool),
    WardrobeEnabled(bool),
    GagVisuals(bool),
    RestrictionVisuals(bool),
    RestraintSetVisuals(bool),
    PuppeteerEnabled(bool),
    TriggerPhrase(String),
    PuppetPerms(PuppetPerms),
    ToyboxEnabled(bool),
    LockToyboxUi(bool),
    ToysConnected(bool),
    ToysInteractable(bool),
    SpatialAudio(bool),
    ShockShareCode(String),
    MaxShockIntensity(u8),
    MaxShockDuration(Duration),
    ArousalEffects(bool),
    RestraintTraits(bool),
}

impl GlobalChange {
    /// Column touched by this change.
    pub fn field_name(&self) -> &'static str {
        match self {
            GlobalChange::ChatGarblerActive(_) => "chat_garbler_active",
            GlobalChange::ChatGarblerLocked(_) => "chat_garbler_locked",
            GlobalChange::AllowedGarblerChannels(_) => "allowed_garbler_channels",
            GlobalChange::GaggedNameplate(_) => "gagged_nameplate",
            GlobalChange::WardrobeEnabled(_) => "wardrobe_enabled",
            GlobalChange::GagVisuals(_) => "gag_visuals",
            GlobalChange::RestrictionVisuals(_) => "restriction_visuals",
            GlobalChange::RestraintSetVisuals(_) => "restraint_set_visuals",
            GlobalChange::PuppeteerEnabled(_) => "puppeteer_enabled",
            GlobalChange::TriggerPhrase(_) => "trigger_phrase",
            GlobalChange::PuppetPerms(_) => "puppet_perms",
            GlobalChange::ToyboxEnabled(_) => "toybox_enabled",
            GlobalChange::LockToyboxUi(_) => "lock_toybox_ui",
            GlobalChange::ToysConnected(_) => "toys_connected",
            GlobalChange::ToysInteractable(_) => "toys_interactable",
            GlobalChange::SpatialAudio(_) => "spatial_audio",
            GlobalChange::ShockShareCode(_) => "shock_share_code",
            GlobalChange::MaxShockIntensity(_) => "max_shock_intensity",
            GlobalChange::MaxShockDuration(_) => "max_shock_duration",
            GlobalChange::ArousalEffects(_) => "arousal_effects",
            GlobalChange::RestraintTraits(_) => "restraint_traits",
        }
    }

    /// Write the change into `globals`.
    pub fn apply_to(self, globals: &mut GlobalPermissions) {
        match self {
            GlobalChange::ChatGarblerActive(v) => globals.chat_garbler_active = v,
            GlobalChange::ChatGarblerLocked(v) => globals.chat_garbler_locked = v,
            GlobalChange::AllowedGarblerChannels(v) => globals.allowed_garbler_channels = v,
            GlobalChange::GaggedNameplate(v) => globals.gagged_nameplate = v,
            GlobalChange::WardrobeEnabled(v) => globals.wardrobe_enabled = v,
            GlobalChange::GagVisuals(v) => globals.gag_visuals = v,
            GlobalChange::RestrictionVisuals(v) => globals.restriction_visuals = v,
            GlobalChange::RestraintSetVisuals(v) => globals.restraint_set_visuals = v,
            GlobalChange::PuppeteerEnabled(v) => globals.puppeteer_enabled = v,
            GlobalChange::TriggerPhrase(v) => globals.trigger_phrase = v,
            GlobalChange::PuppetPerms(v) => globals.puppet_perms = v,
            GlobalChange::ToyboxEnabled(v) => globals.toybox_enabled = v,
            GlobalChange::LockToyboxUi(v) => globals.lock_toybox_ui = v,
            GlobalChange::ToysConnected(v) => globals.toys_connected = v,
            GlobalChange::ToysInteractable(v) => globals.toys_interactable = v,
            GlobalChange::SpatialAudio(v) => globals.spatial_audio = v,
            GlobalChange::ShockShareCode(v) => globals.shock_share_code = v,
            GlobalChange::MaxShockIntensity(v) => globals.max_shock_intensity = v,
            GlobalChange::MaxShockDuration(v) => globals.max_shock_duration = v,
            GlobalChange::ArousalEffects(v) => globals.arousal_effects = v,
            GlobalChange::RestraintTraits(v) => globals.restraint_traits = v,
        }
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
    fn test_pair_edge_involves() {
        let edge = PairEdge {
            owner: uid("AB12345678"),
            partner: uid("ZZ99999999"),
            created_at: Utc::now(),
        };
        assert!(edge.involves(&uid("AB12345678")));
        assert!(edge.involves(&uid("ZZ99999999")));
        assert!(!edge.involves(&uid("CC00000000")));
    }

    #[test]
    fn test_global_change_applies_single_field() {
        let mut globals = GlobalPermissions::new(uid("AB12345678"));
        let before = globals.clone();

        let change = GlobalChange::AllowedGarblerChannels(GarbleChannels::TELL);
        assert_eq!(change.field_name(), "allowed_garbler_channels");
        change.apply_to(&mut globals);

        assert_eq!(globals.allowed_garbler_channels, GarbleChannels::TELL);
        globals.allowed_garbler_channels = before.allowed_garbler_channels;
        assert_eq!(globals, before);
    }

    #[test]
    fn test_globals_serde_roundtrip() {
        let globals = GlobalPermissions::new(uid("AB12345678"));
        let json = serde_json::to_string(&globals).unwrap();
        let back: GlobalPermissions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, globals);
    }
}
