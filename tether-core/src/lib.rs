//! Tether Core - Entity Type Definitions
//!
//! Pure data structures with no I/O. Everything the permission model
//! persists or passes around lives here: identities, the capability catalog,
//! grant rows, flag sets, the padlock typestate, hardcore overrides, collar
//! rows, configuration, the clock seam and the error taxonomy.

mod capability;
mod clock;
mod collar;
mod config;
mod entities;
mod enums;
mod error;
mod flags;
mod grant;
mod hardcore;
mod identity;
mod layer;
mod padlock;

pub use capability::*;
pub use clock::*;
pub use collar::*;
pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use flags::*;
pub use grant::*;
pub use hardcore::*;
pub use identity::*;
pub use layer::*;
pub use padlock::*;
