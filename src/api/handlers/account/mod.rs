//! Account lifecycle handlers and the authentication-key machinery behind
//! them.
//!
//! The submodules split along the seams of the subsystem: key issuance and
//! token format ([`keys`]), redemption and persistence ([`storage`]), session
//! plumbing ([`session`]), and one handler module per user-facing flow.

pub mod activate;
pub mod deactivate;
pub mod error;
pub mod keys;
pub mod login;
pub mod password;
pub mod recover;
pub mod register;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

mod credentials;

pub use self::activate::activate;
pub use self::deactivate::{deactivate, request_deactivation};
pub use self::login::{login, logout};
pub use self::password::change_password;
pub use self::recover::{recover, recovery_form, request_recovery};
pub use self::register::register;
pub use self::state::AccountConfig;
