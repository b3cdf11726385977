//! # Token engines
//!
//! [`Rotator`] replaces the token stored in a secret reference with a
//! freshly rotated one. [`TokenCreator`] issues a new project or group
//! token and stores it in an existing secret.
//!
//! Both engines talk to GitLab through [`IssuerConnector`] and never log
//! token values. When a new token cannot be stored it may be written to a
//! rescue file (see [`rescue`]).
//!
//! [`IssuerConnector`]: crate::gitlab::IssuerConnector

pub mod create;
pub mod expiry;
pub mod rescue;
pub mod rotate;

pub use create::{CreateRequest, CreatedToken, DuplicateCheck, TokenCreator};
pub use expiry::{TokenLifetime, DEFAULT_LIFETIME_DAYS, MAX_LIFETIME_DAYS, MIN_LIFETIME_DAYS};
pub use rescue::write_rescue_file;
pub use rotate::{AdminPolicy, RotatedToken, RotationRequest, Rotator, SELF_ROTATION_SCOPE};
