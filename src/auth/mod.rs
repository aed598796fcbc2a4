//! Token lifecycle: state, refresh exchanges, the per-client refresh lock,
//! and per-provider placement of credentials on the wire.

mod browser;
mod refresh;
pub mod session;
pub mod strategy;
pub mod token;

pub use browser::try_open_browser;
pub use refresh::{
    authorization_url, exchange_authorization_code, exchange_refresh_token, AuthorizationRequest,
    TokenEndpoint, TokenGrant,
};
pub use session::{TokenObserver, TokenSession};
pub use strategy::{AuthMaterial, AuthPlacement, AuthStrategy};
pub use token::{TokenSnapshot, TokenState, DEFAULT_EXPIRY_SKEW};
