//! Accounts and bearer tokens.

pub mod extract;
pub mod token;
pub mod users;

pub use extract::AuthUser;
pub use token::TokenIssuer;
pub use users::UserStore;
