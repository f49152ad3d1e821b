pub mod auth;
pub mod maintenance;
pub mod permissions;

pub use auth::require_auth;
pub use auth::AuthenticatedUser;
pub use maintenance::maintenance_guard;
pub use permissions::*;
