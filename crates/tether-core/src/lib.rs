pub mod dispatch;
pub mod error;
pub mod events;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod state;
pub mod store;
pub mod typing;

pub use error::CoreError;
pub use state::AppState;
