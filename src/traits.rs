pub mod mini_protocol;
pub mod state;

pub use mini_protocol::{MiniProtocol, Mode, Role};
pub use state::Agency;
