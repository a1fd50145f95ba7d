pub mod protocol;
pub mod cats;
pub mod users;
pub mod battle;
pub mod items;
pub mod random;
pub mod error;

pub use protocol::*;
pub use cats::*;
pub use users::*;
pub use battle::*;
pub use items::*;
pub use random::*;
pub use error::*;
