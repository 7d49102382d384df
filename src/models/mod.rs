pub mod merchant;
pub mod payment;
pub mod user;
pub mod wallet_user;

pub use merchant::*;
pub use payment::*;
pub use user::*;
pub use wallet_user::*;
