mod account;
mod category;
mod ledger;
mod merchant;
mod money;
mod transaction;
mod user;

pub use account::*;
pub use category::*;
pub use ledger::*;
pub use merchant::*;
pub use money::*;
pub use transaction::*;
pub use user::*;
