pub mod activity;
pub mod bulk;
pub mod dropdown;
pub mod export;
pub mod filter;
pub mod predicate;
pub mod validate;

pub use activity::*;
pub use bulk::*;
pub use dropdown::*;
pub use export::*;
pub use filter::*;
pub use predicate::*;
pub use validate::*;
