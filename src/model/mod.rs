pub mod activity;
pub mod bulk;
pub mod column;
pub mod common;
pub mod dropdown;
pub mod pagination;
pub mod query;
pub mod resource;
pub mod row;
pub mod user_context;

pub use activity::*;
pub use bulk::*;
pub use column::*;
pub use common::*;
pub use dropdown::*;
pub use pagination::*;
pub use query::*;
pub use resource::*;
pub use row::*;
pub use user_context::*;
