//! haarc dispatch - operation code routing
//!
//! Code ranges are registered once at startup, then frozen into an immutable
//! [`DispatchTable`] shared by `Arc`. Routing is a binary search over the
//! sorted ranges and is total: unmatched codes go to the default handler.

pub mod catalog;
pub mod table;

pub use catalog::{default_table, Category, Primitive, PUA_BLOCK};
pub use table::{
    DispatchConfig, DispatchTable, DispatchTableBuilder, HandlerRef, Route, RouteEntry,
};
