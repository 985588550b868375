//! Routing: the application's views and the guard in front of them.

pub mod guard;
pub mod navigator;
pub mod route;

pub use guard::{Access, Guarded, RouteGuard};
pub use navigator::{Navigation, Navigator};
pub use route::Route;
