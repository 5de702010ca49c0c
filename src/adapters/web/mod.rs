//! Browser front-end: an axum server rendering the sidebar and chat page.

mod handlers;
mod page;
mod router;
mod server;
mod sessions;

pub use page::{escape, render_markdown};
pub use server::WebServer;
pub use sessions::SessionStore;
