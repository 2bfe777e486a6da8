pub mod browser;
pub mod extract;
pub mod http;
pub mod scroll;
pub mod session;
