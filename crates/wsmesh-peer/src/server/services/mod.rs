//! Built-in request handlers.

mod echo;

pub use echo::EchoHandler;
