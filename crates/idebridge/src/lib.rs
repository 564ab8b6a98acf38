pub mod app;
pub mod credentials;
pub mod device;
pub mod handlers;
pub mod reassembler;
pub mod retry;
pub mod session;
pub mod token_store;
pub mod translator;
pub mod upstream;
pub mod utils;
