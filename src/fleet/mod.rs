pub mod board;
pub mod dispatcher;
pub mod models;
pub mod poller;
