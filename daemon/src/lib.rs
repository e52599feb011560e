pub mod backend;
pub mod daemon;
pub mod detector;
pub mod encode;
pub mod event;
pub mod gate;
pub mod notice;
pub mod overlay;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod video;
