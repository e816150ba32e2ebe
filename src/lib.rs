//! Flux Notify - 把 Flux 事件转发到聊天和监控系统

pub mod config;
pub mod event;
pub mod notification;
pub mod server;

pub use config::{Config, ConfigError, EnvConfig, MapConfig, Settings};
pub use event::{DecodeError, Event, EventType, ResourceId};
pub use notification::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, Formatter, Message, SendResult,
};
pub use server::{build_app, serve, AppState};
