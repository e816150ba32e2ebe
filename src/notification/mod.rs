//! 通知层 - 事件渲染与多目标分发
//!
//! # 设计
//! 1. 统一接口：所有目标实现 [`Destination`] trait
//! 2. 目标解耦：每个目标独立实现线上格式，互不影响
//! 3. 频道路由：按频道寻址的目标通过 [`ChannelRouter`] 选择频道
//! 4. 失败隔离：单个目标失败只影响最终状态，不中断其它目标
//!
//! # 使用示例
//! ```ignore
//! use flux_notify::config::EnvConfig;
//! use flux_notify::notification::DispatcherBuilder;
//!
//! let dispatcher = DispatcherBuilder::new(&EnvConfig::new()).build()?;
//! let outcome = dispatcher.dispatch(&event).await;
//! ```

pub mod builder;
pub mod destination;
pub mod destinations;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod message;
pub mod router;
pub mod template;

pub use builder::{create_destination, http_client, DispatcherBuilder};
pub use destination::{Destination, MarkupStyle, SendResult};
pub use dispatcher::{DispatchOutcome, Dispatcher, RenderedMessage};
pub use error::SendError;
pub use formatter::Formatter;
pub use message::Message;
pub use router::{ChannelRouter, ChannelRule};
pub use template::{RenderError, Template, TemplateError};
