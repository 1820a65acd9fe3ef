//! The Chainsaw hunting core: file decoders, the Chainsaw/Sigma rule
//! loaders, and the `Hunter` that evaluates rules against decoded
//! documents. No command-line front-end, output formatting, or file
//! discovery lives here - those are the concern of whatever binds this
//! crate to a terminal.

pub mod error;
pub mod file;
pub mod hunt;
pub mod mapper;
pub mod preprocess;
pub mod rule;

pub use error::{Error, Result};
pub use file::{Kind, Reader, Record};
pub use hunt::{DetectionKind, Detections, Hit, Hunt, Hunter, HunterBuilder};
pub use mapper::Mapper;
pub use rule::{
    Aggregate, Cast, Container, CountPattern, Field, Filter, Level, Logsource, Rule, RuleKind,
    Status,
};
pub use rule::mapping::{self, Mapping};
