//! Policy binding and provisioning state machine for bare-metal fleets.
//!
//! A discovered node reports its facts, the [`binder::PolicyBinder`] walks an
//! ordered rule set and binds the first matching [`policy::PolicyRule`], and
//! the bound model is then driven through its template's transition table by
//! the [`machine::ModelStateMachine`] as external agent events arrive. Every
//! state change lands in the model's append-only transition log.
//!
//! Transport, image storage, and durable persistence live outside this crate;
//! they plug in through the [`broker::AgentBroker`] and [`store::RecordStore`]
//! contracts.

pub mod binder;
pub mod broker;
pub mod config;
pub mod error;
pub mod io;
pub mod machine;
pub mod model;
pub mod node;
pub mod policy;
pub mod store;
pub mod tag;
pub mod template;
pub mod types;

pub use error::{EngineError, Result};
