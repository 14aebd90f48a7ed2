//! oscar router
//!
//! Holds the method registry and turns decoded packets into handler calls:
//! - Literal method addresses registered at setup time
//! - Incoming message addresses treated as patterns and fanned out
//! - Bundles deferred until their time tag, then re-dispatched
//! - Handler panics isolated, logged and counted
//!
//! # Example
//!
//! ```no_run
//! use oscar_core::Message;
//! use oscar_router::Dispatcher;
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher
//!     .register("/synth/1/freq", |msg: &Message| println!("{}", msg))
//!     .unwrap();
//!
//! dispatcher.dispatch(Message::new("/synth/*/freq").arg(440.0f32).into());
//! ```

pub mod dispatcher;
pub mod error;
pub mod registry;

pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig, ScheduledBundle};
pub use error::{RegistrationError, Result, RouterError};
pub use registry::{Method, MethodRegistry, RegisteredMethod};
