//! Host collaborators for `reqcycle-core` on a tokio `LocalSet`.
//!
//! The core never does IO. This crate provides the pieces a program needs
//! to run real requests: timers on tokio, a ureq-backed transport, and an
//! entry-point guard that turns listener panics into log lines.
//!
//! ```no_run
//! use reqcycle_core::{EventType, RequestController};
//! use reqcycle_host::{local_platform, HostConfig};
//!
//! # async fn demo() {
//! tokio::task::LocalSet::new()
//!     .run_until(async {
//!         let controller = RequestController::new(local_platform(HostConfig::from_env()));
//!         controller.listen(EventType::Complete, |event| {
//!             println!("{} -> {}", event.target.last_uri(), event.target.status());
//!         });
//!         controller.send("http://127.0.0.1:3000/text", None, None, None).unwrap();
//!     })
//!     .await;
//! # }
//! ```

pub mod config;
pub mod guard;
pub mod timers;
pub mod transport;

use std::rc::Rc;

use reqcycle_core::Platform;

pub use config::HostConfig;
pub use guard::CatchUnwindGuard;
pub use timers::TokioTimers;
pub use transport::{UreqTransport, UreqTransportFactory};

/// A platform of tokio timers, ureq transports and a `CatchUnwindGuard`.
pub fn local_platform(config: HostConfig) -> Platform {
    Platform::new(
        Rc::new(UreqTransportFactory::new(config)),
        Rc::new(TokioTimers::new()),
    )
    .with_entry_point(Rc::new(CatchUnwindGuard::new()))
}
