//! # zipws-core
//!
//! Core library for zipws - an ephemeral workspace manager for zip
//! archives. A session materializes an archive into a managed directory,
//! external tools read and write the extracted files through ordinary
//! filesystem paths, and a sync packs the modified contents back over the
//! source while keeping a rotating backup chain.
//!
//! The library combines two independent adversary models: a malicious
//! archive (zip-slip entries, zip bombs, lying central directories) and
//! concurrent external mutation of the source archive. Every operation is
//! designed to lose no user data and to never write outside its workspace.
//!
//! ## Example
//!
//! ```rust,no_run
//! use zipws_core::config::Config;
//! use zipws_core::paths::Layout;
//! use zipws_core::{session, sync, tool};
//!
//! # fn main() -> Result<(), zipws_core::Error> {
//! let layout = Layout::discover()?;
//! let config = Config::load(&layout)?;
//!
//! let mut sess = session::create("report.zip", Some("report"), &layout, &config)?;
//! tool::write(&layout, &sess, "notes.txt", b"hello", true)?;
//! let report = sync::sync(&mut sess, false, &layout, &config)?;
//! println!("backed up to {}", report.backup_path.display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod archive;
pub mod config;
pub mod error;
pub mod lock;
pub mod paths;
pub mod security;
pub mod session;
pub mod sync;
pub mod tool;
pub mod workspace;

#[cfg(test)]
mod ziptest;

pub use config::Config;
pub use error::{Error, ErrorCode};
pub use paths::Layout;
pub use session::{Session, SessionState};
pub use sync::SyncReport;
