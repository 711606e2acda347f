//! Converts Apple property lists, binary (`bplist00`) or XML, into compact JSON.
//!
//! ```no_run
//! use plist2json::{Input, JsonPolicy, convert_all};
//!
//! let inputs = [Input::from("Info.plist")];
//! let report = convert_all(&inputs, JsonPolicy::default(), &mut std::io::stdout())?;
//! assert!(report.is_success());
//! # Ok::<(), plist2json::Error>(())
//! ```

pub mod convert;
pub mod error;
pub mod plist;
pub mod stream;

pub use convert::{Failure, Input, Report, convert_all, convert_bytes, convert_file};
pub use error::{Error, Result};
pub use plist::Plist;
pub use stream::json_writer::{JsonPolicy, JsonWriter};
