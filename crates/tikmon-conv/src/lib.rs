//! tikmon-conv - Value decoding for device response fields
//!
//! Turns the text fields of a device response row into label strings and
//! metric samples, following declarative [`Param`] definitions.
//!
//! # Features
//!
//! - **Typed parsing** - numbers with units, booleans, timespans, timestamps, enums
//! - **Remapping** - exact and regex replacement of raw text before parsing
//! - **Variables** - `{name}` placeholders resolved from a [`VariableScope`]
//! - **Pure** - no I/O, every function can be tested with a plain `HashMap`
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use tikmon_conv::{decode_value, Param, ParamType, VariableScope};
//!
//! let uptime = Param::field("uptime", ParamType::Timespan);
//! let row: HashMap<String, String> = [("uptime".to_string(), "1d2h".to_string())].into();
//!
//! let value = decode_value(&uptime, &row, &VariableScope::new()).unwrap();
//! assert_eq!(value, Some(90000.0));
//! ```
//!
//! # YAML Parameter Definitions
//!
//! ```yaml
//! name: psu-state
//! param_type: Enum
//! enum_values:
//!   ok: 1
//!   fail: 0
//! enum_values_re:
//!   "^warn": 0.5
//! enum_fallback: -1
//! ```
//!
//! # Parameter Types
//!
//! | Type | Raw text | Value |
//! |------|----------|-------|
//! | String | `ether1` | labels only |
//! | Int | `123ms` | 123 |
//! | Bool | `yes` | 1 (0 with `negate`) |
//! | Timespan | `1d2h` | 90000 |
//! | DateTime | `may/03/2020 17:41:00` | seconds from/to now |
//! | Enum | `ok` | mapped number |

pub mod decode;
pub mod error;
pub mod param;
pub mod scalar;
pub mod scope;
pub mod types;

// Re-export main types
pub use decode::{
    decode_label, decode_label_at, decode_value, decode_value_at, format_number, Fields, NoFields,
};
pub use error::{ConvError, ConvResult};
pub use param::Param;
pub use scope::VariableScope;
pub use types::{DateTimeType, ParamType, Pattern, RegexRule, RegexRules};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::decode::{decode_label, decode_value, Fields};
    pub use crate::error::{ConvError, ConvResult};
    pub use crate::param::Param;
    pub use crate::scope::VariableScope;
    pub use crate::types::ParamType;
}
