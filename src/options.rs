//! Transaction tuning options and connection opening.
//!
//! A fixed catalogue of backend transaction options, each with a name,
//! a value type, and an optional compiled-in default. Values resolve
//! per option as: live configuration override, else default, else left
//! unset. Validation failures and backend rejections are logged with
//! the option name and offending value and the option is left
//! unapplied; opening a connection never fails because a tuning knob
//! could not be set.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use tracing::error;

use loam_constants::MAX_STRING_OPTION_BYTES;

use crate::backend::Backend;
use crate::backend::Connection;
use crate::config::ConfigStore;
use crate::config::SECTION_TX_OPTIONS;
use crate::error::BackendError;
use crate::error::OptionValueError;

/// Value type of a tuning option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    /// Parsed from config as a signed integer.
    Int,
    /// Applied verbatim; must encode to fewer than
    /// [`MAX_STRING_OPTION_BYTES`] bytes.
    ShortStr,
}

/// A typed, validated option value ready to hand to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Integer option value.
    Int(i64),
    /// Short-string option value.
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// One entry of the tuning-option catalogue.
#[derive(Debug)]
pub struct TransactionOption {
    /// Option name, doubling as its configuration key.
    pub name: &'static str,
    /// Value type used for parsing and validation.
    pub value_type: OptionType,
    /// Compiled-in default, if any. Only integer options carry
    /// defaults; string options are unset unless configured.
    pub default: Option<i64>,
}

/// The catalogue of backend transaction options, in application order.
///
/// Defaults are fixed at compile time; live overrides come from the
/// `backend_tx_options` configuration section under the same names.
pub const TRANSACTION_OPTIONS: &[TransactionOption] = &[
    TransactionOption {
        name: "machine_id",
        value_type: OptionType::ShortStr,
        default: None,
    },
    TransactionOption {
        name: "datacenter_id",
        value_type: OptionType::ShortStr,
        default: None,
    },
    TransactionOption {
        name: "transaction_logging_max_field_length",
        value_type: OptionType::Int,
        default: None,
    },
    TransactionOption {
        name: "timeout",
        value_type: OptionType::Int,
        default: Some(60_000),
    },
    TransactionOption {
        name: "retry_limit",
        value_type: OptionType::Int,
        default: Some(100),
    },
    TransactionOption {
        name: "max_retry_delay",
        value_type: OptionType::Int,
        default: Some(1_000),
    },
    TransactionOption {
        name: "size_limit",
        value_type: OptionType::Int,
        default: Some(10_000_000),
    },
];

/// Find a catalogue entry by name.
pub fn lookup(name: &str) -> Option<&'static TransactionOption> {
    TRANSACTION_OPTIONS.iter().find(|opt| opt.name == name)
}

impl TransactionOption {
    /// Parse and validate a textual value for this option.
    ///
    /// # Errors
    ///
    /// Returns [`OptionValueError`] when an integer option does not
    /// parse or a string option is at or above the backend's byte
    /// limit.
    pub fn parse(&self, raw: &str) -> Result<OptionValue, OptionValueError> {
        match self.value_type {
            OptionType::Int => raw.trim().parse::<i64>().map(OptionValue::Int).map_err(|_| {
                OptionValueError::NotAnInteger {
                    name: self.name,
                    value: raw.to_string(),
                }
            }),
            OptionType::ShortStr => {
                if raw.len() < MAX_STRING_OPTION_BYTES {
                    Ok(OptionValue::Str(raw.to_string()))
                } else {
                    Err(OptionValueError::ValueTooLong {
                        name: self.name,
                        value: raw.to_string(),
                        len: raw.len(),
                        limit: MAX_STRING_OPTION_BYTES,
                    })
                }
            }
        }
    }
}

/// Parse a textual override and apply it to the connection.
///
/// Both validation failure and backend rejection are logged and
/// absorbed. Returns the applied value, or `None` if the option was
/// left unapplied.
pub fn apply_raw(conn: &dyn Connection, opt: &TransactionOption, raw: &str) -> Option<OptionValue> {
    let value = match opt.parse(raw) {
        Ok(value) => value,
        Err(err) => {
            error!(option = opt.name, value = %raw, %err, "invalid transaction option value; leaving unapplied");
            return None;
        }
    };
    apply_value(conn, opt, value)
}

/// Apply an already-validated value to the connection, absorbing
/// backend rejection.
fn apply_value(conn: &dyn Connection, opt: &TransactionOption, value: OptionValue) -> Option<OptionValue> {
    match conn.set_option(opt.name, &value) {
        Ok(()) => {
            debug!(option = opt.name, value = %value, "transaction option applied");
            Some(value)
        }
        Err(err) => {
            error!(option = opt.name, value = %value, %err, "backend rejected transaction option; leaving unapplied");
            None
        }
    }
}

/// Apply the full catalogue to a connection, resolving each option from
/// live configuration, else its compiled default, else leaving it
/// unset. Returns the options that were actually applied.
pub fn apply_catalogue(conn: &dyn Connection, config: &ConfigStore) -> HashMap<&'static str, OptionValue> {
    let mut applied = HashMap::new();
    for opt in TRANSACTION_OPTIONS {
        let outcome = match config.get(SECTION_TX_OPTIONS, opt.name) {
            Some(raw) => apply_raw(conn, opt, &raw),
            None => match opt.default {
                Some(default) => apply_value(conn, opt, OptionValue::Int(default)),
                None => None,
            },
        };
        if let Some(value) = outcome {
            applied.insert(opt.name, value);
        }
    }
    applied
}

/// Open a backend connection and apply the current tuning-option set.
///
/// This is the single entry point the reactor uses at startup and on
/// every full reconnect. Option failures never fail the open.
///
/// # Errors
///
/// Returns [`BackendError::Connect`] only when the backend itself
/// cannot produce a connection.
pub fn open_connection(
    backend: &dyn Backend,
    cluster_file: Option<&Path>,
    config: &ConfigStore,
) -> Result<(Arc<dyn Connection>, HashMap<&'static str, OptionValue>), BackendError> {
    let conn = backend.connect(cluster_file)?;
    let applied = apply_catalogue(conn.as_ref(), config);
    Ok((conn, applied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn memory_connection() -> Arc<dyn Connection> {
        MemoryBackend::new().connect(None).expect("connect")
    }

    #[test]
    fn catalogue_defaults_are_applied_when_config_is_empty() {
        let config = ConfigStore::new();
        let conn = memory_connection();

        let applied = apply_catalogue(conn.as_ref(), &config);

        assert_eq!(applied.get("timeout"), Some(&OptionValue::Int(60_000)));
        assert_eq!(applied.get("retry_limit"), Some(&OptionValue::Int(100)));
        assert_eq!(applied.get("max_retry_delay"), Some(&OptionValue::Int(1_000)));
        assert_eq!(applied.get("size_limit"), Some(&OptionValue::Int(10_000_000)));
        // No default, no override: left unset.
        assert_eq!(applied.get("machine_id"), None);
        assert_eq!(applied.get("transaction_logging_max_field_length"), None);
    }

    #[test]
    fn config_override_beats_default() {
        let config = ConfigStore::new();
        config.set(SECTION_TX_OPTIONS, "timeout", "5000");
        let conn = memory_connection();

        let applied = apply_catalogue(conn.as_ref(), &config);
        assert_eq!(applied.get("timeout"), Some(&OptionValue::Int(5_000)));
    }

    #[test]
    fn string_option_length_guard_is_exclusive_at_sixteen() {
        let opt = lookup("machine_id").expect("catalogue entry");

        // 15 bytes: accepted.
        let fifteen = "a".repeat(15);
        assert_eq!(opt.parse(&fifteen).expect("15 bytes fits"), OptionValue::Str(fifteen.clone()));

        // 16 bytes: rejected.
        let sixteen = "a".repeat(16);
        assert!(matches!(
            opt.parse(&sixteen),
            Err(OptionValueError::ValueTooLong { name: "machine_id", len: 16, .. })
        ));
    }

    #[test]
    fn unparseable_integer_is_left_unapplied() {
        let config = ConfigStore::new();
        config.set(SECTION_TX_OPTIONS, "timeout", "sixty seconds");
        let conn = memory_connection();

        let applied = apply_catalogue(conn.as_ref(), &config);
        assert_eq!(applied.get("timeout"), None);
    }

    #[test]
    fn backend_rejection_does_not_fail_the_open() {
        let backend = MemoryBackend::new().rejecting("size_limit");
        let config = ConfigStore::new();

        let (_, applied) = open_connection(&backend, None, &config).expect("open succeeds");
        assert_eq!(applied.get("size_limit"), None);
        assert_eq!(applied.get("timeout"), Some(&OptionValue::Int(60_000)));
    }
}
