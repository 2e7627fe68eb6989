//! Input validation for queue and message parameters.
//!
//! Every externally supplied value passes through [`validate`] before the
//! backing store is touched, so a rejected call never leaves partial state
//! behind. Checks run in a fixed order (queue, vt, delay, maxsize, id) and the
//! first violation is reported.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

/// Upper bound (inclusive) for visibility timeouts and delays, in seconds.
pub const MAX_DURATION_SECS: i64 = 9_999_999;

/// Smallest accepted bounded message size, in bytes.
pub const MIN_MAXSIZE: i64 = 1024;

/// Largest accepted bounded message size, in bytes.
pub const MAX_MAXSIZE: i64 = 65536;

/// `maxsize` value meaning "no limit".
pub const UNLIMITED_MAXSIZE: i64 = -1;

lazy_static! {
    static ref QUEUE_NAME: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,160}$").expect("valid regex");
    static ref MESSAGE_ID: Regex = Regex::new(r"^[0-9a-z]{32}$").expect("valid regex");
}

/// The parameter a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Queue,
    Vt,
    Delay,
    Maxsize,
    Id,
}

/// The set of values to check. Absent fields are skipped.
#[derive(Debug, Default, Clone, Copy, bon::Builder)]
pub struct Fields<'a> {
    pub queue: Option<&'a str>,
    pub vt: Option<i64>,
    pub delay: Option<i64>,
    pub maxsize: Option<i64>,
    pub id: Option<&'a str>,
}

/// Checks `fields` against their declared constraints.
pub fn validate(fields: Fields<'_>) -> Result<()> {
    if let Some(queue) = fields.queue {
        if !QUEUE_NAME.is_match(queue) {
            return Err(Error::validation(Field::Queue, "Invalid queue name"));
        }
    }

    if let Some(vt) = fields.vt {
        if !(0..=MAX_DURATION_SECS).contains(&vt) {
            return Err(Error::validation(
                Field::Vt,
                format!("Visibility time must be between 0 and {MAX_DURATION_SECS}"),
            ));
        }
    }

    if let Some(delay) = fields.delay {
        if !(0..=MAX_DURATION_SECS).contains(&delay) {
            return Err(Error::validation(
                Field::Delay,
                format!("Delay must be between 0 and {MAX_DURATION_SECS}"),
            ));
        }
    }

    if let Some(maxsize) = fields.maxsize {
        if maxsize != UNLIMITED_MAXSIZE && !(MIN_MAXSIZE..=MAX_MAXSIZE).contains(&maxsize) {
            return Err(Error::validation(
                Field::Maxsize,
                format!("Maximum message size must be between {MIN_MAXSIZE} and {MAX_MAXSIZE}"),
            ));
        }
    }

    if let Some(id) = fields.id {
        if !MESSAGE_ID.is_match(id) {
            return Err(Error::validation(Field::Id, "Invalid message id"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<()>) -> Field {
        match result {
            Err(Error::Validation { field, .. }) => field,
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_queue_names() {
        let long = "a".repeat(160);
        let names = vec!["foo", "FOO_bar-1", "-", "_", long.as_str()];

        for name in names {
            assert!(
                validate(Fields::builder().queue(name).build()).is_ok(),
                "Rejected valid queue name: {name}"
            );
        }
    }

    #[test]
    fn test_invalid_queue_names() {
        let long = "a".repeat(161);
        let names = vec!["", " foo", "foo bar", "foo.bar", "foo:bar", long.as_str()];

        for name in names {
            let result = validate(Fields::builder().queue(name).build());
            assert_eq!(field_of(result), Field::Queue, "Accepted invalid name: {name}");
        }
    }

    #[test]
    fn test_invalid_queue_name_message() {
        let err = validate(Fields::builder().queue(" foo").build()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid queue name");
    }

    #[test]
    fn test_vt_bounds() {
        assert!(validate(Fields::builder().vt(0).build()).is_ok());
        assert!(validate(Fields::builder().vt(MAX_DURATION_SECS).build()).is_ok());

        for vt in [-1, MAX_DURATION_SECS + 1, i64::MAX, i64::MIN] {
            let err = validate(Fields::builder().vt(vt).build()).unwrap_err();
            assert!(err.to_string().starts_with("Visibility time must be between"));
        }
    }

    #[test]
    fn test_delay_bounds() {
        assert!(validate(Fields::builder().delay(0).build()).is_ok());
        assert!(validate(Fields::builder().delay(MAX_DURATION_SECS).build()).is_ok());

        for delay in [-1, 99_999_999, i64::MAX] {
            let err = validate(Fields::builder().delay(delay).build()).unwrap_err();
            assert!(err.to_string().starts_with("Delay must be between"));
        }
    }

    #[test]
    fn test_maxsize_bounds() {
        for maxsize in [UNLIMITED_MAXSIZE, MIN_MAXSIZE, 2048, MAX_MAXSIZE] {
            assert!(validate(Fields::builder().maxsize(maxsize).build()).is_ok());
        }

        for maxsize in [-2, 0, 512, 1023, MAX_MAXSIZE + 1, i64::MAX] {
            let err = validate(Fields::builder().maxsize(maxsize).build()).unwrap_err();
            assert!(err
                .to_string()
                .starts_with("Maximum message size must be between"));
        }
    }

    #[test]
    fn test_message_id_format() {
        assert!(validate(Fields::builder().id(&"0a".repeat(16)).build()).is_ok());

        let upper = "A".repeat(32);
        let short = "1".repeat(31);
        for id in ["123456", upper.as_str(), short.as_str()] {
            let err = validate(Fields::builder().id(id).build()).unwrap_err();
            assert_eq!(err.to_string(), "Invalid message id");
        }
    }

    #[test]
    fn test_first_violation_wins() {
        let result = validate(
            Fields::builder()
                .queue("bad name")
                .vt(-1)
                .delay(-1)
                .maxsize(1)
                .id("x")
                .build(),
        );
        assert_eq!(field_of(result), Field::Queue);

        let result = validate(Fields::builder().queue("ok").vt(-1).delay(-1).build());
        assert_eq!(field_of(result), Field::Vt);

        let result = validate(Fields::builder().delay(-1).maxsize(1).id("x").build());
        assert_eq!(field_of(result), Field::Delay);

        let result = validate(Fields::builder().maxsize(1).id("x").build());
        assert_eq!(field_of(result), Field::Maxsize);
    }

    #[test]
    fn test_empty_fields_pass() {
        assert!(validate(Fields::default()).is_ok());
    }
}
