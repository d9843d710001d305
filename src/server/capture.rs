//! Scheduled capture validation: CAPTURE's optional `sync` argument asks
//! the server to wait until a specific wall-clock time before triggering
//! the camera, so a fleet of servers given the same `sync` timestamp
//! shoot together. The actual waiting is the `Camera` implementation's
//! job (see its `at_time` parameter); this module only validates the
//! timestamp before it reaches the camera.

use crate::error::ArgumentError;

fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Validates a `sync` timestamp against the current time. Rejects
/// timestamps that are not strictly in the future — there's no way to
/// synchronise on a moment that has already passed.
pub fn validate_sync(sync: f64) -> Result<(), ArgumentError> {
    let now = now_unix();
    if sync <= now {
        return Err(ArgumentError::CaptureNotInFuture { requested: sync, now });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_sync_time_is_rejected() {
        assert!(validate_sync(1.0).is_err());
    }

    #[test]
    fn far_future_sync_time_is_accepted() {
        let far_future = now_unix() + 3600.0;
        assert!(validate_sync(far_future).is_ok());
    }
}
