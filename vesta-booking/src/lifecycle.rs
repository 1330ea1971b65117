use vesta_core::reservation::ReservationStatus;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Guard for reservation lifecycle moves. PENDING -> CONFIRMED -> COMPLETED
/// is the happy path; cancellation is allowed from either non-terminal
/// state, and terminal states accept nothing.
pub fn ensure_transition(
    from: ReservationStatus,
    to: ReservationStatus,
) -> Result<(), LifecycleError> {
    use ReservationStatus::*;

    let allowed = matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
    );

    if allowed {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationStatus::*;

    #[test]
    fn happy_path_is_allowed() {
        ensure_transition(Pending, Confirmed).unwrap();
        ensure_transition(Confirmed, Completed).unwrap();
    }

    #[test]
    fn cancellation_from_non_terminal_states() {
        ensure_transition(Pending, Cancelled).unwrap();
        ensure_transition(Confirmed, Cancelled).unwrap();
    }

    #[test]
    fn terminal_states_accept_nothing() {
        assert!(ensure_transition(Cancelled, Confirmed).is_err());
        assert!(ensure_transition(Completed, Cancelled).is_err());
        assert!(ensure_transition(Pending, Completed).is_err());
    }
}
