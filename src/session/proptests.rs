//! Property-based tests for the session
//!
//! Arbitrary transport behaviour must never leave a message pending or
//! break the attempt bound.

use super::*;
use crate::message::{MessageStatus, Role};
use crate::testing::MockTransport;
use crate::transport::{DeliveryReply, TransportError};
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Reply(Option<String>),
    Transient,
    Permanent,
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        proptest::option::of("[a-z ]{0,12}").prop_map(Outcome::Reply),
        Just(Outcome::Transient),
        Just(Outcome::Permanent),
    ]
}

fn arb_transient_error() -> impl Strategy<Value = TransportError> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(TransportError::network),
        "[a-z]{1,8}".prop_map(TransportError::rate_limit),
        "[a-z]{1,8}".prop_map(TransportError::server_error),
    ]
}

fn arb_permanent_error() -> impl Strategy<Value = TransportError> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(TransportError::auth),
        "[a-z]{1,8}".prop_map(TransportError::invalid_request),
        "[a-z]{1,8}".prop_map(TransportError::unknown),
    ]
}

// ============================================================================
// Test Helpers
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

fn transport_for(outcomes: &[Outcome]) -> MockTransport {
    let transport = MockTransport::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Reply(Some(text)) => transport.queue_reply(DeliveryReply::text(text.clone())),
            Outcome::Reply(None) => transport.queue_reply(DeliveryReply::empty()),
            Outcome::Transient => transport.queue_error(TransportError::network("flaky")),
            Outcome::Permanent => transport.queue_error(TransportError::auth("denied")),
        }
    }
    transport
}

/// Expected attempts and whether delivery succeeds
fn model(outcomes: &[Outcome], max_attempts: u32) -> (u32, bool) {
    let mut attempts = 0;
    for outcome in outcomes {
        attempts += 1;
        match outcome {
            Outcome::Reply(_) => return (attempts, true),
            Outcome::Permanent => return (attempts, false),
            Outcome::Transient if attempts >= max_attempts => return (attempts, false),
            Outcome::Transient => {}
        }
    }
    // An empty mock queue answers with a transient error until attempts run out
    (max_attempts, false)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A send always settles its message and respects the attempt bound
    #[test]
    fn prop_send_settles_message(
        outcomes in proptest::collection::vec(arb_outcome(), 0..6),
        max_attempts in 1u32..5,
    ) {
        let policy = RetryPolicy { max_attempts, ..RetryPolicy::default() };
        let session = Session::builder(transport_for(&outcomes))
            .retry_policy(policy)
            .build();

        let result = runtime().block_on(session.send_message("hello"));
        let (expected_attempts, expect_sent) = model(&outcomes, max_attempts);

        let history = session.history();
        let users: Vec<_> = history.iter().filter(|m| m.role == Role::User).collect();
        prop_assert_eq!(users.len(), 1);
        prop_assert!(history.iter().all(|m| !m.is_pending()));
        prop_assert!(!session.is_busy());
        prop_assert_eq!(session.pipeline().transport().attempts(), expected_attempts as usize);
        prop_assert!(expected_attempts <= max_attempts);

        match result {
            Ok(delivered) => {
                prop_assert!(expect_sent);
                prop_assert_eq!(delivered.attempts, expected_attempts);
                prop_assert_eq!(users[0].status, MessageStatus::Sent);
            }
            Err(SessionError::Delivery { attempts, .. }) => {
                prop_assert!(!expect_sent);
                prop_assert_eq!(attempts, expected_attempts);
                prop_assert_eq!(users[0].status, MessageStatus::Failed);
            }
            Err(other) => {
                return Err(TestCaseError::fail(format!("unexpected error {other:?}")));
            }
        }
    }

    /// Failed messages never block later sends
    #[test]
    fn prop_sequential_sends_keep_order(
        rounds in proptest::collection::vec(any::<bool>(), 1..6),
    ) {
        let transport = MockTransport::new();
        for ok in &rounds {
            if *ok {
                transport.queue_reply(DeliveryReply::empty());
            } else {
                transport.queue_error(TransportError::invalid_request("bad"));
            }
        }
        let session = Session::builder(transport).build();
        let rt = runtime();

        for (i, ok) in rounds.iter().enumerate() {
            let result = rt.block_on(session.send_message(&format!("message {i}")));
            prop_assert_eq!(result.is_ok(), *ok);
        }

        let history = session.history();
        prop_assert_eq!(history.len(), rounds.len());
        for (i, (message, ok)) in history.iter().zip(&rounds).enumerate() {
            prop_assert_eq!(&message.text, &format!("message {i}"));
            let expected = if *ok { MessageStatus::Sent } else { MessageStatus::Failed };
            prop_assert_eq!(message.status, expected);
        }
        prop_assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    /// Backoff stays within the jitter band and under the cap
    #[test]
    fn prop_backoff_bounded(
        attempt in 1u32..10,
        spread in -1.0f64..=1.0,
        base_ms in 1u64..1000,
    ) {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(base_ms),
            ..RetryPolicy::default()
        }
        .normalized();
        let delay = policy.backoff(attempt, spread);

        let exponent = i32::try_from(attempt - 1).unwrap();
        let nominal = policy.base_delay.as_secs_f64() * policy.factor.powi(exponent);
        let low = nominal * (1.0 - policy.jitter) - 1e-6;

        prop_assert!(delay <= policy.max_delay);
        prop_assert!(delay.as_secs_f64() >= low.min(policy.max_delay.as_secs_f64()) - 1e-6);
        prop_assert!(delay.as_secs_f64() <= nominal * (1.0 + policy.jitter) + 1e-6);
    }

    /// Only transient errors are retried, and never past the last attempt
    #[test]
    fn prop_retry_only_transient(
        transient in arb_transient_error(),
        permanent in arb_permanent_error(),
        attempt in 1u32..6,
        max_attempts in 1u32..6,
    ) {
        let policy = RetryPolicy { max_attempts, ..RetryPolicy::default() };
        prop_assert!(!policy.should_retry(attempt, &permanent));
        prop_assert_eq!(policy.should_retry(attempt, &transient), attempt < max_attempts);
    }

    /// A hint from the receiver is honored up to the cap
    #[test]
    fn prop_retry_after_honored(hint_ms in 0u64..20_000, attempt in 1u32..4) {
        let policy = RetryPolicy::default();
        let error = TransportError::rate_limit("slow down")
            .with_retry_after(Duration::from_millis(hint_ms));
        let delay = policy.next_delay(attempt, &error);

        prop_assert!(delay <= policy.max_delay);
        prop_assert!(delay >= Duration::from_millis(hint_ms).min(policy.max_delay));
    }

    /// Status only ever leaves `pending`
    #[test]
    fn prop_status_transitions(
        from in prop_oneof![Just(MessageStatus::Pending), Just(MessageStatus::Sent), Just(MessageStatus::Failed)],
        to in prop_oneof![Just(MessageStatus::Pending), Just(MessageStatus::Sent), Just(MessageStatus::Failed)],
    ) {
        let allowed = from.can_transition_to(to);
        prop_assert_eq!(allowed, from == MessageStatus::Pending && to != MessageStatus::Pending);
    }
}
