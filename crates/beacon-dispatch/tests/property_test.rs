//! Property-based tests for queue bounds, request construction and status
//! classification.

#![allow(clippy::unwrap_used)]

use beacon_dispatch::{
    build_request, classify_status, queue::EventQueue, DispatchOutcome, LogEvent, RequestMethod,
    ResponseClass,
};
use beacon_testing::strategies::{
    log_event_strategy, params_strategy, raw_status_strategy, status_code_strategy,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

/// Queue operations applied in sequence.
#[derive(Debug, Clone)]
enum QueueOp {
    Enqueue,
    Take,
}

fn queue_op_strategy() -> impl Strategy<Value = QueueOp> {
    prop_oneof![3 => Just(QueueOp::Enqueue), 1 => Just(QueueOp::Take)]
}

proptest! {
    /// Queue size stays within [0, C] for any interleaving of enqueues and
    /// takes, and a failed enqueue never changes the size.
    #[test]
    fn queue_size_stays_within_capacity(
        capacity in 1usize..32,
        ops in prop::collection::vec(queue_op_strategy(), 0..200),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let queue = EventQueue::new(capacity).unwrap();
            let cancel = CancellationToken::new();
            let mut expected = 0usize;

            for op in ops {
                match op {
                    QueueOp::Enqueue => {
                        let before = queue.len();
                        let accepted =
                            queue.try_enqueue(LogEvent::get("http://localhost/e")).is_ok();
                        if accepted {
                            expected += 1;
                        } else {
                            prop_assert_eq!(before, capacity);
                            prop_assert_eq!(queue.len(), before);
                        }
                    },
                    QueueOp::Take => {
                        if expected > 0 {
                            prop_assert!(queue.take(&cancel).await.is_some());
                            expected -= 1;
                        }
                    },
                }

                prop_assert!(queue.len() <= capacity);
                prop_assert_eq!(queue.len(), expected);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// GET requests carry every parameter, in order, and nothing else is
    /// lost in encoding.
    #[test]
    fn get_request_round_trips_params(params in params_strategy()) {
        let event = LogEvent {
            method: RequestMethod::Get,
            endpoint_url: "https://logx.example.com/v1/events".to_string(),
            params: params.clone(),
            body: String::new(),
        };

        let request = build_request(&event).unwrap();

        prop_assert_eq!(request.query_pairs(), params);
        prop_assert!(request.body.is_none());
        prop_assert!(request.content_type.is_none());
    }

    /// POST requests carry the body verbatim and never a query string.
    #[test]
    fn post_request_carries_body_verbatim(
        event in log_event_strategy("https://logx.example.com/v1/events".to_string())
            .prop_filter("post only", |e| e.method == RequestMethod::Post),
    ) {
        let request = build_request(&event).unwrap();

        prop_assert_eq!(request.body.as_deref(), Some(event.body.as_str()));
        prop_assert_eq!(request.content_type, Some("application/json"));
        prop_assert!(request.url.query().is_none());
    }

    /// Exactly the 2xx range classifies as success.
    #[test]
    fn only_2xx_is_success(status_code in raw_status_strategy()) {
        let class = classify_status(status_code);

        if (200..300).contains(&status_code) {
            prop_assert_eq!(class, ResponseClass::Success);
        } else {
            prop_assert_eq!(class, ResponseClass::ProtocolError { status_code });
        }
    }

    /// Outcomes carry an error record exactly when delivery failed.
    #[test]
    fn outcome_error_matches_classification(status_code in status_code_strategy()) {
        let outcome = DispatchOutcome::from_response(Ok(status_code));

        prop_assert_eq!(outcome.is_success(), outcome.error().is_none());
        prop_assert_eq!(outcome.is_success(), (200..300).contains(&status_code));
    }
}
