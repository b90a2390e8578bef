//! # Request/Response Round Trips
//!
//! A context sends in scope `root`, another answers through a respondable
//! listener. Covers the success path, listener failures and rejections,
//! and which listeners are selected for a request.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use switchboard::{BusError, ListenerError, MessageListener, MessageSender, Responder, SendOptions};

    use crate::integration::fixtures::{from, seen, settle, within, Contexts};

    // =============================================================================
    // GREETING SCENARIO
    // =============================================================================

    /// background asks options in `root`; only the matching respondable
    /// listener runs and its reply comes back verbatim.
    #[tokio::test]
    async fn test_hello_world_request() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        let calls = seen::<(&'static str, Value)>();

        let answering = {
            let calls = calls.clone();
            MessageListener::respondable(move |payload, sender: MessageSender, responder: Responder| {
                calls.lock().push(("root", payload));
                assert_eq!(sender, from("background"));
                async move {
                    responder.respond(json!({ "greeting": "world" }))?;
                    Ok::<(), ListenerError>(())
                }
            })
        };
        let other_scope = {
            let calls = calls.clone();
            MessageListener::respondable(move |payload, _sender, responder: Responder| {
                calls.lock().push(("other", payload));
                async move {
                    responder.respond("wrong scope")?;
                    Ok::<(), ListenerError>(())
                }
            })
        };
        let other_target = {
            let calls = calls.clone();
            MessageListener::respondable(move |payload, _sender, responder: Responder| {
                calls.lock().push(("popup", payload));
                async move {
                    responder.respond("wrong target")?;
                    Ok::<(), ListenerError>(())
                }
            })
        };
        let fire_and_forget = {
            let calls = calls.clone();
            MessageListener::plain(move |payload, _sender| {
                calls.lock().push(("plain", payload));
                Ok(())
            })
        };

        assert!(options.scope("root").on(&answering, None));
        assert!(options.scope("settings").on(&other_scope, None));
        assert!(options.scope("root").on(&other_target, Some("popup")));
        assert!(options.scope("root").on(&fire_and_forget, None));

        let reply = within(
            background
                .scope("root")
                .request(json!({ "greeting": "hello" }), SendOptions::to("options")),
        )
        .await
        .unwrap();

        assert_eq!(reply, json!({ "greeting": "world" }));
        assert_eq!(*calls.lock(), vec![("root", json!({ "greeting": "hello" }))]);
        assert_eq!(background.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_replying_listener_returns_typed_value() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("math").on(
            &MessageListener::replying(|payload: Value, _sender| async move {
                let numbers: Vec<i64> = serde_json::from_value(payload)?;
                Ok::<i64, ListenerError>(numbers.iter().sum())
            }),
            None,
        );

        let sum: i64 = within(
            background
                .scope("math")
                .request_as(vec![1, 2, 3, 4], SendOptions::to("options")),
        )
        .await
        .unwrap();
        assert_eq!(sum, 10);
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_listener_error_rejects_with_message() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("root").on(
            &MessageListener::respondable(|_payload, _sender, _responder| async move {
                Err(ListenerError::new("boom"))
            }),
            None,
        );

        let outcome = within(background.scope("root").request(json!(null), SendOptions::to("options"))).await;
        match outcome {
            Err(BusError::Remote(err)) => assert_eq!(err.message, "boom"),
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_listener_panic_rejects() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("root").on(
            &MessageListener::respondable(|_payload, _sender, _responder| async move {
                if true {
                    panic!("listener blew up");
                }
                Ok(())
            }),
            None,
        );

        let outcome = within(background.scope("root").request(json!(1), SendOptions::to("options"))).await;
        match outcome {
            Err(BusError::Remote(err)) => assert!(err.message.contains("listener blew up")),
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reject_carries_payload() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("root").on(
            &MessageListener::respondable(|_payload, _sender, responder: Responder| async move {
                responder.reject("not allowed")?;
                Ok::<(), ListenerError>(())
            }),
            None,
        );

        let outcome = within(background.scope("root").request(json!(1), SendOptions::to("options"))).await;
        match outcome {
            Err(BusError::Remote(err)) => assert_eq!(err.message, "not allowed"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("root").on(
            &MessageListener::respondable(|_payload, _sender, _responder| async move { Ok(()) }),
            None,
        );

        let options_for_request = SendOptions::to("options").with_timeout(Duration::from_millis(20));
        let outcome = within(background.scope("root").request(json!(1), options_for_request)).await;
        assert!(matches!(outcome, Err(BusError::Timeout { .. })));
        assert_eq!(background.correlator().pending_count(), 0);
    }

    /// A failing or panicking plain listener is logged and skipped; the
    /// rest of the scope still sees the message.
    #[tokio::test]
    async fn test_failing_plain_listeners_do_not_block_others() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        let hits = seen::<u8>();
        let failing = {
            let hits = hits.clone();
            MessageListener::plain(move |_payload, _sender| {
                hits.lock().push(1);
                Err(ListenerError::new("listener refused"))
            })
        };
        let panicking = {
            let hits = hits.clone();
            MessageListener::plain(move |_payload, _sender| {
                hits.lock().push(2);
                if true {
                    panic!("listener blew up");
                }
                Ok(())
            })
        };
        let healthy = {
            let hits = hits.clone();
            MessageListener::plain(move |_payload, _sender| {
                hits.lock().push(3);
                Ok(())
            })
        };
        let root = options.scope("root");
        for listener in [&failing, &panicking, &healthy] {
            assert!(root.on(listener, None));
        }

        let sender = background.scope("root");
        for n in 0..2 {
            within(sender.send(json!(n), SendOptions::to("options"))).await.unwrap();
        }

        assert_eq!(*hits.lock(), vec![1, 2, 3, 1, 2, 3]);
        assert!(root.is_listening(&failing));
        assert!(root.is_listening(&panicking));
    }

    // =============================================================================
    // SELECTION
    // =============================================================================

    #[tokio::test]
    async fn test_duplicate_registration_delivers_once() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        let payloads = seen::<Value>();
        let listener = {
            let payloads = payloads.clone();
            MessageListener::plain(move |payload, _sender| {
                payloads.lock().push(payload);
                Ok(())
            })
        };
        let root = options.scope("root");
        assert!(root.on(&listener, None));
        assert!(!root.on(&listener, None));
        assert!(!root.on(&listener.clone(), None));

        within(background.scope("root").send(json!("ping"), SendOptions::to("options")))
            .await
            .unwrap();
        settle().await;

        assert_eq!(*payloads.lock(), vec![json!("ping")]);

        assert!(root.off(&listener));
        assert!(!root.off(&listener));
        within(background.scope("root").send(json!("again"), SendOptions::to("options")))
            .await
            .unwrap();
        assert_eq!(payloads.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_requests_and_notifications_reach_separate_listeners() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        let notified = seen::<Value>();
        let requested = seen::<Value>();
        let plain = {
            let notified = notified.clone();
            MessageListener::plain(move |payload, _sender| {
                notified.lock().push(payload);
                Ok(())
            })
        };
        let respondable = {
            let requested = requested.clone();
            MessageListener::respondable(move |payload: Value, _sender, responder: Responder| {
                requested.lock().push(payload.clone());
                async move {
                    responder.respond(payload)?;
                    Ok::<(), ListenerError>(())
                }
            })
        };
        options.scope("root").on(&plain, None);
        options.scope("root").on(&respondable, None);

        let root = background.scope("root");
        within(root.send(json!("notify"), SendOptions::to("options"))).await.unwrap();
        let echoed = within(root.request(json!("request"), SendOptions::to("options")))
            .await
            .unwrap();

        assert_eq!(echoed, json!("request"));
        assert_eq!(*notified.lock(), vec![json!("notify")]);
        assert_eq!(*requested.lock(), vec![json!("request")]);
    }
}
