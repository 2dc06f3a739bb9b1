use super::*;

#[tokio::test]
async fn test_create_task_assigns_increasing_ids() {
    let engine = create_test_engine(Arc::new(ScriptedTransport::ok()), 1);
    let mut rx = engine.subscribe();

    let first = engine
        .create_task("https://example.com/a", TaskOptions::default())
        .await
        .unwrap();
    let second = engine
        .create_task("https://example.com/b", TaskOptions::default())
        .await
        .unwrap();
    assert!(second > first);

    match rx.recv().await.unwrap() {
        Event::Created { id, url } => {
            assert_eq!(id, first);
            assert_eq!(url, "https://example.com/a");
        }
        other => panic!("expected Created, got {:?}", other),
    }

    let task = engine.get_task(first).await.unwrap();
    assert_eq!(task.status, Status::Pending);
    assert_eq!(task.progress, 0);
    assert!(task.result.is_none());
    assert!(task.started_at.is_none());

    let listed: Vec<TaskId> = engine.list_tasks().await.iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![first, second]);
}

#[tokio::test]
async fn test_create_task_rejects_invalid_input() {
    let engine = create_test_engine(Arc::new(ScriptedTransport::ok()), 1);

    let result = engine.create_task("not a url", TaskOptions::default()).await;
    assert!(matches!(result, Err(Error::InvalidUrl(_))), "got {result:?}");

    let result = engine
        .create_task("ftp://example.com/file", TaskOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Config { .. })), "got {result:?}");

    let result = engine
        .create_task(
            "https://example.com",
            TaskOptions {
                timeout: Duration::ZERO,
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Config { .. })), "got {result:?}");

    let result = engine
        .create_task(
            "https://example.com",
            TaskOptions {
                proxy: Some("socks5://127.0.0.1:1080".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(
        matches!(&result, Err(Error::Config { key: Some(key), .. }) if key == "proxy"),
        "got {result:?}"
    );

    assert!(engine.list_tasks().await.is_empty());
}

#[tokio::test]
async fn test_update_config_of_idle_task() {
    let engine = create_test_engine(Arc::new(ScriptedTransport::ok()), 1);
    let id = engine
        .create_task("https://example.com/", TaskOptions::default())
        .await
        .unwrap();

    let updated = TaskConfig::new("https://example.com/other", retrying(4));
    assert!(engine.update_task_config(id, updated.clone()).await);
    assert_eq!(engine.get_task(id).await.unwrap().config, updated);

    let invalid = TaskConfig::new("mailto:someone@example.com", TaskOptions::default());
    assert!(!engine.update_task_config(id, invalid).await);
    assert_eq!(engine.get_task(id).await.unwrap().config, updated);

    assert!(
        !engine
            .update_task_config(TaskId(404), TaskConfig::new("https://example.com/", TaskOptions::default()))
            .await
    );
}

#[tokio::test]
async fn test_update_config_rejected_while_active() {
    let transport = Arc::new(ScriptedTransport::ok().with_delay(Duration::from_millis(150)));
    let engine = create_test_engine(transport, 1);

    let id = start_one(&engine, TaskOptions::default()).await;
    let replacement = TaskConfig::new("https://example.com/new", TaskOptions::default());
    assert!(!engine.update_task_config(id, replacement.clone()).await);

    wait_until_inactive(&engine, id).await;
    assert!(engine.update_task_config(id, replacement).await);
}

#[tokio::test]
async fn test_duplicate_copies_configuration() {
    let transport = Arc::new(ScriptedTransport::ok());
    let engine = create_test_engine(transport, 1);
    let mut rx = engine.subscribe();

    let mut options = retrying(2);
    options.headers.insert("Accept".into(), "text/html".into());
    let id = start_one(&engine, options).await;
    collect_until_finished(&mut rx, id).await;

    let copy = engine.duplicate_task(id).await.unwrap();
    assert_ne!(copy, id);

    let original = engine.get_task(id).await.unwrap();
    let duplicate = engine.get_task(copy).await.unwrap();
    assert_eq!(duplicate.config, original.config);
    assert_eq!(duplicate.status, Status::Pending);
    assert!(duplicate.result.is_none());
    assert_eq!(original.status, Status::Done);

    assert!(engine.duplicate_task(TaskId(12345)).await.is_none());
}

#[tokio::test]
async fn test_remove_idle_task() {
    let engine = create_test_engine(Arc::new(ScriptedTransport::ok()), 1);
    let id = engine
        .create_task("https://example.com/", TaskOptions::default())
        .await
        .unwrap();
    let mut rx = engine.subscribe();

    assert!(engine.remove_task(id).await);
    assert!(matches!(rx.recv().await.unwrap(), Event::Removed { id: removed } if removed == id));
    assert!(engine.get_task(id).await.is_none());
    assert!(!engine.remove_task(id).await);
}

#[tokio::test]
async fn test_remove_running_task_stops_runner() {
    let transport = Arc::new(ScriptedTransport::ok().with_delay(Duration::from_millis(100)));
    let engine = create_test_engine(transport.clone(), 1);
    let mut rx = engine.subscribe();

    let id = start_one(&engine, TaskOptions::default()).await;
    // Remove once the request is in flight
    let in_flight = async {
        loop {
            if let Event::Log { message, .. } = rx.recv().await.unwrap() {
                if message.starts_with("Starting") {
                    return;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .unwrap();
    assert!(engine.remove_task(id).await);
    assert!(engine.get_task(id).await.is_none());

    // The runner still winds down and announces the end of its run, but says
    // nothing else about the deleted task
    let events = collect_until_finished(&mut rx, id).await;
    let removed_at = events
        .iter()
        .position(|e| matches!(e, Event::Removed { .. }))
        .unwrap();
    let after_removal = &events[removed_at + 1..];
    assert_eq!(after_removal.len(), 1, "got {:?}", after_removal);
    assert!(matches!(after_removal[0], Event::Finished { .. }));
    assert!(!engine.is_active(id).await);
    assert!(engine.get_task(id).await.is_none());

    // Its slot is reusable
    let next = start_one(&engine, TaskOptions::default()).await;
    collect_until_finished(&mut rx, next).await;
    assert_eq!(engine.get_task(next).await.unwrap().status, Status::Done);
}

#[tokio::test]
async fn test_records_export() {
    let engine = create_test_engine(Arc::new(ScriptedTransport::ok()), 2);
    let mut rx = engine.subscribe();

    let done = start_one(&engine, TaskOptions::default()).await;
    collect_until_finished(&mut rx, done).await;
    let pending = engine
        .create_task("https://example.com/later", TaskOptions::default())
        .await
        .unwrap();

    let records = engine.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, done);
    assert_eq!(records[0].status, Status::Done);
    assert_eq!(records[1].id, pending);
    assert_eq!(records[1].status, Status::Pending);

    let single = engine.record(done).await.unwrap();
    assert_eq!(single, records[0]);
    assert!(engine.record(TaskId(0)).await.is_none());
}
