//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（MockTransport，无需真实 Bot API）
//! - 会话历史与统计的跨 crate 验证

#[cfg(test)]
mod contract_tests {
    use contracts::{OutcomeCounts, OutcomeKind, Recipient, RunTermination};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_success_rate_ignores_skipped() {
        let mut counts = OutcomeCounts::default();
        counts.record(OutcomeKind::Sent);
        counts.record(OutcomeKind::Forbidden);
        counts.record(OutcomeKind::Skipped);
        assert!((counts.success_rate() - 50.0).abs() < 1e-10);

        assert_eq!(OutcomeCounts::default().success_rate(), 0.0);
    }

    #[test]
    fn test_termination_labels() {
        assert_eq!(RunTermination::Completed.as_str(), "completed");
        assert_eq!(RunTermination::Cancelled.as_str(), "cancelled");
        assert!("-100123".parse::<Recipient>().is_ok());
        assert!("@channel".parse::<Recipient>().is_err());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{load_recipients, ConfigLoader};
    use contracts::{
        DispatchSettings, MessagePayload, OutcomeKind, Recipient, RunTermination,
        TransportFailure,
    };
    use dispatcher::{
        classify_failure, BroadcastSession, DispatchError, Dispatcher, MockResponse,
        MockTransport, HISTORY_CAPACITY,
    };
    use observability::DeliveryStatsAggregator;

    fn recipients(ids: &[i64]) -> Vec<Recipient> {
        ids.iter().copied().map(Recipient::new).collect()
    }

    fn payload() -> Arc<MessagePayload> {
        Arc::new(MessagePayload::text("<b>Release</b> is out"))
    }

    fn settings(concurrency: usize, delay_ms: u64) -> DispatchSettings {
        DispatchSettings::new(concurrency, Duration::from_millis(delay_ms), false)
    }

    /// End-to-end: recipient file -> config -> Dispatcher -> report
    ///
    /// 验证完整的数据流：
    /// 1. 从文件加载收件人与配置
    /// 2. Dispatcher 分批发送
    /// 3. 报告按收件人顺序汇总
    #[tokio::test]
    async fn test_e2e_file_to_report() {
        let mut ids = tempfile::NamedTempFile::new().unwrap();
        writeln!(ids, "# subscribers\n101\n102\n\n103\n102").unwrap();
        let list = load_recipients(ids.path()).unwrap();
        assert_eq!(list.duplicates, 1);

        let config = ConfigLoader::load_from_str(
            "[dispatch]\nconcurrency = 2\nbatch_delay_secs = 0.05\n",
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let transport = MockTransport::new();
        let dispatcher = Dispatcher::new(transport);
        let report = dispatcher
            .run(payload(), list.valid, config.dispatch)
            .await
            .unwrap();

        assert_eq!(report.summary.termination, RunTermination::Completed);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.sent(), 3);
        assert!((report.summary.success_rate - 100.0).abs() < 1e-10);
        assert!(report.summary.unprocessed.is_empty());

        let order: Vec<i64> = report.outcomes.iter().map(|o| o.recipient.id()).collect();
        assert_eq!(order, vec![101, 102, 103]);
        let batches: Vec<usize> = report.outcomes.iter().map(|o| o.batch).collect();
        assert_eq!(batches, vec![0, 0, 1]);
        assert_eq!(dispatcher.transport().call_count(), 3);
    }

    #[tokio::test]
    async fn test_blocked_recipient_halves_success_rate() {
        let transport = MockTransport::new().with_response(
            Recipient::new(2),
            MockResponse::Fail(TransportFailure::api(
                403,
                "Forbidden: bot was blocked by the user",
            )),
        );
        let report = Dispatcher::new(transport)
            .run(payload(), recipients(&[1, 2]), settings(2, 0))
            .await
            .unwrap();

        assert_eq!(report.summary.counts.sent, 1);
        assert_eq!(report.summary.counts.forbidden, 1);
        assert!((report.summary.success_rate - 50.0).abs() < 1e-10);

        let blocked = report.outcome_at(1).unwrap();
        assert_eq!(blocked.kind, OutcomeKind::Forbidden);
        assert!(blocked.detail.starts_with("forbidden:"));
        assert!(blocked.message_id.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_transport() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = Dispatcher::from_arc(Arc::clone(&transport));
        let mut dry = settings(2, 0);
        dry.dry_run = true;
        dry.dry_run_delay_ms = 1;

        let report = dispatcher
            .run(payload(), recipients(&[1, 2, 3, 4, 5]), dry)
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 0);
        assert!(report.summary.dry_run);
        assert_eq!(report.summary.counts.skipped, 5);
        assert_eq!(report.summary.success_rate, 0.0);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.kind == OutcomeKind::Skipped));
    }

    #[tokio::test]
    async fn test_cancel_after_first_batch() {
        let transport = MockTransport::new();
        let dispatcher = Dispatcher::new(transport);
        let mut handle = dispatcher
            .start(payload(), recipients(&[1, 2, 3]), settings(1, 300))
            .unwrap();

        let first = handle.next_update().await.unwrap();
        assert_eq!(first.outcome.batch, 0);
        handle.cancel();

        let report = handle.wait().await;
        assert_eq!(report.summary.termination, RunTermination::Cancelled);
        assert_eq!(report.summary.sent(), 1);
        assert_eq!(report.summary.unprocessed, recipients(&[2, 3]));
        assert_eq!(dispatcher.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn test_batches_start_after_previous_finish() {
        let transport = MockTransport::new().with_delay(Duration::from_millis(20));
        let dispatcher = Dispatcher::new(transport);
        let report = dispatcher
            .run(payload(), recipients(&[1, 2, 3, 4, 5]), settings(2, 50))
            .await
            .unwrap();

        let batch_of: HashMap<Recipient, usize> = report
            .outcomes
            .iter()
            .map(|o| (o.recipient, o.batch))
            .collect();
        let calls = dispatcher.transport().calls();
        assert_eq!(calls.len(), 5);

        for later in &calls {
            for earlier in &calls {
                if batch_of[&earlier.recipient] < batch_of[&later.recipient] {
                    assert!(
                        later.started >= earlier.finished + Duration::from_millis(50),
                        "batch {} started before batch {} finished plus the delay",
                        batch_of[&later.recipient],
                        batch_of[&earlier.recipient]
                    );
                }
            }
        }
        assert!(dispatcher.transport().peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_peak_in_flight_respects_bound() {
        let transport = MockTransport::new().with_delay(Duration::from_millis(10));
        let dispatcher = Dispatcher::new(transport);
        let ids: Vec<i64> = (1..=24).collect();
        let report = dispatcher
            .run(payload(), recipients(&ids), settings(5, 0))
            .await
            .unwrap();

        assert_eq!(report.summary.sent(), 24);
        let peak = dispatcher.transport().peak_in_flight();
        assert!(peak >= 1 && peak <= 5, "peak in flight was {peak}");
    }

    #[tokio::test]
    async fn test_slow_send_times_out_as_network_error() {
        let transport = MockTransport::new()
            .with_delay_for(Recipient::new(2), Duration::from_secs(5));
        let mut timed = settings(2, 0);
        timed.send_timeout_secs = 1;

        let report = Dispatcher::new(transport)
            .run(payload(), recipients(&[1, 2]), timed)
            .await
            .unwrap();

        assert_eq!(report.outcome_at(0).unwrap().kind, OutcomeKind::Sent);
        let slow = report.outcome_at(1).unwrap();
        assert_eq!(slow.kind, OutcomeKind::NetworkError);
        assert!(slow.detail.starts_with("network_error:"));
        assert_eq!(report.summary.termination, RunTermination::Completed);
    }

    #[tokio::test]
    async fn test_panicking_send_faults_the_run() {
        let transport =
            MockTransport::new().with_response(Recipient::new(2), MockResponse::Panic);
        let report = Dispatcher::new(transport)
            .run(payload(), recipients(&[1, 2, 3, 4]), settings(2, 0))
            .await
            .unwrap();

        assert!(matches!(
            report.summary.termination,
            RunTermination::Faulted { .. }
        ));
        assert!(report.summary.unprocessed.contains(&Recipient::new(2)));
        assert!(report.summary.unprocessed.contains(&Recipient::new(3)));
        assert!(report.summary.unprocessed.contains(&Recipient::new(4)));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_before_any_send() {
        let dispatcher = Dispatcher::new(MockTransport::new());
        for concurrency in [0, 51] {
            let err = dispatcher
                .start(payload(), recipients(&[1]), settings(concurrency, 0))
                .unwrap_err();
            assert!(err.is_config(), "unexpected error: {err}");
        }

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dispatch]\nconcurrency = 64").unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(dispatcher.transport().call_count(), 0);
    }

    #[tokio::test]
    async fn test_session_rejects_overlapping_runs() {
        let session = BroadcastSession::new();
        let dispatcher =
            Dispatcher::new(MockTransport::new().with_delay(Duration::from_millis(100)));

        let run = session
            .start(&dispatcher, payload(), recipients(&[1, 2]), settings(1, 0))
            .unwrap();
        assert!(session.is_running());

        let second = session.start(&dispatcher, payload(), recipients(&[3]), settings(1, 0));
        assert!(matches!(second, Err(DispatchError::RunInProgress)));

        let report = run.wait().await;
        assert!(report.summary.is_complete());
        assert!(!session.is_running());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_history_keeps_last_ten_runs() {
        let session = BroadcastSession::new();
        let dispatcher = Dispatcher::new(MockTransport::new());

        for run_no in 1..=(HISTORY_CAPACITY as i64 + 1) {
            let run = session
                .start(&dispatcher, payload(), recipients(&[run_no]), settings(1, 0))
                .unwrap();
            run.wait().await;
        }

        let history = session.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        let stats = session.stats();
        assert_eq!(stats.broadcast_count, HISTORY_CAPACITY as u64 + 1);
        assert_eq!(stats.total_sent, HISTORY_CAPACITY as u64 + 1);
        assert!(stats.last_broadcast_at.is_some());

        let exported = session.export_history();
        assert_eq!(exported.len(), HISTORY_CAPACITY);
        assert!(exported.iter().all(|r| r.termination == "completed"));
    }

    #[tokio::test]
    async fn test_delivery_stats_track_batches() {
        let transport = MockTransport::new().with_response(
            Recipient::new(3),
            MockResponse::Fail(TransportFailure::connect("connection reset")),
        );
        let report = Dispatcher::new(transport)
            .run(payload(), recipients(&[1, 2, 3]), settings(2, 0))
            .await
            .unwrap();

        let mut stats = DeliveryStatsAggregator::new();
        for outcome in &report.outcomes {
            stats.update(outcome);
        }
        let summary = stats.summary();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.counts.sent, 2);
        assert_eq!(summary.counts.network_error, 1);
        assert_eq!(summary.latency_ms.count, 3);
    }

    #[test]
    fn test_classification_is_pure() {
        let failure = TransportFailure::api(400, "Bad Request: chat not found");
        let first = classify_failure(&failure);
        let second = classify_failure(&failure);
        assert_eq!(first, second);
        assert_eq!(first, OutcomeKind::Forbidden);
    }
}
