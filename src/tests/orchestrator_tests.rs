#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::{ConlinkError, RuntimeError};
    use crate::orchestrator::Orchestrator;
    use crate::runtime::LabelFilter;
    use crate::test_helpers::{
        Call, CallLog, FakeRuntime, PAIR_NETWORK, RecordingDriver, network_from_yaml,
    };

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    fn setup(yaml: &str) -> (Orchestrator<FakeRuntime, RecordingDriver>, FakeRuntime, CallLog) {
        let log = CallLog::default();
        let runtime = FakeRuntime::new(log.clone());
        let driver = RecordingDriver::new(log.clone());
        let config = network_from_yaml(yaml);
        (Orchestrator::new(runtime.clone(), driver, &config), runtime, log)
    }

    async fn run(orchestrator: &mut Orchestrator<FakeRuntime, RecordingDriver>) -> crate::Result<()> {
        orchestrator.run(&[], &LabelFilter::default(), None).await
    }

    #[tokio::test]
    async fn test_link_waits_for_both_endpoints() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("idb", "/b", 20);
        runtime.add_container("ida", "/a", 10);
        runtime.set_running("idb");
        // a is not running yet; only its start event arrives later.
        runtime.emit("ida");

        run(&mut orch).await.unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::Veth(strings(&["eth0", "eth0", "10", "20"])),
                Call::Exec("ida".to_string(), "echo hi".to_string()),
            ]
        );
        let a = orch.state().container("/a").unwrap();
        assert!(a.commands_completed);
        assert!(orch.state().container("/b").unwrap().commands_completed);
    }

    #[tokio::test]
    async fn test_start_order_does_not_matter() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.start("ida");
        runtime.start("idb");

        run(&mut orch).await.unwrap();

        assert_eq!(log.veth_calls(), vec![strings(&["eth0", "eth0", "20", "10"])]);
        assert_eq!(log.exec_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_events_do_not_repeat_side_effects() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        // Running at listing time and also seen on the event stream.
        runtime.start("ida");
        runtime.emit("ida");
        runtime.start("idb");
        runtime.emit("idb");

        run(&mut orch).await.unwrap();

        assert_eq!(log.veth_calls().len(), 1);
        assert_eq!(log.exec_calls().len(), 1);
        let a = orch.state().container("/a").unwrap();
        assert_eq!((a.connected, a.unconnected), (1, 0));
    }

    #[tokio::test]
    async fn test_commands_wait_for_all_links() {
        let (mut orch, runtime, log) = setup(
            r#"
links:
  - {left: {container: a, intf: e0}, right: {container: b, intf: e0}}
  - {left: {container: b, intf: e1}, right: {container: c, intf: e0}}
commands:
  - {container: b, command: [first, second]}
"#,
        );
        runtime.add_container("ida", "/a", 1);
        runtime.add_container("idb", "/b", 2);
        runtime.add_container("idc", "/c", 3);
        runtime.set_running("ida");
        runtime.set_running("idb");
        runtime.start("idc");

        run(&mut orch).await.unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::Veth(strings(&["e0", "e0", "2", "1"])),
                Call::Veth(strings(&["e0", "e1", "3", "2"])),
                Call::Exec("idb".to_string(), "first".to_string()),
                Call::Exec("idb".to_string(), "second".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_linkless_container_completes_on_start() {
        let (mut orch, runtime, log) = setup(
            r#"
links:
  - {left: {container: a, intf: e0}, right: {container: b, intf: e0}}
commands:
  - {container: solo, command: "echo solo"}
"#,
        );
        runtime.add_container("id0", "/solo", 5);
        runtime.add_container("ida", "/a", 1);
        runtime.add_container("idb", "/b", 2);
        runtime.set_running("id0");
        runtime.start("ida");
        runtime.start("idb");

        run(&mut orch).await.unwrap();

        assert_eq!(
            log.calls()[0],
            Call::Exec("id0".to_string(), "echo solo".to_string())
        );
        assert_eq!(log.veth_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_interfaces_move_before_commands() {
        let (mut orch, runtime, log) = setup(
            r#"
interfaces:
  - {container: a, host-intf: enp1, intf: up0, type: macvlan, mode: bridge}
commands:
  - {container: a, command: "ip link"}
"#,
        );
        runtime.add_container("ida", "/a", 77);
        runtime.set_running("ida");

        run(&mut orch).await.unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::Move(
                    "/a".to_string(),
                    strings(&["macvlan", "enp1", "up0", "1", "77", "--mode", "bridge"])
                ),
                Call::Exec("ida".to_string(), "ip link".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_tunnels_are_created_first() {
        let config = network_from_yaml(
            r#"
links:
  - {left: {container: a, intf: e0}, right: {container: a, intf: e1}}
tunnels:
  - {type: geneve, intf: gnv0, vni: 5, remote: 10.0.0.9}
"#,
        );
        let log = CallLog::default();
        let runtime = FakeRuntime::new(log.clone());
        runtime.add_container("ida", "/a", 3);
        runtime.set_running("ida");
        let mut orch = Orchestrator::new(runtime, RecordingDriver::new(log.clone()), &config);

        orch.run(&config.tunnels, &LabelFilter::default(), None)
            .await
            .unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::Tunnel(strings(&["gnv0", "geneve", "5", "10.0.0.9"])),
                Call::Veth(strings(&["e0", "e1", "3", "3"])),
            ]
        );
    }

    #[tokio::test]
    async fn test_gone_and_untracked_containers_are_skipped() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("idx", "/unrelated", 9);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.set_running("idb");
        runtime.start("idx");
        runtime.emit("vanished");
        runtime.emit("ida");

        run(&mut orch).await.unwrap();

        assert_eq!(log.veth_calls().len(), 1);
        assert!(!orch.state().is_tracked("/unrelated"));
    }

    #[tokio::test]
    async fn test_dead_main_pid_falls_back_to_process_table() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.kill_pid(10);
        runtime.set_top("ida", &[10, 11, 12]);
        runtime.start("ida");
        runtime.start("idb");

        run(&mut orch).await.unwrap();

        assert_eq!(orch.state().container("/a").unwrap().pid, Some(11));
        assert_eq!(log.veth_calls(), vec![strings(&["eth0", "eth0", "20", "11"])]);
    }

    #[tokio::test]
    async fn test_container_without_pid_is_skipped() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.kill_pid(10);
        runtime.start("ida");
        runtime.start("idb");
        runtime.close_after_queue();

        let err = run(&mut orch).await.unwrap_err();

        assert!(matches!(err, ConlinkError::Runtime(RuntimeError::StreamClosed)));
        assert!(log.calls().is_empty());
        assert_eq!(orch.state().container("/a").unwrap().pid, None);
        assert_eq!(orch.state().container("/b").unwrap().pid, Some(20));
    }

    #[tokio::test]
    async fn test_driver_failure_is_fatal() {
        let log = CallLog::default();
        let runtime = FakeRuntime::new(log.clone());
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.start("ida");
        runtime.start("idb");
        let config = network_from_yaml(PAIR_NETWORK);
        let mut orch = Orchestrator::new(runtime, RecordingDriver::failing(log.clone()), &config);

        let err = orch
            .run(&[], &LabelFilter::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConlinkError::Driver(_)));
        assert!(!orch.state().is_link_connected(0));
        assert!(log.exec_calls().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_api_error_is_fatal() {
        let (mut orch, runtime, _log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.start("ida");
        runtime.fail_inspect("500 internal error");

        let err = run(&mut orch).await.unwrap_err();
        assert!(matches!(err, ConlinkError::Runtime(RuntimeError::Api(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout_names_unconnected_containers() {
        let (mut orch, runtime, _log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.start("ida");

        let err = orch
            .run(&[], &LabelFilter::default(), Some(Duration::from_secs(30)))
            .await
            .unwrap_err();

        match err {
            ConlinkError::Timeout { unconnected } => {
                assert_eq!(unconnected, vec!["/a", "/b"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_after_subscription_are_processed() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.set_running("ida");

        let starter = runtime.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            starter.start("idb");
        });

        run(&mut orch).await.unwrap();
        handle.await.unwrap();

        assert_eq!(log.veth_calls(), vec![strings(&["eth0", "eth0", "20", "10"])]);
    }

    #[tokio::test]
    async fn test_start_between_subscribe_and_listing_is_seen_once() {
        let (mut orch, runtime, log) = setup(PAIR_NETWORK);
        runtime.add_container("ida", "/a", 10);
        runtime.add_container("idb", "/b", 20);
        runtime.set_running("ida");
        // b starts once the subscription is live: it shows up both as an
        // event and in the listing.
        runtime.start_on_subscribe("idb");
        runtime.close_after_queue();

        run(&mut orch).await.unwrap();

        assert_eq!(log.veth_calls(), vec![strings(&["eth0", "eth0", "20", "10"])]);
        assert_eq!(log.exec_calls(), vec![("ida".to_string(), "echo hi".to_string())]);
        assert!(orch.state().all_connected());
    }

    #[tokio::test]
    async fn test_subscription_failure_stops_before_any_wiring() {
        let config = network_from_yaml(
            r#"
links:
  - {left: {container: a, intf: e0}, right: {container: a, intf: e1}}
tunnels:
  - {type: vxlan, intf: vx0, vni: 5, remote: 10.0.0.9}
"#,
        );
        let log = CallLog::default();
        let runtime = FakeRuntime::new(log.clone());
        runtime.add_container("ida", "/a", 3);
        runtime.set_running("ida");
        runtime.fail_subscribe("cannot connect to the docker daemon");
        let mut orch = Orchestrator::new(runtime, RecordingDriver::new(log.clone()), &config);

        let err = orch
            .run(&config.tunnels, &LabelFilter::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ConlinkError::Runtime(RuntimeError::Api(_))));
        assert!(log.calls().is_empty());
    }
}
