#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::HelperError;
    use crate::wait::{Condition, interface_has_route, wait_all, wait_for};

    const ROUTES: &str = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
                          eth0\t00000000\t0100A8C0\t0003\t0\t0\t0\t00000000\t0\t0\t0\n\
                          eth10\t0000A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0\n";

    #[test]
    fn test_route_table_matches_whole_interface_name() {
        assert!(interface_has_route(ROUTES, "eth0"));
        assert!(interface_has_route(ROUTES, "eth10"));
        assert!(!interface_has_route(ROUTES, "eth1"));
        assert!(!interface_has_route(ROUTES, "Iface"));
        assert!(!interface_has_route("", "eth0"));
    }

    #[test]
    fn test_tcp_address_parsing() {
        assert_eq!(
            Condition::tcp("db:5432").unwrap(),
            Condition::Tcp {
                host: "db".to_string(),
                port: 5432
            }
        );
        for bad in ["db", ":80", "db:http", "db:70000"] {
            assert!(matches!(
                Condition::tcp(bad),
                Err(HelperError::TcpAddress(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_file_condition_waits_for_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ready");
        let condition = Condition::File(path.clone());
        assert!(!condition.is_met().await.unwrap());

        let creator = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(path, "").unwrap();
        });
        wait_for(&condition, Duration::from_millis(10)).await.unwrap();
        creator.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_condition() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let condition = Condition::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };
        assert!(condition.is_met().await.unwrap());

        drop(listener);
        assert!(!condition.is_met().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_condition_uses_exit_status() {
        assert!(Condition::Command("true".to_string()).is_met().await.unwrap());
        assert!(!Condition::Command("exit 3".to_string()).is_met().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_all_checks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let conditions = vec![
            Condition::Command(format!("touch '{}'", marker.display())),
            Condition::File(marker.clone()),
        ];
        wait_all(&conditions, Duration::from_millis(10)).await.unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn test_condition_display() {
        assert_eq!(
            Condition::Routed("eth0".to_string()).to_string(),
            "IP/routing on interface 'eth0'"
        );
        assert_eq!(
            Condition::Tcp {
                host: "db".to_string(),
                port: 1
            }
            .to_string(),
            "TCP connection to db:1"
        );
    }
}
