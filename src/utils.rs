//! Process and container identity helpers shared across the codebase

use std::path::Path;

/// Whether a process with this pid currently exists in our pid namespace.
pub fn pid_exists(pid: u32) -> bool {
    pid > 0 && Path::new(&format!("/proc/{pid}")).exists()
}

/// Text following `marker` up to the next `/` or newline, if non-empty.
fn segment_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find(['/', '\n']).unwrap_or(rest.len());
    Some(&rest[..end]).filter(|s| !s.is_empty())
}

/// Container id from `/proc/self/cgroup` contents (`.../docker/<id>`).
pub fn container_id_from_cgroup(cgroup: &str) -> Option<String> {
    segment_after(cgroup, "/docker/").map(str::to_string)
}

/// Container id from `/proc/self/mountinfo` contents (`.../containers/<id>/...`).
pub fn container_id_from_mountinfo(mountinfo: &str) -> Option<String> {
    segment_after(mountinfo, "/containers/").map(str::to_string)
}

/// Replace the current process with `argv`; only returns on failure.
#[cfg(unix)]
pub fn exec_command(argv: &[String]) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let Some((program, args)) = argv.split_first() else {
        return std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command");
    };
    std::process::Command::new(program).args(args).exec()
}

/// Run `argv` to completion and exit with its status.
#[cfg(not(unix))]
pub fn exec_command(argv: &[String]) -> std::io::Error {
    let Some((program, args)) = argv.split_first() else {
        return std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command");
    };
    match std::process::Command::new(program).args(args).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cgroup_v1_id() {
        let cgroup = "12:pids:/docker/abc123def\n11:cpu:/docker/abc123def\n";
        assert_eq!(container_id_from_cgroup(cgroup).as_deref(), Some("abc123def"));
    }

    #[test]
    fn test_cgroup_v2_has_no_id() {
        assert_eq!(container_id_from_cgroup("0::/\n"), None);
    }

    #[test]
    fn test_mountinfo_id() {
        let mountinfo = "1 2 0:1 /var/lib/docker/containers/feedbeef/resolv.conf /etc/resolv.conf rw\n";
        assert_eq!(
            container_id_from_mountinfo(mountinfo).as_deref(),
            Some("feedbeef")
        );
    }

    #[test]
    fn test_exec_reports_missing_program() {
        let err = exec_command(&["/nonexistent/conlink-test-program".to_string()]);
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        let err = exec_command(&[]);
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_own_pid_exists() {
        assert!(pid_exists(std::process::id()));
        assert!(!pid_exists(0));
    }
}
