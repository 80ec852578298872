#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use crate::copy::{copy_tree, render_template};
    use crate::error::HelperError;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_known_placeholders_are_replaced() {
        let (text, replaced) = render_template(
            "listen {{ADDR}}:{{PORT}} # {{UNSET}} {{ SPACED }} {{ADDR}}",
            &vars(&[("ADDR", "10.0.0.1"), ("PORT", "80")]),
        )
        .unwrap();
        assert_eq!(text, "listen 10.0.0.1:80 # {{UNSET}} {{ SPACED }} 10.0.0.1");
        assert_eq!(replaced, vec!["ADDR", "PORT", "ADDR"]);
    }

    #[test]
    fn test_copy_tree_templates_and_nests() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("etc/app")).unwrap();
        fs::write(src.path().join("etc/app/conf"), "ip={{IP}}\n").unwrap();
        fs::write(src.path().join("blob"), [0xff, 0xfe, b'{', b'{']).unwrap();

        let written = copy_tree(src.path(), dst.path(), Some(&vars(&[("IP", "192.168.0.2")])))
            .unwrap();

        assert_eq!(
            written,
            vec![dst.path().join("blob"), dst.path().join("etc/app/conf")]
        );
        assert_eq!(
            fs::read_to_string(dst.path().join("etc/app/conf")).unwrap(),
            "ip=192.168.0.2\n"
        );
        assert_eq!(fs::read(dst.path().join("blob")).unwrap(), vec![0xff, 0xfe, b'{', b'{']);
    }

    #[test]
    fn test_copy_without_template_is_verbatim() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("conf"), "ip={{IP}}\n").unwrap();

        copy_tree::<HashMap<String, String>>(src.path(), dst.path(), None).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join("conf")).unwrap(), "ip={{IP}}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let script = src.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        copy_tree::<HashMap<String, String>>(src.path(), dst.path(), None).unwrap();

        let mode = fs::metadata(dst.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_directories_are_required() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "").unwrap();

        let err = copy_tree::<HashMap<String, String>>(&file, dir.path(), None).unwrap_err();
        assert!(matches!(err, HelperError::NotADirectory(path) if path == file));
    }
}
