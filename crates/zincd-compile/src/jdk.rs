//! Target JDK probing and `-release` flag adjustment.
//!
//! Compiling against a javac newer or older than the server's own JVM can
//! silently produce bytecode the runtime rejects. Before every compile the
//! orchestrator probes the target JDK behind the configured javac binary
//! and, when the server's JVM is newer, pins the Scala compiler to the
//! target with `-release`. All probing is best-effort: any read or parse
//! failure leaves the options exactly as the user wrote them.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Flags that already pin the output version; their presence disables the
/// adjustment entirely.
const RELEASE_FLAGS: [&str; 3] = ["-release", "--release", "-java-output-version"];

/// Reads the version string of the JDK at `java_home`.
///
/// Looks for a `JAVA_VERSION` entry in the `<home>/release` properties
/// file. When the file is missing or does not carry the entry, the
/// presence of `<home>/lib/rt.jar` identifies a pre-9 JDK and yields
/// `1.8`.
#[must_use]
pub fn version_from_java_home(java_home: &Path) -> Option<String> {
    if let Ok(contents) = std::fs::read_to_string(java_home.join("release")) {
        for line in contents.lines() {
            if let Some(value) = line.strip_prefix("JAVA_VERSION=") {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    if java_home.join("lib").join("rt.jar").is_file() {
        return Some("1.8".to_string());
    }
    None
}

/// Parses a JDK version string into its major version.
///
/// `1.8`-style versions map to their minor component (`1.8` is 8); anything
/// else is read as the leading digits (`17.0.2` is 17).
#[must_use]
pub fn parse_major_version(version: &str) -> Option<u32> {
    let digits = |s: &str| -> Option<u32> {
        let leading: String = s.chars().take_while(char::is_ascii_digit).collect();
        leading.parse().ok()
    };
    match version.strip_prefix("1.") {
        Some(rest) => digits(rest),
        None => digits(version),
    }
}

/// Adjusts `scalac_options` for the JDK behind `javac_binary`.
///
/// Leaves the options untouched when a release flag is already present,
/// when no javac binary is configured, when the javac belongs to the
/// server's own JDK, or when the target version cannot be determined. When
/// the server's JVM is newer than the target, appends `-release <n>`; when
/// it is older, only warns that the runtime and build JDK may diverge.
#[must_use]
pub fn adjust_release_options(
    scalac_options: Vec<String>,
    javac_binary: Option<&Path>,
    server_java_home: &Path,
    server_jvm_major: u32,
) -> Vec<String> {
    if scalac_options
        .iter()
        .any(|opt| RELEASE_FLAGS.contains(&opt.as_str()))
    {
        return scalac_options;
    }

    let Some(javac) = javac_binary else {
        return scalac_options;
    };
    // javac lives at <home>/bin/javac, so the home is the grandparent.
    let Some(target_home) = javac.parent().and_then(Path::parent) else {
        return scalac_options;
    };
    if target_home == server_java_home {
        return scalac_options;
    }

    let Some(target_major) =
        version_from_java_home(target_home).and_then(|v| parse_major_version(&v))
    else {
        return scalac_options;
    };

    if server_jvm_major > target_major {
        let mut adjusted = scalac_options;
        adjusted.push("-release".to_string());
        adjusted.push(target_major.to_string());
        adjusted
    } else {
        if server_jvm_major < target_major {
            warn!(
                server = server_jvm_major,
                target = target_major,
                javac = %javac.display(),
                "build JDK is newer than the server JVM, runtime and build may diverge"
            );
        }
        scalac_options
    }
}

/// Builds the path of the javac binary under `java_home`.
#[must_use]
pub fn javac_binary(java_home: &Path) -> PathBuf {
    java_home.join("bin").join("javac")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_jdk(dir: &Path, version: &str) -> PathBuf {
        let home = dir.join(format!("jdk-{version}"));
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::write(
            home.join("release"),
            format!("IMPLEMENTOR=\"zincd\"\nJAVA_VERSION=\"{version}\"\n"),
        )
        .unwrap();
        home
    }

    #[test]
    fn reads_version_from_release_file() {
        let tmp = tempfile::tempdir().unwrap();
        let home = write_jdk(tmp.path(), "17.0.2");
        assert_eq!(version_from_java_home(&home), Some("17.0.2".to_string()));
    }

    #[test]
    fn falls_back_to_rt_jar_for_jdk8() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("jdk8");
        std::fs::create_dir_all(home.join("lib")).unwrap();
        std::fs::write(home.join("lib").join("rt.jar"), b"").unwrap();
        assert_eq!(version_from_java_home(&home), Some("1.8".to_string()));
    }

    #[test]
    fn unknown_home_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(version_from_java_home(tmp.path()), None);
    }

    #[test]
    fn major_version_parsing() {
        assert_eq!(parse_major_version("1.8"), Some(8));
        assert_eq!(parse_major_version("1.8.0_292"), Some(8));
        assert_eq!(parse_major_version("11"), Some(11));
        assert_eq!(parse_major_version("17.0.2"), Some(17));
        assert_eq!(parse_major_version("garbage"), None);
    }

    #[test]
    fn appends_release_when_server_is_newer() {
        let tmp = tempfile::tempdir().unwrap();
        let target_home = write_jdk(tmp.path(), "11");
        let server_home = write_jdk(tmp.path(), "17");

        let adjusted = adjust_release_options(
            vec!["-deprecation".to_string()],
            Some(&javac_binary(&target_home)),
            &server_home,
            17,
        );
        assert_eq!(adjusted, vec!["-deprecation", "-release", "11"]);
    }

    #[test]
    fn existing_release_flag_disables_adjustment() {
        let tmp = tempfile::tempdir().unwrap();
        let target_home = write_jdk(tmp.path(), "11");
        let server_home = write_jdk(tmp.path(), "17");

        let options = vec!["-release".to_string(), "11".to_string()];
        let adjusted = adjust_release_options(
            options.clone(),
            Some(&javac_binary(&target_home)),
            &server_home,
            17,
        );
        assert_eq!(adjusted, options);
    }

    #[test]
    fn own_jdk_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let server_home = write_jdk(tmp.path(), "17");

        let adjusted = adjust_release_options(
            vec![],
            Some(&javac_binary(&server_home)),
            &server_home,
            17,
        );
        assert!(adjusted.is_empty());
    }

    #[test]
    fn equal_versions_change_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let target_home = write_jdk(tmp.path(), "17");
        let server_home = write_jdk(tmp.path(), "17.0.1");

        let adjusted = adjust_release_options(
            vec![],
            Some(&javac_binary(&target_home)),
            &server_home,
            17,
        );
        assert!(adjusted.is_empty());
    }

    #[test]
    fn unreadable_target_swallows_the_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let target_home = tmp.path().join("not-a-jdk");
        std::fs::create_dir_all(target_home.join("bin")).unwrap();
        let server_home = write_jdk(tmp.path(), "17");

        let options = vec!["-deprecation".to_string()];
        let adjusted = adjust_release_options(
            options.clone(),
            Some(&javac_binary(&target_home)),
            &server_home,
            17,
        );
        assert_eq!(adjusted, options);
    }
}
