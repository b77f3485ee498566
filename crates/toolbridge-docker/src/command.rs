//! Pure construction of container run commands.
//!
//! This layer turns a package identifier plus an environment map into the
//! argv for a sandboxed launch. It performs no I/O and never executes
//! anything; identifier validation is the caller's responsibility.
//!
//! npm-origin servers are not pre-built into images: the runtime image
//! installs the package at container start and then executes it. That
//! trades a little startup latency for zero image-maintenance burden.

use std::collections::BTreeMap;

use toolbridge_core::{InstallMode, ServerOrigin};

/// Minimal runtime image used for npm-origin servers.
pub const DEFAULT_RUNTIME_IMAGE: &str = "node:22-slim";

/// Container name derived from a managed server name.
pub fn container_name_for(server_name: &str) -> String {
    format!("toolbridge-{server_name}")
}

/// Build the full argv for launching a server inside a container.
///
/// Shape: `docker run [-e K=V ...] --rm -i --name <container> [hardening]
/// <image> [entrypoint...]`.
///
/// Environment flags sit immediately after the `run` token so the flags
/// that follow are unaffected by how many there are; the `BTreeMap`
/// guarantees key-sorted, reproducible ordering.
///
/// Bridge mode publishes no ports (the child speaks over the stdio pipe).
/// Direct mode always applies filesystem/privilege hardening and resource
/// caps, since direct-mode containers run unsupervised for the life of the
/// external client.
pub fn package_run_command(
    origin: ServerOrigin,
    source: &str,
    container_name: &str,
    mode: InstallMode,
    env: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut argv: Vec<String> = vec!["docker".into(), "run".into()];

    for (key, value) in env {
        argv.push("-e".into());
        argv.push(format!("{key}={value}"));
    }

    argv.push("--rm".into());
    argv.push("-i".into());
    argv.push("--name".into());
    argv.push(container_name.into());

    if mode == InstallMode::Direct {
        argv.extend(hardening_flags());
    }

    match origin {
        ServerOrigin::NpmPackage => {
            argv.push(DEFAULT_RUNTIME_IMAGE.into());
            // install-then-run entrypoint
            argv.push("npx".into());
            argv.push("-y".into());
            argv.push(source.into());
        }
        ServerOrigin::ContainerImage => {
            argv.push(source.into());
        }
    }

    argv
}

/// Security hardening and resource caps for unsupervised containers.
fn hardening_flags() -> Vec<String> {
    [
        "--read-only",
        "--security-opt",
        "no-new-privileges",
        "--tmpfs",
        "/tmp",
        "--memory",
        "512m",
        "--cpu-shares",
        "512",
        "--pids-limit",
        "64",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Split a launch argv into the `command` + `args` shape the external
/// client's config schema expects.
///
/// Returns `None` for an empty argv.
pub fn split_for_host_config(argv: &[String]) -> Option<(String, Vec<String>)> {
    let (command, args) = argv.split_first()?;
    Some((command.clone(), args.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn npm_bridge_command_shape() {
        let argv = package_run_command(
            ServerOrigin::NpmPackage,
            "@modelcontextprotocol/server-filesystem",
            "toolbridge-files",
            InstallMode::Bridge,
            &BTreeMap::new(),
        );

        assert_eq!(
            argv,
            vec![
                "docker",
                "run",
                "--rm",
                "-i",
                "--name",
                "toolbridge-files",
                DEFAULT_RUNTIME_IMAGE,
                "npx",
                "-y",
                "@modelcontextprotocol/server-filesystem",
            ]
        );
    }

    #[test]
    fn env_flags_follow_run_token_in_sorted_order() {
        // Insertion order deliberately differs from key order
        let env = env_of(&[("ZEBRA", "z"), ("ALPHA", "a"), ("MIDDLE", "m")]);
        let argv = package_run_command(
            ServerOrigin::NpmPackage,
            "some-pkg",
            "toolbridge-x",
            InstallMode::Bridge,
            &env,
        );

        assert_eq!(argv[0], "docker");
        assert_eq!(argv[1], "run");
        assert_eq!(
            &argv[2..8],
            &[
                "-e",
                "ALPHA=a",
                "-e",
                "MIDDLE=m",
                "-e",
                "ZEBRA=z"
            ]
        );
        assert_eq!(argv[8], "--rm");
    }

    #[test]
    fn same_env_always_builds_identical_argv() {
        let env = env_of(&[("B", "2"), ("A", "1")]);
        let first = package_run_command(
            ServerOrigin::NpmPackage,
            "pkg",
            "toolbridge-a",
            InstallMode::Direct,
            &env,
        );
        let second = package_run_command(
            ServerOrigin::NpmPackage,
            "pkg",
            "toolbridge-a",
            InstallMode::Direct,
            &env,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn direct_mode_applies_hardening() {
        let argv = package_run_command(
            ServerOrigin::NpmPackage,
            "pkg",
            "toolbridge-x",
            InstallMode::Direct,
            &BTreeMap::new(),
        );

        assert!(argv.contains(&"--read-only".to_string()));
        assert!(argv.contains(&"no-new-privileges".to_string()));
        assert!(argv.contains(&"--pids-limit".to_string()));
        assert!(argv.contains(&"--memory".to_string()));
    }

    #[test]
    fn bridge_mode_has_no_hardening_and_no_ports() {
        let argv = package_run_command(
            ServerOrigin::NpmPackage,
            "pkg",
            "toolbridge-x",
            InstallMode::Bridge,
            &BTreeMap::new(),
        );

        assert!(!argv.contains(&"--read-only".to_string()));
        assert!(!argv.contains(&"-p".to_string()));
        assert!(!argv.contains(&"--publish".to_string()));
    }

    #[test]
    fn image_origin_passes_image_through() {
        let argv = package_run_command(
            ServerOrigin::ContainerImage,
            "ghcr.io/example/mcp-weather:1.2",
            "toolbridge-weather",
            InstallMode::Bridge,
            &BTreeMap::new(),
        );

        assert_eq!(argv.last().unwrap(), "ghcr.io/example/mcp-weather:1.2");
        assert!(!argv.contains(&"npx".to_string()));
    }

    #[test]
    fn host_config_split_strips_runtime_token() {
        let argv: Vec<String> = ["docker", "run", "--rm", "-i", "img"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        let (command, args) = split_for_host_config(&argv).unwrap();
        assert_eq!(command, "docker");
        assert_eq!(args, vec!["run", "--rm", "-i", "img"]);
        assert!(split_for_host_config(&[]).is_none());
    }
}
