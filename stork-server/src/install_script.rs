//! Generates `/stork-install-agent.sh`: a POSIX shell script that detects
//! the target OS, fetches the matching agent package from `assets/pkgs`,
//! installs it, enables the service, and registers the agent against this
//! server. Generated on every request rather than cached on disk, so a
//! server restart with a different `--base-url` or a newly-added package
//! is picked up immediately.

use std::path::Path;

use actix_web::{get, web, HttpResponse};

/// One package this server can hand out, keyed by the package-manager
/// family a `detect_os` match maps to (`deb`, `rpm`, `apk`).
struct Package {
    family: &'static str,
    file_name: String,
}

fn discover_packages(pkgs_dir: &Path) -> Vec<Package> {
    let Ok(entries) = std::fs::read_dir(pkgs_dir) else {
        return vec![];
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let family = if name.ends_with(".deb") {
                "deb"
            } else if name.ends_with(".rpm") {
                "rpm"
            } else if name.ends_with(".apk") {
                "apk"
            } else {
                return None;
            };
            Some(Package { family, file_name: name })
        })
        .collect()
}

fn render(server_url: &str, packages: &[Package]) -> String {
    let mut case_arms = String::new();
    for family in ["deb", "rpm", "apk"] {
        let Some(pkg) = packages.iter().find(|p| p.family == family) else {
            continue;
        };
        let pattern = match family {
            "deb" => "ubuntu|debian)",
            "rpm" => "rhel|centos|fedora|rocky|almalinux)",
            _ => "alpine)",
        };
        let installer = match family {
            "deb" => "dpkg -i",
            "rpm" => "rpm -Uvh",
            _ => "apk add --allow-untrusted",
        };
        case_arms.push_str(&format!(
            "        {pattern}\n            PKG_URL=\"{server_url}/assets/pkgs/{file}\"\n            PKG_INSTALL=\"{installer}\"\n            ;;\n",
            pattern = pattern,
            server_url = server_url,
            file = pkg.file_name,
            installer = installer,
        ));
    }

    format!(
        r#"#!/bin/sh
# Installs and registers a stork-agent against {server_url}.
# Generated by the server; re-run to pick up a newer package.
set -e

SERVER_URL="{server_url}"
PKG_URL=""
PKG_INSTALL=""

OS_ID=""
if [ -r /etc/os-release ]; then
    OS_ID=$(. /etc/os-release && echo "$ID")
fi

case "$OS_ID" in
{case_arms}        *)
            echo "stork-install-agent: unsupported or undetected OS ($OS_ID)" >&2
            exit 1
            ;;
esac

if [ -z "$PKG_URL" ]; then
    echo "stork-install-agent: no agent package published for this OS" >&2
    exit 1
fi

TMP_PKG=$(mktemp)
trap 'rm -f "$TMP_PKG"' EXIT

echo "Downloading agent package from $PKG_URL"
curl -fsSL -o "$TMP_PKG" "$PKG_URL"

echo "Installing with: $PKG_INSTALL $TMP_PKG"
$PKG_INSTALL "$TMP_PKG"

systemctl enable stork-agent || true
systemctl restart stork-agent || true

echo "Registering agent with $SERVER_URL"
stork-agent register -u "$SERVER_URL"
"#,
        server_url = server_url,
        case_arms = case_arms,
    )
}

#[get("/stork-install-agent.sh")]
pub async fn install_script_handler(server_url: web::Data<String>) -> HttpResponse {
    let pkgs_dir = Path::new("assets/pkgs");
    let packages = discover_packages(pkgs_dir);
    let body = render(&server_url, &packages);
    HttpResponse::Ok().content_type("text/x-shellscript").body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_case_arm_per_discovered_family() {
        let packages = vec![
            Package { family: "deb", file_name: "stork-agent_1.0_amd64.deb".to_string() },
            Package { family: "rpm", file_name: "stork-agent-1.0.x86_64.rpm".to_string() },
        ];
        let script = render("https://stork.example.com:8443", &packages);
        assert!(script.contains("ubuntu|debian)"));
        assert!(script.contains("stork-agent_1.0_amd64.deb"));
        assert!(script.contains("rhel|centos|fedora|rocky|almalinux)"));
        assert!(!script.contains("alpine)"));
    }

    #[test]
    fn missing_packages_still_renders_a_script_that_fails_loudly() {
        let script = render("https://stork.example.com:8443", &[]);
        assert!(script.contains("unsupported or undetected OS"));
    }
}
