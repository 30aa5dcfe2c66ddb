use std::process::Command;

fn main() {
	println!("cargo:rerun-if-changed=.git/HEAD");
	println!("cargo:rerun-if-changed=.git/refs/");

	println!("cargo:rustc-env=POCTL_VERSION={}", version());
}

/// Release builds carry their version in Cargo.toml; dev builds describe the
/// git checkout instead (`v0.3.1` -> `0.3.1`, otherwise the short commit).
fn version() -> String {
	let cargo_version = env!("CARGO_PKG_VERSION");
	if cargo_version != "0.1.0" {
		return cargo_version.to_string();
	}

	git(&["describe", "--tags", "--exact-match", "HEAD"])
		.map(|tag| tag.trim_start_matches('v').to_string())
		.or_else(|| git(&["rev-parse", "--short", "HEAD"]))
		.unwrap_or_else(|| cargo_version.to_string())
}

fn git(args: &[&str]) -> Option<String> {
	let output = Command::new("git").args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let stdout = String::from_utf8(output.stdout).ok()?;
	Some(stdout.trim().to_string()).filter(|s| !s.is_empty())
}
