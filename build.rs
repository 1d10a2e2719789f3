// SignalCrab - GPL-3.0-or-later
// Exposes the source revision to `signalcrab --version` and the startup log

use std::process::Command;

/// `git describe` of the checkout, e.g. `3f2a9c1d-dirty`
fn describe_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8(output.stdout).ok()?;
    Some(revision.trim().to_owned()).filter(|r| !r.is_empty())
}

fn main() {
    let revision = describe_revision().unwrap_or_else(|| "no git revision".to_owned());
    println!("cargo:rustc-env=SIGNALCRAB_REVISION={revision}");

    for path in [".git/HEAD", ".git/index"] {
        println!("cargo:rerun-if-changed={path}");
    }
}
