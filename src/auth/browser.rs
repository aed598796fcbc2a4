//! Best-effort browser launching for the OAuth consent step.

/// Open `url` in the desktop browser; `false` when no launcher worked.
pub fn try_open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        return launch("open", &[url]);
    }
    #[cfg(target_os = "windows")]
    {
        return launch("cmd", &["/C", "start", "", url]);
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        return launch("xdg-open", &[url]);
    }
    #[allow(unreachable_code)]
    false
}

#[allow(dead_code)]
fn launch(program: &str, args: &[&str]) -> bool {
    tracing::debug!(program, "opening browser");
    std::process::Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
