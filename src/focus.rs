//! Is the terminal running the agent the frontmost application?
//!
//! The hosting terminal is identified from its environment variables (the
//! same ones used for pane detection). macOS asks System Events for the
//! frontmost process and Windows asks for the foreground window's owner.
//! Other platforms always report "not focused", so nothing is suppressed.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::process::Command;

/// Terminal identifier -> application/process name the OS reports
static TERMINAL_APP_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ghostty", "Ghostty"),
        ("kitty", "kitty"),
        ("iterm", "iTerm2"),
        ("iterm2", "iTerm2"),
        ("wezterm", "WezTerm"),
        ("alacritty", "Alacritty"),
        ("terminal", "Terminal"),
        ("apple_terminal", "Terminal"),
        ("hyper", "Hyper"),
        ("warp", "Warp"),
        ("warpterminal", "Warp"),
        ("vscode", "Code"),
        ("vscode-insiders", "Code - Insiders"),
    ])
});

/// Multiplexers report themselves in TERM_PROGRAM, hiding the real terminal
const MULTIPLEXERS: [&str; 2] = ["tmux", "screen"];

const MACOS_FRONTMOST_SCRIPT: &str =
    "tell application \"System Events\" to get name of first application process whose frontmost is true";

const WINDOWS_FOREGROUND_SCRIPT: &str = r#"Add-Type @"
using System;
using System.Runtime.InteropServices;
public class Fg {
  [DllImport("user32.dll")] public static extern IntPtr GetForegroundWindow();
  [DllImport("user32.dll")] public static extern uint GetWindowThreadProcessId(IntPtr hWnd, out uint pid);
}
"@
$fgPid = 0
[void][Fg]::GetWindowThreadProcessId([Fg]::GetForegroundWindow(), [ref]$fgPid)
(Get-Process -Id $fgPid).ProcessName"#;

/// Lowercase and drop everything but ASCII letters and digits
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Either normalized name contains the other (e.g. "iTerm2" vs "iterm")
pub fn names_match(frontmost: &str, terminal: &str) -> bool {
    let frontmost = normalize(frontmost);
    let terminal = normalize(terminal);
    if frontmost.is_empty() || terminal.is_empty() {
        return false;
    }
    frontmost.contains(&terminal) || terminal.contains(&frontmost)
}

/// Application name for a terminal identifier; unknown identifiers pass through
pub fn terminal_app_name(identifier: &str) -> String {
    let key = identifier.to_lowercase();
    TERMINAL_APP_NAMES
        .get(key.as_str())
        .map_or(key.clone(), |name| (*name).to_string())
}

/// Identify the terminal from environment lookups
///
/// Priority: TERM_PROGRAM (unless it names a multiplexer) > GHOSTTY > KITTY >
/// WEZTERM > ALACRITTY > ITERM > Windows Terminal
fn detect_terminal_with(var: impl Fn(&str) -> Option<String>) -> Option<String> {
    let present = |key: &str| var(key).is_some_and(|v| !v.is_empty());

    if let Some(program) = var("TERM_PROGRAM").filter(|p| !p.is_empty()) {
        let program = program.to_lowercase();
        let program = program.strip_suffix(".app").unwrap_or(&program).to_string();

        if program == "vscode"
            && var("TERM_PROGRAM_VERSION").is_some_and(|v| v.to_lowercase().contains("insider"))
        {
            return Some("vscode-insiders".to_string());
        }
        if !MULTIPLEXERS.contains(&program.as_str()) {
            return Some(program);
        }
    }

    let by_env = [
        ("GHOSTTY_RESOURCES_DIR", "ghostty"),
        ("KITTY_WINDOW_ID", "kitty"),
        ("WEZTERM_PANE", "wezterm"),
        ("ALACRITTY_SOCKET", "alacritty"),
        ("ALACRITTY_LOG", "alacritty"),
        ("ITERM_SESSION_ID", "iterm2"),
        ("WT_SESSION", "windowsterminal"),
    ];
    by_env
        .iter()
        .find(|(key, _)| present(*key))
        .map(|(_, terminal)| (*terminal).to_string())
}

/// Identifier of the terminal hosting this process, if recognizable
pub fn detect_terminal() -> Option<String> {
    detect_terminal_with(|key| std::env::var(key).ok())
}

/// Answers whether the agent's terminal currently has focus
#[async_trait]
pub trait FocusDetector: Send + Sync {
    async fn is_terminal_focused(&self) -> bool;
}

/// Queries the OS for the frontmost application
pub struct OsFocusDetector {
    /// Application name of the hosting terminal
    terminal_app: Option<String>,
}

impl OsFocusDetector {
    pub fn detect() -> Self {
        let terminal_app = detect_terminal().map(|id| terminal_app_name(&id));
        tracing::debug!(terminal = ?terminal_app, "Detected terminal");
        Self { terminal_app }
    }
}

/// Run a short script and return its trimmed stdout; any failure is `None`
async fn script_output(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(program, error = %e, "Focus query failed to start");
            return None;
        }
    };

    if !output.status.success() {
        tracing::debug!(program, status = %output.status, "Focus query failed");
        return None;
    }

    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Name of the frontmost application, where the OS lets us ask
async fn frontmost_app() -> Option<String> {
    if cfg!(target_os = "macos") {
        script_output("osascript", &["-e", MACOS_FRONTMOST_SCRIPT]).await
    } else if cfg!(target_os = "windows") {
        script_output(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", WINDOWS_FOREGROUND_SCRIPT],
        )
        .await
    } else {
        None
    }
}

/// Compare the frontmost app reported by `query` with the terminal.
/// An unknown terminal or a failed query means not focused.
async fn terminal_focused_with<F, Fut>(terminal: Option<&str>, query: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let Some(terminal) = terminal else {
        return false;
    };
    let Some(frontmost) = query().await else {
        return false;
    };

    let focused = names_match(&frontmost, terminal);
    tracing::debug!(frontmost = %frontmost, terminal = %terminal, focused, "Focus check");
    focused
}

#[async_trait]
impl FocusDetector for OsFocusDetector {
    async fn is_terminal_focused(&self) -> bool {
        terminal_focused_with(self.terminal_app.as_deref(), frontmost_app).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Code - Insiders"), "codeinsiders");
        assert_eq!(normalize("iTerm2"), "iterm2");
        assert_eq!(normalize("Apple_Terminal"), "appleterminal");
    }

    #[test]
    fn test_names_match() {
        assert!(names_match("iTerm2", "iterm"));
        assert!(names_match("Ghostty", "ghostty"));
        assert!(!names_match("Finder", "kitty"));
        assert!(!names_match("", "kitty"));
        assert!(!names_match("---", "kitty"));
    }

    #[test]
    fn test_terminal_app_name_table() {
        assert_eq!(terminal_app_name("iterm"), "iTerm2");
        assert_eq!(terminal_app_name("apple_terminal"), "Terminal");
        assert_eq!(terminal_app_name("vscode-insiders"), "Code - Insiders");
        assert_eq!(terminal_app_name("WezTerm"), "WezTerm");
        assert_eq!(terminal_app_name("foot"), "foot");
    }

    #[test]
    fn test_detect_from_term_program() {
        assert_eq!(
            detect_terminal_with(env(&[("TERM_PROGRAM", "iTerm.app")])),
            Some("iterm".to_string())
        );
        assert_eq!(
            detect_terminal_with(env(&[("TERM_PROGRAM", "Apple_Terminal")])),
            Some("apple_terminal".to_string())
        );
        assert_eq!(
            detect_terminal_with(env(&[
                ("TERM_PROGRAM", "vscode"),
                ("TERM_PROGRAM_VERSION", "1.96.0-insider")
            ])),
            Some("vscode-insiders".to_string())
        );
    }

    #[test]
    fn test_detect_skips_multiplexer() {
        assert_eq!(
            detect_terminal_with(env(&[("TERM_PROGRAM", "tmux"), ("KITTY_WINDOW_ID", "3")])),
            Some("kitty".to_string())
        );
        assert_eq!(detect_terminal_with(env(&[("TERM_PROGRAM", "tmux")])), None);
    }

    #[test]
    fn test_detect_from_terminal_vars() {
        assert_eq!(
            detect_terminal_with(env(&[("WEZTERM_PANE", "0")])),
            Some("wezterm".to_string())
        );
        assert_eq!(
            detect_terminal_with(env(&[("GHOSTTY_RESOURCES_DIR", "/app")])),
            Some("ghostty".to_string())
        );
        assert_eq!(detect_terminal_with(env(&[("KITTY_WINDOW_ID", "")])), None);
        assert_eq!(detect_terminal_with(env(&[])), None);
    }

    #[test]
    fn test_identifier_then_match() {
        let app = terminal_app_name("iterm");
        assert!(names_match("iTerm2", &app));
        assert!(!names_match("Finder", &terminal_app_name("kitty")));
    }

    #[tokio::test]
    async fn test_unknown_terminal_never_focused() {
        let detector = OsFocusDetector { terminal_app: None };
        assert!(!detector.is_terminal_focused().await);
    }

    #[tokio::test]
    async fn test_failed_frontmost_query_is_not_focused() {
        let terminal = terminal_app_name("iterm");

        assert!(!terminal_focused_with(Some(&terminal), || async { None }).await);
        assert!(!terminal_focused_with(Some(&terminal), || async { Some(String::new()) }).await);
        assert!(!terminal_focused_with(Some(&terminal), || async { Some("Finder".to_string()) }).await);
        assert!(terminal_focused_with(Some(&terminal), || async { Some("iTerm2".to_string()) }).await);
    }

    #[tokio::test]
    async fn test_unknown_terminal_skips_frontmost_query() {
        let queried = std::sync::atomic::AtomicBool::new(false);
        let focused = terminal_focused_with(None, || async {
            queried.store(true, std::sync::atomic::Ordering::SeqCst);
            Some("iTerm2".to_string())
        })
        .await;

        assert!(!focused);
        assert!(!queried.load(std::sync::atomic::Ordering::SeqCst));
    }
}
