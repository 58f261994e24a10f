// src/core/dispatch.rs

//! Decides which interpreter runs a command.
//!
//! The embedded POSIX path cannot run genuinely Windows-native tooling, while
//! forcing everything through `cmd`/PowerShell would break the portable,
//! POSIX-style scripts agents usually write. The classifier is pure so it can
//! be tested without spawning anything.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Host family the classifier reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and the other Unix-likes.
    Posix,
    /// Windows, where native tooling may need `cmd` or PowerShell.
    Windows,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posix" | "unix" | "linux" | "macos" => Ok(Self::Posix),
            "windows" | "win" => Ok(Self::Windows),
            other => Err(format!("Unknown platform '{}'. Use 'posix' or 'windows'.", other)),
        }
    }
}

/// Where a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The embedded POSIX interpreter.
    Posix,
    /// `cmd.exe /C`.
    NativeCmd,
    /// `powershell -NoProfile -Command`.
    NativePowerShell,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix => write!(f, "posix"),
            Self::NativeCmd => write!(f, "cmd"),
            Self::NativePowerShell => write!(f, "powershell"),
        }
    }
}

lazy_static! {
    /// Utilities that only exist as `cmd` builtins or Windows system tools.
    static ref WINDOWS_NATIVE_COMMANDS: HashSet<&'static str> = [
        // Directory listing & file management
        "cd", "chdir", "dir", "type", "copy", "xcopy", "robocopy", "move", "del", "erase", "ren", "rename",
        "md", "rd", "attrib", "icacls", "cacls", "mklink", "tree", "fc", "comp", "findstr",
        "where",
        // Console & system info
        "cls", "ver", "vol", "systeminfo", "chcp", "title", "color",
        // Processes
        "tasklist", "taskkill", "start",
        // Network
        "ipconfig", "netsh", "net", "nslookup", "tracert", "pathping", "getmac",
        // Registry, services, WMI & scheduling
        "reg", "regedit", "sc", "wmic", "schtasks", "bcdedit", "powercfg", "gpupdate",
        "gpresult", "diskpart", "chkdsk", "sfc", "dism", "wevtutil", "shutdown",
    ]
    .into_iter()
    .collect();

    /// Verb-Noun cmdlets as PowerShell capitalizes them (`Get-ChildItem`).
    static ref CMDLET_RE: Regex = Regex::new(
        r"\b(?:Get|Set|New|Remove|Add|Clear|Copy|Move|Rename|Start|Stop|Restart|Invoke|Test|Select|Where|ForEach|Out|Write|Read|Import|Export|ConvertTo|ConvertFrom|Measure|Sort|Group|Format|Resolve|Join|Split|Enable|Disable|Install|Uninstall|Update|Wait|Push|Pop|Register|Unregister)-[A-Z][A-Za-z]+\b"
    )
    .expect("cmdlet pattern is valid");
}

/// Markers that only make sense in PowerShell, regardless of casing rules.
const POWERSHELL_MARKERS: &[&str] = &[
    "$_",
    "$env:",
    "$PSVersionTable",
    "Where-Object",
    "ForEach-Object",
    "Select-Object",
];

/// Classifies a command for the given platform.
///
/// Non-Windows hosts always use the POSIX path. On Windows, a first word found
/// in the native table goes to `cmd`, PowerShell idioms go to PowerShell, and
/// everything else falls back to the POSIX emulation path.
pub fn classify(platform: Platform, command: &str) -> Route {
    if platform == Platform::Posix {
        return Route::Posix;
    }

    if let Some(first) = first_word(command)
        && WINDOWS_NATIVE_COMMANDS.contains(first.as_str())
    {
        return Route::NativeCmd;
    }

    if is_powershell(command) {
        return Route::NativePowerShell;
    }

    Route::Posix
}

/// Returns true when the text contains PowerShell-only syntax.
pub fn is_powershell(command: &str) -> bool {
    POWERSHELL_MARKERS.iter().any(|m| command.contains(m)) || CMDLET_RE.is_match(command)
}

/// Lower-cased first word of a command with any `.exe` suffix and leading
/// `@` (cmd's echo suppression) removed.
fn first_word(command: &str) -> Option<String> {
    let word = command.split_whitespace().next()?;
    let word = word.trim_start_matches('@').to_ascii_lowercase();
    let word = word.strip_suffix(".exe").unwrap_or(&word).to_string();
    if word.is_empty() { None } else { Some(word) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_hosts_always_use_posix() {
        assert_eq!(classify(Platform::Posix, "dir /b"), Route::Posix);
        assert_eq!(
            classify(Platform::Posix, "Get-ChildItem | Where-Object { $_.Length -gt 0 }"),
            Route::Posix
        );
    }

    #[test]
    fn test_windows_native_utilities_use_cmd() {
        assert_eq!(classify(Platform::Windows, "dir /b"), Route::NativeCmd);
        assert_eq!(classify(Platform::Windows, "TASKLIST /FI \"PID eq 4\""), Route::NativeCmd);
        assert_eq!(classify(Platform::Windows, "taskkill.exe /F /PID 12"), Route::NativeCmd);
        assert_eq!(classify(Platform::Windows, "@reg query HKCU"), Route::NativeCmd);
    }

    #[test]
    fn test_windows_powershell_idioms() {
        assert_eq!(
            classify(Platform::Windows, "Get-Process | Sort-Object CPU"),
            Route::NativePowerShell
        );
        assert_eq!(
            classify(Platform::Windows, "ls | % { $_.Name }"),
            Route::NativePowerShell
        );
        assert_eq!(classify(Platform::Windows, "echo $env:PATH"), Route::NativePowerShell);
    }

    #[test]
    fn test_windows_portable_scripts_fall_back_to_posix() {
        assert_eq!(classify(Platform::Windows, "ls -la && echo done"), Route::Posix);
        assert_eq!(classify(Platform::Windows, "git status"), Route::Posix);
        // Lower-case hyphenated words are not cmdlets.
        assert_eq!(classify(Platform::Windows, "get-version --short"), Route::Posix);
        assert_eq!(classify(Platform::Windows, ""), Route::Posix);
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("Windows".parse::<Platform>(), Ok(Platform::Windows));
        assert_eq!("linux".parse::<Platform>(), Ok(Platform::Posix));
        assert!("beos".parse::<Platform>().is_err());
    }
}
