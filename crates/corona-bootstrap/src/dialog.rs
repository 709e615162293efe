//! User-facing modal dialogs.
//!
//! Three categories: information (OK), error (OK), and yes/no confirmation.
//! Every call blocks until the user answers. On Windows they are message
//! boxes; elsewhere they fall back to the console.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Caption of every launcher dialog.
pub const TITLE: &str = "Corona Launcher";

pub trait Dialogs: Send + Sync {
    fn inform(&self, message: &str);

    fn error(&self, message: &str);

    /// Yes/no question. `true` means yes.
    fn confirm(&self, message: &str) -> bool;
}

/// Whether consent prompts are shown or answered in advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMode {
    #[default]
    Prompt,
    #[serde(alias = "yes")]
    AssumeYes,
    #[serde(alias = "no")]
    AssumeNo,
}

impl std::str::FromStr for ConsentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" | "ask" => Ok(ConsentMode::Prompt),
            "yes" | "assume_yes" | "always" => Ok(ConsentMode::AssumeYes),
            "no" | "assume_no" | "never" => Ok(ConsentMode::AssumeNo),
            other => Err(format!("expected prompt, yes or no, got {other:?}")),
        }
    }
}

/// Consent gate in front of every remediation step.
pub struct ConsentGate<'a> {
    dialogs: &'a dyn Dialogs,
    mode: ConsentMode,
}

impl<'a> ConsentGate<'a> {
    pub fn new(dialogs: &'a dyn Dialogs, mode: ConsentMode) -> Self {
        Self { dialogs, mode }
    }

    pub fn ask(&self, question: &str) -> bool {
        let answer = match self.mode {
            ConsentMode::Prompt => self.dialogs.confirm(question),
            ConsentMode::AssumeYes => true,
            ConsentMode::AssumeNo => false,
        };
        info!(mode = ?self.mode, answer, question, "consent");
        answer
    }
}

/// Console dialogs: messages on the output stream, answers read line by line.
pub struct ConsoleDialogs {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleDialogs {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    pub fn stdio() -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stderr()),
        )
    }

    fn write(&self, prefix: &str, message: &str) {
        if let Ok(mut out) = self.output.lock() {
            let _ = writeln!(out, "[{TITLE}] {prefix}{message}");
            let _ = out.flush();
        }
    }
}

impl Dialogs for ConsoleDialogs {
    fn inform(&self, message: &str) {
        self.write("", message);
    }

    fn error(&self, message: &str) {
        self.write("error: ", message);
    }

    fn confirm(&self, message: &str) -> bool {
        loop {
            self.write("", &format!("{message} [y/n]"));
            let mut line = String::new();
            let read = match self.input.lock() {
                Ok(mut input) => input.read_line(&mut line),
                Err(_) => return false,
            };
            match read {
                // EOF or a broken stdin never counts as consent.
                Ok(0) | Err(_) => return false,
                Ok(_) => match line.trim().to_ascii_lowercase().as_str() {
                    "y" | "yes" => return true,
                    "n" | "no" => return false,
                    _ => continue,
                },
            }
        }
    }
}

#[cfg(windows)]
mod message_box {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    use windows::core::PCWSTR;
    use windows::Win32::UI::WindowsAndMessaging::{
        MessageBoxW, IDYES, MB_ICONERROR, MB_ICONINFORMATION, MB_ICONQUESTION, MB_OK, MB_YESNO,
        MESSAGEBOX_RESULT, MESSAGEBOX_STYLE,
    };

    use super::{Dialogs, TITLE};

    fn wstr(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }

    fn show(text: &str, flags: MESSAGEBOX_STYLE) -> MESSAGEBOX_RESULT {
        let caption = wstr(TITLE);
        let text = wstr(text);
        // SAFETY: both buffers are NUL-terminated and outlive the call.
        unsafe {
            MessageBoxW(
                None,
                PCWSTR(text.as_ptr()),
                PCWSTR(caption.as_ptr()),
                flags,
            )
        }
    }

    /// Native Win32 message boxes.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MessageBoxDialogs;

    impl Dialogs for MessageBoxDialogs {
        fn inform(&self, message: &str) {
            show(message, MB_OK | MB_ICONINFORMATION);
        }

        fn error(&self, message: &str) {
            show(message, MB_OK | MB_ICONERROR);
        }

        fn confirm(&self, message: &str) -> bool {
            show(message, MB_YESNO | MB_ICONQUESTION) == IDYES
        }
    }
}

#[cfg(windows)]
pub use message_box::MessageBoxDialogs;

/// The dialog surface for this platform.
pub fn platform_dialogs() -> Arc<dyn Dialogs> {
    #[cfg(windows)]
    {
        Arc::new(MessageBoxDialogs)
    }
    #[cfg(not(windows))]
    {
        Arc::new(ConsoleDialogs::stdio())
    }
}
