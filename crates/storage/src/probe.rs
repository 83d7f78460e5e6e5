use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Decides whether another process currently holds an artifact open.
pub trait LockProbe: fmt::Debug + Send + Sync {
    fn is_busy(&self, path: &Path) -> bool;
}

/// Opens the file for writing without truncating it. A refusal that looks like
/// a sharing or lock violation counts as busy.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteOpenProbe;

impl LockProbe for WriteOpenProbe {
    fn is_busy(&self, path: &Path) -> bool {
        match OpenOptions::new().write(true).open(path) {
            Ok(_) => false,
            Err(err) => is_busy_error(&err) || (cfg!(windows) && err.kind() == io::ErrorKind::PermissionDenied),
        }
    }
}

/// Errors that mean "try again shortly" rather than "this will never work".
pub fn is_busy_error(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    const WINDOWS_SHARING_CODES: [i32; 2] = [32, 33];

    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy
    ) || (cfg!(windows)
        && err
            .raw_os_error()
            .is_some_and(|code| WINDOWS_SHARING_CODES.contains(&code)))
}
