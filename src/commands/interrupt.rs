//! Ctrl-C handling
//!
//! The first SIGINT fires the shared [`CancelToken`] so the flasher stops
//! at its next poll and the command exits with an error. The handler then
//! restores the default action, so a second Ctrl-C kills the process.

use std::sync::OnceLock;

use qspiflash_core::CancelToken;

static INTERRUPT: OnceLock<CancelToken> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_sigint(_: libc::c_int) {
    if let Some(token) = INTERRUPT.get() {
        token.cancel();
    }
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Token fired by the first Ctrl-C; installs the handler on first use
pub fn interrupt_token() -> CancelToken {
    INTERRUPT
        .get_or_init(|| {
            #[cfg(unix)]
            unsafe {
                let handler = on_sigint as extern "C" fn(libc::c_int);
                libc::signal(libc::SIGINT, handler as libc::sighandler_t);
            }
            log::debug!("SIGINT handler installed");
            CancelToken::new()
        })
        .clone()
}
