//! Cross-process "new frame" wake signal.
//!
//! The producer signals after every published frame; a waiting consumer
//! wakes, but a wake guarantees nothing — the consumer must still call
//! `read_frame` and handle emptiness. On Windows this is a named
//! auto-reset event; on Unix a named POSIX semaphore. Both may coalesce or
//! accumulate wakes, which is legal under that contract.

use std::time::Duration;

use crate::error::TransportError;
use crate::TransportResult;

/// Wake-signal name derived from the channel name.
pub fn signal_name(channel_name: &str) -> String {
    format!("{channel_name}_Event")
}

#[cfg(windows)]
pub(crate) use windows_impl::FrameSignal;

#[cfg(unix)]
pub(crate) use unix_impl::FrameSignal;

#[cfg(windows)]
mod windows_impl {
    use super::*;

    use tracing::trace;
    use windows::core::HSTRING;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows::Win32::System::Threading::{
        CreateEventW, SetEvent, WaitForSingleObject, INFINITE,
    };

    /// Named auto-reset event shared between producer and consumer.
    pub struct FrameSignal {
        handle: HANDLE,
    }

    // HANDLE is a process-local kernel object reference; event operations
    // are thread-safe.
    unsafe impl Send for FrameSignal {}
    unsafe impl Sync for FrameSignal {}

    impl FrameSignal {
        /// Create the named event, or open it if another process already
        /// created it.
        pub fn open(channel_name: &str) -> TransportResult<Self> {
            let name = HSTRING::from(signal_name(channel_name));
            let handle = unsafe { CreateEventW(None, false, false, &name) }
                .map_err(|e| TransportError::Signal(e.message().to_string()))?;
            Ok(Self { handle })
        }

        /// Wake one waiter.
        pub fn signal(&self) -> TransportResult<()> {
            unsafe { SetEvent(self.handle) }
                .map_err(|e| TransportError::Signal(e.message().to_string()))
        }

        /// Block until signaled or the timeout elapses. `None` waits
        /// forever; a zero duration polls.
        pub fn wait(&self, timeout: Option<Duration>) -> bool {
            let millis = match timeout {
                None => INFINITE,
                Some(t) => t.as_millis().min(u128::from(INFINITE - 1)) as u32,
            };
            let result = unsafe { WaitForSingleObject(self.handle, millis) };
            if result == WAIT_OBJECT_0 {
                true
            } else {
                if result != WAIT_TIMEOUT {
                    trace!(code = result.0, "frame event wait failed");
                }
                false
            }
        }
    }

    impl Drop for FrameSignal {
        fn drop(&mut self) {
            let _ = unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;

    use std::ffi::CString;
    use std::io;
    use tracing::trace;

    /// Named POSIX semaphore shared between producer and consumer.
    pub struct FrameSignal {
        sem: *mut libc::sem_t,
    }

    // sem_post/sem_wait are thread-safe on a shared semaphore.
    unsafe impl Send for FrameSignal {}
    unsafe impl Sync for FrameSignal {}

    impl FrameSignal {
        /// Create the named semaphore, or open it if another process
        /// already created it.
        pub fn open(channel_name: &str) -> TransportResult<Self> {
            let name = CString::new(format!("/{}", signal_name(channel_name)))
                .map_err(|_| TransportError::Signal("channel name contains NUL".into()))?;
            let sem = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    libc::O_CREAT,
                    0o600 as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            if sem == libc::SEM_FAILED {
                return Err(TransportError::Signal(
                    io::Error::last_os_error().to_string(),
                ));
            }
            Ok(Self { sem })
        }

        /// Wake one waiter.
        pub fn signal(&self) -> TransportResult<()> {
            if unsafe { libc::sem_post(self.sem) } != 0 {
                return Err(TransportError::Signal(
                    io::Error::last_os_error().to_string(),
                ));
            }
            Ok(())
        }

        /// Block until signaled or the timeout elapses. `None` waits
        /// forever; a zero duration polls.
        pub fn wait(&self, timeout: Option<Duration>) -> bool {
            let result = match timeout {
                None => loop {
                    let rc = unsafe { libc::sem_wait(self.sem) };
                    if rc == 0 || !interrupted() {
                        break rc;
                    }
                },
                Some(t) if t.is_zero() => unsafe { libc::sem_trywait(self.sem) },
                Some(t) => {
                    let deadline = deadline_from_now(t);
                    loop {
                        let rc = unsafe { libc::sem_timedwait(self.sem, &deadline) };
                        if rc == 0 || !interrupted() {
                            break rc;
                        }
                    }
                }
            };
            if result == 0 {
                true
            } else {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => {}
                    _ => trace!(error = %err, "frame semaphore wait failed"),
                }
                false
            }
        }
    }

    impl Drop for FrameSignal {
        fn drop(&mut self) {
            // Close our reference only; the name outlives us, matching the
            // "longer of any holder" channel lifetime.
            unsafe { libc::sem_close(self.sem) };
        }
    }

    fn interrupted() -> bool {
        io::Error::last_os_error().raw_os_error() == Some(libc::EINTR)
    }

    fn deadline_from_now(timeout: Duration) -> libc::timespec {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
        let nanos = now.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
        libc::timespec {
            tv_sec: now.tv_sec
                + timeout.as_secs() as libc::time_t
                + (nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: (nanos % 1_000_000_000) as libc::c_long,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        format!("frametap_sig_{}_{}", std::process::id(), tag)
    }

    #[test]
    fn test_signal_name_derivation() {
        assert_eq!(signal_name("frametap_frames"), "frametap_frames_Event");
    }

    #[test]
    fn test_zero_timeout_does_not_block_when_unsignaled() {
        let signal = FrameSignal::open(&unique_name("poll")).unwrap();
        assert!(!signal.wait(Some(Duration::ZERO)));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let name = unique_name("wake");
        let signal = FrameSignal::open(&name).unwrap();

        let waiter = thread::spawn(move || {
            let signal = FrameSignal::open(&name).unwrap();
            signal.wait(Some(Duration::from_secs(5)))
        });

        // The waiter may not be parked yet; the signal persists either way.
        signal.signal().unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_times_out() {
        let signal = FrameSignal::open(&unique_name("timeout")).unwrap();
        let start = std::time::Instant::now();
        assert!(!signal.wait(Some(Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
