use anyhow::{Result, bail};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::{Arc, Mutex};

use crate::bridge::create_pipe;
use crate::detector::NotificationEvent;
use crate::system::traits::{MixerInterface, NotificationSinkInterface};

struct MockMixerState {
    volume: i64,
    muted: bool,
    fail_query: bool,
    fail_drain: bool,
    fail_wait: bool,
    drained_bytes: usize,
    set_volume_calls: Vec<i64>,
    set_mute_calls: Vec<bool>,
}

/// Mock mixer for testing - backed by a real pipe, so its wait descriptor
/// behaves exactly like a hardware one under `poll(2)`: it becomes ready
/// when an event is emitted and stays ready until drained.
#[derive(Clone)]
pub struct MockMixer {
    state: Arc<Mutex<MockMixerState>>,
    pipe_read: Arc<OwnedFd>,
    pipe_write: Arc<OwnedFd>,
}

impl MockMixer {
    pub fn new(volume: i64, muted: bool) -> Result<Self> {
        let (pipe_read, pipe_write) = create_pipe()?;
        Ok(Self {
            state: Arc::new(Mutex::new(MockMixerState {
                volume,
                muted,
                fail_query: false,
                fail_drain: false,
                fail_wait: false,
                drained_bytes: 0,
                set_volume_calls: Vec::new(),
                set_mute_calls: Vec::new(),
            })),
            pipe_read: Arc::new(pipe_read),
            pipe_write: Arc::new(pipe_write),
        })
    }

    /// Change the volume as if some external program did it, marking the
    /// wait descriptor ready.
    pub fn emit_volume(&self, volume: i64) {
        self.state.lock().unwrap().volume = volume;
        self.signal();
    }

    /// Flip the mute switch as if some external program did it.
    pub fn emit_mute(&self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
        self.signal();
    }

    /// Make subsequent state queries fail (to exercise the bridge's
    /// keep-running-on-error path).
    pub fn set_query_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_query = fail;
    }

    /// Make event acknowledgement fail without consuming the pending
    /// bytes, so the wait descriptor stays readable.
    pub fn set_drain_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_drain = fail;
    }

    /// Make wait-descriptor collection fail.
    pub fn set_wait_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_wait = fail;
    }

    pub fn drained_bytes(&self) -> usize {
        self.state.lock().unwrap().drained_bytes
    }

    pub fn set_volume_calls(&self) -> Vec<i64> {
        self.state.lock().unwrap().set_volume_calls.clone()
    }

    pub fn set_mute_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().set_mute_calls.clone()
    }

    fn signal(&self) {
        let byte = [1u8];
        let _ = unsafe { libc::write(self.pipe_write.as_raw_fd(), byte.as_ptr().cast(), 1) };
    }
}

impl MixerInterface for MockMixer {
    fn volume(&self) -> Result<i64> {
        let state = self.state.lock().unwrap();
        if state.fail_query {
            bail!("mock volume query failure");
        }
        Ok(state.volume)
    }

    fn is_muted(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.fail_query {
            bail!("mock mute query failure");
        }
        Ok(state.muted)
    }

    fn set_volume(&self, percent: i64) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.set_volume_calls.push(percent);
            state.volume = percent.clamp(0, 100);
        }
        // Mirror hardware behavior: a mutation makes the descriptor ready.
        self.signal();
        Ok(())
    }

    fn set_mute(&self, mute: bool) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.set_mute_calls.push(mute);
            state.muted = mute;
        }
        self.signal();
        Ok(())
    }

    fn wait_descriptors(&self) -> Result<Vec<libc::pollfd>> {
        if self.state.lock().unwrap().fail_wait {
            bail!("mock wait descriptor failure");
        }
        Ok(vec![libc::pollfd {
            fd: self.pipe_read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }])
    }

    fn drain_events(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_drain {
            bail!("mock drain failure");
        }
        let mut buf = [0u8; 16];
        loop {
            let n = unsafe {
                libc::read(self.pipe_read.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len())
            };
            if n <= 0 {
                // Nonblocking pipe: EAGAIN means fully drained.
                return Ok(());
            }
            self.state.lock().unwrap().drained_bytes += n as usize;
        }
    }
}

/// Mock notification sink that records every shown event.
#[derive(Clone, Default)]
pub struct MockNotificationSink {
    shown: Arc<Mutex<Vec<NotificationEvent>>>,
    closed: Arc<Mutex<bool>>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<NotificationEvent> {
        self.shown.lock().unwrap().clone()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

impl NotificationSinkInterface for MockNotificationSink {
    fn show(&self, event: &NotificationEvent) -> Result<()> {
        self.shown.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}
