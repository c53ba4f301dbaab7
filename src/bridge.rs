use anyhow::{Context, Result, bail};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::detector::ChangeDetector;
use crate::system::{MixerInterface, NotificationSinkInterface};

/// What a channel observes on its mixer control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Volume,
    Mute,
}

/// One monitored mixer control: the mixer handle, the notification sink it
/// drives, and the last state observed by the poll loop.
///
/// The stored state is owned by the poll thread alone. Hotkeys and other
/// writers only ever touch the mixer; their changes arrive here through the
/// wait-descriptor wakeup path.
pub struct Channel {
    label: String,
    kind: ChannelKind,
    mixer: Arc<dyn MixerInterface>,
    sink: Arc<dyn NotificationSinkInterface>,
    detector: ChangeDetector,
    last_volume: Option<i64>,
    last_mute: Option<bool>,
    drain_failures: u32,
}

/// A drain failure leaves the descriptors readable, so the loop re-wakes
/// immediately. After this many consecutive failures the channel gives up
/// instead of spinning.
const MAX_DRAIN_FAILURES: u32 = 3;

impl Channel {
    /// A channel that notifies on volume changes.
    pub fn volume(
        label: &str,
        mixer: Arc<dyn MixerInterface>,
        sink: Arc<dyn NotificationSinkInterface>,
        detector: ChangeDetector,
    ) -> Self {
        Self::new(label, ChannelKind::Volume, mixer, sink, detector)
    }

    /// A channel that notifies on mute/unmute transitions.
    pub fn mute(
        label: &str,
        mixer: Arc<dyn MixerInterface>,
        sink: Arc<dyn NotificationSinkInterface>,
        detector: ChangeDetector,
    ) -> Self {
        Self::new(label, ChannelKind::Mute, mixer, sink, detector)
    }

    fn new(
        label: &str,
        kind: ChannelKind,
        mixer: Arc<dyn MixerInterface>,
        sink: Arc<dyn NotificationSinkInterface>,
        detector: ChangeDetector,
    ) -> Self {
        Self {
            label: label.to_string(),
            kind,
            mixer,
            sink,
            detector,
            last_volume: None,
            last_mute: None,
            drain_failures: 0,
        }
    }

    /// Handle a wakeup on this channel: acknowledge the pending mixer
    /// events, re-query the state and notify if it actually changed.
    ///
    /// A failing query or notification is logged and retried on the next
    /// wakeup. A failing drain is different: the descriptors stay readable,
    /// so persistent drain failure turns fatal rather than busy-looping.
    fn process(&mut self) -> Result<()> {
        // Draining first is a correctness requirement: until the pending
        // events are acknowledged the descriptors stay readable and the
        // poll loop would spin.
        if let Err(e) = self.mixer.drain_events() {
            self.drain_failures += 1;
            if self.drain_failures >= MAX_DRAIN_FAILURES {
                return Err(e).with_context(|| {
                    format!(
                        "{}: acknowledging mixer events failed {} times in a row",
                        self.label, self.drain_failures
                    )
                });
            }
            warn!("{}: failed to acknowledge mixer events: {e:#}", self.label);
            return Ok(());
        }
        self.drain_failures = 0;

        // A single failed detection must not kill the loop; log it and
        // wait for the next wakeup.
        if let Err(e) = self.refresh() {
            warn!("{}: change handling failed: {e:#}", self.label);
        }

        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        match self.kind {
            ChannelKind::Volume => {
                let volume = self.mixer.volume()?;
                if let Some(event) = self.detector.detect_volume(self.last_volume, volume) {
                    debug!("{}: volume changed to {}", self.label, volume);
                    self.sink.show(&event)?;
                }
                self.last_volume = Some(volume);
            }
            ChannelKind::Mute => {
                let muted = self.mixer.is_muted()?;
                if let Some(event) = self.detector.detect_mute(self.last_mute, muted) {
                    debug!("{}: mute switched to {}", self.label, muted);
                    self.sink.show(&event)?;
                }
                self.last_mute = Some(muted);
            }
        }

        Ok(())
    }
}

/// Cloneable handle that wakes a blocked [`PollBridge::run`] and makes it
/// return. Safe to call from any thread, any number of times.
#[derive(Clone)]
pub struct ShutdownHandle {
    write_fd: Arc<OwnedFd>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            let byte = [1u8];
            // The pipe is nonblocking; if it were somehow full the loop is
            // already awake, so the result does not matter.
            let _ = unsafe { libc::write(self.write_fd.as_raw_fd(), byte.as_ptr().cast(), 1) };
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// The core engine: blocks on every channel's wait descriptors plus one
/// shutdown pipe, and bridges mixer change events to notification sinks.
pub struct PollBridge {
    channels: Vec<Channel>,
    shutdown_read: OwnedFd,
    shutdown: ShutdownHandle,
}

impl PollBridge {
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        if channels.is_empty() {
            bail!("poll bridge needs at least one channel");
        }

        let (read_fd, write_fd) = create_pipe().context("failed to create shutdown pipe")?;

        Ok(Self {
            channels,
            shutdown_read: read_fd,
            shutdown: ShutdownHandle {
                write_fd: Arc::new(write_fd),
                requested: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the observe -> detect -> notify loop on the calling thread.
    /// Returns after [`ShutdownHandle::request_shutdown`], or with an error
    /// if the wait itself fails. Sinks are closed on every exit path.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_loop();

        for channel in &self.channels {
            if let Err(e) = channel.sink.close() {
                debug!("{}: failed to close notification sink: {e:#}", channel.label);
            }
        }

        result
    }

    fn run_loop(&mut self) -> Result<()> {
        info!(
            "mixer poll loop started, watching {} channel(s)",
            self.channels.len()
        );

        loop {
            // Rebuilt every cycle; ALSA may change its descriptor set.
            // Slot 0 is always the shutdown pipe.
            let mut fds = vec![libc::pollfd {
                fd: self.shutdown_read.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            let mut spans = Vec::with_capacity(self.channels.len());
            for channel in &self.channels {
                let descriptors = channel
                    .mixer
                    .wait_descriptors()
                    .with_context(|| format!("{}: failed to collect wait descriptors", channel.label))?;
                spans.push((fds.len(), descriptors.len()));
                fds.extend(descriptors);
            }

            poll_indefinite(&mut fds).context("mixer wait failed")?;

            // Shutdown takes priority over any simultaneously ready channel.
            if fds[0].revents != 0 {
                info!("shutdown requested, leaving mixer poll loop");
                return Ok(());
            }

            for (channel, (start, len)) in self.channels.iter_mut().zip(spans) {
                if fds[start..start + len].iter().any(|fd| fd.revents != 0) {
                    channel.process()?;
                }
            }
        }
    }
}

/// Block until at least one descriptor is ready. Interrupting signals are
/// retried; any other failure is fatal to the loop.
pub(crate) fn poll_indefinite(fds: &mut [libc::pollfd]) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// A nonblocking close-on-exec pipe, used as the shutdown wakeup primitive
/// and by the mock mixer's fake event descriptors.
pub(crate) fn create_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}
