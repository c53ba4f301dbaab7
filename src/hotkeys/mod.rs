//! X11 media-key router.
//!
//! Grabs the XF86 audio keys on the root window and translates presses
//! into direct mixer mutations. The resulting state change reaches the
//! poll bridge through the mixer's own wait descriptors, so there is no
//! shared state with the bridge beyond the mixer handle itself.

use anyhow::{Context, Result, bail};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{ConnectionExt, GrabMode, Keycode, ModMask, Window};
use x11rb::rust_connection::RustConnection;

use crate::bridge::{create_pipe, poll_indefinite};
use crate::system::MixerInterface;

const XF86_AUDIO_LOWER_VOLUME: u32 = 0x1008_ff11;
const XF86_AUDIO_MUTE: u32 = 0x1008_ff12;
const XF86_AUDIO_RAISE_VOLUME: u32 = 0x1008_ff13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    LowerVolume,
    RaiseVolume,
    ToggleMute,
}

/// Global hotkey listener running on its own thread.
pub struct HotkeyRouter {
    running: Arc<AtomicBool>,
    wake_write: OwnedFd,
    thread: Option<thread::JoinHandle<()>>,
}

impl HotkeyRouter {
    /// Connect to X11, grab the media keys and start the event thread.
    ///
    /// The mute key is only bound when a digital-output mixer is
    /// configured.
    pub fn spawn(
        volume_mixer: Arc<dyn MixerInterface>,
        digital_mixer: Option<Arc<dyn MixerInterface>>,
        volume_step: i64,
    ) -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).context("failed to connect to X server")?;
        let root = conn.setup().roots[screen_num].root;

        let mut wanted = vec![
            (XF86_AUDIO_LOWER_VOLUME, HotkeyAction::LowerVolume),
            (XF86_AUDIO_RAISE_VOLUME, HotkeyAction::RaiseVolume),
        ];
        if digital_mixer.is_some() {
            wanted.push((XF86_AUDIO_MUTE, HotkeyAction::ToggleMute));
        }

        let keymap = Keymap::load(&conn)?;
        let mut bindings: Vec<(Keycode, HotkeyAction)> = Vec::new();
        for (keysym, action) in wanted {
            match keymap.keycode_for(keysym) {
                Some(keycode) => {
                    grab_key(&conn, root, keycode);
                    bindings.push((keycode, action));
                    debug!("bound {:?} to keycode {}", action, keycode);
                }
                None => warn!("keysym {keysym:#x} ({action:?}) not present in the X keymap"),
            }
        }
        if bindings.is_empty() {
            bail!("none of the media key symbols are present in the X keymap");
        }
        conn.flush()?;

        info!("global hotkeys active ({} key(s) bound)", bindings.len());

        let (wake_read, wake_write) =
            create_pipe().context("failed to create hotkey wake pipe")?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let thread = thread::Builder::new()
            .name("hotkeys".to_string())
            .spawn(move || {
                if let Err(e) = event_loop(
                    conn,
                    bindings,
                    volume_mixer,
                    digital_mixer,
                    volume_step,
                    thread_running,
                    wake_read,
                ) {
                    error!("hotkey event loop failed: {e:#}");
                }
            })?;

        Ok(Self {
            running,
            wake_write,
            thread: Some(thread),
        })
    }

    /// Stop the event thread and wait for it to exit. Key grabs are left
    /// to process teardown.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let byte = [1u8];
        let _ = unsafe { libc::write(self.wake_write.as_raw_fd(), byte.as_ptr().cast(), 1) };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HotkeyRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply a hotkey action to the shared mixer handles.
pub fn apply_action(
    action: HotkeyAction,
    volume_mixer: &dyn MixerInterface,
    digital_mixer: Option<&dyn MixerInterface>,
    volume_step: i64,
) -> Result<()> {
    match action {
        HotkeyAction::LowerVolume => adjust_volume(volume_mixer, -volume_step),
        HotkeyAction::RaiseVolume => adjust_volume(volume_mixer, volume_step),
        HotkeyAction::ToggleMute => match digital_mixer {
            Some(mixer) => mixer.set_mute(!mixer.is_muted()?),
            None => Ok(()),
        },
    }
}

fn adjust_volume(mixer: &dyn MixerInterface, delta: i64) -> Result<()> {
    let volume = mixer.volume()?;
    mixer.set_volume((volume + delta).clamp(0, 100))
}

fn event_loop(
    conn: RustConnection,
    bindings: Vec<(Keycode, HotkeyAction)>,
    volume_mixer: Arc<dyn MixerInterface>,
    digital_mixer: Option<Arc<dyn MixerInterface>>,
    volume_step: i64,
    running: Arc<AtomicBool>,
    wake_read: OwnedFd,
) -> Result<()> {
    let stream_fd = conn.stream().as_fd().as_raw_fd();

    while running.load(Ordering::SeqCst) {
        // Handle everything already buffered before blocking again; the
        // socket only signals readable for unread wire data.
        while let Some(event) = conn.poll_for_event()? {
            if let Event::KeyPress(key) = event {
                if let Some((_, action)) = bindings.iter().find(|(kc, _)| *kc == key.detail) {
                    debug!("hotkey pressed: {:?}", action);
                    if let Err(e) = apply_action(
                        *action,
                        volume_mixer.as_ref(),
                        digital_mixer.as_deref(),
                        volume_step,
                    ) {
                        warn!("hotkey action {:?} failed: {e:#}", action);
                    }
                }
            }
        }

        // Block on the X socket plus the wake pipe; slot 0 ends the loop.
        let mut fds = [
            libc::pollfd {
                fd: wake_read.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: stream_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        poll_indefinite(&mut fds).context("hotkey wait failed")?;
        if fds[0].revents != 0 {
            break;
        }
    }
    Ok(())
}

/// Grab a keycode with every CapsLock/NumLock modifier combination, so the
/// keys fire regardless of lock state.
fn grab_key(conn: &RustConnection, root: Window, keycode: Keycode) {
    let modifiers = [
        ModMask::from(0u16),
        ModMask::LOCK,
        ModMask::M2,
        ModMask::LOCK | ModMask::M2,
    ];

    for &mods in &modifiers {
        match conn.grab_key(false, root, mods, keycode, GrabMode::ASYNC, GrabMode::ASYNC) {
            Ok(cookie) => {
                if let Err(e) = cookie.check() {
                    debug!("could not grab keycode {} with mods {:?}: {}", keycode, mods, e);
                }
            }
            Err(e) => debug!("grab request for keycode {} failed: {}", keycode, e),
        }
    }
}

struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<u32>,
}

impl Keymap {
    fn load(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;
        let reply = conn
            .get_keyboard_mapping(min_keycode, count)?
            .reply()
            .context("failed to fetch the X keyboard mapping")?;
        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode as usize,
            keysyms: reply.keysyms,
        })
    }

    fn keycode_for(&self, keysym: u32) -> Option<Keycode> {
        find_keycode(
            &self.keysyms,
            self.keysyms_per_keycode,
            self.min_keycode,
            keysym,
        )
    }
}

fn find_keycode(
    keysyms: &[u32],
    keysyms_per_keycode: usize,
    min_keycode: Keycode,
    keysym: u32,
) -> Option<Keycode> {
    if keysyms_per_keycode == 0 {
        return None;
    }
    keysyms
        .chunks(keysyms_per_keycode)
        .position(|chunk| chunk.contains(&keysym))
        .map(|index| min_keycode + index as Keycode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockMixer;

    #[test]
    fn find_keycode_locates_keysym() {
        // Keycodes 10..13, two keysyms per keycode.
        let keysyms = vec![0x61, 0x41, 0x62, 0x42, XF86_AUDIO_MUTE, 0, 0x64, 0x44];
        assert_eq!(find_keycode(&keysyms, 2, 10, XF86_AUDIO_MUTE), Some(12));
        assert_eq!(find_keycode(&keysyms, 2, 10, 0x41), Some(10));
        assert_eq!(find_keycode(&keysyms, 2, 10, 0xffff), None);
        assert_eq!(find_keycode(&keysyms, 0, 10, 0x61), None);
    }

    #[test]
    fn raise_and_lower_step_the_volume() {
        let mixer = MockMixer::new(50, false).unwrap();

        apply_action(HotkeyAction::RaiseVolume, &mixer, None, 5).unwrap();
        apply_action(HotkeyAction::LowerVolume, &mixer, None, 5).unwrap();

        assert_eq!(mixer.set_volume_calls(), vec![55, 50]);
    }

    #[test]
    fn volume_adjustment_clamps_at_bounds() {
        let mixer = MockMixer::new(3, false).unwrap();
        apply_action(HotkeyAction::LowerVolume, &mixer, None, 5).unwrap();
        assert_eq!(mixer.set_volume_calls(), vec![0]);

        let mixer = MockMixer::new(98, false).unwrap();
        apply_action(HotkeyAction::RaiseVolume, &mixer, None, 5).unwrap();
        assert_eq!(mixer.set_volume_calls(), vec![100]);
    }

    #[test]
    fn mute_toggles_the_digital_mixer_only() {
        let volume = MockMixer::new(40, false).unwrap();
        let digital = MockMixer::new(100, false).unwrap();
        let digital_ref: &dyn MixerInterface = &digital;

        apply_action(HotkeyAction::ToggleMute, &volume, Some(digital_ref), 5).unwrap();
        assert_eq!(digital.set_mute_calls(), vec![true]);
        assert!(volume.set_mute_calls().is_empty());

        apply_action(HotkeyAction::ToggleMute, &volume, Some(digital_ref), 5).unwrap();
        assert_eq!(digital.set_mute_calls(), vec![true, false]);
    }

    #[test]
    fn mute_without_digital_mixer_is_a_no_op() {
        let volume = MockMixer::new(40, false).unwrap();
        apply_action(HotkeyAction::ToggleMute, &volume, None, 5).unwrap();
        assert!(volume.set_mute_calls().is_empty());
    }
}
